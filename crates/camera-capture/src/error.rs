use crate::Dimensions;
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("camera at index {index} is not available ({available} camera(s) found)")]
    Configuration { index: usize, available: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("frame size changed from {expected} to {found} during the run")]
    GeometryChanged {
        expected: Dimensions,
        found: Dimensions,
    },
    #[error("sink error: {0}")]
    Sink(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(String),
}

/// Coarse failure domain, so callers can pick a recovery policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Detected before any device was opened.
    Configuration,
    /// Raised while a device was open; resources were released first.
    Device,
    /// Encoder or preview failure.
    Sink,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. } | Error::Config(_) => ErrorKind::Configuration,
            Error::Device(_) | Error::GeometryChanged { .. } | Error::Unsupported(_) => {
                ErrorKind::Device
            }
            Error::Sink(_) | Error::Io(_) => ErrorKind::Sink,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
