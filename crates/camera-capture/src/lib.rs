//! camera-capture: single-camera acquisition loop with optional recording
//!
//! Camera drivers, preview windows and video encoders sit behind small traits.
//! The default build enables a `mock` backend so binaries compile on any host;
//! the `opencv` feature adds a real one and `ximea` the XIMEA xiAPI driver.

mod types;
pub use types::{CameraDescriptor, Dimensions, Frame, PixelFormat};

mod error;
pub use error::{Error, ErrorKind, Result};

mod traits;
pub use traits::{CameraSource, DeviceHandle, EncoderFactory, Preview, VideoEncoder};

mod stats;
pub use stats::RunStatistics;

mod recording;
pub use recording::{RecordingSink, RecordingSummary};

mod capture;
pub use capture::{
    open_camera, select_camera, CaptureLoop, RunError, RunReport, StopFlag, StopReason,
};

pub mod config;
pub use config::CaptureConfig;

pub mod io;

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::{
    MockCamera, MockCounts, MockDevice, MockEncoderFactory, MockPreview, MockProbe,
};

#[cfg(feature = "opencv")]
mod opencv_backend;
#[cfg(feature = "opencv")]
pub use opencv_backend::{HighGuiPreview, OpenCvCamera, OpenCvDevice, OpenCvEncoderFactory};

#[cfg(feature = "ximea")]
mod ximea_backend;
#[cfg(feature = "ximea")]
pub use ximea_backend::{XimeaCamera, XimeaDevice, DEFAULT_GRAB_TIMEOUT_MS};
