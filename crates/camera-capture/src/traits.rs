use crate::{CameraDescriptor, Dimensions, Frame, Result};
use std::path::Path;

/// Camera binding: enumerates devices and opens them.
///
/// Passed into the caller explicitly, so tests and the CLI can swap backends.
pub trait CameraSource {
    type Device: DeviceHandle;

    /// List the cameras currently attached, in enumeration order.
    fn list(&self) -> Result<Vec<CameraDescriptor>>;

    /// Open a camera by its instance path.
    fn open(&self, instance_path: &str) -> Result<Self::Device>;
}

/// An open, exclusive session to one camera. Released on drop.
pub trait DeviceHandle {
    /// Block until the next frame is available.
    fn grab(&mut self) -> Result<Frame<'_>>;
}

/// An open video file accepting frames of a fixed size.
pub trait VideoEncoder {
    fn write(&mut self, frame: &Frame<'_>) -> Result<()>;

    /// Flush and close the underlying file.
    fn release(&mut self) -> Result<()>;
}

/// Creates encoders once the frame size is known.
pub trait EncoderFactory {
    fn create(&mut self, path: &Path, size: Dimensions, fps: f64)
        -> Result<Box<dyn VideoEncoder>>;
}

/// A preview window that also yields user key presses.
pub trait Preview {
    fn show(&mut self, frame: &Frame<'_>) -> Result<()>;

    /// Non-blocking poll for a pressed key.
    fn poll_key(&mut self) -> Result<Option<char>>;

    fn close(&mut self);
}
