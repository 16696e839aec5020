use core::fmt;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Bgr8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    /// Samples per pixel.
    pub fn channels(self) -> u32 {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Width and height of a frame in pixels.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One acquired image.
///
/// `data` borrows the device's buffer, so a frame only lives until the next
/// call to [`DeviceHandle::grab`](crate::DeviceHandle::grab).
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: &'a [u8],
    pub ts: Option<OffsetDateTime>,
}

impl Frame<'_> {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    pub fn channels(&self) -> u32 {
        self.pixel_format.channels()
    }

    /// Number of bytes a tightly packed frame of this shape occupies.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels() as usize
    }
}

/// Enumerated identity of one camera, prior to opening it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CameraDescriptor {
    pub index: usize,
    pub serial_number: Option<String>,
    pub instance_path: String,
}

impl CameraDescriptor {
    /// Find the enumerated camera with the given instance path.
    pub fn find_by_path<'a>(
        cameras: &'a [CameraDescriptor],
        instance_path: &str,
    ) -> Option<&'a CameraDescriptor> {
        cameras.iter().find(|c| c.instance_path == instance_path)
    }
}
