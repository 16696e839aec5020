use crate::{Error, PixelFormat, Result};

#[cfg(feature = "opencv")]
use crate::Frame;
#[cfg(feature = "opencv")]
use opencv::{core, imgproc, prelude::*};

/// Copy a frame into an owned 8-bit BGR Mat, the layout highgui and
/// VideoWriter expect.
#[cfg(feature = "opencv")]
pub fn to_bgr_mat(frame: &Frame<'_>) -> Result<core::Mat> {
    let len = frame.expected_len();
    if frame.data.len() < len || len == 0 {
        return Err(Error::Sink(format!(
            "frame buffer holds {} bytes, expected {len} for {}",
            frame.data.len(),
            frame.dimensions()
        )));
    }
    let mat = core::Mat::from_slice(&frame.data[..len]).map_err(|e| Error::Sink(e.to_string()))?;
    let shaped = mat
        .reshape(frame.channels() as i32, frame.height as i32)
        .map_err(|e| Error::Sink(e.to_string()))?;
    let mut bgr = core::Mat::default();
    match frame.pixel_format {
        PixelFormat::Bgr8 => shaped
            .copy_to(&mut bgr)
            .map_err(|e| Error::Sink(e.to_string()))?,
        PixelFormat::Rgb8 => imgproc::cvt_color(&shaped, &mut bgr, imgproc::COLOR_RGB2BGR, 0)
            .map_err(|e| Error::Sink(e.to_string()))?,
        PixelFormat::Gray8 => imgproc::cvt_color(&shaped, &mut bgr, imgproc::COLOR_GRAY2BGR, 0)
            .map_err(|e| Error::Sink(e.to_string()))?,
    }
    Ok(bgr)
}

/// Map a Mat channel count onto the frame formats the capture path produces.
pub fn pixel_format_for_channels(channels: i32) -> Result<PixelFormat> {
    match channels {
        1 => Ok(PixelFormat::Gray8),
        3 => Ok(PixelFormat::Bgr8),
        _ => Err(Error::Unsupported("only 1- and 3-channel 8-bit frames are supported")),
    }
}
