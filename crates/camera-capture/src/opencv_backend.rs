use crate::io::{pixel_format_for_channels, to_bgr_mat};
use crate::{
    CameraDescriptor, CameraSource, DeviceHandle, Dimensions, EncoderFactory, Error, Frame,
    Preview, Result, VideoEncoder,
};
use opencv::prelude::*;
use opencv::{core, highgui, videoio};
use std::path::Path;
use time::OffsetDateTime;
use tracing::debug;

/// Cameras reachable through OpenCV's `VideoCapture`.
pub struct OpenCvCamera {
    probe_limit: usize,
    exposure_us: Option<u32>,
}

impl OpenCvCamera {
    pub fn new(probe_limit: usize) -> Self {
        Self {
            probe_limit,
            exposure_us: None,
        }
    }

    pub fn with_exposure_us(mut self, exposure_us: Option<u32>) -> Self {
        self.exposure_us = exposure_us;
        self
    }
}

impl CameraSource for OpenCvCamera {
    type Device = OpenCvDevice;

    fn list(&self) -> Result<Vec<CameraDescriptor>> {
        // OpenCV has no enumeration API; probe indices and keep the ones that open
        let mut out = Vec::new();
        for idx in 0..self.probe_limit as i32 {
            let mut cap = match videoio::VideoCapture::new(idx, videoio::CAP_ANY) {
                Ok(cap) => cap,
                Err(e) => {
                    debug!(idx, "probe failed: {e}");
                    continue;
                }
            };
            if cap.is_opened().unwrap_or(false) {
                out.push(CameraDescriptor {
                    index: out.len(),
                    serial_number: None,
                    instance_path: idx.to_string(),
                });
            }
            let _ = cap.release();
        }
        Ok(out)
    }

    fn open(&self, instance_path: &str) -> Result<OpenCvDevice> {
        // Numeric paths are capture indices, anything else a file or URL
        let mut cap = if let Ok(idx) = instance_path.parse::<i32>() {
            videoio::VideoCapture::new(idx, videoio::CAP_ANY)
                .map_err(|e| Error::Device(e.to_string()))?
        } else {
            videoio::VideoCapture::from_file(instance_path, videoio::CAP_ANY)
                .map_err(|e| Error::Device(e.to_string()))?
        };
        let opened = cap.is_opened().map_err(|e| Error::Device(e.to_string()))?;
        if !opened {
            return Err(Error::Device(format!(
                "failed to open camera with instance path: {instance_path}"
            )));
        }
        if let Some(us) = self.exposure_us {
            // Units are backend specific; ignore backends that refuse it
            let accepted = cap
                .set(videoio::CAP_PROP_EXPOSURE, f64::from(us))
                .unwrap_or(false);
            debug!(exposure_us = us, accepted, "exposure hint");
        }
        Ok(OpenCvDevice {
            cap,
            mat: core::Mat::default(),
        })
    }
}

pub struct OpenCvDevice {
    cap: videoio::VideoCapture,
    mat: core::Mat,
}

impl DeviceHandle for OpenCvDevice {
    fn grab(&mut self) -> Result<Frame<'_>> {
        let got = self
            .cap
            .read(&mut self.mat)
            .map_err(|e| Error::Device(e.to_string()))?;
        if !got || self.mat.empty() {
            return Err(Error::Device("failed to get image data (empty frame)".into()));
        }
        let pixel_format = pixel_format_for_channels(self.mat.channels())?;
        let width = self.mat.cols() as u32;
        let height = self.mat.rows() as u32;
        let data = self
            .mat
            .data_bytes()
            .map_err(|e| Error::Device(e.to_string()))?;
        Ok(Frame {
            width,
            height,
            pixel_format,
            data,
            ts: Some(OffsetDateTime::now_utc()),
        })
    }
}

impl Drop for OpenCvDevice {
    fn drop(&mut self) {
        let _ = self.cap.release();
    }
}

/// Creates `VideoWriter`s with a fixed fourcc.
pub struct OpenCvEncoderFactory {
    fourcc: [char; 4],
}

impl OpenCvEncoderFactory {
    pub fn new(fourcc: [char; 4]) -> Self {
        Self { fourcc }
    }
}

impl EncoderFactory for OpenCvEncoderFactory {
    fn create(
        &mut self,
        path: &Path,
        size: Dimensions,
        fps: f64,
    ) -> Result<Box<dyn VideoEncoder>> {
        let [c1, c2, c3, c4] = self.fourcc;
        let code =
            videoio::VideoWriter::fourcc(c1, c2, c3, c4).map_err(|e| Error::Sink(e.to_string()))?;
        let filename = path
            .to_str()
            .ok_or_else(|| Error::Sink(format!("non UTF-8 output path: {}", path.display())))?;
        let writer = videoio::VideoWriter::new(
            filename,
            code,
            fps,
            core::Size::new(size.width as i32, size.height as i32),
            true,
        )
        .map_err(|e| Error::Sink(e.to_string()))?;
        if !writer.is_opened().map_err(|e| Error::Sink(e.to_string()))? {
            return Err(Error::Sink(format!(
                "could not open video writer for {}",
                path.display()
            )));
        }
        Ok(Box::new(OpenCvEncoder { writer }))
    }
}

struct OpenCvEncoder {
    writer: videoio::VideoWriter,
}

impl VideoEncoder for OpenCvEncoder {
    fn write(&mut self, frame: &Frame<'_>) -> Result<()> {
        let bgr = to_bgr_mat(frame)?;
        self.writer
            .write(&bgr)
            .map_err(|e| Error::Sink(e.to_string()))
    }

    fn release(&mut self) -> Result<()> {
        self.writer
            .release()
            .map_err(|e| Error::Sink(e.to_string()))
    }
}

/// A highgui window; keys are read with `wait_key(1)`, which also pumps the
/// window's event loop.
pub struct HighGuiPreview {
    title: String,
}

impl HighGuiPreview {
    pub fn new(title: impl Into<String>) -> Result<Self> {
        let title = title.into();
        highgui::named_window(&title, highgui::WINDOW_AUTOSIZE)
            .map_err(|e| Error::Sink(e.to_string()))?;
        Ok(Self { title })
    }
}

impl Preview for HighGuiPreview {
    fn show(&mut self, frame: &Frame<'_>) -> Result<()> {
        let bgr = to_bgr_mat(frame)?;
        highgui::imshow(&self.title, &bgr).map_err(|e| Error::Sink(e.to_string()))
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        let key = highgui::wait_key(1).map_err(|e| Error::Sink(e.to_string()))?;
        if key < 0 {
            return Ok(None);
        }
        Ok(Some(char::from((key & 0xFF) as u8)))
    }

    fn close(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.title) {
            debug!("destroy_window failed: {e}");
        }
    }
}
