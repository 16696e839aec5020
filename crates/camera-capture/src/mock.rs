use crate::{
    CameraDescriptor, CameraSource, DeviceHandle, Dimensions, EncoderFactory, Error, Frame,
    PixelFormat, Preview, Result, VideoEncoder,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

/// Calls observed by the mock backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MockCounts {
    pub lists: usize,
    pub opens: Vec<String>,
    pub devices_dropped: usize,
    pub frames_grabbed: u64,
    pub encoders_created: Vec<(PathBuf, Dimensions, f64)>,
    pub frames_encoded: u64,
    pub encoders_released: usize,
    pub frames_shown: u64,
    pub previews_closed: usize,
}

/// Shared handle onto [`MockCounts`], cloned into every mock object.
#[derive(Clone, Debug, Default)]
pub struct MockProbe {
    inner: Arc<Mutex<MockCounts>>,
}

impl MockProbe {
    pub fn snapshot(&self) -> MockCounts {
        self.inner
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut MockCounts)) {
        if let Ok(mut counts) = self.inner.lock() {
            f(&mut counts);
        }
    }
}

/// In-process camera backend producing synthetic frames.
#[derive(Clone, Debug)]
pub struct MockCamera {
    cameras: usize,
    size: Dimensions,
    fail_after: Option<u64>,
    resize_after: Option<u64>,
    probe: MockProbe,
}

impl MockCamera {
    pub fn new(cameras: usize) -> Self {
        Self {
            cameras,
            size: Dimensions {
                width: 320,
                height: 240,
            },
            fail_after: None,
            resize_after: None,
            probe: MockProbe::default(),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Dimensions { width, height };
        self
    }

    /// Acquisition fails once `frames` frames have been delivered.
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Frames after the first `frames` come out at half size.
    pub fn resize_after(mut self, frames: u64) -> Self {
        self.resize_after = Some(frames);
        self
    }

    pub fn with_probe(mut self, probe: MockProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }

    fn instance_path(index: usize) -> String {
        format!("mock://{index}")
    }
}

impl CameraSource for MockCamera {
    type Device = MockDevice;

    fn list(&self) -> Result<Vec<CameraDescriptor>> {
        self.probe.update(|c| c.lists += 1);
        Ok((0..self.cameras)
            .map(|index| CameraDescriptor {
                index,
                serial_number: Some(format!("MOCK{index:04}")),
                instance_path: Self::instance_path(index),
            })
            .collect())
    }

    fn open(&self, instance_path: &str) -> Result<MockDevice> {
        if CameraDescriptor::find_by_path(&self.list()?, instance_path).is_none() {
            return Err(Error::Device(format!(
                "failed to open camera with instance path: {instance_path}"
            )));
        }
        self.probe
            .update(|c| c.opens.push(instance_path.to_string()));
        Ok(MockDevice {
            size: self.size,
            counter: 0,
            fail_after: self.fail_after,
            resize_after: self.resize_after,
            buf: Vec::new(),
            probe: self.probe.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MockDevice {
    size: Dimensions,
    counter: u64,
    fail_after: Option<u64>,
    resize_after: Option<u64>,
    buf: Vec<u8>,
    probe: MockProbe,
}

impl DeviceHandle for MockDevice {
    fn grab(&mut self) -> Result<Frame<'_>> {
        if self.fail_after.is_some_and(|n| self.counter >= n) {
            return Err(Error::Device(format!(
                "mock acquisition failed after {} frames",
                self.counter
            )));
        }
        let (width, height) = if self.resize_after.is_some_and(|n| self.counter >= n) {
            (self.size.width / 2, self.size.height / 2)
        } else {
            (self.size.width, self.size.height)
        };
        self.counter += 1;

        // Gray ramp, shifted each frame so consecutive frames differ
        let shift = self.counter as u32;
        self.buf.clear();
        self.buf.reserve((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                self.buf.push(((x + y + shift) % 256) as u8);
            }
        }
        self.probe.update(|c| c.frames_grabbed += 1);
        Ok(Frame {
            width,
            height,
            pixel_format: PixelFormat::Gray8,
            data: &self.buf,
            ts: Some(OffsetDateTime::now_utc()),
        })
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.probe.update(|c| c.devices_dropped += 1);
    }
}

/// Encoder factory that records calls instead of writing files.
pub struct MockEncoderFactory {
    probe: MockProbe,
}

impl MockEncoderFactory {
    pub fn new(probe: MockProbe) -> Self {
        Self { probe }
    }
}

impl EncoderFactory for MockEncoderFactory {
    fn create(
        &mut self,
        path: &Path,
        size: Dimensions,
        fps: f64,
    ) -> Result<Box<dyn VideoEncoder>> {
        self.probe
            .update(|c| c.encoders_created.push((path.to_path_buf(), size, fps)));
        Ok(Box::new(MockEncoder {
            probe: self.probe.clone(),
            released: false,
        }))
    }
}

struct MockEncoder {
    probe: MockProbe,
    released: bool,
}

impl VideoEncoder for MockEncoder {
    fn write(&mut self, _frame: &Frame<'_>) -> Result<()> {
        if self.released {
            return Err(Error::Sink("write after release".into()));
        }
        self.probe.update(|c| c.frames_encoded += 1);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Err(Error::Sink("encoder released twice".into()));
        }
        self.released = true;
        self.probe.update(|c| c.encoders_released += 1);
        Ok(())
    }
}

/// Headless preview; reports `key` after `press_after` frames were shown.
pub struct MockPreview {
    key: char,
    press_after: Option<u64>,
    fail_after: Option<u64>,
    shown: u64,
    probe: MockProbe,
}

impl MockPreview {
    pub fn new(probe: MockProbe) -> Self {
        Self {
            key: 'q',
            press_after: None,
            fail_after: None,
            shown: 0,
            probe,
        }
    }

    pub fn press_after(mut self, frames: u64, key: char) -> Self {
        self.press_after = Some(frames);
        self.key = key;
        self
    }

    /// `show` fails once `frames` frames have been displayed.
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

impl Preview for MockPreview {
    fn show(&mut self, _frame: &Frame<'_>) -> Result<()> {
        if self.fail_after.is_some_and(|n| self.shown >= n) {
            return Err(Error::Sink("mock window lost".into()));
        }
        self.shown += 1;
        self.probe.update(|c| c.frames_shown += 1);
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        Ok(self
            .press_after
            .filter(|n| self.shown >= *n)
            .map(|_| self.key))
    }

    fn close(&mut self) {
        self.probe.update(|c| c.previews_closed += 1);
    }
}
