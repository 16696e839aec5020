//! The capture loop: acquire, forward, count, and always clean up.

use crate::stats::StatsRecorder;
use crate::{
    CameraDescriptor, CameraSource, DeviceHandle, EncoderFactory, Error, Preview, RecordingSink,
    RecordingSummary, Result, RunStatistics,
};
use core::fmt;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Pick the camera at `index` from the source's enumeration.
///
/// Fails with [`Error::Configuration`] when the index is out of range; no
/// device is opened in that case.
pub fn select_camera<S: CameraSource>(source: &S, index: usize) -> Result<CameraDescriptor> {
    let cameras = source.list()?;
    let available = cameras.len();
    debug!(available, "enumerated cameras");
    cameras
        .into_iter()
        .nth(index)
        .ok_or(Error::Configuration { index, available })
}

/// Select and open the camera at `index`.
pub fn open_camera<S: CameraSource>(
    source: &S,
    index: usize,
) -> Result<(CameraDescriptor, S::Device)> {
    let descriptor = select_camera(source, index)?;
    info!(index, path = %descriptor.instance_path, "opening camera");
    let device = source.open(&descriptor.instance_path)?;
    Ok((descriptor, device))
}

/// Cross-thread stop request, e.g. set from a Ctrl+C handler.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    KeyPressed(char),
    Interrupted,
    FrameLimit,
    TimeLimit,
    Failed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::KeyPressed(k) => write!(f, "key '{k}' pressed"),
            StopReason::Interrupted => f.write_str("interrupted"),
            StopReason::FrameLimit => f.write_str("frame limit reached"),
            StopReason::TimeLimit => f.write_str("time limit reached"),
            StopReason::Failed => f.write_str("error"),
        }
    }
}

/// Outcome of one run, available on both the success and the error path.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub statistics: RunStatistics,
    pub stop_reason: StopReason,
    pub recording: Option<RecordingSummary>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---------------------------------")?;
        writeln!(f, "  Total Frames: {}", self.statistics.frame_count)?;
        writeln!(
            f,
            "  Elapsed Time: {:.2} seconds",
            self.statistics.elapsed_secs()
        )?;
        writeln!(
            f,
            "  Actual Average FPS: {:.2}",
            self.statistics.average_fps()
        )?;
        write!(f, "---------------------------------")?;
        if let Some(rec) = &self.recording {
            write!(f, "\nRecording stopped. Video saved to {}", rec.path.display())?;
        }
        Ok(())
    }
}

impl RunReport {
    /// Report for a run that failed before its first acquisition.
    pub fn not_started() -> Self {
        Self {
            statistics: RunStatistics::new(0, Duration::ZERO),
            stop_reason: StopReason::Failed,
            recording: None,
        }
    }
}

/// A run that ended in an error, after cleanup already happened.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct RunError {
    pub report: RunReport,
    pub source: Error,
}

/// Builder and driver for one capture run.
///
/// Frame rate given to [`CaptureLoop::record_to`] only ends up in the video
/// metadata; the loop itself runs as fast as the device delivers.
pub struct CaptureLoop {
    recording: RecordingSink,
    preview: Option<Box<dyn Preview>>,
    stop_key: Option<char>,
    max_frames: Option<u64>,
    max_duration: Option<Duration>,
    stop_flag: Option<StopFlag>,
}

impl Default for CaptureLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureLoop {
    pub fn new() -> Self {
        Self {
            recording: RecordingSink::disabled(),
            preview: None,
            stop_key: Some('q'),
            max_frames: None,
            max_duration: None,
            stop_flag: None,
        }
    }

    pub fn record_to(
        mut self,
        path: impl Into<PathBuf>,
        fps: f64,
        factory: Box<dyn EncoderFactory>,
    ) -> Self {
        self.recording = RecordingSink::new(path, fps, factory);
        self
    }

    pub fn preview(mut self, preview: Box<dyn Preview>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn stop_key(mut self, key: Option<char>) -> Self {
        self.stop_key = key;
        self
    }

    pub fn max_frames(mut self, frames: Option<u64>) -> Self {
        self.max_frames = frames;
        self
    }

    pub fn max_duration(mut self, duration: Option<Duration>) -> Self {
        self.max_duration = duration;
        self
    }

    pub fn stop_flag(mut self, flag: StopFlag) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// Run until a stop condition or an error, then release everything.
    ///
    /// The device is consumed and dropped before this returns, on every path.
    pub fn run<D: DeviceHandle>(mut self, mut device: D) -> Result<RunReport, RunError> {
        let mut stats = StatsRecorder::start();
        info!(
            recording = self.recording.is_enabled(),
            preview = self.preview.is_some(),
            "capture loop started"
        );

        let outcome = self.drive(&mut device, &mut stats);
        let statistics = stats.finish();

        // Cleanup: encoder, window, device. Each exactly once.
        let closed = self.recording.close();
        if let Some(preview) = self.preview.as_mut() {
            preview.close();
        }
        drop(device);
        debug!("capture resources released");

        let (stop_reason, failure) = match outcome {
            Ok(reason) => (reason, None),
            Err(e) => {
                error!("capture stopped by error: {e}");
                (StopReason::Failed, Some(e))
            }
        };
        let (recording, failure) = match closed {
            Ok(summary) => (summary, failure),
            Err(e) => {
                warn!("failed to close recording: {e}");
                (None, failure.or(Some(e)))
            }
        };

        let report = RunReport {
            statistics,
            stop_reason,
            recording,
        };
        info!(
            frames = report.statistics.frame_count,
            fps = report.statistics.average_fps(),
            reason = %report.stop_reason,
            "capture loop finished"
        );
        match failure {
            None => Ok(report),
            Some(source) => Err(RunError { report, source }),
        }
    }

    fn drive<D: DeviceHandle>(
        &mut self,
        device: &mut D,
        stats: &mut StatsRecorder,
    ) -> Result<StopReason> {
        loop {
            if let Some(reason) = self.limit_reached(stats) {
                return Ok(reason);
            }

            let frame = device.grab()?;
            self.recording.write(&frame)?;
            // Counted once recorded, so the count matches the video even if
            // the preview fails below
            stats.record_frame(frame.ts);
            if let Some(preview) = self.preview.as_mut() {
                preview.show(&frame)?;
            }

            if let Some(preview) = self.preview.as_mut() {
                if let Some(key) = preview.poll_key()? {
                    if self.stop_key == Some(key) {
                        return Ok(StopReason::KeyPressed(key));
                    }
                }
            }
        }
    }

    fn limit_reached(&self, stats: &StatsRecorder) -> Option<StopReason> {
        if self.stop_flag.as_ref().is_some_and(StopFlag::is_requested) {
            return Some(StopReason::Interrupted);
        }
        if self.max_frames.is_some_and(|n| stats.frame_count() >= n) {
            return Some(StopReason::FrameLimit);
        }
        if self.max_duration.is_some_and(|d| stats.elapsed() >= d) {
            return Some(StopReason::TimeLimit);
        }
        None
    }
}
