use crate::{Dimensions, EncoderFactory, Error, Frame, Result, VideoEncoder};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// What was written once a recording is closed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub dimensions: Dimensions,
    pub fps: f64,
    pub frames: u64,
}

enum State {
    Disabled,
    /// Output requested; the encoder waits for the first frame's size.
    Pending {
        path: PathBuf,
        fps: f64,
        factory: Box<dyn EncoderFactory>,
    },
    Active {
        encoder: Box<dyn VideoEncoder>,
        summary: RecordingSummary,
    },
    Closed,
}

/// Lazily created video destination.
///
/// `Disabled` or `Pending` until the first frame, `Active` afterwards, and
/// `Closed` after [`RecordingSink::close`]. The encoder is released at most
/// once; dropping an active sink closes it.
pub struct RecordingSink {
    state: State,
}

impl RecordingSink {
    pub fn disabled() -> Self {
        Self {
            state: State::Disabled,
        }
    }

    pub fn new(path: impl Into<PathBuf>, fps: f64, factory: Box<dyn EncoderFactory>) -> Self {
        Self {
            state: State::Pending {
                path: path.into(),
                fps,
                factory,
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, State::Pending { .. } | State::Active { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Forward one frame, creating the encoder on the first call.
    pub fn write(&mut self, frame: &Frame<'_>) -> Result<()> {
        if matches!(self.state, State::Pending { .. }) {
            self.activate(frame)?;
        }
        match &mut self.state {
            State::Disabled => Ok(()),
            State::Active { encoder, summary } => {
                let found = frame.dimensions();
                if found != summary.dimensions {
                    return Err(Error::GeometryChanged {
                        expected: summary.dimensions,
                        found,
                    });
                }
                encoder.write(frame)?;
                summary.frames += 1;
                Ok(())
            }
            State::Closed => Err(Error::Sink("recording already closed".into())),
            State::Pending { .. } => Err(Error::Sink("recording was not started".into())),
        }
    }

    fn activate(&mut self, frame: &Frame<'_>) -> Result<()> {
        let (path, fps, mut factory) = match std::mem::replace(&mut self.state, State::Closed) {
            State::Pending { path, fps, factory } => (path, fps, factory),
            other => {
                self.state = other;
                return Ok(());
            }
        };
        let dimensions = frame.dimensions();
        let encoder = factory.create(&path, dimensions, fps)?;
        info!(path = %path.display(), size = %dimensions, fps, "recording started");
        self.state = State::Active {
            encoder,
            summary: RecordingSummary {
                path,
                dimensions,
                fps,
                frames: 0,
            },
        };
        Ok(())
    }

    /// Flush and release the encoder. Returns `None` when nothing was
    /// recorded; later calls are no-ops.
    pub fn close(&mut self) -> Result<Option<RecordingSummary>> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Active {
                mut encoder,
                summary,
            } => {
                encoder.release()?;
                info!(path = %summary.path.display(), frames = summary.frames, "recording stopped");
                Ok(Some(summary))
            }
            State::Pending { path, .. } => {
                debug!(path = %path.display(), "no frames received; nothing recorded");
                Ok(None)
            }
            State::Disabled | State::Closed => Ok(None),
        }
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.close() {
                warn!("failed to release encoder on drop: {e}");
            }
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::{MockEncoderFactory, MockProbe, PixelFormat};

    fn frame(data: &[u8], width: u32, height: u32) -> Frame<'_> {
        Frame {
            width,
            height,
            pixel_format: PixelFormat::Gray8,
            data,
            ts: None,
        }
    }

    #[test]
    fn test_disabled_sink_ignores_frames() {
        let mut sink = RecordingSink::disabled();
        let buf = vec![0u8; 4];
        sink.write(&frame(&buf, 2, 2)).unwrap();
        assert!(!sink.is_enabled());
        assert!(sink.close().unwrap().is_none());
    }

    #[test]
    fn test_encoder_created_once_with_first_frame_size() {
        let probe = MockProbe::default();
        let mut sink = RecordingSink::new(
            "videos/out.mp4",
            90.0,
            Box::new(MockEncoderFactory::new(probe.clone())),
        );
        assert!(!sink.is_active());

        let buf = vec![7u8; 64 * 48];
        for _ in 0..3 {
            sink.write(&frame(&buf, 64, 48)).unwrap();
        }
        assert!(sink.is_active());

        let counts = probe.snapshot();
        assert_eq!(counts.encoders_created.len(), 1);
        let (path, size, fps) = &counts.encoders_created[0];
        assert_eq!(path, &PathBuf::from("videos/out.mp4"));
        assert_eq!(
            *size,
            Dimensions {
                width: 64,
                height: 48
            }
        );
        assert_eq!(*fps, 90.0);
        assert_eq!(counts.frames_encoded, 3);

        let summary = sink.close().unwrap().unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(probe.snapshot().encoders_released, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let probe = MockProbe::default();
        let mut sink = RecordingSink::new(
            "out.mp4",
            30.0,
            Box::new(MockEncoderFactory::new(probe.clone())),
        );
        let buf = vec![0u8; 16];
        sink.write(&frame(&buf, 4, 4)).unwrap();
        assert!(sink.close().unwrap().is_some());
        assert!(sink.close().unwrap().is_none());
        drop(sink);
        assert_eq!(probe.snapshot().encoders_released, 1);
    }

    #[test]
    fn test_pending_sink_closes_without_encoder() {
        let probe = MockProbe::default();
        let mut sink = RecordingSink::new(
            "out.mp4",
            30.0,
            Box::new(MockEncoderFactory::new(probe.clone())),
        );
        assert!(sink.is_enabled());
        assert!(sink.close().unwrap().is_none());
        assert!(sink.is_closed());
        assert!(probe.snapshot().encoders_created.is_empty());
    }

    #[test]
    fn test_size_change_is_rejected() {
        let probe = MockProbe::default();
        let mut sink = RecordingSink::new(
            "out.mp4",
            30.0,
            Box::new(MockEncoderFactory::new(probe.clone())),
        );
        let big = vec![0u8; 16];
        let small = vec![0u8; 4];
        sink.write(&frame(&big, 4, 4)).unwrap();
        let err = sink.write(&frame(&small, 2, 2)).unwrap_err();
        assert!(matches!(err, Error::GeometryChanged { .. }));
        assert_eq!(probe.snapshot().frames_encoded, 1);
    }

    #[test]
    fn test_drop_releases_active_encoder() {
        let probe = MockProbe::default();
        {
            let mut sink = RecordingSink::new(
                "out.mp4",
                30.0,
                Box::new(MockEncoderFactory::new(probe.clone())),
            );
            let buf = vec![0u8; 4];
            sink.write(&frame(&buf, 2, 2)).unwrap();
        }
        assert_eq!(probe.snapshot().encoders_released, 1);
    }
}
