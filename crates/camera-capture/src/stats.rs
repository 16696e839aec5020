use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Frame count and wall-clock time accumulated by one capture run.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct RunStatistics {
    pub frame_count: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Device timestamps of the first and last counted frame, when the
    /// backend provides them.
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_frame_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_frame_at: Option<OffsetDateTime>,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunStatistics {
    pub fn new(frame_count: u64, elapsed: Duration) -> Self {
        Self {
            frame_count,
            elapsed,
            first_frame_at: None,
            last_frame_at: None,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Observed throughput; 0.0 when no time has elapsed.
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed_secs();
        if secs > 0.0 {
            self.frame_count as f64 / secs
        } else {
            0.0
        }
    }
}

/// Running counter owned by the capture loop.
#[derive(Debug)]
pub(crate) struct StatsRecorder {
    started: Instant,
    frame_count: u64,
    first_frame_at: Option<OffsetDateTime>,
    last_frame_at: Option<OffsetDateTime>,
}

impl StatsRecorder {
    pub(crate) fn start() -> Self {
        Self {
            started: Instant::now(),
            frame_count: 0,
            first_frame_at: None,
            last_frame_at: None,
        }
    }

    pub(crate) fn record_frame(&mut self, ts: Option<OffsetDateTime>) {
        self.frame_count += 1;
        if self.first_frame_at.is_none() {
            self.first_frame_at = ts;
        }
        if ts.is_some() {
            self.last_frame_at = ts;
        }
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn finish(&self) -> RunStatistics {
        RunStatistics {
            frame_count: self.frame_count,
            elapsed: self.elapsed(),
            first_frame_at: self.first_frame_at,
            last_frame_at: self.last_frame_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_fps_900_frames_in_10s() {
        let stats = RunStatistics::new(900, Duration::from_secs_f64(10.0));
        assert_eq!(format!("{:.2}", stats.average_fps()), "90.00");
    }

    #[test]
    fn test_average_fps_zero_elapsed() {
        let stats = RunStatistics::new(12, Duration::ZERO);
        assert_eq!(stats.average_fps(), 0.0);
    }

    #[test]
    fn test_recorder_counts_frames() {
        let mut rec = StatsRecorder::start();
        for _ in 0..5 {
            rec.record_frame(None);
        }
        let stats = rec.finish();
        assert_eq!(stats.frame_count, 5);
        assert!(stats.elapsed >= Duration::ZERO);
        assert!(stats.first_frame_at.is_none());
    }

    #[test]
    fn test_recorder_keeps_first_and_last_timestamps() {
        let first = OffsetDateTime::UNIX_EPOCH;
        let last = first + time::Duration::seconds(3);
        let mut rec = StatsRecorder::start();
        rec.record_frame(Some(first));
        rec.record_frame(None);
        rec.record_frame(Some(last));
        let stats = rec.finish();
        assert_eq!(stats.first_frame_at, Some(first));
        assert_eq!(stats.last_frame_at, Some(last));
    }

    #[test]
    fn test_statistics_serialize_seconds() {
        let stats = RunStatistics::new(900, Duration::from_millis(10_500));
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["frame_count"], 900);
        assert_eq!(json["elapsed_secs"], 10.5);
        assert!(json["first_frame_at"].is_null());
    }
}
