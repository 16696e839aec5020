use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_index: usize,
    /// Nominal frame rate written into the video metadata.
    pub fps: f64,
    pub output_dir: PathBuf,
    pub output_file: String,
    pub fourcc: String,
    pub display: bool,
    pub stop_key: char,
    pub exposure_us: Option<u32>,
    /// Per-frame acquisition timeout for SDK backends that support one.
    pub grab_timeout_ms: u32,
    /// Highest device index probed when enumerating OpenCV cameras.
    pub probe_limit: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 2,
            fps: 90.0,
            output_dir: PathBuf::from("videos"),
            output_file: "recorded_video2.mp4".to_string(),
            fourcc: "mp4v".to_string(),
            display: true,
            stop_key: 'q',
            exposure_us: Some(5000),
            grab_timeout_ms: 5000,
            probe_limit: 8,
        }
    }
}

impl CaptureConfig {
    /// Read `path`, or write and return the defaults if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str(&contents)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(Error::Config(format!(
                "fps must be a positive number, got {}",
                self.fps
            )));
        }
        self.fourcc_chars()?;
        if self.grab_timeout_ms == 0 {
            return Err(Error::Config("grab_timeout_ms must be positive".into()));
        }
        if self.output_file.is_empty() {
            return Err(Error::Config("output_file must not be empty".into()));
        }
        Ok(())
    }

    pub fn fourcc_chars(&self) -> Result<[char; 4]> {
        let chars: Vec<char> = self.fourcc.chars().collect();
        match chars.as_slice() {
            [a, b, c, d] if chars.iter().all(char::is_ascii) => Ok([*a, *b, *c, *d]),
            _ => Err(Error::Config(format!(
                "fourcc must be 4 ASCII characters, got {:?}",
                self.fourcc
            ))),
        }
    }

    /// Output video path; creates the output directory if needed.
    pub fn output_path(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(self.output_dir.join(&self.output_file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.camera_index, 2);
        assert_eq!(config.fps, 90.0);
        assert_eq!(config.grab_timeout_ms, 5000);
        assert_eq!(config.fourcc_chars().unwrap(), ['m', 'p', '4', 'v']);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        let config = CaptureConfig::load(&path).unwrap();
        assert_eq!(config, CaptureConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        fs::write(&path, r#"{ "camera_index": 0, "fps": 30.0 }"#).unwrap();
        let config = CaptureConfig::load(&path).unwrap();
        assert_eq!(config.camera_index, 0);
        assert_eq!(config.fps, 30.0);
        assert_eq!(config.output_file, "recorded_video2.mp4");
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            CaptureConfig::load(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = CaptureConfig {
            fps: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.fps = f64::NAN;
        assert!(config.validate().is_err());
        config.fps = 60.0;
        config.fourcc = "h264x".into();
        assert!(config.validate().is_err());
        config.fourcc = "XVID".into();
        assert!(config.validate().is_ok());
        config.grab_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_path_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            output_dir: dir.path().join("videos"),
            ..Default::default()
        };
        let path = config.output_path().unwrap();
        assert!(dir.path().join("videos").is_dir());
        assert_eq!(path, dir.path().join("videos").join("recorded_video2.mp4"));
    }
}
