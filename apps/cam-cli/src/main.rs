use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use camera_capture as cap;
use camera_capture::{
    CameraDescriptor, CameraSource, CaptureConfig, CaptureLoop, EncoderFactory, Preview,
    RunError, RunReport, StopFlag,
};

#[derive(Parser, Debug)]
#[command(
    name = "cam",
    version,
    about = "Single-camera viewer and recorder",
    disable_help_subcommand = true
)]
struct Cli {
    /// Configuration file (JSON); written with defaults if missing
    #[arg(long, global = true, default_value = "capture.json")]
    config: PathBuf,

    /// Camera backend
    #[arg(long, value_enum, global = true, default_value_t = Backend::Mock)]
    backend: Backend,

    /// Number of cameras the mock backend pretends to have
    #[arg(long, global = true, default_value_t = 3usize)]
    mock_cameras: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Mock,
    Opencv,
    Ximea,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List attached cameras
    List,
    /// Show the live feed of one camera
    View {
        /// Camera index in enumeration order (overrides config)
        #[arg(long)]
        index: Option<usize>,
        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
    },
    /// Show and record one camera to a video file, then report average FPS
    Record {
        /// Camera index in enumeration order (overrides config)
        #[arg(long)]
        index: Option<usize>,
        /// Nominal frame rate stored in the video file
        #[arg(long)]
        fps: Option<f64>,
        /// Output directory, created if missing
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Output file name inside the output directory
        #[arg(long)]
        output_file: Option<String>,
        /// Record without a preview window (stop with Ctrl+C or a limit)
        #[arg(long, action = ArgAction::SetTrue)]
        no_display: bool,
        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
        /// Stop after this many seconds
        #[arg(long)]
        max_seconds: Option<f64>,
        /// Also write the run summary as JSON to this path
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
}

/// Per-invocation knobs that are not part of the config file.
#[derive(Debug, Default)]
struct Session {
    record: bool,
    display: bool,
    max_frames: Option<u64>,
    max_duration: Option<Duration>,
    summary_json: Option<PathBuf>,
}

impl Session {
    /// Preview window title: `Recording Camera N` while recording, `Camera N`
    /// for the plain viewer.
    fn window_title(&self, index: usize) -> String {
        if self.record {
            format!("Recording Camera {index}")
        } else {
            format!("Camera {index}")
        }
    }
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let mut config = CaptureConfig::load(&cli.config)?;

    let stop = StopFlag::new();
    let handler_flag = stop.clone();
    ctrlc::set_handler(move || handler_flag.request())?;

    let session = match cli.command {
        Commands::List => return camera_list(cli.backend, cli.mock_cameras, &config),
        Commands::View { index, max_frames } => {
            if let Some(index) = index {
                config.camera_index = index;
            }
            Session {
                record: false,
                display: true,
                max_frames,
                ..Default::default()
            }
        }
        Commands::Record {
            index,
            fps,
            output_dir,
            output_file,
            no_display,
            max_frames,
            max_seconds,
            summary_json,
        } => {
            if let Some(index) = index {
                config.camera_index = index;
            }
            if let Some(fps) = fps {
                config.fps = fps;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(file) = output_file {
                config.output_file = file;
            }
            let max_duration = max_seconds
                .map(Duration::try_from_secs_f64)
                .transpose()
                .map_err(|e| anyhow::anyhow!("invalid --max-seconds: {e}"))?;
            Session {
                record: true,
                display: config.display && !no_display,
                max_frames,
                max_duration,
                summary_json,
            }
        }
    };

    run_backend(cli.backend, cli.mock_cameras, &config, &session, stop)
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn camera_list(backend: Backend, mock_cameras: usize, config: &CaptureConfig) -> Result<()> {
    let cameras = match backend {
        Backend::Mock => cap::MockCamera::new(mock_cameras).list()?,
        Backend::Opencv => {
            #[cfg(feature = "opencv")]
            {
                cap::OpenCvCamera::new(config.probe_limit).list()?
            }
            #[cfg(not(feature = "opencv"))]
            {
                let _ = config;
                return Err(opencv_disabled());
            }
        }
        Backend::Ximea => {
            #[cfg(feature = "ximea")]
            {
                cap::XimeaCamera::new().list()?
            }
            #[cfg(not(feature = "ximea"))]
            {
                return Err(ximea_disabled());
            }
        }
    };
    if cameras.is_empty() {
        println!("no cameras found");
    }
    for c in &cameras {
        println!(
            "{:>2}  serial={}  path={}",
            c.index,
            c.serial_number.as_deref().unwrap_or("-"),
            c.instance_path
        );
    }
    Ok(())
}

fn run_backend(
    backend: Backend,
    mock_cameras: usize,
    config: &CaptureConfig,
    session: &Session,
    stop: StopFlag,
) -> Result<()> {
    match backend {
        Backend::Mock => {
            let cam = cap::MockCamera::new(mock_cameras);
            let probe = cam.probe();
            let preview_probe = probe.clone();
            capture(
                &cam,
                config,
                session,
                stop,
                Box::new(cap::MockEncoderFactory::new(probe)),
                move |_title| Ok(Box::new(cap::MockPreview::new(preview_probe))),
            )
        }
        Backend::Opencv => {
            #[cfg(feature = "opencv")]
            {
                let cam = cap::OpenCvCamera::new(config.probe_limit)
                    .with_exposure_us(config.exposure_us);
                let fourcc = config.fourcc_chars()?;
                capture(
                    &cam,
                    config,
                    session,
                    stop,
                    Box::new(cap::OpenCvEncoderFactory::new(fourcc)),
                    |title| Ok(Box::new(cap::HighGuiPreview::new(title)?)),
                )
            }
            #[cfg(not(feature = "opencv"))]
            {
                let _ = (config, session, stop);
                Err(opencv_disabled())
            }
        }
        Backend::Ximea => {
            #[cfg(feature = "ximea")]
            {
                let cam = cap::XimeaCamera::new()
                    .with_exposure_us(config.exposure_us)
                    .with_timeout_ms(config.grab_timeout_ms);
                let fourcc = config.fourcc_chars()?;
                capture(
                    &cam,
                    config,
                    session,
                    stop,
                    Box::new(cap::OpenCvEncoderFactory::new(fourcc)),
                    |title| Ok(Box::new(cap::HighGuiPreview::new(title)?)),
                )
            }
            #[cfg(not(feature = "ximea"))]
            {
                let _ = (config, session, stop);
                Err(ximea_disabled())
            }
        }
    }
}

#[cfg(not(feature = "opencv"))]
fn opencv_disabled() -> anyhow::Error {
    anyhow::anyhow!("OpenCV backend not enabled at compile time; rebuild with --features opencv")
}

#[cfg(not(feature = "ximea"))]
fn ximea_disabled() -> anyhow::Error {
    anyhow::anyhow!("XIMEA backend not enabled at compile time; rebuild with --features ximea")
}

/// Open the configured camera and drive one capture run.
///
/// Configuration problems are reported before any device is opened.
fn capture<S: CameraSource>(
    source: &S,
    config: &CaptureConfig,
    session: &Session,
    stop: StopFlag,
    encoder: Box<dyn EncoderFactory>,
    preview: impl FnOnce(&str) -> cap::Result<Box<dyn Preview>>,
) -> Result<()> {
    config.validate()?;
    let output = if session.record {
        Some(config.output_path()?)
    } else {
        None
    };

    let (descriptor, device) = cap::open_camera(source, config.camera_index)?;
    println!(
        "Opening Camera {} with path: {}",
        descriptor.index, descriptor.instance_path
    );

    let mut run = CaptureLoop::new()
        .stop_key(Some(config.stop_key))
        .max_frames(session.max_frames)
        .max_duration(session.max_duration)
        .stop_flag(stop);
    if let Some(path) = &output {
        run = run.record_to(path, config.fps, encoder);
    }

    let result = match open_preview(session, descriptor.index, preview) {
        Ok(window) => {
            if let Some(window) = window {
                run = run.preview(window);
                println!(
                    "Camera is open. Press '{}' to stop (Ctrl+C also works).",
                    config.stop_key
                );
            } else {
                println!("Camera is open. Press Ctrl+C to stop.");
            }
            if output.is_some() {
                println!("Recording started...");
            }
            run.run(device)
        }
        Err(source) => {
            // Nothing was acquired yet; release the camera and report as a failed run
            drop(device);
            Err(RunError {
                report: RunReport::not_started(),
                source,
            })
        }
    };

    let report = match &result {
        Ok(report) => report,
        Err(e) => {
            println!("An error occurred: {}", e.source);
            &e.report
        }
    };
    println!("{report}");
    if let Some(path) = &session.summary_json {
        let failure = result.as_ref().err().map(|e| e.source.to_string());
        write_summary(path, &descriptor, report, failure)?;
        info!(path = %path.display(), "wrote run summary");
    }
    println!("--- Finished ---");

    result.map(|_| ()).map_err(|e| {
        error!(kind = ?e.source.kind(), "capture failed");
        anyhow::Error::new(e.source)
    })
}

fn open_preview(
    session: &Session,
    index: usize,
    preview: impl FnOnce(&str) -> cap::Result<Box<dyn Preview>>,
) -> cap::Result<Option<Box<dyn Preview>>> {
    if !session.display {
        return Ok(None);
    }
    preview(&session.window_title(index)).map(Some)
}

#[derive(Serialize)]
struct SummaryRecord<'a> {
    camera: &'a CameraDescriptor,
    #[serde(flatten)]
    report: &'a RunReport,
    average_fps: f64,
    error: Option<String>,
}

fn write_summary(
    path: &Path,
    camera: &CameraDescriptor,
    report: &RunReport,
    error: Option<String>,
) -> Result<()> {
    let record = SummaryRecord {
        camera,
        report,
        average_fps: report.statistics.average_fps(),
        error,
    };
    std::fs::write(path, serde_json::to_string_pretty(&record)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(dir: &Path) -> CaptureConfig {
        CaptureConfig {
            output_dir: dir.join("videos"),
            ..Default::default()
        }
    }

    fn headless(max_frames: u64, summary: Option<PathBuf>) -> Session {
        Session {
            record: true,
            display: false,
            max_frames: Some(max_frames),
            max_duration: None,
            summary_json: summary,
        }
    }

    #[test]
    fn test_cli_parses_record_overrides() {
        let cli = Cli::try_parse_from([
            "cam",
            "--backend",
            "mock",
            "record",
            "--index",
            "1",
            "--fps",
            "60",
            "--no-display",
            "--max-frames",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.backend, Backend::Mock);
        match cli.command {
            Commands::Record {
                index,
                fps,
                no_display,
                max_frames,
                ..
            } => {
                assert_eq!(index, Some(1));
                assert_eq!(fps, Some(60.0));
                assert!(no_display);
                assert_eq!(max_frames, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_accepts_ximea_backend() {
        let cli = Cli::try_parse_from(["cam", "--backend", "ximea", "list"]).unwrap();
        assert_eq!(cli.backend, Backend::Ximea);
    }

    #[cfg(not(feature = "ximea"))]
    #[test]
    fn test_ximea_backend_requires_feature() {
        let err = camera_list(Backend::Ximea, 0, &CaptureConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--features ximea"));
    }

    #[test]
    fn test_window_titles() {
        let view = Session::default();
        assert_eq!(view.window_title(2), "Camera 2");
        let record = headless(1, None);
        assert_eq!(record.window_title(2), "Recording Camera 2");
    }

    #[test]
    fn test_mock_record_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());
        let summary = dir.path().join("summary.json");
        let cam = cap::MockCamera::new(3).with_size(32, 24);
        let probe = cam.probe();

        capture(
            &cam,
            &config,
            &headless(12, Some(summary.clone())),
            StopFlag::new(),
            Box::new(cap::MockEncoderFactory::new(probe.clone())),
            |_| Ok(Box::new(cap::MockPreview::new(cap::MockProbe::default()))),
        )
        .unwrap();

        let counts = probe.snapshot();
        assert_eq!(counts.opens, vec!["mock://2".to_string()]);
        assert_eq!(counts.frames_encoded, 12);
        assert_eq!(counts.encoders_released, 1);
        assert!(dir.path().join("videos").is_dir());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(json["statistics"]["frame_count"], 12);
        assert_eq!(json["stop_reason"], "frame_limit");
        assert_eq!(json["recording"]["frames"], 12);
        assert_eq!(json["camera"]["instance_path"], "mock://2");
        assert!(json["error"].is_null());
    }

    #[test]
    fn test_missing_camera_opens_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());
        let cam = cap::MockCamera::new(2);
        let probe = cam.probe();

        let err = capture(
            &cam,
            &config,
            &headless(1, None),
            StopFlag::new(),
            Box::new(cap::MockEncoderFactory::new(probe.clone())),
            |_| Ok(Box::new(cap::MockPreview::new(cap::MockProbe::default()))),
        )
        .unwrap_err();

        let err = err.downcast::<cap::Error>().unwrap();
        assert_eq!(err.kind(), cap::ErrorKind::Configuration);
        assert!(probe.snapshot().opens.is_empty());
    }

    #[test]
    fn test_device_failure_is_reported_after_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());
        let summary = dir.path().join("summary.json");
        let cam = cap::MockCamera::new(3).with_size(8, 8).fail_after(4);
        let probe = cam.probe();

        let err = capture(
            &cam,
            &config,
            &headless(100, Some(summary.clone())),
            StopFlag::new(),
            Box::new(cap::MockEncoderFactory::new(probe.clone())),
            |_| Ok(Box::new(cap::MockPreview::new(cap::MockProbe::default()))),
        )
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<cap::Error>().map(cap::Error::kind),
            Some(cap::ErrorKind::Device)
        );
        let counts = probe.snapshot();
        assert_eq!(counts.encoders_released, 1);
        assert_eq!(counts.devices_dropped, 1);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(json["statistics"]["frame_count"], 4);
        assert_eq!(json["stop_reason"], "failed");
        assert!(json["error"].is_string());
    }

    #[test]
    fn test_window_failure_still_reports_and_releases_camera() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());
        let summary = dir.path().join("summary.json");
        let cam = cap::MockCamera::new(3);
        let probe = cam.probe();
        let session = Session {
            display: true,
            ..headless(10, Some(summary.clone()))
        };

        let err = capture(
            &cam,
            &config,
            &session,
            StopFlag::new(),
            Box::new(cap::MockEncoderFactory::new(probe.clone())),
            |_| Err(cap::Error::Sink("no display".into())),
        )
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<cap::Error>().map(cap::Error::kind),
            Some(cap::ErrorKind::Sink)
        );
        let counts = probe.snapshot();
        assert_eq!(counts.opens.len(), 1);
        assert_eq!(counts.devices_dropped, 1);
        assert!(counts.encoders_created.is_empty());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(json["statistics"]["frame_count"], 0);
        assert_eq!(json["stop_reason"], "failed");
        assert_eq!(json["error"], "sink error: no display");
    }
}
