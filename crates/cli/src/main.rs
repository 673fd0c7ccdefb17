use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use rollcall_core::capture::infrastructure::image_file_reader;
use rollcall_core::detection::infrastructure::onnx_scrfd_detector::OnnxScrfdDetector;
use rollcall_core::liveness::domain::liveness_gate::LivenessGate;
use rollcall_core::liveness::infrastructure::onnx_liveness_model::OnnxLivenessModel;
use rollcall_core::pipeline::attendance_pipeline::{AttendancePipeline, FrameReport};
use rollcall_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use rollcall_core::shared::config::EngineConfig;
use rollcall_core::shared::constants::{DETECTOR_MODEL_NAME, LIVENESS_MODEL_NAME};
use rollcall_core::shared::model_resolver;
use rollcall_core::tracking::domain::tracked_face::FaceObservation;

/// Face detection, liveness gating and attendance deduplication.
#[derive(Parser)]
#[command(name = "rollcall")]
struct Cli {
    /// JSON engine configuration. Missing fields keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect faces in still images and check liveness.
    Detect {
        /// Image files to scan.
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Face detection confidence threshold (0.0-1.0).
        #[arg(long)]
        confidence: Option<f64>,

        /// Minimum face side in pixels; enables the frame-edge checks.
        #[arg(long)]
        min_face_size: Option<f64>,

        /// Directory holding bundled model files.
        #[arg(long)]
        models_dir: Option<PathBuf>,

        /// Download URL for the detector model when it is not cached.
        #[arg(long)]
        detector_url: Option<String>,

        /// Download URL for the liveness model when it is not cached.
        #[arg(long)]
        liveness_url: Option<String>,

        /// Skip the liveness model entirely.
        #[arg(long)]
        no_liveness: bool,

        /// Milliseconds between consecutive images.
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Feed recorded face observations through tracking and deduplication.
    Replay {
        /// JSON file with a list of frames.
        observations: PathBuf,

        /// Session timeout override in milliseconds.
        #[arg(long)]
        session_timeout_ms: Option<u64>,

        /// Only log attendance for stable tracks.
        #[arg(long)]
        require_stable: bool,

        /// Print every frame report instead of attendance events only.
        #[arg(long)]
        frames: bool,
    },
}

/// One recorded frame of a replay file.
#[derive(Debug, Deserialize)]
struct ReplayFrame {
    timestamp_ms: u64,
    frame_width: u32,
    frame_height: u32,
    #[serde(default)]
    faces: Vec<FaceObservation>,
}

#[derive(Serialize)]
struct ImageReport<'a> {
    file: &'a Path,
    #[serde(flatten)]
    report: FrameReport,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Detect {
            images,
            confidence,
            min_face_size,
            models_dir,
            detector_url,
            liveness_url,
            no_liveness,
            interval_ms,
        } => {
            if let Some(c) = confidence {
                config.detector.confidence_threshold = c;
            }
            if let Some(size) = min_face_size {
                config.detector.min_face_size = size;
            }
            if no_liveness {
                config.liveness.enabled = false;
            }
            validate_images(&images)?;
            config.validate()?;

            let urls = ModelUrls {
                detector: detector_url.as_deref(),
                liveness: liveness_url.as_deref(),
            };
            run_detect(&images, config, models_dir.as_deref(), urls, interval_ms)
        }
        Command::Replay {
            observations,
            session_timeout_ms,
            require_stable,
            frames,
        } => {
            if let Some(timeout) = session_timeout_ms {
                config.attendance.session_timeout_ms = timeout;
            }
            if require_stable {
                config.pipeline.require_stable_track = true;
            }
            config.validate()?;
            run_replay(&observations, config, frames)
        }
    }
}

struct ModelUrls<'a> {
    detector: Option<&'a str>,
    liveness: Option<&'a str>,
}

fn run_detect(
    images: &[PathBuf],
    config: EngineConfig,
    models_dir: Option<&Path>,
    urls: ModelUrls<'_>,
    interval_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Resolving model: {DETECTOR_MODEL_NAME}");
    let detector_path = model_resolver::resolve(
        DETECTOR_MODEL_NAME,
        urls.detector,
        models_dir,
        Some(Box::new(download_progress)),
    )?;
    let detector = OnnxScrfdDetector::new(&detector_path, &config.detector)?;

    let liveness = if config.liveness.enabled {
        log::info!("Resolving model: {LIVENESS_MODEL_NAME}");
        let path = model_resolver::resolve(
            LIVENESS_MODEL_NAME,
            urls.liveness,
            models_dir,
            Some(Box::new(download_progress)),
        )?;
        let model = OnnxLivenessModel::new(&path)?;
        Some(LivenessGate::new(Box::new(model), config.liveness.clone()))
    } else {
        None
    };

    let mut pipeline = AttendancePipeline::new(config)?
        .with_detector(Box::new(detector))
        .with_logger(Box::new(StdoutPipelineLogger::default()));
    if let Some(gate) = liveness {
        pipeline = pipeline.with_liveness(gate);
    }

    for (index, path) in images.iter().enumerate() {
        let timestamp_ms = index as u64 * interval_ms;
        let frame = image_file_reader::read_frame(path, index)?.with_timestamp(timestamp_ms);
        let report = pipeline.process_frame(&frame)?;
        log::debug!("{}: {} face(s)", path.display(), report.faces.len());
        println!(
            "{}",
            serde_json::to_string(&ImageReport { file: path, report })?
        );
    }

    pipeline.summary();
    Ok(())
}

fn run_replay(
    observations: &Path,
    config: EngineConfig,
    print_frames: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let frames = load_replay(observations)?;
    log::info!("Replaying {} frame(s) from {}", frames.len(), observations.display());

    let mut pipeline =
        AttendancePipeline::new(config)?.with_logger(Box::new(StdoutPipelineLogger::default()));

    let mut events = 0;
    for frame in &frames {
        pipeline.sweep(frame.timestamp_ms)?;
        let report = pipeline.ingest(
            &frame.faces,
            frame.frame_width,
            frame.frame_height,
            frame.timestamp_ms,
        )?;
        events += report.events.len();

        if print_frames {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            for event in &report.events {
                println!("{}", serde_json::to_string(event)?);
            }
        }
    }

    log::info!("{events} attendance event(s)");
    pipeline.summary();
    Ok(())
}

fn load_replay(path: &Path) -> Result<Vec<ReplayFrame>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Observation file not found: {}", path.display()).into());
    }
    let text = fs::read_to_string(path)?;
    let frames: Vec<ReplayFrame> = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid observation file {}: {e}", path.display()))?;

    for pair in frames.windows(2) {
        if pair[1].timestamp_ms < pair[0].timestamp_ms {
            return Err(format!(
                "Timestamps must not decrease, got {} after {}",
                pair[1].timestamp_ms, pair[0].timestamp_ms
            )
            .into());
        }
    }
    Ok(frames)
}

fn validate_images(images: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    for path in images {
        if !path.exists() {
            return Err(format!("Input file not found: {}", path.display()).into());
        }
        if !image_file_reader::is_supported(path) {
            return Err(format!("Unsupported image format: {}", path.display()).into());
        }
    }
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
