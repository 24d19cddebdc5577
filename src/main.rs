use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ocrkit::{
    full_text, imread, DetConfig, DetectionReport, EngineError, ErrorCode, ErrorReport, LayoutConfig,
    LayoutDetector, LayoutReport, Mat, OcrEngine, OcrReport, OrtSession, RecConfig, TextDetector,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ocrkit")]
#[command(about = "OcrKit - document layout detection and PaddleOCR text recognition", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect document layout regions (PP-DocLayout)
    Layout {
        /// Path to layout model (ONNX)
        #[arg(long)]
        model: PathBuf,

        /// Minimum detection confidence
        #[arg(long)]
        conf: Option<f32>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Detect and recognise text lines
    Ocr {
        /// Path to detection model (ONNX)
        #[arg(long)]
        det_model: PathBuf,

        /// Path to recognition model (ONNX)
        #[arg(long)]
        rec_model: PathBuf,

        /// Path to dictionary file
        #[arg(long)]
        dict: PathBuf,

        /// Probability map binarization threshold
        #[arg(long)]
        det_thresh: Option<f32>,

        /// Minimum recognition confidence
        #[arg(long)]
        rec_thresh: Option<f32>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Detect text regions only
    Detect {
        /// Path to detection model (ONNX)
        #[arg(long)]
        det_model: PathBuf,

        /// Probability map binarization threshold
        #[arg(long)]
        det_thresh: Option<f32>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Input image path
    image: PathBuf,

    /// JSON file with `layout`, `det` and `rec` settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    /// JSON report
    Json,
    /// Plain text, one line per result
    Text,
    /// TSV: label\tscore\tcoordinates
    Tsv,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    layout: LayoutConfig,
    det: DetConfig,
    rec: RecConfig,
}

/// A failed run, reported as JSON on stdout.
struct Failure(ErrorReport);

impl Failure {
    fn new(code: ErrorCode, err: impl std::fmt::Display) -> Self {
        Failure(ErrorReport::new(code, err.to_string()))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure(report)) => {
            error!("{:?}: {}", report.code, report.error);
            match serde_json::to_string(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => error!("failed to serialize error report: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Failure> {
    match command {
        Command::Layout { model, conf, common } => {
            let file_cfg = load_config(common.config.as_deref())?;
            let mut cfg = file_cfg.layout;
            cfg.model_path = model;
            let conf = conf.unwrap_or(cfg.conf_threshold);

            let detector = LayoutDetector::from_config(cfg).map_err(engine_failure)?;
            let img = load_image(&common.image)?;

            let start = Instant::now();
            let detections = detector.detect(&img, conf).map_err(inference_failure)?;
            let report = LayoutReport::new(&detections, start.elapsed(), img.cols() as u32, img.rows() as u32);

            match common.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => {
                    for d in &report.detections {
                        println!("{} {:.4}", d.class_name, d.score);
                    }
                }
                OutputFormat::Tsv => {
                    for d in &report.detections {
                        println!("{}\t{:.4}\t{:.2},{:.2},{:.2},{:.2}", d.class_name, d.score, d.x1, d.y1, d.x2, d.y2);
                    }
                }
            }
        }
        Command::Ocr {
            det_model,
            rec_model,
            dict,
            det_thresh,
            rec_thresh,
            common,
        } => {
            let file_cfg = load_config(common.config.as_deref())?;
            let mut det_cfg = file_cfg.det;
            det_cfg.model_path = det_model;
            let mut rec_cfg = file_cfg.rec;
            rec_cfg.model_path = rec_model;
            rec_cfg.dict_path = dict;
            let det_thresh = det_thresh.unwrap_or(det_cfg.thresh);
            let rec_thresh = rec_thresh.unwrap_or(rec_cfg.rec_thresh);

            let ocr = OcrEngine::from_configs(det_cfg, rec_cfg).map_err(engine_failure)?;
            let img = load_image(&common.image)?;

            let start = Instant::now();
            let lines = ocr
                .recognize_text(&img, det_thresh, rec_thresh)
                .map_err(inference_failure)?;
            let report = OcrReport::new(&lines, start.elapsed(), img.cols() as u32, img.rows() as u32);

            match common.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => println!("{}", full_text(&lines)),
                OutputFormat::Tsv => {
                    for r in &report.results {
                        println!("{}\t{:.4}\t{:.2},{:.2},{:.2},{:.2}", r.text, r.score, r.x1, r.y1, r.x2, r.y2);
                    }
                }
            }
        }
        Command::Detect {
            det_model,
            det_thresh,
            common,
        } => {
            let file_cfg = load_config(common.config.as_deref())?;
            let mut det_cfg = file_cfg.det;
            det_cfg.model_path = det_model;
            let det_thresh = det_thresh.unwrap_or(det_cfg.thresh);

            let engine =
                OrtSession::from_path(&det_cfg.model_path, &det_cfg.engine_cfg).map_err(engine_failure)?;
            let detector = TextDetector::new(engine, det_cfg);
            let img = load_image(&common.image)?;

            let start = Instant::now();
            let polygons = detector.run(&img, det_thresh).map_err(inference_failure)?;
            let report = DetectionReport::new(&polygons, start.elapsed(), img.cols() as u32, img.rows() as u32);

            match common.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text | OutputFormat::Tsv => {
                    for b in &report.boxes {
                        let pts: Vec<String> = b.points.iter().map(|[x, y]| format!("{x:.2},{y:.2}")).collect();
                        println!("{:.4}\t{}", b.score, pts.join(","));
                    }
                }
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FileConfig, Failure> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let content = fs::read_to_string(path)
        .map_err(|e| Failure::new(ErrorCode::EngineNotInitialized, format!("{}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| Failure::new(ErrorCode::EngineNotInitialized, format!("{}: {e}", path.display())))
}

fn load_image(path: &Path) -> Result<Mat, Failure> {
    let img = imread(path).map_err(|e| Failure::new(ErrorCode::ImageLoadFailed, e))?;
    if img.empty() {
        return Err(Failure::new(ErrorCode::ImageLoadFailed, "Could not load image"));
    }
    Ok(img)
}

fn engine_failure(err: EngineError) -> Failure {
    Failure::new(ErrorCode::EngineNotInitialized, err)
}

fn inference_failure(err: EngineError) -> Failure {
    Failure::new(ErrorCode::InferenceFailed, err)
}

fn print_json<T: Serialize>(report: &T) -> Result<(), Failure> {
    let json = serde_json::to_string_pretty(report).map_err(|e| Failure::new(ErrorCode::InferenceFailed, e))?;
    println!("{json}");
    Ok(())
}
