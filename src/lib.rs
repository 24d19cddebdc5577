//! # OcrKit - document layout and text recognition in pure Rust
//!
//! OcrKit runs PP-DocLayout layout detection and PaddleOCR text detection and
//! recognition models through ONNX Runtime, with all pre- and postprocessing
//! (resizing, DB box decoding, perspective cropping, CTC decoding) written in
//! Rust.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocrkit::{full_text, imread, DetConfig, OcrEngine, RecConfig};
//!
//! let ocr = OcrEngine::from_configs(
//!     DetConfig::ppv4("models/det.onnx".into()),
//!     RecConfig::ppv4("models/rec.onnx".into(), "models/keys.txt".into()),
//! )?;
//!
//! let img = imread("page.jpg")?;
//! let lines = ocr.recognize_text(&img, 0.3, 0.5)?;
//! for line in &lines {
//!     println!("{}: {:.3}", line.text, line.score);
//! }
//! println!("{}", full_text(&lines));
//! # Ok::<(), ocrkit::EngineError>(())
//! ```
//!
//! Models run behind the [`InferenceEngine`] trait, so every stage can also be
//! driven by a custom backend or an in-memory stub.

mod contours;
mod det;
mod engine;
mod geometry;
mod image_impl;
mod layout;
mod ocr;
mod postprocess;
mod preprocess;
mod rec;
mod report;
mod types;

pub use crate::det::TextDetector;
pub use crate::engine::{EngineError, InferenceEngine, OrtSession};
pub use crate::geometry::{crop_text_region, order_points};
pub use crate::image_impl::{imread, Mat, Point2f, Size};
pub use crate::layout::{decode_layout, Detection, LayoutDetector, LayoutVariant, DOC_CLASSES};
pub use crate::ocr::{full_text, OcrEngine, TextLine};
pub use crate::postprocess::{sort_reading_order, DbPostProcess, Polygon};
pub use crate::preprocess::{prepare_detection_input, prepare_layout_input, prepare_recognition_input};
pub use crate::rec::{CtcDecoder, Dictionary, TextRecognizer};
pub use crate::report::{
    BoxRecord, DetectionRecord, DetectionReport, ErrorCode, ErrorReport, LayoutReport, OcrReport, TextRecord,
};
pub use crate::types::{DetConfig, EngineConfig, LayoutConfig, OptimizationLevel, RecConfig, ScaleFactor};
