use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::det::TextDetector;
use crate::engine::{EngineError, InferenceEngine, OrtSession};
use crate::geometry::crop_text_region;
use crate::image_impl::Mat;
use crate::postprocess::Polygon;
use crate::rec::{Dictionary, TextRecognizer};
use crate::types::{DetConfig, RecConfig};

/// One recognised line with the axis-aligned extent of its region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLine {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub text: String,
    pub score: f32,
}

/// Detection plus recognition over whole images.
pub struct OcrEngine<D: InferenceEngine, R: InferenceEngine = D> {
    det: TextDetector<D>,
    rec: TextRecognizer<R>,
}

impl<D: InferenceEngine, R: InferenceEngine> OcrEngine<D, R> {
    pub fn new(det: TextDetector<D>, rec: TextRecognizer<R>) -> Self {
        Self { det, rec }
    }

    /// Raw text polygons in reading order.
    pub fn detect_text(&self, img: &Mat, det_thresh: f32) -> Result<Vec<Polygon>, EngineError> {
        self.det.run(img, det_thresh)
    }

    /// Recognise an already-cropped single line.
    pub fn recognize_region(&self, img: &Mat) -> Result<(String, f32), EngineError> {
        self.rec.run(img)
    }

    pub fn recognize_text(
        &self,
        img: &Mat,
        det_thresh: f32,
        rec_thresh: f32,
    ) -> Result<Vec<TextLine>, EngineError> {
        let start = Instant::now();
        let polygons = self.det.run(img, det_thresh)?;

        let mut lines = Vec::with_capacity(polygons.len());
        let mut empty_crops = 0usize;
        let mut empty_texts = 0usize;
        let mut low_scores = 0usize;

        for polygon in &polygons {
            let Some(crop) = crop_text_region(img, &polygon.points) else {
                empty_crops += 1;
                continue;
            };

            let (text, score) = self.rec.run(&crop)?;
            if text.is_empty() {
                empty_texts += 1;
                continue;
            }
            if score < rec_thresh {
                low_scores += 1;
                continue;
            }

            let (x1, y1, x2, y2) = polygon.bounding_rect();
            lines.push(TextLine {
                x1,
                y1,
                x2,
                y2,
                text,
                score,
            });
        }

        debug!(
            "OCR: {} regions, {} lines in {:.1} ms (skipped: {} empty crops, {} empty texts, {} low scores)",
            polygons.len(),
            lines.len(),
            start.elapsed().as_secs_f64() * 1000.0,
            empty_crops,
            empty_texts,
            low_scores
        );
        Ok(lines)
    }
}

impl OcrEngine<OrtSession> {
    /// Load both models and the dictionary named in the configs.
    pub fn from_configs(det_cfg: DetConfig, rec_cfg: RecConfig) -> Result<Self, EngineError> {
        let det_engine = OrtSession::from_path(&det_cfg.model_path, &det_cfg.engine_cfg)?;
        let rec_engine = OrtSession::from_path(&rec_cfg.model_path, &rec_cfg.engine_cfg)?;
        let dict = Dictionary::from_file(&rec_cfg.dict_path)?;

        Ok(Self::new(
            TextDetector::new(det_engine, det_cfg),
            TextRecognizer::new(rec_engine, dict, rec_cfg),
        ))
    }
}

/// All recognised texts, one per line.
pub fn full_text(lines: &[TextLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
