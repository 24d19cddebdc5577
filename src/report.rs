//! JSON records for layout, OCR and raw detection results.
//!
//! Coordinates are rounded to 2 decimals and scores to 4, so the output is
//! stable across platforms and easy to diff. Values are plain JSON numbers in
//! their shortest form: a rounded `10.00` prints as `10.0`, which readers
//! compare by value.

use std::time::Duration;

use serde::Serialize;

use crate::layout::Detection;
use crate::ocr::TextLine;
use crate::postprocess::Polygon;

fn round_to(value: f32, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value as f64 * factor).round() / factor
}

fn coord(value: f32) -> f64 {
    round_to(value, 2)
}

fn score(value: f32) -> f64 {
    round_to(value, 4)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub score: f64,
    pub class_id: usize,
    pub class_name: String,
}

impl From<&Detection> for DetectionRecord {
    fn from(d: &Detection) -> Self {
        Self {
            x1: coord(d.x1),
            y1: coord(d.y1),
            x2: coord(d.x2),
            y2: coord(d.y2),
            score: score(d.score),
            class_id: d.class_id,
            class_name: d.class_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRecord {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub score: f64,
    pub text: String,
}

impl From<&TextLine> for TextRecord {
    fn from(l: &TextLine) -> Self {
        Self {
            x1: coord(l.x1),
            y1: coord(l.y1),
            x2: coord(l.x2),
            y2: coord(l.y2),
            score: score(l.score),
            text: l.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxRecord {
    pub points: [[f64; 2]; 4],
    pub score: f64,
}

impl From<&Polygon> for BoxRecord {
    fn from(p: &Polygon) -> Self {
        Self {
            points: p.points.map(|pt| [coord(pt.x), coord(pt.y)]),
            score: score(p.score),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutReport {
    pub detections: Vec<DetectionRecord>,
    pub count: usize,
    pub inference_time_ms: u64,
    pub image_width: u32,
    pub image_height: u32,
}

impl LayoutReport {
    pub fn new(detections: &[Detection], elapsed: Duration, image_width: u32, image_height: u32) -> Self {
        Self {
            detections: detections.iter().map(DetectionRecord::from).collect(),
            count: detections.len(),
            inference_time_ms: elapsed.as_millis() as u64,
            image_width,
            image_height,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrReport {
    pub results: Vec<TextRecord>,
    pub count: usize,
    pub inference_time_ms: u64,
    pub image_width: u32,
    pub image_height: u32,
}

impl OcrReport {
    pub fn new(lines: &[TextLine], elapsed: Duration, image_width: u32, image_height: u32) -> Self {
        Self {
            results: lines.iter().map(TextRecord::from).collect(),
            count: lines.len(),
            inference_time_ms: elapsed.as_millis() as u64,
            image_width,
            image_height,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub boxes: Vec<BoxRecord>,
    pub count: usize,
    pub inference_time_ms: u64,
    pub image_width: u32,
    pub image_height: u32,
}

impl DetectionReport {
    pub fn new(polygons: &[Polygon], elapsed: Duration, image_width: u32, image_height: u32) -> Self {
        Self {
            boxes: polygons.iter().map(BoxRecord::from).collect(),
            count: polygons.len(),
            inference_time_ms: elapsed.as_millis() as u64,
            image_width,
            image_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ImageLoadFailed,
    EngineNotInitialized,
    BufferInvalid,
    InferenceFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub code: ErrorCode,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}
