use ndarray::{arr2, ArrayD, ArrayView2, Axis, Ix2};
use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::{EngineError, InferenceEngine, OrtSession};
use crate::image_impl::Mat;
use crate::preprocess::prepare_layout_input;
use crate::types::{LayoutConfig, ScaleFactor};

/// PP-DocLayout class table, indexed by the model's class id.
pub const DOC_CLASSES: [&str; 23] = [
    "paragraph_title",
    "image",
    "text",
    "number",
    "abstract",
    "content",
    "figure_title",
    "formula",
    "table",
    "table_title",
    "reference",
    "doc_title",
    "footnote",
    "header",
    "algorithm",
    "footer",
    "seal",
    "chart_title",
    "chart",
    "formula_number",
    "header_image",
    "footer_image",
    "aside_text",
];

/// Columns of one layout output row: class, score, x1, y1, x2, y2.
const ROW_WIDTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: &'static str,
    pub score: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Input schema of the exported layout model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutVariant {
    /// `image` + `scale_factor`; boxes come back in resized coordinates.
    M,
    /// `im_shape` + `image` + unit `scale_factor`; boxes come back in
    /// original coordinates.
    L,
}

impl LayoutVariant {
    pub fn from_input_count(count: usize) -> Self {
        match count {
            3 => LayoutVariant::L,
            2 => LayoutVariant::M,
            other => {
                warn!("Layout model declares {other} inputs, assuming the 2-input schema");
                LayoutVariant::M
            }
        }
    }
}

/// Turn raw `[N, 6]` rows into detections in original-image coordinates,
/// keeping row order.
pub fn decode_layout(
    rows: ArrayView2<'_, f32>,
    variant: LayoutVariant,
    scale: ScaleFactor,
    ori_w: u32,
    ori_h: u32,
    conf_threshold: f32,
) -> Vec<Detection> {
    let scale = match variant {
        LayoutVariant::M => scale,
        LayoutVariant::L => ScaleFactor::IDENTITY,
    };
    let (w, h) = (ori_w as f32, ori_h as f32);

    rows.axis_iter(Axis(0))
        .filter(|row| row.len() >= ROW_WIDTH)
        .filter_map(|row| {
            let class = row[0];
            let score = row[1];
            if !class.is_finite() || score.is_nan() || score < conf_threshold {
                return None;
            }
            if !row.iter().skip(2).take(4).all(|v| v.is_finite()) {
                return None;
            }
            let class_id = class as i64;
            if class_id < 0 || class_id >= DOC_CLASSES.len() as i64 {
                return None;
            }

            let (x1, y1) = scale.to_original(row[2], row[3]);
            let (x2, y2) = scale.to_original(row[4], row[5]);
            let (x1, x2) = (x1.clamp(0.0, w), x2.clamp(0.0, w));
            let (y1, y2) = (y1.clamp(0.0, h), y2.clamp(0.0, h));

            Some(Detection {
                class_id: class_id as usize,
                class_name: DOC_CLASSES[class_id as usize],
                score,
                x1: x1.min(x2),
                y1: y1.min(y2),
                x2: x1.max(x2),
                y2: y1.max(y2),
            })
        })
        .collect()
}

pub struct LayoutDetector<E: InferenceEngine> {
    cfg: LayoutConfig,
    engine: E,
    variant: LayoutVariant,
}

impl<E: InferenceEngine> LayoutDetector<E> {
    pub fn new(engine: E, cfg: LayoutConfig) -> Self {
        let variant = LayoutVariant::from_input_count(engine.input_count());
        debug!("Layout model variant: {:?}", variant);
        Self { cfg, engine, variant }
    }

    pub fn variant(&self) -> LayoutVariant {
        self.variant
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.cfg
    }

    pub fn detect(&self, img: &Mat, conf_threshold: f32) -> Result<Vec<Detection>, EngineError> {
        if img.empty() {
            return Ok(Vec::new());
        }

        let (image, scale) = prepare_layout_input(img, self.cfg.target_width, self.cfg.target_height)?;
        let image = image.into_dyn();

        let inputs = match self.variant {
            LayoutVariant::M => vec![
                ("image".to_string(), image),
                ("scale_factor".to_string(), arr2(&[[scale.x, scale.y]]).into_dyn()),
            ],
            LayoutVariant::L => vec![
                (
                    "im_shape".to_string(),
                    arr2(&[[img.rows() as f32, img.cols() as f32]]).into_dyn(),
                ),
                ("image".to_string(), image),
                ("scale_factor".to_string(), arr2(&[[1.0f32, 1.0]]).into_dyn()),
            ],
        };

        let output = self.engine.run(inputs)?;
        let rows = detection_rows(&output)?;
        debug!("Layout model returned {} raw rows", rows.nrows());

        Ok(decode_layout(
            rows,
            self.variant,
            scale,
            img.cols() as u32,
            img.rows() as u32,
            conf_threshold,
        ))
    }
}

impl LayoutDetector<OrtSession> {
    pub fn from_config(cfg: LayoutConfig) -> Result<Self, EngineError> {
        let engine = OrtSession::from_path(&cfg.model_path, &cfg.engine_cfg)?;
        Ok(Self::new(engine, cfg))
    }
}

/// Accept `[N, 6]` or `[1, N, 6]`.
fn detection_rows(output: &ArrayD<f32>) -> Result<ArrayView2<'_, f32>, EngineError> {
    let shape = output.shape().to_vec();
    let view = match shape.as_slice() {
        [_, ROW_WIDTH] => output.view(),
        [1, _, ROW_WIDTH] => output.index_axis(Axis(0), 0),
        _ => return Err(EngineError::InvalidOutputShape(shape)),
    };
    view.into_dimensionality::<Ix2>()
        .map_err(|_| EngineError::InvalidOutputShape(shape))
}
