use std::time::Instant;

use ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use tracing::debug;

use crate::engine::{image_input_name, EngineError, InferenceEngine};
use crate::image_impl::Mat;
use crate::postprocess::{DbPostProcess, Polygon};
use crate::preprocess::prepare_detection_input;
use crate::types::DetConfig;

pub struct TextDetector<E: InferenceEngine> {
    cfg: DetConfig,
    engine: E,
}

impl<E: InferenceEngine> TextDetector<E> {
    pub fn new(engine: E, cfg: DetConfig) -> Self {
        Self { cfg, engine }
    }

    pub fn config(&self) -> &DetConfig {
        &self.cfg
    }

    /// Text polygons in reading order, binarizing the map at `thresh`.
    pub fn run(&self, img: &Mat, thresh: f32) -> Result<Vec<Polygon>, EngineError> {
        if img.empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let prepared = prepare_detection_input(
            img,
            self.cfg.max_side_len,
            self.cfg.block_size,
            self.cfg.mean,
            self.cfg.std,
        );
        let (input, scale) = match prepared {
            Ok(prepared) => prepared,
            // Sides that shrink below one pixel leave nothing to detect.
            Err(EngineError::Preprocess(reason)) => {
                debug!("Skipping detection on {}x{} image: {}", img.cols(), img.rows(), reason);
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        let output = self
            .engine
            .run(vec![(image_input_name(&self.engine), input.into_dyn())])?;
        let map = probability_map(&output)?;

        let postprocess = DbPostProcess::new(thresh, self.cfg.box_thresh, self.cfg.min_size);
        let polygons = postprocess.decode(map, scale, img.cols() as u32, img.rows() as u32);

        debug!(
            "Detected {} text regions in {:.1} ms",
            polygons.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(polygons)
    }
}

/// Accept `[1, 1, H, W]`, `[1, H, W]` or `[H, W]`.
fn probability_map(output: &ArrayD<f32>) -> Result<ArrayView2<'_, f32>, EngineError> {
    let shape = output.shape().to_vec();
    let view = match shape.as_slice() {
        [1, 1, _, _] => output.index_axis(Axis(0), 0).index_axis_move(Axis(0), 0),
        [1, _, _] => output.index_axis(Axis(0), 0),
        [_, _] => output.view(),
        _ => return Err(EngineError::InvalidOutputShape(shape)),
    };
    view.into_dimensionality::<Ix2>()
        .map_err(|_| EngineError::InvalidOutputShape(shape))
}
