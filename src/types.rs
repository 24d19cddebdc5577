use std::path::PathBuf;

use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    Disable,
    Basic,
    Extended,
    All,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub intra_op_num_threads: usize,
    pub inter_op_num_threads: usize,
    pub optimization_level: OptimizationLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intra_op_num_threads: 4,
            inter_op_num_threads: 2,
            optimization_level: OptimizationLevel::All,
        }
    }
}

/// PP-DocLayout model settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub model_path: PathBuf,
    pub target_width: u32,
    pub target_height: u32,
    pub conf_threshold: f32,
    pub engine_cfg: EngineConfig,
}

impl LayoutConfig {
    pub fn pp_doclayout(model_path: PathBuf) -> Self {
        Self {
            model_path,
            ..Self::default()
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            target_width: 640,
            target_height: 640,
            conf_threshold: 0.5,
            engine_cfg: EngineConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DetConfig {
    pub model_path: PathBuf,
    pub max_side_len: u32,
    pub block_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub thresh: f32,
    pub box_thresh: f32,
    pub min_size: f32,
    pub engine_cfg: EngineConfig,
}

impl DetConfig {
    pub fn ppv4(model_path: PathBuf) -> Self {
        Self {
            model_path,
            ..Self::default()
        }
    }
}

impl Default for DetConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            max_side_len: 960,
            block_size: 32,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            thresh: 0.3,
            // The pipeline accepts weaker boxes than the DB default of 0.5.
            box_thresh: 0.3,
            min_size: 3.0,
            engine_cfg: EngineConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RecConfig {
    pub model_path: PathBuf,
    pub dict_path: PathBuf,
    pub img_height: u32,
    pub max_width: u32,
    pub rec_thresh: f32,
    pub engine_cfg: EngineConfig,
}

impl RecConfig {
    pub fn ppv4(model_path: PathBuf, dict_path: PathBuf) -> Self {
        Self {
            model_path,
            dict_path,
            ..Self::default()
        }
    }
}

impl Default for RecConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            dict_path: PathBuf::new(),
            img_height: 48,
            max_width: 2048,
            rec_thresh: 0.5,
            engine_cfg: EngineConfig::default(),
        }
    }
}

/// Ratio from processed-image coordinates to original-image coordinates:
/// `processed = original * factor`, so mapping back divides by it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleFactor {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactor {
    pub const IDENTITY: ScaleFactor = ScaleFactor { x: 1.0, y: 1.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Factor that maps an `orig_w x orig_h` image onto `new_w x new_h`.
    pub fn between(orig_w: u32, orig_h: u32, new_w: u32, new_h: u32) -> Self {
        Self {
            x: new_w as f32 / orig_w as f32,
            y: new_h as f32 / orig_h as f32,
        }
    }

    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        (x / self.x, y / self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_factor_round_trips_processed_coordinates() {
        let sf = ScaleFactor::between(1000, 500, 640, 640);
        assert!((sf.x - 0.64).abs() < 1e-6);
        assert!((sf.y - 1.28).abs() < 1e-6);

        let (x, y) = sf.to_original(320.0, 320.0);
        assert!((x - 500.0).abs() < 1e-3);
        assert!((y - 250.0).abs() < 1e-3);
    }

    #[test]
    fn configs_deserialize_with_partial_json() {
        let det: DetConfig =
            serde_json::from_str(r#"{"thresh": 0.4, "engine_cfg": {"intra_op_num_threads": 1}}"#)
                .unwrap();
        assert_eq!(det.thresh, 0.4);
        assert_eq!(det.max_side_len, 960);
        assert_eq!(det.engine_cfg.intra_op_num_threads, 1);
        assert_eq!(det.engine_cfg.inter_op_num_threads, 2);

        let layout = LayoutConfig::pp_doclayout(PathBuf::from("layout.onnx"));
        assert_eq!(layout.target_width, 640);
        assert_eq!(layout.conf_threshold, 0.5);
    }
}
