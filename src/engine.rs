use std::borrow::Cow;
use std::path::Path;
use std::sync::Mutex;

use ndarray::ArrayD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::value::Value;
use tracing::{debug, info};

use crate::types::{EngineConfig, OptimizationLevel};

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("ORT error: {0}")]
    Ort(String),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Invalid output shape: {0:?}")]
    InvalidOutputShape(Vec<usize>),

    #[error("Preprocess error: {0}")]
    Preprocess(String),

    #[error("Dictionary error: {0}")]
    Dictionary(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        EngineError::ImageError(err.to_string())
    }
}

fn ort_error(err: impl std::fmt::Display) -> EngineError {
    EngineError::Ort(err.to_string())
}

/// Boundary to whatever executes the models.
///
/// Implementations receive named input tensors and hand back the first output
/// tensor. The layout pipeline also asks how many inputs the model declares,
/// since that count decides which input schema it expects.
///
/// Also used with a boxed engine (`Box<dyn InferenceEngine>`) when the model
/// backend is picked at runtime.
pub trait InferenceEngine: Send + Sync {
    fn input_names(&self) -> &[String];

    fn input_count(&self) -> usize {
        self.input_names().len()
    }

    fn run(&self, inputs: Vec<(String, ArrayD<f32>)>) -> Result<ArrayD<f32>, EngineError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn input_names(&self) -> &[String] {
        (**self).input_names()
    }

    fn run(&self, inputs: Vec<(String, ArrayD<f32>)>) -> Result<ArrayD<f32>, EngineError> {
        (**self).run(inputs)
    }
}

/// Paddle detection and recognition models take a single image tensor,
/// conventionally named `x`.
pub(crate) fn image_input_name<E: InferenceEngine + ?Sized>(engine: &E) -> String {
    engine
        .input_names()
        .first()
        .cloned()
        .unwrap_or_else(|| "x".to_string())
}

/// ONNX Runtime session. Running needs exclusive access, so concurrent callers
/// are serialized on the inner lock.
pub struct OrtSession {
    session: Mutex<Session>,
    input_names: Vec<String>,
}

impl OrtSession {
    pub fn from_path(model_path: &Path, engine_cfg: &EngineConfig) -> Result<Self, EngineError> {
        info!("Loading model: {}", model_path.display());

        let level = match engine_cfg.optimization_level {
            OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            OptimizationLevel::Basic => GraphOptimizationLevel::Level1,
            OptimizationLevel::Extended => GraphOptimizationLevel::Level2,
            OptimizationLevel::All => GraphOptimizationLevel::Level3,
        };

        let mut builder = Session::builder()
            .map_err(ort_error)?
            .with_optimization_level(level)
            .map_err(ort_error)?;

        if engine_cfg.intra_op_num_threads > 0 {
            builder = builder
                .with_intra_threads(engine_cfg.intra_op_num_threads)
                .map_err(ort_error)?;
        }

        if engine_cfg.inter_op_num_threads > 0 {
            builder = builder
                .with_inter_threads(engine_cfg.inter_op_num_threads)
                .map_err(ort_error)?;
        }

        let session = builder.commit_from_file(model_path).map_err(ort_error)?;
        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        debug!("Model inputs: {:?}", input_names);

        Ok(Self {
            session: Mutex::new(session),
            input_names,
        })
    }
}

impl InferenceEngine for OrtSession {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn run(&self, inputs: Vec<(String, ArrayD<f32>)>) -> Result<ArrayD<f32>, EngineError> {
        let mut values: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = Vec::with_capacity(inputs.len());
        for (name, array) in inputs {
            let value = Value::from_array(array).map_err(ort_error)?;
            values.push((Cow::Owned(name), value.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| EngineError::Ort("session lock poisoned".to_string()))?;

        let session_inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(values);
        let outputs = session.run(session_inputs).map_err(ort_error)?;
        let tensor = outputs[0].try_extract_array::<f32>().map_err(ort_error)?;
        Ok(tensor.to_owned())
    }
}
