use std::fs;
use std::path::Path;

use ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use tracing::{debug, warn};

use crate::engine::{image_input_name, EngineError, InferenceEngine};
use crate::image_impl::Mat;
use crate::preprocess::prepare_recognition_input;
use crate::types::RecConfig;

/// Recognition vocabulary. Index 0 is the CTC blank.
#[derive(Debug, Clone)]
pub struct Dictionary {
    tokens: Vec<String>,
}

impl Dictionary {
    /// Wrap a token list that already carries the blank at index 0.
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// Load a PaddleOCR key file, one token per line.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Dictionary(format!("failed to read {}: {e}", path.display()))
        })?;
        let dict = Self::parse(&content)?;
        debug!("Loaded {} dictionary tokens from {}", dict.len(), path.display());
        Ok(dict)
    }

    /// Blank first, then each line (an empty line is a space), then a space
    /// token unless the file already ends with one, then an end token.
    pub fn parse(content: &str) -> Result<Self, EngineError> {
        let mut tokens = vec![String::new()];
        for line in content.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            tokens.push(if line.is_empty() { " ".to_string() } else { line.to_string() });
        }
        if tokens.len() == 1 {
            return Err(EngineError::Dictionary("dictionary is empty".to_string()));
        }

        if tokens.last().map(String::as_str) != Some(" ") {
            tokens.push(" ".to_string());
        }
        tokens.push(String::new());
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }
}

/// Greedy CTC decoding over a `[seq_len, vocab]` matrix.
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    dict: Dictionary,
}

impl CtcDecoder {
    pub fn new(dict: Dictionary) -> Self {
        Self { dict }
    }

    /// Returns the decoded text and the mean probability of the emitted
    /// tokens (0.0 when nothing was emitted).
    pub fn decode(&self, preds: ArrayView2<'_, f32>) -> (String, f32) {
        let (seq_len, vocab) = preds.dim();
        if seq_len == 0 || vocab == 0 {
            return (String::new(), 0.0);
        }

        let first = preds.row(0);
        let first_min = first.iter().copied().fold(f32::INFINITY, f32::min);
        let first_sum: f32 = first.sum();
        let needs_softmax = first_min < -0.001 || (first_sum - 1.0).abs() > 0.1;
        debug!("CTC: seq_len={seq_len}, vocab={vocab}, softmax={needs_softmax}");

        let mut text = String::new();
        let mut score_sum = 0.0f32;
        let mut emitted = 0usize;
        let mut prev_idx = 0usize;

        for row in preds.axis_iter(Axis(0)) {
            let mut probs = row.to_vec();
            if needs_softmax {
                softmax(&mut probs);
            }

            let mut best_idx = 0usize;
            let mut best_val = probs[0];
            for (i, &v) in probs.iter().enumerate().skip(1) {
                if v > best_val {
                    best_val = v;
                    best_idx = i;
                }
            }

            if best_idx != 0 && best_idx != prev_idx {
                match self.dict.get(best_idx) {
                    Some(token) => {
                        text.push_str(token);
                        score_sum += best_val;
                        emitted += 1;
                    }
                    None => warn!(
                        "CTC index {} outside dictionary of {} tokens",
                        best_idx,
                        self.dict.len()
                    ),
                }
            }
            prev_idx = best_idx;
        }

        let score = if emitted > 0 { score_sum / emitted as f32 } else { 0.0 };
        (text, score)
    }
}

fn softmax(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in row.iter_mut() {
        *v /= sum;
    }
}

pub struct TextRecognizer<E: InferenceEngine> {
    cfg: RecConfig,
    engine: E,
    decoder: CtcDecoder,
}

impl<E: InferenceEngine> TextRecognizer<E> {
    pub fn new(engine: E, dict: Dictionary, cfg: RecConfig) -> Self {
        Self {
            cfg,
            engine,
            decoder: CtcDecoder::new(dict),
        }
    }

    pub fn config(&self) -> &RecConfig {
        &self.cfg
    }

    /// Recognise one cropped text line. An empty crop decodes to nothing
    /// without running the model.
    pub fn run(&self, img: &Mat) -> Result<(String, f32), EngineError> {
        if img.empty() {
            return Ok((String::new(), 0.0));
        }

        let input = prepare_recognition_input(img, self.cfg.img_height, self.cfg.max_width)?;
        let output = self
            .engine
            .run(vec![(image_input_name(&self.engine), input.into_dyn())])?;
        let preds = sequence_view(&output)?;
        Ok(self.decoder.decode(preds))
    }
}

/// Accept `[1, T, C]` or `[T, C]`.
fn sequence_view(output: &ArrayD<f32>) -> Result<ArrayView2<'_, f32>, EngineError> {
    let shape = output.shape().to_vec();
    let view = match shape.as_slice() {
        [1, _, _] => output.index_axis(Axis(0), 0),
        [_, _] => output.view(),
        _ => return Err(EngineError::InvalidOutputShape(shape)),
    };
    view.into_dimensionality::<Ix2>()
        .map_err(|_| EngineError::InvalidOutputShape(shape))
}
