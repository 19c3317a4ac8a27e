//! Pre-trained sequence regressor executed with tract
//!
//! Loads an exported ONNX network taking a `[1, 1, look_back]` f32 input of
//! scaled values and producing a single scaled forecast. The model file can be
//! pinned with a SHA256 checksum.

use super::sequence::SequenceRegressor;
use crate::error::{PipelineError, Result};
use crate::partition::Window;
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Inference slower than this is logged
const SLOW_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Debug)]
pub struct OnnxRegressor {
    model: TractModel,
    look_back: usize,
    checksum: String,
}

impl OnnxRegressor {
    /// Load from disk, verifying the checksum when one is given
    pub fn from_path(path: &Path, look_back: usize, expected_sha256: Option<&str>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        info!(path = %path.display(), size = bytes.len(), "Loading ONNX sequence model");
        Self::from_bytes(&bytes, look_back, expected_sha256)
    }

    pub fn from_bytes(bytes: &[u8], look_back: usize, expected_sha256: Option<&str>) -> Result<Self> {
        let checksum = sha256_hex(bytes);
        if let Some(expected) = expected_sha256 {
            if !checksum.eq_ignore_ascii_case(expected.trim()) {
                return Err(PipelineError::Model(format!(
                    "checksum mismatch: expected {}, got {}",
                    expected, checksum
                )));
            }
        }
        let model = load_model(bytes, look_back)
            .map_err(|e| PipelineError::Model(format!("{:#}", e)))?;
        Ok(Self {
            model,
            look_back,
            checksum,
        })
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    fn run(&self, inputs: &[f64]) -> anyhow::Result<f64> {
        let data: Vec<f32> = inputs.iter().map(|&v| v as f32).collect();
        let input: Tensor = tract_ndarray::Array3::from_shape_vec((1, 1, self.look_back), data)
            .context("Failed to shape model input")?
            .into();
        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let value = output
            .to_array_view::<f32>()?
            .iter()
            .next()
            .copied()
            .context("Model output is empty")?;
        Ok(value as f64)
    }
}

fn load_model(bytes: &[u8], look_back: usize) -> anyhow::Result<TractModel> {
    let model = tract_onnx::onnx()
        .model_for_read(&mut std::io::Cursor::new(bytes))
        .context("Failed to parse ONNX model")?
        .with_input_fact(0, f32::fact([1, 1, look_back]).into())
        .context("Failed to set input shape")?
        .into_optimized()
        .context("Failed to optimize model")?
        .into_runnable()
        .context("Failed to create runnable model")?;
    Ok(model)
}

/// Hex-encoded SHA256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

impl SequenceRegressor for OnnxRegressor {
    fn name(&self) -> &str {
        "onnx"
    }

    fn fit(&mut self, windows: &[Window]) -> Result<()> {
        if let Some(w) = windows.iter().find(|w| w.inputs.len() != self.look_back) {
            return Err(PipelineError::InvalidConfig(format!(
                "model expects look-back {}, window has {}",
                self.look_back,
                w.inputs.len()
            )));
        }
        debug!(windows = windows.len(), "Pre-trained model, skipping training");
        Ok(())
    }

    fn predict(&self, inputs: &[f64]) -> Result<f64> {
        if inputs.len() != self.look_back {
            return Err(PipelineError::InvalidConfig(format!(
                "expected {} inputs, got {}",
                self.look_back,
                inputs.len()
            )));
        }
        let start = Instant::now();
        let value = self
            .run(inputs)
            .map_err(|e| PipelineError::FitFailure(format!("inference failed: {:#}", e)))?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms", SLOW_INFERENCE_MS);
        }
        Ok(value)
    }
}
