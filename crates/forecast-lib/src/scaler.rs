//! Reversible min-max scaling
//!
//! Parameters are fitted on the training partition only and are immutable
//! afterwards, so one fitted scaler can be shared read-only across threads.

use crate::error::{PipelineError, Result};
use serde::Serialize;

/// Min-max scaler mapping the fitted range onto `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    /// Fit on training values.
    ///
    /// Fails with `InsufficientData` when no value is finite and with
    /// `DegenerateScale` when every value is equal.
    pub fn fit(train: &[f64]) -> Result<Self> {
        let finite = train.iter().copied().filter(|v| v.is_finite());
        let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if min > max {
            return Err(PipelineError::InsufficientData { needed: 0, got: 0 });
        }
        if max == min {
            return Err(PipelineError::DegenerateScale { value: min });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn transform(&self, x: f64) -> f64 {
        (x - self.min) / (self.max - self.min)
    }

    pub fn inverse_transform(&self, scaled: f64) -> f64 {
        scaled * (self.max - self.min) + self.min
    }

    pub fn transform_slice(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&x| self.transform(x)).collect()
    }

    pub fn inverse_slice(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&x| self.inverse_transform(x)).collect()
    }
}
