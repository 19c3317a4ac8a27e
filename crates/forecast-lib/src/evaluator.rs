//! Accuracy metrics over (predicted, actual) pairs

use crate::error::{PipelineError, Result};
use crate::forecaster::{ForecastPoint, RollingOutcome, SkippedStep};
use serde::Serialize;

/// Minimum valid pairs for meaningful metrics
pub const MIN_VALID_PAIRS: usize = 2;

/// Aggregate forecast accuracy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Coefficient of determination, `None` when the actuals have zero variance
    pub r2: Option<f64>,
    /// Pairs the metrics were computed over
    pub count: usize,
}

/// Compute metrics over `(predicted, actual)` pairs.
///
/// Pairs with a non-finite member are ignored. Fewer than two remaining pairs
/// is an `InsufficientResults` error.
pub fn evaluate(pairs: &[(f64, f64)]) -> Result<Metrics> {
    let valid: Vec<(f64, f64)> = pairs
        .iter()
        .copied()
        .filter(|(p, a)| p.is_finite() && a.is_finite())
        .collect();
    if valid.len() < MIN_VALID_PAIRS {
        return Err(PipelineError::InsufficientResults {
            valid: valid.len(),
            needed: MIN_VALID_PAIRS,
        });
    }

    let n = valid.len() as f64;
    let mse = valid.iter().map(|(p, a)| (a - p).powi(2)).sum::<f64>() / n;
    let mae = valid.iter().map(|(p, a)| (a - p).abs()).sum::<f64>() / n;

    let mean_actual = valid.iter().map(|(_, a)| a).sum::<f64>() / n;
    let ss_tot: f64 = valid.iter().map(|(_, a)| (a - mean_actual).powi(2)).sum();
    let ss_res: f64 = valid.iter().map(|(p, a)| (a - p).powi(2)).sum();
    let r2 = (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot);

    Ok(Metrics {
        mse,
        mae,
        rmse: mse.sqrt(),
        r2,
        count: valid.len(),
    })
}

/// Scored output of one strategy run; read-only once built
#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    strategy: String,
    target: String,
    points: Vec<ForecastPoint>,
    skipped: Vec<SkippedStep>,
    train_len: usize,
    test_len: usize,
    metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    train_metrics: Option<Metrics>,
}

/// Rolling output whose forecasts could not be scored
#[derive(Debug)]
pub struct Unscored {
    pub error: PipelineError,
    pub outcome: RollingOutcome,
}

impl ForecastResult {
    /// Score a rolling outcome
    pub fn from_outcome(outcome: RollingOutcome, target: impl Into<String>) -> Result<Self> {
        Self::score(outcome, target).map_err(|unscored| unscored.error)
    }

    /// Score a rolling outcome, handing it back intact when metrics cannot be
    /// computed so its points and skips stay reportable
    pub fn score(
        outcome: RollingOutcome,
        target: impl Into<String>,
    ) -> std::result::Result<Self, Unscored> {
        let pairs: Vec<(f64, f64)> = outcome
            .points
            .iter()
            .map(|p| (p.predicted, p.actual))
            .collect();
        let metrics = match evaluate(&pairs) {
            Ok(metrics) => metrics,
            Err(error) => return Err(Unscored { error, outcome }),
        };
        Ok(Self {
            strategy: outcome.strategy,
            target: target.into(),
            points: outcome.points,
            skipped: outcome.skipped,
            train_len: outcome.train_len,
            test_len: outcome.test_len,
            metrics,
            train_metrics: None,
        })
    }

    /// Attach in-sample metrics computed on the training windows
    pub fn with_train_metrics(mut self, metrics: Metrics) -> Self {
        self.train_metrics = Some(metrics);
        self
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn skipped(&self) -> &[SkippedStep] {
        &self.skipped
    }

    pub fn train_len(&self) -> usize {
        self.train_len
    }

    pub fn test_len(&self) -> usize {
        self.test_len
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn train_metrics(&self) -> Option<&Metrics> {
        self.train_metrics.as_ref()
    }

    /// Predicted values in step order
    pub fn predictions(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.predicted).collect()
    }

    /// Actual values in step order
    pub fn actuals(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.actual).collect()
    }
}
