//! Walk-forward forecasting
//!
//! A single rolling loop drives every model family through the
//! `ForecastStrategy` step contract:
//! - autoregressive: refit AR(p) on the full history each step
//! - sequence: a regressor trained once, applied to the last `L` scaled values
//! - probabilistic: AR(p) emitting a sampled predictive distribution
//!
//! The loop always extends history with the observed test value, never with
//! its own forecast.

mod autoregressive;
mod lstm;
mod onnx;
mod probabilistic;
mod sequence;

pub use autoregressive::{ArFit, AutoregressiveStrategy};
pub use lstm::{LstmConfig, LstmRegressor};
pub use onnx::{sha256_hex, OnnxRegressor};
pub use probabilistic::ProbabilisticStrategy;
pub use sequence::{SequenceRegressor, SequenceStrategy};

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Model families benchmarked by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Autoregressive,
    Sequence,
    Probabilistic,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Autoregressive,
        StrategyKind::Sequence,
        StrategyKind::Probabilistic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Autoregressive => "autoregressive",
            StrategyKind::Sequence => "sequence",
            StrategyKind::Probabilistic => "probabilistic",
        }
    }

    /// Resolve a strategy from its name or the classic model alias
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "autoregressive" | "ar" | "arima" => Some(StrategyKind::Autoregressive),
            "sequence" | "lstm" => Some(StrategyKind::Sequence),
            "probabilistic" | "deepar" => Some(StrategyKind::Probabilistic),
            _ => None,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a per-step predictive distribution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictiveDistribution {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    /// (level, value) pairs, e.g. (0.1, p10)
    pub quantiles: Vec<(f64, f64)>,
}

impl PredictiveDistribution {
    pub fn quantile(&self, level: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|(l, _)| (l - level).abs() < 1e-9)
            .map(|(_, v)| *v)
    }
}

/// One-step forecast emitted by a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct StepForecast {
    pub point: f64,
    pub distribution: Option<PredictiveDistribution>,
}

impl StepForecast {
    pub fn point(point: f64) -> Self {
        Self {
            point,
            distribution: None,
        }
    }
}

/// Step contract shared by every model family
pub trait ForecastStrategy: Send {
    /// Strategy name used in logs and results
    fn name(&self) -> &str;

    /// Fit (or reuse) the model on `history` and forecast the next value
    fn fit_and_predict_one_step(&mut self, history: &[f64]) -> Result<StepForecast>;
}

/// A scored step of the rolling loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    /// Zero-based position in the test split
    pub step: usize,
    pub predicted: f64,
    pub actual: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<PredictiveDistribution>,
    pub elapsed_us: u64,
}

/// A step whose fit failed and was recorded as a gap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedStep {
    pub step: usize,
    pub actual: f64,
    pub kind: String,
    pub reason: String,
}

/// Everything a rolling run produced, in step order
#[derive(Debug, Clone, Serialize)]
pub struct RollingOutcome {
    pub strategy: String,
    pub points: Vec<ForecastPoint>,
    pub skipped: Vec<SkippedStep>,
    pub steps_attempted: usize,
    pub train_len: usize,
    pub test_len: usize,
    pub history_len: usize,
}

/// Walk-forward one-step-ahead evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingForecaster {
    max_steps: Option<usize>,
}

impl RollingForecaster {
    pub fn new(max_steps: Option<usize>) -> Self {
        Self { max_steps }
    }

    pub fn max_steps(&self) -> Option<usize> {
        self.max_steps
    }

    /// Run the expanding-window loop over `test`, seeded with `train`.
    ///
    /// A failed step is recorded in `skipped` and the loop continues; the
    /// observed value is still appended so later steps see the true history.
    pub fn run(
        &self,
        strategy: &mut dyn ForecastStrategy,
        train: &[f64],
        test: &[f64],
    ) -> Result<RollingOutcome> {
        if train.is_empty() {
            return Err(PipelineError::InsufficientData { needed: 0, got: 0 });
        }

        let steps = self.max_steps.map_or(test.len(), |cap| cap.min(test.len()));
        let mut history: Vec<f64> = Vec::with_capacity(train.len() + steps);
        history.extend_from_slice(train);

        let mut points = Vec::with_capacity(steps);
        let mut skipped = Vec::new();

        for (step, &actual) in test.iter().take(steps).enumerate() {
            let start = Instant::now();
            match strategy.fit_and_predict_one_step(&history) {
                Ok(forecast) if forecast.point.is_finite() => {
                    debug!(
                        strategy = strategy.name(),
                        step,
                        predicted = forecast.point,
                        actual,
                        "Rolling step forecast"
                    );
                    points.push(ForecastPoint {
                        step,
                        predicted: forecast.point,
                        actual,
                        distribution: forecast.distribution,
                        elapsed_us: start.elapsed().as_micros() as u64,
                    });
                }
                Ok(forecast) => {
                    warn!(
                        strategy = strategy.name(),
                        step,
                        predicted = forecast.point,
                        "Non-finite forecast, skipping step"
                    );
                    skipped.push(SkippedStep {
                        step,
                        actual,
                        kind: "fit_failure".to_string(),
                        reason: format!("non-finite forecast {}", forecast.point),
                    });
                }
                Err(e) if e.is_recoverable() => {
                    warn!(strategy = strategy.name(), step, error = %e, "Step failed, skipping");
                    skipped.push(SkippedStep {
                        step,
                        actual,
                        kind: e.kind().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
            history.push(actual);
        }

        Ok(RollingOutcome {
            strategy: strategy.name().to_string(),
            points,
            skipped,
            steps_attempted: steps,
            train_len: train.len(),
            test_len: test.len(),
            history_len: history.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Predicts the last value and records what it saw
    struct Recorder {
        seen: Vec<(usize, f64)>,
        fail_on_call: Option<usize>,
        fatal: bool,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                seen: Vec::new(),
                fail_on_call: None,
                fatal: false,
            }
        }
    }

    impl ForecastStrategy for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn fit_and_predict_one_step(&mut self, history: &[f64]) -> Result<StepForecast> {
            let call = self.seen.len();
            let last = *history.last().unwrap();
            self.seen.push((history.len(), last));
            if self.fail_on_call == Some(call) {
                if self.fatal {
                    return Err(PipelineError::EmptyDataset);
                }
                return Err(PipelineError::FitFailure("did not converge".into()));
            }
            // Deliberately wrong so appended values are distinguishable
            Ok(StepForecast::point(last + 1000.0))
        }
    }

    #[test]
    fn test_history_extended_with_ground_truth() {
        let train = [1.0, 2.0, 3.0];
        let test = [10.0, 20.0, 30.0, 40.0];
        let mut strategy = Recorder::new();
        let outcome = RollingForecaster::new(None)
            .run(&mut strategy, &train, &test)
            .unwrap();

        assert_eq!(outcome.points.len(), 4);
        // Call t sees len(train) + t values, the last being the observed test[t-1]
        assert_eq!(strategy.seen[0], (3, 3.0));
        for t in 1..test.len() {
            assert_eq!(strategy.seen[t], (train.len() + t, test[t - 1]));
        }
        assert_eq!(outcome.history_len, train.len() + test.len());
        for (point, actual) in outcome.points.iter().zip(test) {
            assert_eq!(point.actual, actual);
        }
    }

    #[test]
    fn test_step_cap_bounds_pairs() {
        let train = [1.0, 2.0];
        let test: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let mut strategy = Recorder::new();
        let outcome = RollingForecaster::new(Some(7))
            .run(&mut strategy, &train, &test)
            .unwrap();
        assert_eq!(outcome.points.len(), 7);
        assert_eq!(outcome.steps_attempted, 7);
        assert_eq!(outcome.history_len, 9);
    }

    #[test]
    fn test_cap_larger_than_test_split() {
        let mut strategy = Recorder::new();
        let outcome = RollingForecaster::new(Some(100))
            .run(&mut strategy, &[1.0], &[2.0, 3.0])
            .unwrap();
        assert_eq!(outcome.points.len(), 2);
    }

    #[test]
    fn test_failed_step_is_skipped_not_fatal() {
        let mut strategy = Recorder::new();
        strategy.fail_on_call = Some(1);
        let outcome = RollingForecaster::new(None)
            .run(&mut strategy, &[1.0, 2.0], &[3.0, 4.0, 5.0])
            .unwrap();

        assert_eq!(outcome.points.len(), 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].step, 1);
        assert_eq!(outcome.skipped[0].kind, "fit_failure");
        // The observed value is still appended after a skipped step
        assert_eq!(strategy.seen[2], (4, 4.0));
        let steps: Vec<usize> = outcome.points.iter().map(|p| p.step).collect();
        assert_eq!(steps, vec![0, 2]);
    }

    #[test]
    fn test_structural_error_aborts() {
        let mut strategy = Recorder::new();
        strategy.fail_on_call = Some(0);
        strategy.fatal = true;
        let result = RollingForecaster::new(None).run(&mut strategy, &[1.0], &[2.0]);
        assert!(matches!(result, Err(PipelineError::EmptyDataset)));
    }

    #[test]
    fn test_empty_train_rejected() {
        let mut strategy = Recorder::new();
        assert!(matches!(
            RollingForecaster::new(None).run(&mut strategy, &[], &[1.0]),
            Err(PipelineError::InsufficientData { needed: 0, got: 0 })
        ));
    }

    #[test]
    fn test_strategy_kind_aliases() {
        assert_eq!(StrategyKind::parse("ARIMA"), Some(StrategyKind::Autoregressive));
        assert_eq!(StrategyKind::parse("lstm"), Some(StrategyKind::Sequence));
        assert_eq!(StrategyKind::parse("deepar"), Some(StrategyKind::Probabilistic));
        assert_eq!(StrategyKind::parse("prophet"), None);
        assert_eq!(StrategyKind::Sequence.to_string(), "sequence");
    }
}
