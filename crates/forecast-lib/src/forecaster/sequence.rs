//! Sequence strategy: a regressor trained once on scaled look-back windows
//!
//! The scaler is fitted on the training split only. At each rolling step the
//! last `L` raw history values are scaled, fed to the regressor and the output
//! inverse-scaled, so forecasts are compared with actuals in original units.

use super::{ForecastStrategy, StepForecast};
use crate::error::{PipelineError, Result};
use crate::partition::{make_windows, Window};
use crate::scaler::MinMaxScaler;
use tracing::info;

/// A regressor over fixed-length scaled input sequences
pub trait SequenceRegressor: Send {
    fn name(&self) -> &str;

    /// Train on windows cut from the scaled training split
    fn fit(&mut self, windows: &[Window]) -> Result<()>;

    /// Predict the scaled value following `inputs`
    fn predict(&self, inputs: &[f64]) -> Result<f64>;
}

pub struct SequenceStrategy {
    regressor: Box<dyn SequenceRegressor>,
    scaler: MinMaxScaler,
    look_back: usize,
    train_pairs: Vec<(f64, f64)>,
}

impl SequenceStrategy {
    /// Fit the scaler and the regressor on `train`.
    ///
    /// Fails with `DegenerateScale` on a constant training split and with
    /// `InsufficientData` when no window fits.
    pub fn train(
        mut regressor: Box<dyn SequenceRegressor>,
        train: &[f64],
        look_back: usize,
    ) -> Result<Self> {
        let scaler = MinMaxScaler::fit(train)?;
        let scaled = scaler.transform_slice(train);
        let windows = make_windows(&scaled, look_back)?;

        regressor.fit(&windows)?;

        let train_pairs = windows
            .iter()
            .map(|w| {
                regressor
                    .predict(&w.inputs)
                    .map(|p| (scaler.inverse_transform(p), scaler.inverse_transform(w.target)))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            event = "sequence_trained",
            regressor = regressor.name(),
            windows = windows.len(),
            look_back,
            scale_min = scaler.min(),
            scale_max = scaler.max(),
            "Sequence regressor trained"
        );

        Ok(Self {
            regressor,
            scaler,
            look_back,
            train_pairs,
        })
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    pub fn look_back(&self) -> usize {
        self.look_back
    }

    /// In-sample (predicted, actual) pairs on the original scale
    pub fn train_pairs(&self) -> &[(f64, f64)] {
        &self.train_pairs
    }
}

impl ForecastStrategy for SequenceStrategy {
    fn name(&self) -> &str {
        "sequence"
    }

    fn fit_and_predict_one_step(&mut self, history: &[f64]) -> Result<StepForecast> {
        if history.len() < self.look_back {
            return Err(PipelineError::InsufficientData {
                needed: self.look_back - 1,
                got: history.len(),
            });
        }
        let inputs = self
            .scaler
            .transform_slice(&history[history.len() - self.look_back..]);
        let scaled = self.regressor.predict(&inputs)?;
        Ok(StepForecast::point(self.scaler.inverse_transform(scaled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Predicts the last input unchanged
    struct Persistence;

    impl SequenceRegressor for Persistence {
        fn name(&self) -> &str {
            "persistence"
        }

        fn fit(&mut self, windows: &[Window]) -> Result<()> {
            assert!(!windows.is_empty());
            Ok(())
        }

        fn predict(&self, inputs: &[f64]) -> Result<f64> {
            inputs
                .last()
                .copied()
                .ok_or_else(|| PipelineError::Model("empty input".into()))
        }
    }

    #[test]
    fn test_predictions_are_inverse_scaled() {
        let train = [100.0, 200.0, 300.0, 400.0, 500.0];
        let mut strategy =
            SequenceStrategy::train(Box::new(Persistence), &train, 2).unwrap();
        // Persistence in scaled space returns the last raw value once inverted
        let forecast = strategy
            .fit_and_predict_one_step(&[100.0, 450.0, 650.0])
            .unwrap();
        assert!((forecast.point - 650.0).abs() < 1e-9);
        assert_eq!(strategy.scaler().min(), 100.0);
        assert_eq!(strategy.scaler().max(), 500.0);
    }

    #[test]
    fn test_train_pairs_in_original_units() {
        let train = [1.0, 3.0, 2.0, 5.0, 4.0];
        let strategy =
            SequenceStrategy::train(Box::new(Persistence), &train, 1).unwrap();
        // len - L - 1 windows
        assert_eq!(
            strategy.train_pairs(),
            &[(1.0, 3.0), (3.0, 2.0), (2.0, 5.0)]
        );
    }

    #[test]
    fn test_constant_train_is_degenerate() {
        let result = SequenceStrategy::train(Box::new(Persistence), &[7.0; 20], 1);
        assert!(matches!(result, Err(PipelineError::DegenerateScale { .. })));
    }

    #[test]
    fn test_short_train_is_insufficient() {
        let result = SequenceStrategy::train(Box::new(Persistence), &[1.0, 2.0], 1);
        assert!(matches!(result, Err(PipelineError::InsufficientData { .. })));
    }
}
