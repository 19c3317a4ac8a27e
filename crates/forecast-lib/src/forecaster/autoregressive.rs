//! Autoregressive AR(p) strategy, refit on the full history every step

use super::{ForecastStrategy, StepForecast};
use crate::error::{PipelineError, Result};
use serde::Serialize;

/// Relative ridge added to the normal-equation diagonal
const RIDGE: f64 = 1e-10;

/// Conditional least-squares AR(p) fit with intercept
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArFit {
    /// Mean removed from the series before fitting
    pub center: f64,
    pub intercept: f64,
    /// `coefficients[i]` multiplies the value `i + 1` periods back
    pub coefficients: Vec<f64>,
    /// Residual variance, degrees-of-freedom corrected
    pub sigma2: f64,
}

impl ArFit {
    /// Minimum history length for an order-`p` fit
    pub fn min_history(order: usize) -> usize {
        2 * order + 2
    }

    /// Fit `y[t] = c + sum(phi[i] * y[t - 1 - i])` over `history`.
    ///
    /// The series is mean-centered first to keep the normal equations well
    /// conditioned on large-magnitude telemetry.
    pub fn fit(history: &[f64], order: usize) -> Result<Self> {
        if order == 0 {
            return Err(PipelineError::InvalidConfig(
                "autoregressive order must be at least 1".into(),
            ));
        }
        let n = history.len();
        if n < Self::min_history(order) {
            return Err(PipelineError::FitFailure(format!(
                "AR({}) needs {} observations, got {}",
                order,
                Self::min_history(order),
                n
            )));
        }
        if history.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::FitFailure(
                "history contains non-finite values".into(),
            ));
        }

        let center = history.iter().sum::<f64>() / n as f64;
        let y: Vec<f64> = history.iter().map(|v| v - center).collect();

        let k = order + 1;
        let mut xtx = vec![vec![0.0; k]; k];
        let mut xty = vec![0.0; k];
        let mut row = vec![0.0; k];
        for t in order..n {
            row[0] = 1.0;
            for lag in 1..=order {
                row[lag] = y[t - lag];
            }
            for i in 0..k {
                xty[i] += row[i] * y[t];
                for j in 0..k {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }

        let trace: f64 = (0..k).map(|i| xtx[i][i]).sum();
        let ridge = RIDGE * (trace / k as f64).max(1.0);
        for (i, r) in xtx.iter_mut().enumerate() {
            r[i] += ridge;
        }

        let beta = solve_symmetric(&xtx, &xty).ok_or_else(|| {
            PipelineError::FitFailure("normal equations not positive definite".into())
        })?;
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(PipelineError::FitFailure(
                "non-finite AR coefficients".into(),
            ));
        }

        let mut ssr = 0.0;
        for t in order..n {
            let fitted = beta[0]
                + (1..=order)
                    .map(|lag| beta[lag] * y[t - lag])
                    .sum::<f64>();
            ssr += (y[t] - fitted).powi(2);
        }
        let dof = (n - order - k).max(1);

        Ok(Self {
            center,
            intercept: beta[0],
            coefficients: beta[1..].to_vec(),
            sigma2: ssr / dof as f64,
        })
    }

    pub fn order(&self) -> usize {
        self.coefficients.len()
    }

    /// Forecast the value following `history` on the original scale
    pub fn forecast_next(&self, history: &[f64]) -> Result<f64> {
        let p = self.order();
        if history.len() < p {
            return Err(PipelineError::InsufficientData {
                needed: p.saturating_sub(1),
                got: history.len(),
            });
        }
        let n = history.len();
        let centered = self.intercept
            + self
                .coefficients
                .iter()
                .enumerate()
                .map(|(i, phi)| phi * (history[n - 1 - i] - self.center))
                .sum::<f64>();
        Ok(centered + self.center)
    }
}

/// Solve a symmetric positive definite system via Cholesky decomposition
fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = a[i][i] - sum;
                if d <= 0.0 || !d.is_finite() {
                    return None;
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }

    // Forward substitution: L z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|k| l[i][k] * z[k]).sum();
        z[i] = (b[i] - sum) / l[i][i];
    }
    // Back substitution: L^T x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (z[i] - sum) / l[i][i];
    }
    Some(x)
}

/// AR(p) refit on the entire history at every rolling step
#[derive(Debug, Clone)]
pub struct AutoregressiveStrategy {
    order: usize,
    last_fit: Option<ArFit>,
}

impl AutoregressiveStrategy {
    /// Create a strategy, checking the training split supports the order
    pub fn new(order: usize, train_len: usize) -> Result<Self> {
        if order == 0 {
            return Err(PipelineError::InvalidConfig(
                "autoregressive order must be at least 1".into(),
            ));
        }
        let needed = ArFit::min_history(order);
        if train_len < needed {
            return Err(PipelineError::InsufficientData {
                needed: needed - 1,
                got: train_len,
            });
        }
        Ok(Self {
            order,
            last_fit: None,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Coefficients from the most recent successful step
    pub fn last_fit(&self) -> Option<&ArFit> {
        self.last_fit.as_ref()
    }
}

impl ForecastStrategy for AutoregressiveStrategy {
    fn name(&self) -> &str {
        "autoregressive"
    }

    fn fit_and_predict_one_step(&mut self, history: &[f64]) -> Result<StepForecast> {
        let fit = ArFit::fit(history, self.order)?;
        let point = fit.forecast_next(history)?;
        self.last_fit = Some(fit);
        Ok(StepForecast::point(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_recovers_ar1() {
        // y[t] = 0.5 * y[t-1] + 10, noiseless
        let mut series = vec![-40.0];
        for _ in 0..20 {
            let last = *series.last().unwrap();
            series.push(0.5 * last + 10.0);
        }
        let fit = ArFit::fit(&series[..12], 1).unwrap();
        assert!((fit.coefficients[0] - 0.5).abs() < 1e-6);
        let next = fit.forecast_next(&series[..12]).unwrap();
        assert!((next - series[12]).abs() < 1e-6);
        assert!(fit.sigma2 < 1e-9);
    }

    #[test]
    fn test_linear_trend_is_extrapolated() {
        let series: Vec<f64> = (0..40).map(|t| 3.0 * t as f64 + 7.0).collect();
        let fit = ArFit::fit(&series, 1).unwrap();
        let next = fit.forecast_next(&series).unwrap();
        assert!((next - (3.0 * 40.0 + 7.0)).abs() < 1e-3, "got {}", next);
    }

    #[test]
    fn test_constant_series_forecasts_constant() {
        let series = vec![42.0; 20];
        let fit = ArFit::fit(&series, 2).unwrap();
        let next = fit.forecast_next(&series).unwrap();
        assert!((next - 42.0).abs() < 1e-6);
    }

    #[test]
    fn test_fit_failure_modes() {
        assert!(matches!(
            ArFit::fit(&[1.0, 2.0, 3.0], 2),
            Err(PipelineError::FitFailure(_))
        ));
        assert!(matches!(
            ArFit::fit(&[1.0, f64::NAN, 3.0, 4.0, 5.0, 6.0], 1),
            Err(PipelineError::FitFailure(_))
        ));
        assert!(ArFit::fit(&[1.0; 10], 0).is_err());
    }

    #[test]
    fn test_strategy_rejects_short_train() {
        assert!(matches!(
            AutoregressiveStrategy::new(2, 5),
            Err(PipelineError::InsufficientData { .. })
        ));
        assert!(AutoregressiveStrategy::new(2, 6).is_ok());
    }

    #[test]
    fn test_strategy_step_keeps_last_fit() {
        let history: Vec<f64> = (0..30).map(|t| (t as f64 * 0.3).sin() * 10.0).collect();
        let mut strategy = AutoregressiveStrategy::new(2, history.len()).unwrap();
        let forecast = strategy.fit_and_predict_one_step(&history).unwrap();
        assert!(forecast.point.is_finite());
        assert!(forecast.distribution.is_none());
        assert_eq!(strategy.last_fit().unwrap().order(), 2);
    }
}
