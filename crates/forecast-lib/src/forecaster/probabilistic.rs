//! Probabilistic strategy: AR(p) mean with Gaussian residual sampling
//!
//! Each step refits AR(p), then draws `num_samples` values from
//! `Normal(mean, sigma)` with a seeded generator, so repeated runs with the same
//! seed produce identical distributions.

use super::autoregressive::ArFit;
use super::{ForecastStrategy, PredictiveDistribution, StepForecast};
use crate::config::PointEstimate;
use crate::error::{PipelineError, Result};
use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;

/// Quantile levels reported for every step
pub const QUANTILE_LEVELS: [f64; 3] = [0.1, 0.5, 0.9];

pub struct ProbabilisticStrategy {
    order: usize,
    num_samples: usize,
    point_estimate: PointEstimate,
    rng: ChaCha8Rng,
}

impl ProbabilisticStrategy {
    pub fn new(
        order: usize,
        num_samples: usize,
        point_estimate: PointEstimate,
        seed: u64,
        train_len: usize,
    ) -> Result<Self> {
        if num_samples < 2 {
            return Err(PipelineError::InvalidConfig(
                "probabilistic strategy needs at least 2 samples per step".into(),
            ));
        }
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
            num_samples,
            point_estimate,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    fn sample(&mut self, mean: f64, sigma: f64) -> Result<Vec<f64>> {
        if sigma <= f64::EPSILON * mean.abs().max(1.0) {
            return Ok(vec![mean; self.num_samples]);
        }
        let normal = Normal::new(mean, sigma)
            .map_err(|e| PipelineError::FitFailure(format!("invalid predictive normal: {}", e)))?;
        Ok((0..self.num_samples)
            .map(|_| normal.sample(&mut self.rng))
            .collect())
    }
}

impl ForecastStrategy for ProbabilisticStrategy {
    fn name(&self) -> &str {
        "probabilistic"
    }

    fn fit_and_predict_one_step(&mut self, history: &[f64]) -> Result<StepForecast> {
        let fit = ArFit::fit(history, self.order)?;
        let mean = fit.forecast_next(history)?;
        let sigma = fit.sigma2.max(0.0).sqrt();

        let mut samples = self.sample(mean, sigma)?;
        let distribution = summarize(&mut samples);
        let point = match self.point_estimate {
            PointEstimate::Mean => distribution.mean,
            PointEstimate::Median => distribution.median,
        };
        Ok(StepForecast {
            point,
            distribution: Some(distribution),
        })
    }
}

/// Summarize samples into moments and quantiles; sorts in place
fn summarize(samples: &mut [f64]) -> PredictiveDistribution {
    samples.sort_by(|a, b| a.total_cmp(b));
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);

    PredictiveDistribution {
        mean,
        median: quantile_sorted(samples, 0.5),
        std_dev: variance.sqrt(),
        quantiles: QUANTILE_LEVELS
            .iter()
            .map(|&q| (q, quantile_sorted(samples, q)))
            .collect(),
    }
}

/// Linear-interpolated quantile of sorted, non-empty data
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_series(len: usize) -> Vec<f64> {
        (0..len)
            .map(|t| 50.0 + 10.0 * (t as f64 * 0.4).sin() + ((t * 7919) % 13) as f64 * 0.5)
            .collect()
    }

    #[test]
    fn test_distribution_is_ordered() {
        let history = noisy_series(40);
        let mut strategy =
            ProbabilisticStrategy::new(2, 500, PointEstimate::Mean, 7, history.len()).unwrap();
        let forecast = strategy.fit_and_predict_one_step(&history).unwrap();
        let dist = forecast.distribution.unwrap();

        let p10 = dist.quantile(0.1).unwrap();
        let p50 = dist.quantile(0.5).unwrap();
        let p90 = dist.quantile(0.9).unwrap();
        assert!(p10 <= p50 && p50 <= p90);
        assert!(dist.std_dev > 0.0);
        assert_eq!(forecast.point, dist.mean);
        assert_eq!(p50, dist.median);
    }

    #[test]
    fn test_same_seed_same_samples() {
        let history = noisy_series(30);
        let run = |seed| {
            let mut s =
                ProbabilisticStrategy::new(1, 100, PointEstimate::Median, seed, history.len())
                    .unwrap();
            s.fit_and_predict_one_step(&history).unwrap()
        };
        assert_eq!(run(3), run(3));
        assert_ne!(run(3).point, run(4).point);
    }

    #[test]
    fn test_zero_residual_collapses_distribution() {
        let history = vec![10.0; 12];
        let mut strategy =
            ProbabilisticStrategy::new(1, 50, PointEstimate::Mean, 1, history.len()).unwrap();
        let forecast = strategy.fit_and_predict_one_step(&history).unwrap();
        let dist = forecast.distribution.unwrap();
        assert!((dist.mean - 10.0).abs() < 1e-9);
        assert!(dist.std_dev < 1e-9);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(ProbabilisticStrategy::new(2, 1, PointEstimate::Mean, 0, 100).is_err());
        assert!(matches!(
            ProbabilisticStrategy::new(3, 100, PointEstimate::Mean, 0, 4),
            Err(PipelineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(quantile_sorted(&sorted, 0.5), 20.0);
        assert!((quantile_sorted(&sorted, 0.1) - 4.0).abs() < 1e-12);
        assert_eq!(quantile_sorted(&sorted, 1.0), 40.0);
    }
}
