//! Single-layer LSTM regressor trained with backpropagation through time
//!
//! Architecture: one LSTM layer of `hidden_units` cells over a univariate
//! input sequence, followed by a dense unit on the last hidden state. Trained
//! with Adam on squared error, batch size 1, seeded for reproducibility.
//!
//! Gate layout within every 4H block is input, forget, cell, output.
//!
//! A window of L look-back values is consumed as L timesteps of one feature,
//! so the input weights stay at 4H for any L. At L = 1 this is the same
//! network as a Keras `LSTM(H)` over `input_shape=(1, 1)`. For L > 1 it
//! differs from the `(1, L)` layout, which feeds one timestep of L features.

use super::sequence::SequenceRegressor;
use crate::config::SequenceConfig;
use crate::error::{PipelineError, Result};
use crate::partition::Window;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Serialize)]
pub struct LstmConfig {
    pub hidden_units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
    /// Shuffle window order every epoch
    pub shuffle: bool,
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self {
            hidden_units: 4,
            epochs: 5,
            learning_rate: 0.001,
            seed: 42,
            shuffle: true,
        }
    }
}

impl LstmConfig {
    pub fn from_sequence(config: &SequenceConfig, seed: u64) -> Self {
        Self {
            hidden_units: config.hidden_units,
            epochs: config.epochs,
            learning_rate: config.learning_rate,
            seed,
            shuffle: true,
        }
    }
}

/// Offsets into the flat parameter vector
#[derive(Debug, Clone, Copy)]
struct Layout {
    hidden: usize,
}

impl Layout {
    fn gates(&self) -> usize {
        4 * self.hidden
    }
    /// Input weights, one per gate row
    fn w(&self) -> usize {
        0
    }
    /// Recurrent weights, row-major `[gate_row][hidden]`
    fn u(&self) -> usize {
        self.gates()
    }
    fn b(&self) -> usize {
        self.u() + self.gates() * self.hidden
    }
    /// Dense weights over the last hidden state
    fn v(&self) -> usize {
        self.b() + self.gates()
    }
    fn d(&self) -> usize {
        self.v() + self.hidden
    }
    fn len(&self) -> usize {
        self.d() + 1
    }
}

/// Per-timestep activations kept for the backward pass
struct StepCache {
    x: f64,
    h_prev: Vec<f64>,
    c_prev: Vec<f64>,
    i: Vec<f64>,
    f: Vec<f64>,
    g: Vec<f64>,
    o: Vec<f64>,
    tanh_c: Vec<f64>,
}

struct Adam {
    m: Vec<f64>,
    v: Vec<f64>,
    t: i32,
    learning_rate: f64,
}

impl Adam {
    fn new(len: usize, learning_rate: f64) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
            t: 0,
            learning_rate,
        }
    }

    fn step(&mut self, params: &mut [f64], grads: &[f64]) {
        self.t += 1;
        let bias1 = 1.0 - BETA1.powi(self.t);
        let bias2 = 1.0 - BETA2.powi(self.t);
        for (k, p) in params.iter_mut().enumerate() {
            self.m[k] = BETA1 * self.m[k] + (1.0 - BETA1) * grads[k];
            self.v[k] = BETA2 * self.v[k] + (1.0 - BETA2) * grads[k] * grads[k];
            let m_hat = self.m[k] / bias1;
            let v_hat = self.v[k] / bias2;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
        }
    }
}

pub struct LstmRegressor {
    config: LstmConfig,
    layout: Layout,
    params: Vec<f64>,
    look_back: Option<usize>,
    epoch_losses: Vec<f64>,
}

impl LstmRegressor {
    pub fn new(config: LstmConfig) -> Result<Self> {
        if config.hidden_units == 0 {
            return Err(PipelineError::InvalidConfig(
                "hidden_units must be at least 1".into(),
            ));
        }
        if !(config.learning_rate > 0.0) {
            return Err(PipelineError::InvalidConfig(
                "learning_rate must be positive".into(),
            ));
        }
        let layout = Layout {
            hidden: config.hidden_units,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let params = init_params(layout, &mut rng);
        Ok(Self {
            config,
            layout,
            params,
            look_back: None,
            epoch_losses: Vec::new(),
        })
    }

    /// Mean squared training error per epoch, in scaled units
    pub fn epoch_losses(&self) -> &[f64] {
        &self.epoch_losses
    }

    pub fn num_parameters(&self) -> usize {
        self.params.len()
    }

    fn forward(&self, xs: &[f64]) -> (f64, Vec<StepCache>, Vec<f64>) {
        let h_n = self.layout.hidden;
        let l = self.layout;
        let p = &self.params;
        let mut h = vec![0.0; h_n];
        let mut c = vec![0.0; h_n];
        let mut caches = Vec::with_capacity(xs.len());

        for &x in xs {
            let mut a = vec![0.0; l.gates()];
            for (r, a_r) in a.iter_mut().enumerate() {
                let recurrent: f64 = (0..h_n).map(|j| p[l.u() + r * h_n + j] * h[j]).sum();
                *a_r = p[l.w() + r] * x + recurrent + p[l.b() + r];
            }
            let i: Vec<f64> = a[0..h_n].iter().map(|&z| sigmoid(z)).collect();
            let f: Vec<f64> = a[h_n..2 * h_n].iter().map(|&z| sigmoid(z)).collect();
            let g: Vec<f64> = a[2 * h_n..3 * h_n].iter().map(|&z| z.tanh()).collect();
            let o: Vec<f64> = a[3 * h_n..4 * h_n].iter().map(|&z| sigmoid(z)).collect();

            let c_new: Vec<f64> = (0..h_n).map(|j| f[j] * c[j] + i[j] * g[j]).collect();
            let tanh_c: Vec<f64> = c_new.iter().map(|v| v.tanh()).collect();
            let h_new: Vec<f64> = (0..h_n).map(|j| o[j] * tanh_c[j]).collect();

            caches.push(StepCache {
                x,
                h_prev: std::mem::replace(&mut h, h_new),
                c_prev: std::mem::replace(&mut c, c_new),
                i,
                f,
                g,
                o,
                tanh_c,
            });
        }

        let y = (0..h_n).map(|j| p[l.v() + j] * h[j]).sum::<f64>() + p[l.d()];
        (y, caches, h)
    }

    /// Squared error and its gradient for one window
    fn loss_and_gradient(&self, xs: &[f64], target: f64) -> (f64, Vec<f64>) {
        let l = self.layout;
        let h_n = l.hidden;
        let p = &self.params;
        let (y, caches, h_last) = self.forward(xs);
        let err = y - target;
        let dy = 2.0 * err;

        let mut grads = vec![0.0; p.len()];
        for j in 0..h_n {
            grads[l.v() + j] = dy * h_last[j];
        }
        grads[l.d()] = dy;

        let mut dh: Vec<f64> = (0..h_n).map(|j| dy * p[l.v() + j]).collect();
        let mut dc = vec![0.0; h_n];
        let mut da = vec![0.0; l.gates()];

        for cache in caches.iter().rev() {
            for j in 0..h_n {
                let d_o = dh[j] * cache.tanh_c[j];
                dc[j] += dh[j] * cache.o[j] * (1.0 - cache.tanh_c[j] * cache.tanh_c[j]);
                let d_i = dc[j] * cache.g[j];
                let d_g = dc[j] * cache.i[j];
                let d_f = dc[j] * cache.c_prev[j];

                da[j] = d_i * cache.i[j] * (1.0 - cache.i[j]);
                da[h_n + j] = d_f * cache.f[j] * (1.0 - cache.f[j]);
                da[2 * h_n + j] = d_g * (1.0 - cache.g[j] * cache.g[j]);
                da[3 * h_n + j] = d_o * cache.o[j] * (1.0 - cache.o[j]);

                dc[j] *= cache.f[j];
            }

            let mut dh_prev = vec![0.0; h_n];
            for (r, &da_r) in da.iter().enumerate() {
                grads[l.w() + r] += da_r * cache.x;
                grads[l.b() + r] += da_r;
                for j in 0..h_n {
                    grads[l.u() + r * h_n + j] += da_r * cache.h_prev[j];
                    dh_prev[j] += p[l.u() + r * h_n + j] * da_r;
                }
            }
            dh = dh_prev;
        }

        (err * err, grads)
    }
}

impl SequenceRegressor for LstmRegressor {
    fn name(&self) -> &str {
        "lstm"
    }

    fn fit(&mut self, windows: &[Window]) -> Result<()> {
        let look_back = windows
            .first()
            .map(|w| w.inputs.len())
            .ok_or(PipelineError::InsufficientData { needed: 0, got: 0 })?;
        if windows.iter().any(|w| w.inputs.len() != look_back) {
            return Err(PipelineError::InvalidConfig(
                "windows must share one look-back length".into(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(1));
        let mut adam = Adam::new(self.params.len(), self.config.learning_rate);
        let mut order: Vec<usize> = (0..windows.len()).collect();
        self.epoch_losses.clear();

        for epoch in 0..self.config.epochs {
            if self.config.shuffle {
                order.shuffle(&mut rng);
            }
            let mut total = 0.0;
            for &idx in &order {
                let window = &windows[idx];
                let (loss, grads) = self.loss_and_gradient(&window.inputs, window.target);
                if !loss.is_finite() || grads.iter().any(|g| !g.is_finite()) {
                    return Err(PipelineError::FitFailure(format!(
                        "LSTM training diverged at epoch {}",
                        epoch
                    )));
                }
                adam.step(&mut self.params, &grads);
                total += loss;
            }
            let mean_loss = total / windows.len() as f64;
            debug!(epoch, loss = mean_loss, "LSTM epoch finished");
            self.epoch_losses.push(mean_loss);
        }

        self.look_back = Some(look_back);
        Ok(())
    }

    fn predict(&self, inputs: &[f64]) -> Result<f64> {
        let look_back = self.look_back.ok_or_else(|| {
            PipelineError::FitFailure("LSTM must be fitted before prediction".into())
        })?;
        if inputs.len() != look_back {
            return Err(PipelineError::InvalidConfig(format!(
                "expected {} inputs, got {}",
                look_back,
                inputs.len()
            )));
        }
        Ok(self.forward(inputs).0)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Glorot-uniform weights, zero biases except a unit forget-gate bias
fn init_params(layout: Layout, rng: &mut impl Rng) -> Vec<f64> {
    let h = layout.hidden;
    let gates = layout.gates();
    let mut params = vec![0.0; layout.len()];

    let w_limit = (6.0 / (1 + gates) as f64).sqrt();
    for p in &mut params[layout.w()..layout.u()] {
        *p = rng.gen_range(-w_limit..w_limit);
    }
    let u_limit = (6.0 / (h + gates) as f64).sqrt();
    for p in &mut params[layout.u()..layout.b()] {
        *p = rng.gen_range(-u_limit..u_limit);
    }
    for p in &mut params[layout.b() + h..layout.b() + 2 * h] {
        *p = 1.0;
    }
    let v_limit = (6.0 / (h + 1) as f64).sqrt();
    for p in &mut params[layout.v()..layout.d()] {
        *p = rng.gen_range(-v_limit..v_limit);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::make_windows;

    fn scaled_wave(len: usize) -> Vec<f64> {
        (0..len)
            .map(|t| 0.5 + 0.4 * (t as f64 * 0.35).sin())
            .collect()
    }

    #[test]
    fn test_parameter_count() {
        let model = LstmRegressor::new(LstmConfig::default()).unwrap();
        // 4H input weights + 4H*H recurrent + 4H bias + H dense + 1
        assert_eq!(model.num_parameters(), 16 + 64 + 16 + 4 + 1);
    }

    #[test]
    fn test_look_back_is_unrolled_over_time() {
        let mut model = LstmRegressor::new(LstmConfig {
            epochs: 1,
            ..Default::default()
        })
        .unwrap();
        let before = model.num_parameters();
        let windows = make_windows(&scaled_wave(12), 3).unwrap();
        model.fit(&windows).unwrap();
        assert_eq!(model.num_parameters(), before);

        let (_, caches, _) = model.forward(&windows[0].inputs);
        assert_eq!(caches.len(), 3);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let config = LstmConfig {
            hidden_units: 3,
            ..LstmConfig::default()
        };
        let mut model = LstmRegressor::new(config).unwrap();
        let xs = [0.2, 0.7, 0.4];
        let target = 0.9;
        let (_, grads) = model.loss_and_gradient(&xs, target);

        let eps = 1e-6;
        for k in 0..model.params.len() {
            let original = model.params[k];
            model.params[k] = original + eps;
            let (up, _) = model.loss_and_gradient(&xs, target);
            model.params[k] = original - eps;
            let (down, _) = model.loss_and_gradient(&xs, target);
            model.params[k] = original;

            let numeric = (up - down) / (2.0 * eps);
            let tolerance = 1e-6 + 1e-4 * numeric.abs().max(grads[k].abs());
            assert!(
                (numeric - grads[k]).abs() < tolerance,
                "param {}: analytic {} vs numeric {}",
                k,
                grads[k],
                numeric
            );
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        let windows = make_windows(&scaled_wave(80), 3).unwrap();
        let mut model = LstmRegressor::new(LstmConfig {
            epochs: 30,
            learning_rate: 0.01,
            ..LstmConfig::default()
        })
        .unwrap();
        model.fit(&windows).unwrap();

        let losses = model.epoch_losses();
        assert_eq!(losses.len(), 30);
        assert!(losses[29] < losses[0], "losses: {:?}", losses);
        assert!(model.predict(&[0.5, 0.6, 0.7]).unwrap().is_finite());
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let windows = make_windows(&scaled_wave(30), 1).unwrap();
        let train = || {
            let mut m = LstmRegressor::new(LstmConfig::default()).unwrap();
            m.fit(&windows).unwrap();
            m.predict(&[0.3]).unwrap()
        };
        assert_eq!(train(), train());
    }

    #[test]
    fn test_predict_requires_fit_and_matching_length() {
        let mut model = LstmRegressor::new(LstmConfig::default()).unwrap();
        assert!(matches!(
            model.predict(&[0.1]),
            Err(PipelineError::FitFailure(_))
        ));
        let windows = make_windows(&scaled_wave(10), 2).unwrap();
        model.fit(&windows).unwrap();
        assert!(model.predict(&[0.1]).is_err());
        assert!(model.predict(&[0.1, 0.2]).is_ok());
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(LstmRegressor::new(LstmConfig {
            hidden_units: 0,
            ..LstmConfig::default()
        })
        .is_err());
        assert!(LstmRegressor::new(LstmConfig {
            learning_rate: 0.0,
            ..LstmConfig::default()
        })
        .is_err());
    }
}
