// Small dense networks with hand-written backpropagation
//
// One tanh hidden layer and a linear output, parameters kept in a single
// flat vector so the optimizer and gradient clipping see one buffer.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Single-hidden-layer perceptron: `y = W2 · tanh(W1 · x + b1) + b2`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mlp {
    pub in_dim: usize,
    pub hidden: usize,
    pub out_dim: usize,
    pub params: Vec<f64>,
}

/// Activations kept from a forward pass for the backward pass
#[derive(Debug, Clone)]
pub struct MlpTrace {
    pub hidden: Vec<f64>,
    pub output: Vec<f64>,
}

impl Mlp {
    /// Initialize with scaled uniform weights; `out_gain` scales the output layer
    pub fn new(
        in_dim: usize,
        hidden: usize,
        out_dim: usize,
        out_gain: f64,
        rng: &mut impl Rng,
    ) -> Self {
        let n_params = Self::param_count(in_dim, hidden, out_dim);
        let mut params = vec![0.0; n_params];

        let bound_1 = (6.0 / (in_dim + hidden) as f64).sqrt();
        for w in &mut params[..hidden * in_dim] {
            *w = rng.gen_range(-bound_1..bound_1);
        }

        let w2_start = hidden * in_dim + hidden;
        let bound_2 = out_gain * (6.0 / (hidden + out_dim) as f64).sqrt();
        for w in &mut params[w2_start..w2_start + out_dim * hidden] {
            *w = rng.gen_range(-bound_2..=bound_2);
        }

        Self {
            in_dim,
            hidden,
            out_dim,
            params,
        }
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// Length of the flat parameter vector for the given layer sizes
    pub fn param_count(in_dim: usize, hidden: usize, out_dim: usize) -> usize {
        hidden * in_dim + hidden + out_dim * hidden + out_dim
    }

    /// Check that the parameter vector matches the layer sizes
    pub fn check_shape(&self) -> Result<(), String> {
        if self.in_dim == 0 || self.hidden == 0 || self.out_dim == 0 {
            return Err(format!(
                "layer sizes must be > 0, got {}x{}x{}",
                self.in_dim, self.hidden, self.out_dim
            ));
        }
        let expected = Self::param_count(self.in_dim, self.hidden, self.out_dim);
        if self.params.len() != expected {
            return Err(format!(
                "{}x{}x{} network needs {} parameters, found {}",
                self.in_dim,
                self.hidden,
                self.out_dim,
                expected,
                self.params.len()
            ));
        }
        Ok(())
    }

    fn w1(&self, h: usize, i: usize) -> f64 {
        self.params[h * self.in_dim + i]
    }

    fn b1_offset(&self) -> usize {
        self.hidden * self.in_dim
    }

    fn w2_offset(&self) -> usize {
        self.b1_offset() + self.hidden
    }

    fn b2_offset(&self) -> usize {
        self.w2_offset() + self.out_dim * self.hidden
    }

    pub fn forward_trace(&self, x: &[f64]) -> MlpTrace {
        debug_assert_eq!(x.len(), self.in_dim);
        let b1 = self.b1_offset();
        let hidden: Vec<f64> = (0..self.hidden)
            .map(|h| {
                let pre = self.params[b1 + h]
                    + x.iter().enumerate().map(|(i, &xi)| self.w1(h, i) * xi).sum::<f64>();
                pre.tanh()
            })
            .collect();

        let w2 = self.w2_offset();
        let b2 = self.b2_offset();
        let output = (0..self.out_dim)
            .map(|o| {
                self.params[b2 + o]
                    + hidden
                        .iter()
                        .enumerate()
                        .map(|(h, &a)| self.params[w2 + o * self.hidden + h] * a)
                        .sum::<f64>()
            })
            .collect();

        MlpTrace { hidden, output }
    }

    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.forward_trace(x).output
    }

    /// Accumulate `d loss / d params` into `grad` given `d loss / d output`
    pub fn backward(&self, x: &[f64], trace: &MlpTrace, d_out: &[f64], grad: &mut [f64]) {
        debug_assert_eq!(grad.len(), self.params.len());
        let b1 = self.b1_offset();
        let w2 = self.w2_offset();
        let b2 = self.b2_offset();

        let mut d_hidden = vec![0.0; self.hidden];
        for (o, &g) in d_out.iter().enumerate() {
            grad[b2 + o] += g;
            for h in 0..self.hidden {
                grad[w2 + o * self.hidden + h] += g * trace.hidden[h];
                d_hidden[h] += g * self.params[w2 + o * self.hidden + h];
            }
        }

        for h in 0..self.hidden {
            let d_pre = d_hidden[h] * (1.0 - trace.hidden[h] * trace.hidden[h]);
            grad[b1 + h] += d_pre;
            for (i, &xi) in x.iter().enumerate() {
                grad[h * self.in_dim + i] += d_pre * xi;
            }
        }
    }
}

/// Adam optimizer over a flat parameter buffer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Adam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    t: u64,
}

impl Adam {
    pub fn new(n_params: usize, lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            m: vec![0.0; n_params],
            v: vec![0.0; n_params],
            t: 0,
        }
    }

    /// Check that the moment buffers cover `n_params` parameters
    pub fn check_len(&self, n_params: usize) -> Result<(), String> {
        if self.m.len() != n_params || self.v.len() != n_params {
            return Err(format!(
                "optimizer state sized {}/{} for {} parameters",
                self.m.len(),
                self.v.len(),
                n_params
            ));
        }
        Ok(())
    }

    /// Apply one descent step
    pub fn step(&mut self, params: &mut [f64], grad: &[f64]) {
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t as i32);
        let bc2 = 1.0 - self.beta2.powi(self.t as i32);
        for i in 0..params.len() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * grad[i];
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * grad[i] * grad[i];
            let m_hat = self.m[i] / bc1;
            let v_hat = self.v[i] / bc2;
            params[i] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

/// Scale gradient buffers so their joint L2 norm is at most `max_norm`
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut [&mut [f64]], max_norm: f64) -> f64 {
    let norm = grads
        .iter()
        .flat_map(|g| g.iter())
        .map(|x| x * x)
        .sum::<f64>()
        .sqrt();
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for g in grads.iter_mut() {
            for x in g.iter_mut() {
                *x *= scale;
            }
        }
    }
    norm
}
