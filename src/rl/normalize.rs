// Running observation and reward normalization
//
// Keeps running mean/variance estimates of observations and of the
// discounted return, and rescales both before they reach the learner.

use serde::{Deserialize, Serialize};

/// Running mean and variance (parallel Welford update)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunningMeanStd {
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
    pub count: f64,
}

impl RunningMeanStd {
    pub fn new(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            var: vec![1.0; dim],
            // Small prior count keeps the first update from dividing by zero
            count: 1e-4,
        }
    }

    /// Check that both moment vectors have `dim` entries
    pub fn check_dim(&self, dim: usize) -> Result<(), String> {
        if self.mean.len() != dim || self.var.len() != dim {
            return Err(format!(
                "running statistics sized {}/{} for {} features",
                self.mean.len(),
                self.var.len(),
                dim
            ));
        }
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Fold a batch of samples into the running estimate
    pub fn update(&mut self, batch: &[Vec<f64>]) {
        if batch.is_empty() {
            return;
        }
        let n = batch.len() as f64;
        let dim = self.dim();

        let mut batch_mean = vec![0.0; dim];
        for x in batch {
            for (m, v) in batch_mean.iter_mut().zip(x) {
                *m += v / n;
            }
        }
        let mut batch_var = vec![0.0; dim];
        for x in batch {
            for ((bv, bm), v) in batch_var.iter_mut().zip(&batch_mean).zip(x) {
                *bv += (v - bm).powi(2) / n;
            }
        }

        let total = self.count + n;
        for i in 0..dim {
            let delta = batch_mean[i] - self.mean[i];
            let m_a = self.var[i] * self.count;
            let m_b = batch_var[i] * n;
            let m2 = m_a + m_b + delta * delta * self.count * n / total;
            self.mean[i] += delta * n / total;
            self.var[i] = m2 / total;
        }
        self.count = total;
    }

    pub fn update_one(&mut self, x: &[f64]) {
        self.update(&[x.to_vec()]);
    }
}

/// Normalization settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizeConfig {
    pub norm_obs: bool,
    pub norm_reward: bool,
    /// Normalized observations are clipped to ±clip_obs
    pub clip_obs: f64,
    /// Normalized rewards are clipped to ±clip_reward
    pub clip_reward: f64,
    pub gamma: f64,
    pub epsilon: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            norm_obs: true,
            norm_reward: true,
            clip_obs: 10.0,
            clip_reward: 10.0,
            gamma: 0.99,
            epsilon: 1e-8,
        }
    }
}

/// Observation/reward normalizer wrapped around an environment during training
///
/// Statistics are only updated while training; prediction reads them frozen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Normalizer {
    pub cfg: NormalizeConfig,
    pub obs_rms: RunningMeanStd,
    pub ret_rms: RunningMeanStd,
    #[serde(skip)]
    discounted_return: f64,
}

impl Normalizer {
    pub fn new(obs_dim: usize, cfg: NormalizeConfig) -> Self {
        Self {
            cfg,
            obs_rms: RunningMeanStd::new(obs_dim),
            ret_rms: RunningMeanStd::new(1),
            discounted_return: 0.0,
        }
    }

    /// Normalize an observation with the current statistics
    pub fn normalize_obs(&self, obs: &[f64]) -> Vec<f64> {
        if !self.cfg.norm_obs {
            return obs.to_vec();
        }
        obs.iter()
            .zip(self.obs_rms.mean.iter().zip(&self.obs_rms.var))
            .map(|(&x, (&m, &v))| {
                ((x - m) / (v + self.cfg.epsilon).sqrt()).clamp(-self.cfg.clip_obs, self.cfg.clip_obs)
            })
            .collect()
    }

    /// Record a raw observation seen during training
    pub fn observe(&mut self, obs: &[f64]) {
        if self.cfg.norm_obs {
            self.obs_rms.update_one(obs);
        }
    }

    /// Scale a raw reward by the running std of the discounted return
    pub fn normalize_reward(&mut self, reward: f64, done: bool) -> f64 {
        if !self.cfg.norm_reward {
            return reward;
        }
        self.discounted_return = self.discounted_return * self.cfg.gamma + reward;
        self.ret_rms.update_one(&[self.discounted_return]);
        if done {
            self.discounted_return = 0.0;
        }
        let std = (self.ret_rms.var[0] + self.cfg.epsilon).sqrt();
        (reward / std).clamp(-self.cfg.clip_reward, self.cfg.clip_reward)
    }

    pub fn reset_return(&mut self) {
        self.discounted_return = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean_std_matches_batch() {
        let data: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let mut rms = RunningMeanStd::new(2);
        for chunk in data.chunks(7) {
            rms.update(chunk);
        }

        assert!((rms.mean[0] - 49.5).abs() < 1e-3);
        assert!((rms.mean[1] - 99.0).abs() < 1e-3);
        // Population variance of 0..100 is 833.25
        assert!((rms.var[0] - 833.25).abs() < 0.5);
        assert!((rms.var[1] - 4.0 * 833.25).abs() < 2.0);
    }

    #[test]
    fn test_obs_clipping() {
        let mut norm = Normalizer::new(1, NormalizeConfig::default());
        for _ in 0..50 {
            norm.observe(&[0.0]);
            norm.observe(&[1.0]);
        }
        let z = norm.normalize_obs(&[1000.0]);
        assert_eq!(z[0], 10.0);
        let mid = norm.normalize_obs(&[0.5]);
        assert!(mid[0].abs() < 0.05);
    }

    #[test]
    fn test_disabled_normalization_passes_through() {
        let cfg = NormalizeConfig {
            norm_obs: false,
            norm_reward: false,
            ..NormalizeConfig::default()
        };
        let mut norm = Normalizer::new(2, cfg);
        norm.observe(&[5.0, 6.0]);
        assert_eq!(norm.normalize_obs(&[5.0, 6.0]), vec![5.0, 6.0]);
        assert_eq!(norm.normalize_reward(-42.0, false), -42.0);
    }

    #[test]
    fn test_reward_scaling_shrinks_large_rewards() {
        let mut norm = Normalizer::new(1, NormalizeConfig::default());
        let mut last = 0.0;
        for i in 0..200 {
            last = norm.normalize_reward(-300.0, i % 10 == 9);
        }
        assert!(last < 0.0);
        assert!(last.abs() < 10.0);
    }
}
