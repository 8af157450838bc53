// Proximal Policy Optimization for continuous dosing actions
//
// Gaussian policy whose mean comes from a tanh MLP working in the unit
// action box [-1, 1]^n, a state-independent learnable log-std, and a tanh
// MLP critic. Rollouts are collected on-policy, advantages estimated with
// GAE(lambda), and the clipped surrogate is optimized with Adam over shuffled
// mini-batches.

use crate::rl::core::{ActionSpace, RLEnv, State};
use crate::rl::dosing::DoseAction;
use crate::rl::mlp::{clip_grad_norm, Adam, Mlp};
use crate::rl::normalize::{NormalizeConfig, Normalizer};
use crate::rl::policy::{Policy, PolicyError, TrainReport};
use crate::rl::train::{evaluate_policy, EvalHook};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

/// PPO hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PpoConfig {
    pub learning_rate: f64,
    /// Environment steps collected per update
    pub n_steps: usize,
    pub batch_size: usize,
    pub n_epochs: usize,
    /// Discount factor
    pub gamma: f64,
    pub gae_lambda: f64,
    /// Clip range of the probability ratio
    pub clip_range: f64,
    /// Entropy bonus coefficient
    pub ent_coef: f64,
    /// Value loss coefficient
    pub vf_coef: f64,
    pub max_grad_norm: f64,
    pub hidden_size: usize,
    pub log_std_init: f64,
    pub normalize: NormalizeConfig,
    pub seed: Option<u64>,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-5,
            n_steps: 2048,
            batch_size: 128,
            n_epochs: 10,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            ent_coef: 0.0,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            hidden_size: 64,
            log_std_init: 0.0,
            normalize: NormalizeConfig::default(),
            seed: None,
        }
    }
}

impl PpoConfig {
    /// Small, fast configuration for quick experiments and tests
    pub fn default_quick() -> Self {
        Self {
            learning_rate: 3e-4,
            n_steps: 256,
            batch_size: 64,
            n_epochs: 4,
            hidden_size: 16,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.learning_rate <= 0.0 {
            return Err("learning_rate must be > 0".to_string());
        }
        if self.n_steps == 0 {
            return Err("n_steps must be > 0".to_string());
        }
        if self.batch_size == 0 || self.batch_size > self.n_steps {
            return Err("batch_size must be in [1, n_steps]".to_string());
        }
        if self.n_epochs == 0 {
            return Err("n_epochs must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err("gamma must be in [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err("gae_lambda must be in [0, 1]".to_string());
        }
        if self.clip_range <= 0.0 || self.clip_range >= 1.0 {
            return Err("clip_range must be in (0, 1)".to_string());
        }
        if self.hidden_size == 0 {
            return Err("hidden_size must be > 0".to_string());
        }
        if self.max_grad_norm <= 0.0 {
            return Err("max_grad_norm must be > 0".to_string());
        }
        Ok(())
    }
}

/// One collected transition
#[derive(Debug, Clone)]
struct Transition {
    /// Normalized observation the action was sampled for
    obs: Vec<f64>,
    /// Unclipped Gaussian sample in unit action space
    action: Vec<f64>,
    log_prob: f64,
    value: f64,
    /// Normalized reward
    reward: f64,
    done: bool,
}

/// Loss statistics of one update
#[derive(Debug, Clone, Copy, Default)]
struct UpdateStats {
    policy_loss: f64,
    value_loss: f64,
    entropy: f64,
    approx_kl: f64,
    clip_fraction: f64,
}

fn entropy_rng() -> ChaCha20Rng {
    ChaCha20Rng::from_entropy()
}

/// Box-Muller transform for a standard normal draw
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1 = rng.gen::<f64>().max(1e-10);
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Log density of a diagonal Gaussian
fn gaussian_log_prob(action: &[f64], mean: &[f64], log_std: &[f64]) -> f64 {
    action
        .iter()
        .zip(mean)
        .zip(log_std)
        .map(|((&a, &m), &ls)| {
            let z = (a - m) / ls.exp();
            -0.5 * z * z - ls - 0.5 * (2.0 * PI).ln()
        })
        .sum()
}

fn gaussian_entropy(log_std: &[f64]) -> f64 {
    log_std
        .iter()
        .map(|ls| ls + 0.5 * (1.0 + (2.0 * PI).ln()))
        .sum()
}

/// GAE(lambda) advantages and value targets
fn compute_gae(
    buffer: &[Transition],
    last_value: f64,
    gamma: f64,
    lambda: f64,
) -> (Vec<f64>, Vec<f64>) {
    let n = buffer.len();
    let mut advantages = vec![0.0; n];
    let mut gae = 0.0;

    for t in (0..n).rev() {
        let next_non_terminal = if buffer[t].done { 0.0 } else { 1.0 };
        let next_value = if t + 1 == n {
            last_value
        } else {
            buffer[t + 1].value
        };
        let delta = buffer[t].reward + gamma * next_value * next_non_terminal - buffer[t].value;
        gae = delta + gamma * lambda * next_non_terminal * gae;
        advantages[t] = gae;
    }

    let returns = advantages
        .iter()
        .zip(buffer)
        .map(|(a, tr)| a + tr.value)
        .collect();
    (advantages, returns)
}

/// PPO agent with an MLP Gaussian policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpoPolicy {
    cfg: PpoConfig,
    obs_dim: usize,
    action_space: ActionSpace,
    actor: Mlp,
    log_std: Vec<f64>,
    critic: Mlp,
    actor_opt: Adam,
    log_std_opt: Adam,
    critic_opt: Adam,
    normalizer: Normalizer,
    num_timesteps: u64,
    #[serde(skip, default = "entropy_rng")]
    rng: ChaCha20Rng,
    /// Raw observation to continue the rollout from on a resumed `learn`
    #[serde(skip)]
    last_obs: Option<Vec<f64>>,
}

impl PpoPolicy {
    /// Create a freshly initialized policy for the given spaces
    pub fn new(obs_dim: usize, action_space: ActionSpace, cfg: PpoConfig) -> anyhow::Result<Self> {
        cfg.validate()
            .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;
        if action_space.dim() != 2 {
            anyhow::bail!(
                "dose policy needs a 2-dimensional action space, got {}",
                action_space.dim()
            );
        }

        let mut rng = match cfg.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        let act_dim = action_space.dim();
        let actor = Mlp::new(obs_dim, cfg.hidden_size, act_dim, 0.01, &mut rng);
        let critic = Mlp::new(obs_dim, cfg.hidden_size, 1, 1.0, &mut rng);

        Ok(Self {
            actor_opt: Adam::new(actor.num_params(), cfg.learning_rate),
            log_std_opt: Adam::new(act_dim, cfg.learning_rate),
            critic_opt: Adam::new(critic.num_params(), cfg.learning_rate),
            normalizer: Normalizer::new(obs_dim, cfg.normalize.clone()),
            log_std: vec![cfg.log_std_init; act_dim],
            obs_dim,
            action_space,
            actor,
            critic,
            cfg,
            num_timesteps: 0,
            rng,
            last_obs: None,
        })
    }

    /// Create a policy shaped for `env`
    pub fn for_env<E: RLEnv>(env: &E, cfg: PpoConfig) -> anyhow::Result<Self> {
        Self::new(env.state_dim(), env.action_space(), cfg)
    }

    pub fn config(&self) -> &PpoConfig {
        &self.cfg
    }

    pub fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    /// Current exploration standard deviation per action dimension
    pub fn action_std(&self) -> Vec<f64> {
        self.log_std.iter().map(|ls| ls.exp()).collect()
    }

    /// Reseed the sampling RNG (restored policies start from entropy)
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha20Rng::seed_from_u64(seed);
    }

    /// Consistency of every stored buffer with the stored spaces
    fn check_shapes(&self) -> Result<(), String> {
        let space = &self.action_space;
        if space.low.len() != 2 || space.high.len() != 2 {
            return Err(format!(
                "action bounds sized {}/{}, dose policy needs 2",
                space.low.len(),
                space.high.len()
            ));
        }
        if space
            .low
            .iter()
            .zip(&space.high)
            .any(|(lo, hi)| !lo.is_finite() || !hi.is_finite() || lo >= hi)
        {
            return Err("action bounds must be finite with low < high".to_string());
        }
        let act_dim = space.dim();

        self.actor.check_shape().map_err(|e| format!("actor: {}", e))?;
        self.critic.check_shape().map_err(|e| format!("critic: {}", e))?;
        if self.actor.in_dim != self.obs_dim || self.actor.out_dim != act_dim {
            return Err(format!(
                "actor maps {} -> {}, expected {} -> {}",
                self.actor.in_dim, self.actor.out_dim, self.obs_dim, act_dim
            ));
        }
        if self.critic.in_dim != self.obs_dim || self.critic.out_dim != 1 {
            return Err(format!(
                "critic maps {} -> {}, expected {} -> 1",
                self.critic.in_dim, self.critic.out_dim, self.obs_dim
            ));
        }
        if self.log_std.len() != act_dim {
            return Err(format!(
                "log_std has {} entries, expected {}",
                self.log_std.len(),
                act_dim
            ));
        }

        self.actor_opt
            .check_len(self.actor.num_params())
            .map_err(|e| format!("actor optimizer: {}", e))?;
        self.critic_opt
            .check_len(self.critic.num_params())
            .map_err(|e| format!("critic optimizer: {}", e))?;
        self.log_std_opt
            .check_len(act_dim)
            .map_err(|e| format!("log_std optimizer: {}", e))?;

        self.normalizer
            .obs_rms
            .check_dim(self.obs_dim)
            .map_err(|e| format!("observation normalizer: {}", e))?;
        self.normalizer
            .ret_rms
            .check_dim(1)
            .map_err(|e| format!("return normalizer: {}", e))?;
        Ok(())
    }

    fn check_obs(&self, obs: &[f64]) -> Result<(), PolicyError> {
        if obs.len() != self.obs_dim {
            return Err(PolicyError::Incompatible(format!(
                "expected {} observation features, got {}",
                self.obs_dim,
                obs.len()
            )));
        }
        Ok(())
    }

    /// Sample a unit-space action; returns (action, log_prob, value)
    fn sample(&mut self, norm_obs: &[f64]) -> (Vec<f64>, f64, f64) {
        let mean = self.actor.forward(norm_obs);
        let action: Vec<f64> = mean
            .iter()
            .zip(&self.log_std)
            .map(|(&m, &ls)| m + ls.exp() * standard_normal(&mut self.rng))
            .collect();
        let log_prob = gaussian_log_prob(&action, &mean, &self.log_std);
        let value = self.critic.forward(norm_obs)[0];
        (action, log_prob, value)
    }

    /// Train with an optional periodic evaluation hook
    ///
    /// When a hook is given, the deterministic policy is evaluated every
    /// `eval_freq` timesteps and the best one is saved to the hook's
    /// checkpoint path.
    pub fn learn_with_eval<E: RLEnv>(
        &mut self,
        env: &mut E,
        total_steps: u64,
        resume: bool,
        mut eval: Option<EvalHook<'_>>,
    ) -> anyhow::Result<TrainReport> {
        if env.state_dim() != self.obs_dim || env.action_space() != self.action_space {
            return Err(PolicyError::Incompatible(format!(
                "policy built for {} features and {:?}, environment {} has {} features and {:?}",
                self.obs_dim,
                self.action_space,
                env.name(),
                env.state_dim(),
                env.action_space()
            ))
            .into());
        }

        if !resume {
            self.num_timesteps = 0;
            self.last_obs = None;
        }
        let start = self.num_timesteps;
        let stop = start + total_steps;

        let mut obs = match self.last_obs.take() {
            Some(obs) => obs,
            None => {
                self.normalizer.reset_return();
                env.reset()?.features
            }
        };

        let mut report = TrainReport::default();
        let mut episode_return = 0.0;
        let mut finished_returns = Vec::new();

        while self.num_timesteps < stop {
            let mut buffer = Vec::with_capacity(self.cfg.n_steps);

            for _ in 0..self.cfg.n_steps {
                self.normalizer.observe(&obs);
                let norm_obs = self.normalizer.normalize_obs(&obs);
                let (action, log_prob, value) = self.sample(&norm_obs);

                let env_action = self.action_space.scale_from_unit(&action);
                let result = env.step(&env_action)?;

                episode_return += result.reward;
                let reward = self.normalizer.normalize_reward(result.reward, result.done);
                self.num_timesteps += 1;

                buffer.push(Transition {
                    obs: norm_obs,
                    action,
                    log_prob,
                    value,
                    reward,
                    done: result.done,
                });

                obs = if result.done {
                    finished_returns.push(episode_return);
                    episode_return = 0.0;
                    env.reset()?.features
                } else {
                    result.next_state.features
                };

                if let Some(hook) = eval.as_mut() {
                    if hook.cfg.eval_freq > 0 && self.num_timesteps % hook.cfg.eval_freq == 0 {
                        self.run_eval(hook, &mut report)?;
                    }
                }
            }

            let last_value = self.critic.forward(&self.normalizer.normalize_obs(&obs))[0];
            let (advantages, returns) =
                compute_gae(&buffer, last_value, self.cfg.gamma, self.cfg.gae_lambda);
            let stats = self.update(&buffer, &advantages, &returns);
            report.n_updates += 1;

            report.policy_loss = stats.policy_loss;
            report.value_loss = stats.value_loss;
            report.entropy = stats.entropy;
            report.approx_kl = stats.approx_kl;
            report.clip_fraction = stats.clip_fraction;

            let recent = &finished_returns[finished_returns.len().saturating_sub(100)..];
            let mean_return = if recent.is_empty() {
                f64::NAN
            } else {
                recent.iter().sum::<f64>() / recent.len() as f64
            };
            tracing::info!(
                timesteps = self.num_timesteps,
                episodes = finished_returns.len(),
                ep_return_mean = mean_return,
                policy_loss = stats.policy_loss,
                value_loss = stats.value_loss,
                approx_kl = stats.approx_kl,
                clip_fraction = stats.clip_fraction,
                std = ?self.action_std(),
                "ppo update"
            );
        }

        self.last_obs = Some(obs);

        report.steps = self.num_timesteps - start;
        report.total_timesteps = self.num_timesteps;
        report.episodes_completed = finished_returns.len();
        if !finished_returns.is_empty() {
            report.mean_episode_return =
                Some(finished_returns.iter().sum::<f64>() / finished_returns.len() as f64);
        }
        Ok(report)
    }

    fn run_eval(&self, hook: &mut EvalHook<'_>, report: &mut TrainReport) -> anyhow::Result<()> {
        let eval = evaluate_policy(&mut *hook.env, self, hook.cfg.n_eval_episodes)?;
        tracing::info!(
            timesteps = self.num_timesteps,
            avg_return = eval.avg_return,
            std_return = eval.std_return,
            "evaluation"
        );

        let improved = report
            .best_eval_return
            .map_or(true, |best| eval.avg_return > best);
        if improved {
            report.best_eval_return = Some(eval.avg_return);
            if let Some(path) = &hook.cfg.best_model_path {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                self.save(path)?;
                tracing::info!(path = %path.display(), "new best policy saved");
            }
        }
        Ok(())
    }

    /// Several epochs of clipped-surrogate updates over the rollout
    fn update(
        &mut self,
        buffer: &[Transition],
        advantages: &[f64],
        returns: &[f64],
    ) -> UpdateStats {
        let clip = self.cfg.clip_range;
        let act_dim = self.log_std.len();
        let mut indices: Vec<usize> = (0..buffer.len()).collect();

        let mut stats = UpdateStats::default();
        let mut n_batches = 0usize;

        for _epoch in 0..self.cfg.n_epochs {
            indices.shuffle(&mut self.rng);

            for batch in indices.chunks(self.cfg.batch_size) {
                let n = batch.len() as f64;

                // Per-batch advantage normalization
                let adv_mean = batch.iter().map(|&i| advantages[i]).sum::<f64>() / n;
                let adv_std = if batch.len() > 1 {
                    (batch
                        .iter()
                        .map(|&i| (advantages[i] - adv_mean).powi(2))
                        .sum::<f64>()
                        / n)
                        .sqrt()
                } else {
                    1.0
                };

                let mut g_actor = vec![0.0; self.actor.num_params()];
                let mut g_log_std = vec![0.0; act_dim];
                let mut g_critic = vec![0.0; self.critic.num_params()];

                let mut policy_loss = 0.0;
                let mut value_loss = 0.0;
                let mut approx_kl = 0.0;
                let mut clipped = 0usize;

                let std: Vec<f64> = self.log_std.iter().map(|ls| ls.exp()).collect();

                for &i in batch {
                    let tr = &buffer[i];
                    let adv = if batch.len() > 1 {
                        (advantages[i] - adv_mean) / (adv_std + 1e-8)
                    } else {
                        advantages[i]
                    };

                    let trace = self.actor.forward_trace(&tr.obs);
                    let mean = &trace.output;
                    let log_prob = gaussian_log_prob(&tr.action, mean, &self.log_std);
                    let log_ratio = log_prob - tr.log_prob;
                    let ratio = log_ratio.exp();

                    let surr1 = ratio * adv;
                    let surr2 = ratio.clamp(1.0 - clip, 1.0 + clip) * adv;
                    policy_loss -= surr1.min(surr2) / n;
                    approx_kl += ((ratio - 1.0) - log_ratio) / n;
                    if (ratio - 1.0).abs() > clip {
                        clipped += 1;
                    }

                    // The clipped branch is constant in the parameters
                    let d_log_prob = if surr1 <= surr2 { -adv * ratio / n } else { 0.0 };

                    let mut d_mean = vec![0.0; act_dim];
                    for d in 0..act_dim {
                        let z = (tr.action[d] - mean[d]) / std[d];
                        d_mean[d] = d_log_prob * z / std[d];
                        g_log_std[d] += d_log_prob * (z * z - 1.0);
                    }
                    self.actor.backward(&tr.obs, &trace, &d_mean, &mut g_actor);

                    let c_trace = self.critic.forward_trace(&tr.obs);
                    let v = c_trace.output[0];
                    value_loss += (returns[i] - v).powi(2) / n;
                    let d_v = self.cfg.vf_coef * 2.0 * (v - returns[i]) / n;
                    self.critic.backward(&tr.obs, &c_trace, &[d_v], &mut g_critic);
                }

                // Entropy bonus: d(-ent_coef * H) / d log_std = -ent_coef
                for g in g_log_std.iter_mut() {
                    *g -= self.cfg.ent_coef;
                }

                clip_grad_norm(
                    &mut [&mut g_actor[..], &mut g_log_std[..], &mut g_critic[..]],
                    self.cfg.max_grad_norm,
                );
                self.actor_opt.step(&mut self.actor.params, &g_actor);
                self.log_std_opt.step(&mut self.log_std, &g_log_std);
                self.critic_opt.step(&mut self.critic.params, &g_critic);

                stats.policy_loss += policy_loss;
                stats.value_loss += value_loss;
                stats.approx_kl += approx_kl;
                stats.clip_fraction += clipped as f64 / n;
                n_batches += 1;
            }
        }

        let nb = n_batches.max(1) as f64;
        UpdateStats {
            policy_loss: stats.policy_loss / nb,
            value_loss: stats.value_loss / nb,
            entropy: gaussian_entropy(&self.log_std),
            approx_kl: stats.approx_kl / nb,
            clip_fraction: stats.clip_fraction / nb,
        }
    }
}

impl Policy for PpoPolicy {
    fn predict(&self, state: &State) -> Result<DoseAction, PolicyError> {
        self.check_obs(&state.features)?;
        let mean = self
            .actor
            .forward(&self.normalizer.normalize_obs(&state.features));
        let scaled = self.action_space.scale_from_unit(&mean);
        Ok(DoseAction::new(scaled[0], scaled[1]))
    }

    fn learn<E: RLEnv>(
        &mut self,
        env: &mut E,
        total_steps: u64,
        resume: bool,
    ) -> anyhow::Result<TrainReport> {
        self.learn_with_eval(env, total_steps, resume, None)
    }

    fn save(&self, path: &Path) -> Result<(), PolicyError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn load(path: &Path) -> Result<Self, PolicyError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PolicyError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let policy: PpoPolicy = serde_json::from_slice(&bytes)?;
        policy.check_shapes().map_err(PolicyError::Incompatible)?;
        Ok(policy)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::{StepInfo, StepResult};

    /// Reward peaks when both unit-space actions sit at 0.5
    struct BanditEnv {
        step: usize,
    }

    impl RLEnv for BanditEnv {
        fn state_dim(&self) -> usize {
            3
        }

        fn action_space(&self) -> ActionSpace {
            ActionSpace::new(vec![-1.0, -1.0], vec![1.0, 1.0])
        }

        fn reset(&mut self) -> anyhow::Result<State> {
            self.step = 0;
            Ok(State::new(vec![0.5, 0.5, 0.5]))
        }

        fn step(&mut self, action: &[f64]) -> anyhow::Result<StepResult> {
            self.step += 1;
            let reward = -((action[0] - 0.5).abs() + (action[1] - 0.5).abs());
            Ok(StepResult {
                next_state: State::new(vec![0.5, 0.5, 0.5]),
                reward,
                done: self.step >= 10,
                info: StepInfo::default(),
            })
        }
    }

    fn quick(seed: u64) -> PpoConfig {
        PpoConfig {
            seed: Some(seed),
            learning_rate: 3e-3,
            ..PpoConfig::default_quick()
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(PpoConfig::default().validate().is_ok());
        assert!(PpoConfig::default_quick().validate().is_ok());

        let bad = PpoConfig {
            batch_size: 4096,
            ..PpoConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = PpoConfig {
            clip_range: 0.0,
            ..PpoConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_gaussian_log_prob_standard() {
        let lp = gaussian_log_prob(&[0.0], &[0.0], &[0.0]);
        assert!((lp + 0.5 * (2.0 * PI).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_gae_terminal_cuts_bootstrap() {
        let tr = |reward: f64, value: f64, done: bool| Transition {
            obs: vec![],
            action: vec![],
            log_prob: 0.0,
            value,
            reward,
            done,
        };
        let buffer = vec![tr(1.0, 0.0, false), tr(1.0, 0.0, true)];
        let (adv, ret) = compute_gae(&buffer, 100.0, 1.0, 1.0);
        assert_eq!(adv, vec![2.0, 1.0]);
        assert_eq!(ret, vec![2.0, 1.0]);
    }

    #[test]
    fn test_predict_within_bounds() {
        let policy = PpoPolicy::new(3, DoseAction::space(), quick(1)).unwrap();
        let action = policy.predict(&State::new(vec![0.7, 0.3, 0.5])).unwrap();
        assert!(DoseAction::space().contains(&action.to_vec()));
        assert!(policy.predict(&State::new(vec![0.7])).is_err());
    }

    #[test]
    fn test_rejects_wrong_action_dim() {
        let space = ActionSpace::new(vec![0.0], vec![1.0]);
        assert!(PpoPolicy::new(3, space, quick(1)).is_err());
    }

    #[test]
    fn test_learn_counts_timesteps() {
        let mut env = BanditEnv { step: 0 };
        let mut policy = PpoPolicy::for_env(&env, quick(3)).unwrap();

        let report = policy.learn(&mut env, 300, false).unwrap();
        // Whole rollouts are collected: 2 x 256
        assert_eq!(report.total_timesteps, 512);
        assert_eq!(report.n_updates, 2);
        assert!(report.episodes_completed > 0);

        let report = policy.learn(&mut env, 10, true).unwrap();
        assert_eq!(report.total_timesteps, 768);
        assert_eq!(report.steps, 256);

        let report = policy.learn(&mut env, 10, false).unwrap();
        assert_eq!(report.total_timesteps, 256);
    }

    #[test]
    fn test_learning_improves_bandit_return() {
        let mut env = BanditEnv { step: 0 };
        let mut policy = PpoPolicy::for_env(&env, quick(5)).unwrap();

        let before = evaluate_policy(&mut env, &policy, 5).unwrap().avg_return;
        policy.learn(&mut env, 20_000, false).unwrap();
        let after = evaluate_policy(&mut env, &policy, 5).unwrap().avg_return;

        assert!(after > before, "before {} after {}", before, after);
    }
}
