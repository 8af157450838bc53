// Training orchestration: evaluation, checkpointing and load-or-train
//
// Wraps a `Policy` implementation with the pieces every training run needs:
// deterministic evaluation, best-model checkpointing and the fallback from a
// missing saved policy to a fresh training run.

use crate::rl::core::RLEnv;
use crate::rl::policy::{Policy, PolicyError, TrainReport};
use crate::rl::ppo::{PpoConfig, PpoPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for periodic evaluation during training
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvalConfig {
    /// Evaluate every `eval_freq` timesteps (0 disables)
    pub eval_freq: u64,

    /// Deterministic episodes per evaluation
    pub n_eval_episodes: usize,

    /// Where the best-scoring policy is written
    pub best_model_path: Option<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            eval_freq: 500,
            n_eval_episodes: 5,
            best_model_path: Some(PathBuf::from("logs/best_model.json")),
        }
    }
}

impl EvalConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.eval_freq > 0 && self.n_eval_episodes == 0 {
            return Err("n_eval_episodes must be > 0 when evaluation is enabled".to_string());
        }
        Ok(())
    }
}

/// Evaluation environment plus its settings, handed to a trainer
pub struct EvalHook<'a> {
    pub env: &'a mut dyn RLEnv,
    pub cfg: &'a EvalConfig,
}

/// Policy evaluation report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyEvalReport {
    pub n_episodes: usize,
    pub avg_return: f64,
    pub std_return: f64,
    pub avg_episode_length: f64,
}

/// Evaluate a policy with deterministic actions
pub fn evaluate_policy<E: RLEnv + ?Sized, P: Policy>(
    env: &mut E,
    policy: &P,
    n_episodes: usize,
) -> anyhow::Result<PolicyEvalReport> {
    if n_episodes == 0 {
        anyhow::bail!("n_episodes must be > 0");
    }

    let space = env.action_space();
    let mut returns = Vec::with_capacity(n_episodes);
    let mut total_steps = 0usize;

    for _ in 0..n_episodes {
        let mut state = env.reset()?;
        let mut episode_return = 0.0;

        // Safety limit
        for _ in 0..1000 {
            let action = space.clip(&policy.predict(&state)?.to_vec());
            let step_result = env.step(&action)?;

            episode_return += step_result.reward;
            total_steps += 1;
            state = step_result.next_state;

            if step_result.done {
                break;
            }
        }

        returns.push(episode_return);
    }

    let n = n_episodes as f64;
    let avg_return = returns.iter().sum::<f64>() / n;
    let std_return = (returns.iter().map(|r| (r - avg_return).powi(2)).sum::<f64>() / n).sqrt();

    Ok(PolicyEvalReport {
        n_episodes,
        avg_return,
        std_return,
        avg_episode_length: total_steps as f64 / n,
    })
}

/// How the policy in hand was obtained
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    Loaded,
    Trained(TrainReport),
}

/// Load a saved policy, or train and save a new one when none exists
///
/// Only a missing file falls back to training; a corrupt or incompatible
/// file is an error.
pub fn load_or_train<E: RLEnv>(
    path: &Path,
    env: &mut E,
    cfg: &PpoConfig,
    total_steps: u64,
    eval: Option<EvalHook<'_>>,
) -> anyhow::Result<(PpoPolicy, ModelSource)> {
    match PpoPolicy::load(path) {
        Ok(mut policy) => {
            // Restored policies sample from entropy unless a seed is configured
            if let Some(seed) = cfg.seed {
                policy.reseed(seed);
            }
            tracing::info!(path = %path.display(), "loaded existing policy");
            Ok((policy, ModelSource::Loaded))
        }
        Err(PolicyError::NotFound(_)) => {
            tracing::info!(
                path = %path.display(),
                total_steps,
                "no saved policy, training a new one"
            );
            let mut policy = PpoPolicy::for_env(env, cfg.clone())?;
            let report = policy.learn_with_eval(env, total_steps, false, eval)?;
            policy.save(path)?;
            tracing::info!(path = %path.display(), "trained a new policy and saved it");
            Ok((policy, ModelSource::Trained(report)))
        }
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::{ActionSpace, State, StepInfo, StepResult};
    use crate::rl::dosing::DoseAction;

    /// Pays the induction rate as reward, episodes of 4 steps
    struct ToyEnv {
        current_step: usize,
    }

    impl RLEnv for ToyEnv {
        fn state_dim(&self) -> usize {
            1
        }

        fn action_space(&self) -> ActionSpace {
            ActionSpace::new(vec![0.0, 0.0], vec![1.0, 1.0])
        }

        fn reset(&mut self) -> anyhow::Result<State> {
            self.current_step = 0;
            Ok(State::new(vec![0.0]))
        }

        fn step(&mut self, action: &[f64]) -> anyhow::Result<StepResult> {
            self.current_step += 1;
            Ok(StepResult {
                next_state: State::new(vec![0.0]),
                reward: action[0],
                done: self.current_step >= 4,
                info: StepInfo::default(),
            })
        }
    }

    struct FixedPolicy(DoseAction);

    impl Policy for FixedPolicy {
        fn predict(&self, _state: &State) -> Result<DoseAction, PolicyError> {
            Ok(self.0)
        }

        fn learn<E: RLEnv>(
            &mut self,
            _env: &mut E,
            _total_steps: u64,
            _resume: bool,
        ) -> anyhow::Result<TrainReport> {
            Ok(TrainReport::default())
        }

        fn save(&self, _path: &Path) -> Result<(), PolicyError> {
            Ok(())
        }

        fn load(path: &Path) -> Result<Self, PolicyError> {
            Err(PolicyError::NotFound(path.to_path_buf()))
        }
    }

    #[test]
    fn test_evaluate_fixed_policy() {
        let mut env = ToyEnv { current_step: 0 };
        let policy = FixedPolicy(DoseAction::new(0.5, 0.0));

        let report = evaluate_policy(&mut env, &policy, 3).unwrap();
        assert_eq!(report.n_episodes, 3);
        assert_eq!(report.avg_return, 2.0);
        assert_eq!(report.std_return, 0.0);
        assert_eq!(report.avg_episode_length, 4.0);
    }

    #[test]
    fn test_evaluate_clips_into_action_space() {
        let mut env = ToyEnv { current_step: 0 };
        let policy = FixedPolicy(DoseAction::new(5.0, -3.0));

        // Induction 5.0 is clipped to the upper bound 1.0
        let report = evaluate_policy(&mut env, &policy, 2).unwrap();
        assert_eq!(report.avg_return, 4.0);
    }

    #[test]
    fn test_evaluate_requires_episodes() {
        let mut env = ToyEnv { current_step: 0 };
        let policy = FixedPolicy(DoseAction::new(0.5, 0.0));
        assert!(evaluate_policy(&mut env, &policy, 0).is_err());
    }

    #[test]
    fn test_eval_config_validation() {
        assert!(EvalConfig::default().validate().is_ok());
        let bad = EvalConfig {
            eval_freq: 100,
            n_eval_episodes: 0,
            best_model_path: None,
        };
        assert!(bad.validate().is_err());
    }
}
