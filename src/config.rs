// Application configuration
//
// One JSON document gathers every tunable of a run. Missing fields fall back
// to their defaults, so a config file only needs the values it changes.

use crate::feedback::FeedbackConfig;
use crate::rl::env_anesthesia::AnesthesiaEnvConfig;
use crate::rl::ppo::PpoConfig;
use crate::rl::train::EvalConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub env: AnesthesiaEnvConfig,
    pub ppo: PpoConfig,
    pub eval: EvalConfig,
    pub feedback: FeedbackConfig,

    /// Timesteps of the initial training run
    pub initial_train_steps: u64,

    /// Policy trained from scratch or loaded at startup
    pub model_path: PathBuf,

    /// Policy written after an interactive session
    pub finetuned_path: PathBuf,

    /// Optional JSON export of the per-step reward log
    pub reward_log_path: Option<PathBuf>,

    /// Moving-average window of the reward log summary
    pub reward_window: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: AnesthesiaEnvConfig::default(),
            ppo: PpoConfig::default(),
            eval: EvalConfig::default(),
            feedback: FeedbackConfig::default(),
            initial_train_steps: 50_000,
            model_path: PathBuf::from("ppo_anesthesia.json"),
            finetuned_path: PathBuf::from("ppo_anesthesia_finetuned.json"),
            reward_log_path: None,
            reward_window: 100,
        }
    }
}

impl AppConfig {
    /// Small budgets for smoke runs
    pub fn default_quick() -> Self {
        Self {
            ppo: PpoConfig::default_quick(),
            eval: EvalConfig {
                eval_freq: 256,
                n_eval_episodes: 2,
                best_model_path: None,
            },
            feedback: FeedbackConfig {
                fine_tune_steps: 256,
                audit_path: None,
            },
            initial_train_steps: 2_048,
            ..Self::default()
        }
    }

    /// Read a JSON config file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: AppConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(cfg)
    }

    /// Apply a seed to every randomized component
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.env.seed = Some(seed);
        self.ppo.seed = Some(seed);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.env.validate().map_err(|e| format!("env: {}", e))?;
        self.ppo.validate().map_err(|e| format!("ppo: {}", e))?;
        self.eval.validate().map_err(|e| format!("eval: {}", e))?;
        if self.feedback.fine_tune_steps == 0 {
            return Err("feedback: fine_tune_steps must be > 0".to_string());
        }
        if self.initial_train_steps == 0 {
            return Err("initial_train_steps must be > 0".to_string());
        }
        if self.reward_window == 0 {
            return Err("reward_window must be > 0".to_string());
        }
        if self.model_path == self.finetuned_path {
            return Err("model_path and finetuned_path must differ".to_string());
        }
        Ok(())
    }
}
