// Policy capability
//
// The minimal surface the dosing loop needs from a learned policy. The
// environment and the feedback loop only depend on this trait, never on a
// particular training algorithm.

use crate::rl::core::{RLEnv, State};
use crate::rl::dosing::DoseAction;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors raised by policy persistence and inference
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("no saved policy at {0}")]
    NotFound(PathBuf),

    #[error("IO error on policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in policy file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("policy is incompatible with the environment: {0}")]
    Incompatible(String),
}

impl PolicyError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PolicyError::NotFound(_))
    }
}

/// Training report with metrics
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TrainReport {
    /// Environment steps taken in this call
    pub steps: u64,

    /// Policy timestep counter after the call
    pub total_timesteps: u64,

    /// Number of rollout/update iterations
    pub n_updates: usize,

    /// Episodes that finished during this call
    pub episodes_completed: usize,

    /// Mean undiscounted return of the finished episodes
    pub mean_episode_return: Option<f64>,

    /// Loss statistics of the final update
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
    pub approx_kl: f64,
    pub clip_fraction: f64,

    /// Best deterministic evaluation return seen, when evaluation ran
    pub best_eval_return: Option<f64>,
}

/// A dosing policy that can be queried, trained, saved and restored
pub trait Policy: Sized {
    /// Deterministic action for an observation
    fn predict(&self, state: &State) -> Result<DoseAction, PolicyError>;

    /// Train for `total_steps` environment steps
    ///
    /// With `resume` the timestep counter continues from its previous value;
    /// otherwise it restarts at zero.
    fn learn<E: RLEnv>(
        &mut self,
        env: &mut E,
        total_steps: u64,
        resume: bool,
    ) -> anyhow::Result<TrainReport>;

    /// Persist the policy
    fn save(&self, path: &Path) -> Result<(), PolicyError>;

    /// Restore a persisted policy; a missing file is [`PolicyError::NotFound`]
    fn load(path: &Path) -> Result<Self, PolicyError>;
}
