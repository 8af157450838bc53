// Core RL Abstractions
//
// Defines the fundamental reinforcement learning types and the RLEnv trait
// for continuous-action dosing environments.

use serde::{Deserialize, Serialize};

/// State representation at runtime
///
/// Uses a simple vector representation that can be normalized and fed
/// directly into function approximators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    /// Feature vector representing the current state
    ///
    /// For AnesthesiaEnv:
    /// - features[0]: weight (kg / 100)
    /// - features[1]: operation duration (hours / 6)
    /// - features[2]: age (years / 70)
    pub features: Vec<f64>,
}

impl State {
    /// Create a new state from feature vector
    pub fn new(features: Vec<f64>) -> Self {
        Self { features }
    }

    /// Get number of features
    pub fn dim(&self) -> usize {
        self.features.len()
    }
}

/// Continuous box action space: one `[low, high]` interval per dimension
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionSpace {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
}

impl ActionSpace {
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Self {
        assert_eq!(low.len(), high.len());
        Self { low, high }
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Clip an action into the box
    pub fn clip(&self, action: &[f64]) -> Vec<f64> {
        action
            .iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(&a, (&lo, &hi))| a.clamp(lo, hi))
            .collect()
    }

    /// Map a unit action in [-1, 1]^n onto the box (values are clipped first)
    pub fn scale_from_unit(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(&u, (&lo, &hi))| lo + 0.5 * (u.clamp(-1.0, 1.0) + 1.0) * (hi - lo))
            .collect()
    }

    pub fn contains(&self, action: &[f64]) -> bool {
        action.len() == self.dim()
            && action
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(&a, (&lo, &hi))| a >= lo && a <= hi)
    }
}

/// Result of taking a step in an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Next state after taking the action
    pub next_state: State,

    /// Reward received for this transition
    pub reward: f64,

    /// Whether the episode is done
    pub done: bool,

    /// Additional information about the step
    pub info: StepInfo,
}

/// Additional information about an environment step
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StepInfo {
    /// Induction bolus computed for the action (mg)
    pub initial_dose_mg: f64,

    /// Maintenance infusion computed for the action (mg/hr)
    pub maintenance_dose_mg_per_hr: f64,

    /// Maintenance infusion over the whole operation (mg)
    pub total_maintenance_dose_mg: f64,

    /// Step index within the episode (1-based)
    pub step: usize,
}

/// Reinforcement Learning Environment trait
///
/// This trait defines the interface that all RL environments must implement.
/// Trainers only see observations, bounded continuous actions and rewards.
pub trait RLEnv {
    /// Get the dimensionality of the state vector
    fn state_dim(&self) -> usize;

    /// Get the bounds of the continuous action space
    fn action_space(&self) -> ActionSpace;

    /// Reset to the start of a new episode
    fn reset(&mut self) -> anyhow::Result<State>;

    /// Advance one step with the given action
    fn step(&mut self, action: &[f64]) -> anyhow::Result<StepResult>;

    /// Get a human-readable name for the environment
    fn name(&self) -> &str {
        "RLEnv"
    }
}

// =============================================================================
// Tests
// =============================================================================
