// Reinforcement learning for anesthesia dose recommendation
//
// This module provides the dosing environment, its reward shaping, and the
// policy-gradient trainer that learns induction and maintenance rates.

pub mod core;
pub mod dosing;
pub mod env_anesthesia;
pub mod mlp;
pub mod normalize;
pub mod policy;
pub mod ppo;
pub mod reward;
pub mod train;

pub use core::{ActionSpace, RLEnv, State, StepInfo, StepResult};
pub use dosing::{
    calculate_doses, doses_from_corrected_rates, DoseAction, DoseBreakdown, PatientInput,
    PatientState, TargetDoses,
};
pub use env_anesthesia::{AnesthesiaEnv, AnesthesiaEnvConfig, FeedbackFlag};
pub use normalize::{NormalizeConfig, Normalizer, RunningMeanStd};
pub use policy::{Policy, PolicyError, TrainReport};
pub use ppo::{PpoConfig, PpoPolicy};
pub use reward::{dose_reward, reward_components, RewardComponents, RewardLog, RewardSummary};
pub use train::{evaluate_policy, load_or_train, EvalConfig, EvalHook, ModelSource, PolicyEvalReport};
