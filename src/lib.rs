//! Reinforcement-learning dose recommender for anesthesia.
//!
//! The crate trains a PPO policy that proposes an induction dose rate and a
//! maintenance infusion rate from a patient's weight, operation duration and
//! age, then refines it with clinician feedback in an interactive loop.

pub mod config;
pub mod console;
pub mod feedback;
pub mod rl;
pub mod telemetry;

pub use config::AppConfig;
pub use console::{Console, InputError};
pub use feedback::{FeedbackConfig, FeedbackSession};
