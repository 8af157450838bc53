// Anesthesia Dosing RL Environment
//
// Single-step-per-decision environment: the patient does not evolve within
// an episode, only the step counter does. Each step scores the proposed
// induction/maintenance rates against the current reference target.

use crate::rl::core::{ActionSpace, RLEnv, State, StepInfo, StepResult};
use crate::rl::dosing::{
    calculate_doses, DoseAction, DoseBreakdown, PatientState, TargetDoses, AGE_SCALE_YEARS,
    DURATION_SCALE_HR, WEIGHT_SCALE_KG,
};
use crate::rl::reward::{dose_reward, RewardLog};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

/// Configuration for AnesthesiaEnv
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnesthesiaEnvConfig {
    /// Steps per episode
    pub episode_length: usize,

    /// Sampling range for patient weight (kg)
    pub weight_range_kg: (f64, f64),

    /// Sampling range for operation duration (hours)
    pub duration_range_hr: (f64, f64),

    /// Sampling range for patient age (years)
    pub age_range_years: (f64, f64),

    /// Reference target the reward starts from
    pub initial_target: TargetDoses,

    /// Random seed for patient sampling
    pub seed: Option<u64>,
}

impl Default for AnesthesiaEnvConfig {
    fn default() -> Self {
        Self {
            episode_length: 10,
            weight_range_kg: (50.0, 100.0),
            duration_range_hr: (1.0, 6.0),
            age_range_years: (18.0, 70.0),
            initial_target: TargetDoses::default(),
            seed: None,
        }
    }
}

impl AnesthesiaEnvConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.episode_length == 0 {
            return Err("episode_length must be > 0".to_string());
        }
        for (name, (lo, hi), scale) in [
            ("weight_range_kg", self.weight_range_kg, WEIGHT_SCALE_KG),
            ("duration_range_hr", self.duration_range_hr, DURATION_SCALE_HR),
            ("age_range_years", self.age_range_years, AGE_SCALE_YEARS),
        ] {
            if lo >= hi {
                return Err(format!("{} must satisfy low < high", name));
            }
            if lo < 0.0 || hi > scale {
                return Err(format!("{} must lie within [0, {}]", name, scale));
            }
        }
        Ok(())
    }
}

/// Most recent clinician verdict
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeedbackFlag {
    Approved,
    Rejected,
}

impl FeedbackFlag {
    pub fn from_approval(approval: bool) -> Self {
        if approval {
            FeedbackFlag::Approved
        } else {
            FeedbackFlag::Rejected
        }
    }
}

/// Anesthesia dosing environment
///
/// State space:
/// - weight / 100
/// - duration / 6
/// - age / 70
///
/// Action space:
/// - induction rate in [1.0, 3.5] mg/kg
/// - maintenance rate in [4.0, 12.0] µg/kg/min
///
/// Reward:
/// - negative asymmetric distance between computed doses and the target,
///   overdosing weighted 1.5x
pub struct AnesthesiaEnv {
    cfg: AnesthesiaEnvConfig,
    patient: Option<PatientState>,
    pinned: Option<PatientState>,
    target: TargetDoses,
    feedback: Option<FeedbackFlag>,
    current_step: usize,
    rewards: RewardLog,
    rng: ChaCha20Rng,
    episode_count: usize,
}

impl AnesthesiaEnv {
    /// Create a new AnesthesiaEnv
    pub fn new(cfg: AnesthesiaEnvConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        let target = cfg.initial_target;

        Self {
            cfg,
            patient: None,
            pinned: None,
            target,
            feedback: None,
            current_step: 0,
            rewards: RewardLog::new(),
            rng,
            episode_count: 0,
        }
    }

    pub fn config(&self) -> &AnesthesiaEnvConfig {
        &self.cfg
    }

    /// Sample a new virtual patient
    fn sample_patient(&mut self) -> PatientState {
        let (w_lo, w_hi) = self.cfg.weight_range_kg;
        let (d_lo, d_hi) = self.cfg.duration_range_hr;
        let (a_lo, a_hi) = self.cfg.age_range_years;

        PatientState {
            weight_norm: self.rng.gen_range(w_lo..=w_hi) / WEIGHT_SCALE_KG,
            duration_norm: self.rng.gen_range(d_lo..=d_hi) / DURATION_SCALE_HR,
            age_norm: self.rng.gen_range(a_lo..=a_hi) / AGE_SCALE_YEARS,
        }
    }

    /// Current patient, if the environment has been reset
    pub fn patient(&self) -> Option<&PatientState> {
        self.patient.as_ref()
    }

    /// Replace the current patient without touching the step counter
    pub fn set_patient(&mut self, patient: PatientState) {
        self.patient = Some(patient);
    }

    /// Make every subsequent reset return `patient` instead of sampling
    pub fn pin_patient(&mut self, patient: PatientState) {
        self.pinned = Some(patient);
    }

    pub fn unpin_patient(&mut self) {
        self.pinned = None;
    }

    pub fn pinned_patient(&self) -> Option<&PatientState> {
        self.pinned.as_ref()
    }

    pub fn target(&self) -> TargetDoses {
        self.target
    }

    pub fn last_feedback(&self) -> Option<FeedbackFlag> {
        self.feedback
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    pub fn reward_log(&self) -> &RewardLog {
        &self.rewards
    }

    fn require_patient(&self) -> anyhow::Result<&PatientState> {
        self.patient
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Environment not initialized. Call reset() first."))
    }

    /// Doses implied by `action` for the current patient
    pub fn calculate_doses(&self, action: &DoseAction) -> anyhow::Result<DoseBreakdown> {
        Ok(calculate_doses(self.require_patient()?, action))
    }

    /// Reward of `action` for the current patient against the current target
    pub fn calculate_reward(&self, action: &DoseAction) -> anyhow::Result<f64> {
        self.calculate_reward_against(action, &self.target)
    }

    /// Reward of `action` for the current patient against an explicit target
    pub fn calculate_reward_against(
        &self,
        action: &DoseAction,
        target: &TargetDoses,
    ) -> anyhow::Result<f64> {
        let doses = self.calculate_doses(action)?;
        Ok(dose_reward(&doses, target))
    }

    /// Record a clinician verdict
    ///
    /// A rejection makes `corrected` the target for every later reward until
    /// the next rejection. An approval leaves the target alone. The verdict is
    /// kept as its own flag; the patient observation is not modified.
    pub fn provide_doctor_feedback(&mut self, approval: bool, corrected: TargetDoses) {
        if !approval {
            tracing::info!(
                induction = corrected.induction,
                maintenance = corrected.maintenance,
                "reward target corrected by clinician"
            );
            self.target = corrected;
        }
        self.feedback = Some(FeedbackFlag::from_approval(approval));
    }
}

impl RLEnv for AnesthesiaEnv {
    fn state_dim(&self) -> usize {
        3 // weight, duration, age
    }

    fn action_space(&self) -> ActionSpace {
        DoseAction::space()
    }

    fn reset(&mut self) -> anyhow::Result<State> {
        let patient = match self.pinned {
            Some(p) => p,
            None => self.sample_patient(),
        };
        self.patient = Some(patient);
        self.current_step = 0;
        self.episode_count += 1;

        Ok(patient.to_rl_state())
    }

    fn step(&mut self, action: &[f64]) -> anyhow::Result<StepResult> {
        let action = DoseAction::from_slice(action)?;
        let patient = *self.require_patient()?;

        self.current_step += 1;

        let doses = calculate_doses(&patient, &action);
        let reward = dose_reward(&doses, &self.target);
        let done = self.current_step >= self.cfg.episode_length;

        self.rewards.push(reward);

        Ok(StepResult {
            next_state: patient.to_rl_state(),
            reward,
            done,
            info: StepInfo {
                initial_dose_mg: doses.initial_dose_mg,
                maintenance_dose_mg_per_hr: doses.maintenance_dose_mg_per_hr,
                total_maintenance_dose_mg: doses.total_maintenance_dose_mg,
                step: self.current_step,
            },
        })
    }

    fn name(&self) -> &str {
        "AnesthesiaEnv"
    }
}

// =============================================================================
// Tests
// =============================================================================
