// Clinician feedback and fine-tuning loop
//
// One consultation per patient: the policy proposes rates, the clinician
// approves or corrects them, corrections become the new reward target and
// trigger a short fine-tuning pass on the corrected patient.

pub mod audit;
pub mod interactive;

pub use audit::{FeedbackLog, FeedbackRecord};
pub use interactive::run_interactive;

use crate::rl::dosing::{
    calculate_doses, doses_from_corrected_rates, DoseAction, DoseBreakdown, PatientInput,
    PatientState, TargetDoses,
};
use crate::rl::env_anesthesia::AnesthesiaEnv;
use crate::rl::policy::{Policy, TrainReport};
use crate::rl::reward::dose_reward;
use crate::rl::RLEnv;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a feedback session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Environment steps of fine-tuning after each correction
    pub fine_tune_steps: u64,

    /// JSONL audit log of every consultation
    pub audit_path: Option<PathBuf>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            fine_tune_steps: 1000,
            audit_path: None,
        }
    }
}

/// What the policy suggests for one patient
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub input: PatientInput,
    pub state: PatientState,
    pub action: DoseAction,
    pub doses: DoseBreakdown,
}

/// The clinician's verdict on a proposal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Review {
    Approved,
    /// Rejected with corrected (induction, maintenance) values
    Rejected(TargetDoses),
}

/// Result of one consultation
#[derive(Debug, Clone, PartialEq)]
pub struct ConsultationOutcome {
    pub approved: bool,
    /// Corrected values, or the proposal itself when approved
    pub correct_doses: TargetDoses,
    /// Doses to administer
    pub final_doses: DoseBreakdown,
    /// Reward of the proposed action against the post-feedback target
    pub reward: f64,
    /// Present when a correction triggered fine-tuning
    pub fine_tune: Option<TrainReport>,
}

/// Feedback session owning the environment, the policy and the audit trail
pub struct FeedbackSession<P: Policy> {
    env: AnesthesiaEnv,
    policy: P,
    cfg: FeedbackConfig,
    corrections: Vec<(PatientState, TargetDoses)>,
    audit: Option<FeedbackLog>,
    fine_tuned: bool,
}

impl<P: Policy> FeedbackSession<P> {
    pub fn new(env: AnesthesiaEnv, policy: P, cfg: FeedbackConfig) -> anyhow::Result<Self> {
        let audit = match &cfg.audit_path {
            Some(path) => Some(FeedbackLog::open(path.clone())?),
            None => None,
        };

        Ok(Self {
            env,
            policy,
            cfg,
            corrections: Vec::new(),
            audit,
            fine_tuned: false,
        })
    }

    /// Normalize the patient, inject it into a reset environment and ask the
    /// policy for rates
    pub fn propose(&mut self, input: PatientInput) -> anyhow::Result<Proposal> {
        let state = input.normalize();

        self.env.reset()?;
        self.env.set_patient(state);

        let action = self.policy.predict(&state.to_rl_state())?;
        let doses = self.env.calculate_doses(&action)?;

        tracing::debug!(
            induction_rate = action.induction_rate,
            maintenance_rate = action.maintenance_rate,
            initial_dose_mg = doses.initial_dose_mg,
            "policy proposal"
        );

        Ok(Proposal {
            input,
            state,
            action,
            doses,
        })
    }

    /// Apply the clinician's verdict on `proposal`
    pub fn review(
        &mut self,
        proposal: &Proposal,
        review: Review,
    ) -> anyhow::Result<ConsultationOutcome> {
        let (approved, correct_doses, final_doses) = match review {
            Review::Approved => {
                let proposed = TargetDoses::from(proposal.action);
                self.env.provide_doctor_feedback(true, proposed);
                (true, proposed, proposal.doses)
            }
            Review::Rejected(corrected) => {
                self.env.provide_doctor_feedback(false, corrected);
                self.corrections.push((proposal.state, corrected));
                (
                    false,
                    corrected,
                    doses_from_corrected_rates(&proposal.input, &corrected),
                )
            }
        };

        let reward = dose_reward(
            &calculate_doses(&proposal.state, &proposal.action),
            &self.env.target(),
        );

        if let Some(log) = &self.audit {
            log.append(&FeedbackRecord::new(
                proposal.state,
                proposal.action,
                approved,
                correct_doses,
                self.env.target(),
            ))?;
        }

        let fine_tune = if approved {
            None
        } else {
            Some(self.fine_tune(proposal.state)?)
        };

        Ok(ConsultationOutcome {
            approved,
            correct_doses,
            final_doses,
            reward,
            fine_tune,
        })
    }

    /// Short resumed training pass with the corrected patient pinned
    fn fine_tune(&mut self, patient: PatientState) -> anyhow::Result<TrainReport> {
        self.env.pin_patient(patient);
        let result = self
            .policy
            .learn(&mut self.env, self.cfg.fine_tune_steps, true);
        self.env.unpin_patient();

        let report = result?;
        self.fine_tuned = true;
        tracing::info!(
            steps = report.steps,
            total_timesteps = report.total_timesteps,
            "policy updated with clinician feedback"
        );
        Ok(report)
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn env(&self) -> &AnesthesiaEnv {
        &self.env
    }

    /// Corrections recorded this session, in order
    pub fn corrections(&self) -> &[(PatientState, TargetDoses)] {
        &self.corrections
    }

    /// Whether any correction has fine-tuned the policy
    pub fn fine_tuned(&self) -> bool {
        self.fine_tuned
    }

    pub fn into_parts(self) -> (AnesthesiaEnv, P) {
        (self.env, self.policy)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::State;
    use crate::rl::env_anesthesia::AnesthesiaEnvConfig;
    use crate::rl::policy::PolicyError;
    use std::path::Path;

    /// Always proposes the same rates and counts training calls
    struct StubPolicy {
        action: DoseAction,
        learn_calls: Vec<(u64, bool)>,
    }

    impl Policy for StubPolicy {
        fn predict(&self, _state: &State) -> Result<DoseAction, PolicyError> {
            Ok(self.action)
        }

        fn learn<E: RLEnv>(
            &mut self,
            env: &mut E,
            total_steps: u64,
            resume: bool,
        ) -> anyhow::Result<TrainReport> {
            self.learn_calls.push((total_steps, resume));
            env.reset()?;
            env.step(&self.action.to_vec())?;
            Ok(TrainReport {
                steps: total_steps,
                ..TrainReport::default()
            })
        }

        fn save(&self, _path: &Path) -> Result<(), PolicyError> {
            Ok(())
        }

        fn load(path: &Path) -> Result<Self, PolicyError> {
            Err(PolicyError::NotFound(path.to_path_buf()))
        }
    }

    fn session(action: DoseAction) -> FeedbackSession<StubPolicy> {
        let env = AnesthesiaEnv::new(AnesthesiaEnvConfig {
            seed: Some(1),
            ..AnesthesiaEnvConfig::default()
        });
        let policy = StubPolicy {
            action,
            learn_calls: Vec::new(),
        };
        FeedbackSession::new(env, policy, FeedbackConfig::default()).unwrap()
    }

    fn reference_patient() -> PatientInput {
        PatientInput {
            weight_kg: 70.0,
            duration_hr: 2.0,
            age_years: 40,
        }
    }

    #[test]
    fn test_proposal_uses_injected_patient() {
        let mut s = session(DoseAction::new(3.0, 8.0));
        let proposal = s.propose(reference_patient()).unwrap();

        assert_eq!(s.env().patient(), Some(&proposal.state));
        assert!((proposal.doses.initial_dose_mg - 210.0).abs() < 1e-9);
        assert!((proposal.doses.maintenance_dose_mg_per_hr - 33.6).abs() < 1e-9);
    }

    #[test]
    fn test_approval_keeps_target_and_skips_training() {
        let mut s = session(DoseAction::new(3.0, 8.0));
        let proposal = s.propose(reference_patient()).unwrap();
        let outcome = s.review(&proposal, Review::Approved).unwrap();

        assert!(outcome.approved);
        assert_eq!(outcome.final_doses, proposal.doses);
        assert_eq!(outcome.correct_doses, TargetDoses::new(3.0, 8.0));
        assert!(outcome.fine_tune.is_none());
        assert_eq!(s.env().target(), TargetDoses::default());
        assert!(s.corrections().is_empty());
        assert!(s.policy().learn_calls.is_empty());
        assert!(!s.fine_tuned());
    }

    #[test]
    fn test_rejection_updates_target_and_fine_tunes() {
        let mut s = session(DoseAction::new(3.0, 8.0));
        let proposal = s.propose(reference_patient()).unwrap();

        let corrected = TargetDoses::new(210.0, 33.6);
        let outcome = s.review(&proposal, Review::Rejected(corrected)).unwrap();

        assert!(!outcome.approved);
        assert_eq!(s.env().target(), corrected);
        // The proposal now matches the corrected target exactly
        assert!(outcome.reward.abs() < 1e-9);
        assert!((outcome.final_doses.initial_dose_mg - 210.0 * 70.0).abs() < 1e-6);
        assert_eq!(s.corrections().len(), 1);
        assert_eq!(s.policy().learn_calls, vec![(1000, true)]);
        assert!(s.fine_tuned());
        assert!(s.env().pinned_patient().is_none());
    }

    #[test]
    fn test_fine_tune_trains_on_corrected_patient() {
        let mut s = session(DoseAction::new(2.0, 6.0));
        let proposal = s.propose(reference_patient()).unwrap();
        s.review(&proposal, Review::Rejected(TargetDoses::new(2.0, 6.0)))
            .unwrap();

        // The stub reset the environment during learn; the pin made it the
        // corrected patient rather than a random one
        assert_eq!(s.env().patient(), Some(&proposal.state));
    }
}
