// Anesthesia dose arithmetic
//
// Patient normalization, action bounds and the closed-form conversion from
// (induction rate, maintenance rate) to physical doses.

use crate::rl::core::{ActionSpace, State};
use serde::{Deserialize, Serialize};

/// Weight scale (kg) used to normalize the observation
pub const WEIGHT_SCALE_KG: f64 = 100.0;
/// Duration scale (hours)
pub const DURATION_SCALE_HR: f64 = 6.0;
/// Age scale (years)
pub const AGE_SCALE_YEARS: f64 = 70.0;

/// Patients strictly older than this receive a reduced induction rate
pub const ELDERLY_AGE_YEARS: f64 = 65.0;
/// Induction multiplier applied to elderly patients
pub const ELDERLY_INDUCTION_FACTOR: f64 = 0.75;

pub const INDUCTION_RATE_MIN: f64 = 1.0;
pub const INDUCTION_RATE_MAX: f64 = 3.5;
pub const MAINTENANCE_RATE_MIN: f64 = 4.0;
pub const MAINTENANCE_RATE_MAX: f64 = 12.0;

/// Raw patient parameters as entered at the bedside
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PatientInput {
    pub weight_kg: f64,
    pub duration_hr: f64,
    pub age_years: u32,
}

impl PatientInput {
    pub fn normalize(&self) -> PatientState {
        PatientState {
            weight_norm: self.weight_kg / WEIGHT_SCALE_KG,
            duration_norm: self.duration_hr / DURATION_SCALE_HR,
            age_norm: self.age_years as f64 / AGE_SCALE_YEARS,
        }
    }
}

/// Normalized patient observation
///
/// Each coordinate is the physiological quantity divided by its scale
/// constant. Sampled patients land in [0, 1]; bedside input is not clamped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PatientState {
    pub weight_norm: f64,
    pub duration_norm: f64,
    pub age_norm: f64,
}

impl PatientState {
    pub fn weight_kg(&self) -> f64 {
        self.weight_norm * WEIGHT_SCALE_KG
    }

    pub fn duration_hr(&self) -> f64 {
        self.duration_norm * DURATION_SCALE_HR
    }

    pub fn age_years(&self) -> f64 {
        self.age_norm * AGE_SCALE_YEARS
    }

    /// Whether the elderly induction reduction applies
    ///
    /// Compared in normalized units so that an age of exactly 65 years never
    /// trips the threshold through rounding in the denormalization.
    pub fn is_elderly(&self) -> bool {
        self.age_norm > ELDERLY_AGE_YEARS / AGE_SCALE_YEARS
    }

    pub fn induction_multiplier(&self) -> f64 {
        if self.is_elderly() {
            ELDERLY_INDUCTION_FACTOR
        } else {
            1.0
        }
    }

    pub fn to_rl_state(&self) -> State {
        State::new(vec![self.weight_norm, self.duration_norm, self.age_norm])
    }

    /// Rebuild a patient from an observation vector
    pub fn from_rl_state(state: &State) -> anyhow::Result<Self> {
        match state.features.as_slice() {
            [w, d, a] => Ok(Self {
                weight_norm: *w,
                duration_norm: *d,
                age_norm: *a,
            }),
            other => anyhow::bail!("expected 3 patient features, got {}", other.len()),
        }
    }
}

/// Proposed dosing rates
///
/// `induction_rate` in mg/kg, `maintenance_rate` in µg/kg/min.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DoseAction {
    pub induction_rate: f64,
    pub maintenance_rate: f64,
}

impl DoseAction {
    pub fn new(induction_rate: f64, maintenance_rate: f64) -> Self {
        Self {
            induction_rate,
            maintenance_rate,
        }
    }

    pub fn from_slice(action: &[f64]) -> anyhow::Result<Self> {
        match action {
            [i, m] => Ok(Self::new(*i, *m)),
            other => anyhow::bail!("expected 2 action components, got {}", other.len()),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.induction_rate, self.maintenance_rate]
    }

    /// The bounded action space every trainer samples from
    pub fn space() -> ActionSpace {
        ActionSpace::new(
            vec![INDUCTION_RATE_MIN, MAINTENANCE_RATE_MIN],
            vec![INDUCTION_RATE_MAX, MAINTENANCE_RATE_MAX],
        )
    }
}

/// Reference doses the reward is scored against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TargetDoses {
    pub induction: f64,
    pub maintenance: f64,
}

impl TargetDoses {
    pub fn new(induction: f64, maintenance: f64) -> Self {
        Self {
            induction,
            maintenance,
        }
    }
}

impl Default for TargetDoses {
    fn default() -> Self {
        Self::new(3.0, 8.0)
    }
}

impl From<DoseAction> for TargetDoses {
    fn from(action: DoseAction) -> Self {
        Self::new(action.induction_rate, action.maintenance_rate)
    }
}

/// Physical doses derived from an action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DoseBreakdown {
    /// Induction bolus (mg)
    pub initial_dose_mg: f64,
    /// Maintenance infusion (mg/hr)
    pub maintenance_dose_mg_per_hr: f64,
    /// Maintenance over the whole operation (mg)
    pub total_maintenance_dose_mg: f64,
}

/// Convert a µg/kg/min infusion rate to mg/hr for a patient of `weight_kg`
pub fn maintenance_mg_per_hr(maintenance_rate: f64, weight_kg: f64) -> f64 {
    (maintenance_rate * weight_kg / 1000.0) * 60.0
}

/// Compute the doses implied by `action` for `patient`
///
/// Bounds are not enforced here; the action space contract does that.
pub fn calculate_doses(patient: &PatientState, action: &DoseAction) -> DoseBreakdown {
    let weight = patient.weight_kg();
    let duration = patient.duration_hr();

    let induction_rate = action.induction_rate * patient.induction_multiplier();
    let initial_dose_mg = induction_rate * weight;
    let maintenance_dose_mg_per_hr = maintenance_mg_per_hr(action.maintenance_rate, weight);

    DoseBreakdown {
        initial_dose_mg,
        maintenance_dose_mg_per_hr,
        total_maintenance_dose_mg: maintenance_dose_mg_per_hr * duration,
    }
}

/// Doses administered from clinician-corrected rates
///
/// Uses the raw bedside weight and duration and applies no age reduction:
/// the clinician's rate is taken as already adjusted.
pub fn doses_from_corrected_rates(input: &PatientInput, corrected: &TargetDoses) -> DoseBreakdown {
    let maintenance_dose_mg_per_hr = maintenance_mg_per_hr(corrected.maintenance, input.weight_kg);
    DoseBreakdown {
        initial_dose_mg: corrected.induction * input.weight_kg,
        maintenance_dose_mg_per_hr,
        total_maintenance_dose_mg: maintenance_dose_mg_per_hr * input.duration_hr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(weight: f64, duration: f64, age: u32) -> PatientState {
        PatientInput {
            weight_kg: weight,
            duration_hr: duration,
            age_years: age,
        }
        .normalize()
    }

    #[test]
    fn test_normalization() {
        let p = patient(70.0, 2.0, 40);
        assert!((p.weight_norm - 0.70).abs() < 1e-12);
        assert!((p.duration_norm - 2.0 / 6.0).abs() < 1e-12);
        assert!((p.age_norm - 40.0 / 70.0).abs() < 1e-12);
        assert!((p.weight_kg() - 70.0).abs() < 1e-9);
        assert!((p.duration_hr() - 2.0).abs() < 1e-9);
        assert!((p.age_years() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_reference_patient_doses() {
        let p = patient(70.0, 2.0, 40);
        let doses = calculate_doses(&p, &DoseAction::new(3.0, 8.0));

        assert!((doses.initial_dose_mg - 210.0).abs() < 1e-9);
        assert!((doses.maintenance_dose_mg_per_hr - 33.6).abs() < 1e-9);
        assert!((doses.total_maintenance_dose_mg - 67.2).abs() < 1e-9);
    }

    #[test]
    fn test_elderly_threshold() {
        assert_eq!(patient(70.0, 2.0, 65).induction_multiplier(), 1.0);
        assert_eq!(patient(70.0, 2.0, 66).induction_multiplier(), 0.75);

        let elderly = calculate_doses(&patient(80.0, 1.0, 70), &DoseAction::new(2.0, 6.0));
        assert!((elderly.initial_dose_mg - 120.0).abs() < 1e-9);
        // Maintenance is never age-adjusted
        assert!((elderly.maintenance_dose_mg_per_hr - 28.8).abs() < 1e-9);
    }

    #[test]
    fn test_rl_state_roundtrip() {
        let p = patient(90.0, 3.0, 30);
        let back = PatientState::from_rl_state(&p.to_rl_state()).unwrap();
        assert_eq!(p, back);
        assert!(PatientState::from_rl_state(&State::new(vec![0.1, 0.2])).is_err());
    }

    #[test]
    fn test_corrected_rates_skip_age_reduction() {
        let input = PatientInput {
            weight_kg: 60.0,
            duration_hr: 3.0,
            age_years: 68,
        };
        let doses = doses_from_corrected_rates(&input, &TargetDoses::new(2.0, 5.0));
        assert!((doses.initial_dose_mg - 120.0).abs() < 1e-9);
        assert!((doses.maintenance_dose_mg_per_hr - 18.0).abs() < 1e-9);
        assert!((doses.total_maintenance_dose_mg - 54.0).abs() < 1e-9);
    }

    #[test]
    fn test_action_space_bounds() {
        let space = DoseAction::space();
        assert_eq!(space.low, vec![1.0, 4.0]);
        assert_eq!(space.high, vec![3.5, 12.0]);
        assert!(DoseAction::from_slice(&[1.0]).is_err());
    }
}
