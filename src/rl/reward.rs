// Asymmetric dose reward and the process-lifetime reward log

use crate::rl::dosing::{DoseBreakdown, TargetDoses};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Error weight applied when a dose overshoots its target
pub const OVERDOSE_WEIGHT: f64 = 1.5;
/// Error weight applied when a dose is at or below its target
pub const UNDERDOSE_WEIGHT: f64 = 1.0;

/// Per-component breakdown of a reward, for logging and analysis
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct RewardComponents {
    pub induction_penalty: f64,
    pub maintenance_penalty: f64,
}

impl RewardComponents {
    pub fn reward(&self) -> f64 {
        -(self.induction_penalty + self.maintenance_penalty)
    }
}

fn weighted_error(dose: f64, target: f64) -> f64 {
    let weight = if dose > target {
        OVERDOSE_WEIGHT
    } else {
        UNDERDOSE_WEIGHT
    };
    weight * (dose - target).abs()
}

/// Score a dose breakdown against an explicit target
pub fn reward_components(doses: &DoseBreakdown, target: &TargetDoses) -> RewardComponents {
    RewardComponents {
        induction_penalty: weighted_error(doses.initial_dose_mg, target.induction),
        maintenance_penalty: weighted_error(doses.maintenance_dose_mg_per_hr, target.maintenance),
    }
}

/// Reward for a dose breakdown: never positive, zero only on an exact match
pub fn dose_reward(doses: &DoseBreakdown, target: &TargetDoses) -> f64 {
    reward_components(doses, target).reward()
}

/// Summary of the reward log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewardSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
    /// Mean of the trailing window
    pub recent_mean: f64,
}

/// Append-only sequence of step rewards
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RewardLog {
    rewards: Vec<f64>,
}

impl RewardLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reward: f64) {
        self.rewards.push(reward);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.rewards
    }

    /// Trailing moving average with the given window
    pub fn moving_average(&self, window: usize) -> Vec<f64> {
        let window = window.max(1);
        let mut out = Vec::with_capacity(self.rewards.len());
        let mut acc = 0.0;
        for (i, r) in self.rewards.iter().enumerate() {
            acc += r;
            if i >= window {
                acc -= self.rewards[i - window];
            }
            out.push(acc / (i + 1).min(window) as f64);
        }
        out
    }

    pub fn summary(&self, window: usize) -> Option<RewardSummary> {
        let last = *self.rewards.last()?;
        let count = self.rewards.len();
        let min = self.rewards.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = self.rewards.iter().sum::<f64>() / count as f64;
        let recent_mean = self.moving_average(window).last().copied().unwrap_or(last);

        Some(RewardSummary {
            count,
            mean,
            min,
            max,
            last,
            recent_mean,
        })
    }

    /// Write the log and its moving average as JSON
    pub fn export_json<P: AsRef<Path>>(&self, path: P, window: usize) -> anyhow::Result<()> {
        let doc = serde_json::json!({
            "rewards": self.rewards,
            "moving_average": self.moving_average(window),
            "summary": self.summary(window),
        });
        std::fs::write(path, serde_json::to_string_pretty(&doc)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doses(initial: f64, maintenance: f64) -> DoseBreakdown {
        DoseBreakdown {
            initial_dose_mg: initial,
            maintenance_dose_mg_per_hr: maintenance,
            total_maintenance_dose_mg: 0.0,
        }
    }

    #[test]
    fn test_exact_match_is_zero() {
        let target = TargetDoses::new(210.0, 33.6);
        assert_eq!(dose_reward(&doses(210.0, 33.6), &target), 0.0);
    }

    #[test]
    fn test_overdose_weighted_more() {
        let target = TargetDoses::new(100.0, 20.0);
        let over = dose_reward(&doses(110.0, 20.0), &target);
        let under = dose_reward(&doses(90.0, 20.0), &target);
        assert_eq!(over, -15.0);
        assert_eq!(under, -10.0);
        assert_eq!(over / under, 1.5);
    }

    #[test]
    fn test_components_sum() {
        let target = TargetDoses::default();
        let c = reward_components(&doses(5.0, 6.0), &target);
        assert_eq!(c.induction_penalty, 3.0);
        assert_eq!(c.maintenance_penalty, 2.0);
        assert_eq!(c.reward(), -5.0);
    }

    #[test]
    fn test_reward_log_summary() {
        let mut log = RewardLog::new();
        assert!(log.summary(3).is_none());

        for r in [-4.0, -2.0, -6.0, 0.0] {
            log.push(r);
        }

        let s = log.summary(2).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.mean, -3.0);
        assert_eq!(s.min, -6.0);
        assert_eq!(s.max, 0.0);
        assert_eq!(s.last, 0.0);
        assert_eq!(s.recent_mean, -3.0);
        assert_eq!(log.moving_average(2), vec![-4.0, -3.0, -4.0, -3.0]);
    }
}
