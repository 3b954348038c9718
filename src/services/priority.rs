//! Priority ranking
//!
//! Weighted scoring over business value, impact, effort and risk. Effort
//! and risk are inverted before weighting so that harder or riskier work
//! ranks lower. Weights are validated on update and an invalid set leaves
//! the previous weights in place.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::models::PriorityLevel;
use crate::utils::{AdvisorError, AdvisorResult};

const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub business_value: f64,
    pub impact: f64,
    pub effort: f64,
    pub risk: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self { business_value: 0.3, impact: 0.4, effort: 0.2, risk: 0.1 }
    }
}

impl PriorityWeights {
    fn sum(&self) -> f64 {
        self.business_value + self.impact + self.effort + self.risk
    }
}

/// Score thresholds for CRITICAL/HIGH/MEDIUM; anything below is LOW.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self { critical: 0.75, high: 0.5, medium: 0.25 }
    }
}

pub struct PriorityRanker {
    weights: RwLock<PriorityWeights>,
    thresholds: PriorityThresholds,
}

impl Default for PriorityRanker {
    fn default() -> Self {
        Self::new(PriorityWeights::default(), PriorityThresholds::default())
    }
}

impl PriorityRanker {
    pub fn new(weights: PriorityWeights, thresholds: PriorityThresholds) -> Self {
        Self { weights: RwLock::new(weights), thresholds }
    }

    /// All four inputs are clamped to [0, 1]; the result is in [0, 1].
    pub fn calculate_priority_score(
        &self,
        business_value: f64,
        impact: f64,
        effort: f64,
        risk: f64,
    ) -> f64 {
        let w = *self.weights.read().expect("priority weights lock poisoned");
        let business_value = business_value.clamp(0.0, 1.0);
        let impact = impact.clamp(0.0, 1.0);
        let effort = effort.clamp(0.0, 1.0);
        let risk = risk.clamp(0.0, 1.0);

        let score = w.business_value * business_value
            + w.impact * impact
            + w.effort * (1.0 - effort)
            + w.risk * (1.0 - risk);
        score.clamp(0.0, 1.0)
    }

    /// Rejects weight sets not summing to 1.0 within tolerance; the
    /// previous weights stay in effect on rejection.
    pub fn update_weights(&self, weights: PriorityWeights) -> AdvisorResult<()> {
        let sum = weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AdvisorError::invalid_input(format!(
                "priority weights must sum to 1.0, got {:.4}",
                sum
            )));
        }
        *self.weights.write().expect("priority weights lock poisoned") = weights;
        Ok(())
    }

    pub fn current_weights(&self) -> PriorityWeights {
        *self.weights.read().expect("priority weights lock poisoned")
    }

    pub fn determine_priority_level(&self, score: f64) -> PriorityLevel {
        if score >= self.thresholds.critical {
            PriorityLevel::Critical
        } else if score >= self.thresholds.high {
            PriorityLevel::High
        } else if score >= self.thresholds.medium {
            PriorityLevel::Medium
        } else {
            PriorityLevel::Low
        }
    }
}
