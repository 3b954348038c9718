//! Impact estimation
//!
//! Turns an analyzer's improvement estimate into the multi-dimension
//! [`Impact`] figure on a canonical recommendation: expected performance
//! gain, dollar savings against the target's monthly spend, a fixed
//! implementation cost per change family, ROI and payback.

use crate::models::{Impact, OptimizationType};

/// Fixed implementation cost and risk per change family.
fn family_profile(optimization_type: OptimizationType) -> (f64, f64) {
    use OptimizationType::*;
    match optimization_type {
        // Query rewrites: hand the new text to the caller, low stakes.
        PredicatePushdown | JoinReordering | SubqueryFlattening | ColumnPruning
        | AggregationOptimization | CteConversion | PartitionFiltering => (100.0, 0.2),
        // Table rebuilds copy data and can break writers mid-flight.
        Partitioning => (500.0, 0.4),
        Clustering => (300.0, 0.3),
        SchemaChange => (800.0, 0.6),
        // Reservation changes are reversible but affect every workload.
        SlotAllocation => (200.0, 0.3),
    }
}

#[derive(Default)]
pub struct ImpactEstimator;

impl ImpactEstimator {
    pub fn new() -> Self {
        Self
    }

    /// `improvement_pct` is the analyzer's expected improvement;
    /// `monthly_spend_usd` is the observed spend attributable to the
    /// target (query, table or reservation).
    pub fn estimate_impact(
        &self,
        optimization_type: OptimizationType,
        improvement_pct: f64,
        monthly_spend_usd: f64,
    ) -> Impact {
        let performance_score = (improvement_pct / 100.0).clamp(0.0, 1.0);
        let monthly_savings_usd = (monthly_spend_usd * performance_score).max(0.0);
        let (implementation_cost_usd, risk_score) = family_profile(optimization_type);

        Impact {
            performance_score,
            monthly_savings_usd,
            implementation_cost_usd,
            roi_pct: calculate_roi(monthly_savings_usd * 12.0, implementation_cost_usd),
            payback_months: calculate_payback_period(
                implementation_cost_usd,
                monthly_savings_usd,
            ),
            risk_score,
        }
    }
}

/// ROI percentage. Zero when nothing is at stake on either side; signals
/// infinity instead of dividing by a zero cost.
pub fn calculate_roi(savings_usd: f64, cost_usd: f64) -> f64 {
    if cost_usd == 0.0 {
        return if savings_usd > 0.0 { f64::INFINITY } else { 0.0 };
    }
    (savings_usd - cost_usd) / cost_usd * 100.0
}

/// Months until the implementation cost is recovered. Infinite when the
/// change saves nothing (or loses money) per month.
pub fn calculate_payback_period(cost_usd: f64, monthly_savings_usd: f64) -> f64 {
    if monthly_savings_usd <= 0.0 {
        return f64::INFINITY;
    }
    cost_usd / monthly_savings_usd
}
