//! Resource monitoring
//!
//! Snapshots slot and storage utilization through the engine's
//! INFORMATION_SCHEMA views and turns sustained over/under-provisioning
//! into Resource recommendations for the generator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backends::QueryEngine;
use crate::models::{
    Confidence, EstimatedImprovement, OptimizationRecommendation, OptimizationType,
    RecommendationDetail,
};
use crate::services::query_analyzer::json_f64;
use crate::utils::{AdvisorError, AdvisorResult};

const DEFAULT_OVER_UTILIZATION: f64 = 0.85;
const DEFAULT_UNDER_UTILIZATION: f64 = 0.30;
/// Reservation sizing moves in whole hundreds of slots.
const SLOT_STEP: u32 = 100;

/// Point-in-time utilization of the reservation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub captured_at: DateTime<Utc>,
    pub slot_capacity: u32,
    /// Average slots consumed over the sampling window.
    pub avg_slots_used: f64,
    pub utilization_ratio: f64,
    pub active_queries: u64,
    pub storage_bytes: f64,
}

pub struct ResourceMonitor {
    engine: Arc<dyn QueryEngine>,
    slot_capacity: u32,
    over_threshold: f64,
    under_threshold: f64,
}

impl ResourceMonitor {
    pub fn new(engine: Arc<dyn QueryEngine>, slot_capacity: u32) -> Self {
        Self {
            engine,
            slot_capacity,
            over_threshold: DEFAULT_OVER_UTILIZATION,
            under_threshold: DEFAULT_UNDER_UTILIZATION,
        }
    }

    pub fn with_thresholds(mut self, over: f64, under: f64) -> Self {
        self.over_threshold = over;
        self.under_threshold = under;
        self
    }

    /// Snapshot current utilization. Slot usage averages the last hour of
    /// job statistics; storage sums logical bytes across the project.
    pub async fn collect_utilization(&self) -> AdvisorResult<ResourceUtilization> {
        if self.slot_capacity == 0 {
            return Err(AdvisorError::config("slot_capacity must be positive"));
        }

        let slot_rows = self.engine.execute_query(SLOT_USAGE_SQL).await?;
        let slot_ms: f64 = slot_rows
            .first()
            .and_then(|row| row.get("slot_ms"))
            .and_then(json_f64)
            .unwrap_or(0.0);
        let active_queries = slot_rows
            .first()
            .and_then(|row| row.get("active_queries"))
            .and_then(json_f64)
            .unwrap_or(0.0) as u64;

        let storage_bytes = match self.engine.execute_query(STORAGE_SQL).await {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.get("logical_bytes"))
                .and_then(json_f64)
                .unwrap_or(0.0),
            Err(err) => {
                tracing::warn!(error = %err, "storage probe failed; reporting zero bytes");
                0.0
            },
        };

        // One slot for one hour is 3.6e6 slot-ms.
        let avg_slots_used = slot_ms / 3_600_000.0;
        Ok(ResourceUtilization {
            captured_at: Utc::now(),
            slot_capacity: self.slot_capacity,
            avg_slots_used,
            utilization_ratio: (avg_slots_used / self.slot_capacity as f64).clamp(0.0, 1.0),
            active_queries,
            storage_bytes,
        })
    }

    /// Suggest a reservation resize when utilization sits outside the
    /// healthy band. Returns the analyzer-level suggestion plus the
    /// payload the generator needs.
    pub fn assess(
        &self,
        utilization: &ResourceUtilization,
    ) -> Option<(OptimizationRecommendation, RecommendationDetail)> {
        let current = utilization.slot_capacity;
        let (target, description, rationale) = if utilization.utilization_ratio
            > self.over_threshold
        {
            let target = round_to_step(
                (utilization.avg_slots_used / self.over_threshold).ceil() as u32,
            )
            .max(current + SLOT_STEP);
            (
                target,
                format!("Increase slot reservation from {} to {}", current, target),
                format!(
                    "average utilization {:.0}% exceeds the {:.0}% ceiling; queries are queueing",
                    utilization.utilization_ratio * 100.0,
                    self.over_threshold * 100.0
                ),
            )
        } else if utilization.utilization_ratio < self.under_threshold {
            let target = round_to_step(
                (utilization.avg_slots_used / self.under_threshold).ceil() as u32,
            )
            .clamp(SLOT_STEP, current.saturating_sub(SLOT_STEP).max(SLOT_STEP));
            if target >= current {
                return None;
            }
            (
                target,
                format!("Reduce slot reservation from {} to {}", current, target),
                format!(
                    "average utilization {:.0}% is below the {:.0}% floor; slots sit idle",
                    utilization.utilization_ratio * 100.0,
                    self.under_threshold * 100.0
                ),
            )
        } else {
            return None;
        };

        let improvement_pct =
            ((target as f64 - current as f64) / current as f64 * 100.0).abs();
        let suggestion = OptimizationRecommendation {
            optimization_type: OptimizationType::SlotAllocation,
            description,
            rationale,
            impact_score: (utilization.utilization_ratio * 10.0).clamp(0.0, 10.0),
            original_snippet: String::new(),
            optimized_snippet: String::new(),
            estimated_improvement: EstimatedImprovement {
                percentage: improvement_pct,
                confidence: Confidence::Medium,
                metrics: vec!["slot_utilization".into(), "queue_time_ms".into()],
            },
        };
        let detail = RecommendationDetail::Resource {
            target: "slot_reservation".to_string(),
            settings_before: serde_json::json!({ "slots": current }),
            settings_after: serde_json::json!({ "slots": target }),
        };
        Some((suggestion, detail))
    }
}

fn round_to_step(slots: u32) -> u32 {
    slots.div_ceil(SLOT_STEP) * SLOT_STEP
}

const SLOT_USAGE_SQL: &str = "SELECT \
     SUM(total_slot_ms) AS slot_ms, \
     COUNTIF(state = 'RUNNING') AS active_queries \
     FROM `region-us`.INFORMATION_SCHEMA.JOBS_BY_PROJECT \
     WHERE creation_time >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 1 HOUR)";

const STORAGE_SQL: &str = "SELECT SUM(total_logical_bytes) AS logical_bytes \
     FROM `region-us`.INFORMATION_SCHEMA.TABLE_STORAGE";
