//! Recommendation model
//!
//! Analyzers emit lightweight [`OptimizationRecommendation`]s; the
//! recommendation generator is the sole writer of canonical
//! [`Recommendation`] records, which add identity, impact, priority and a
//! lifecycle with a TTL.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pattern::OptimizationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedImprovement {
    /// Expected improvement percentage; negative values mean an expected
    /// regression and are surfaced as-is.
    pub percentage: f64,
    pub confidence: Confidence,
    /// Metrics the improvement applies to (bytes_processed, slot_ms, ...).
    pub metrics: Vec<String>,
}

/// A single optimization suggestion attached to an analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecommendation {
    pub optimization_type: OptimizationType,
    pub description: String,
    pub rationale: String,
    /// Impact score inherited from the triggering pattern, in [0, 10].
    pub impact_score: f64,
    pub original_snippet: String,
    pub optimized_snippet: String,
    pub estimated_improvement: EstimatedImprovement,
}

/// Multi-dimension impact estimate for a canonical recommendation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    /// Expected performance improvement, 0..1.
    pub performance_score: f64,
    pub monthly_savings_usd: f64,
    pub implementation_cost_usd: f64,
    /// Percent; `f64::INFINITY` when cost is zero and savings positive.
    pub roi_pct: f64,
    /// Months; `f64::INFINITY` when monthly savings are non-positive.
    pub payback_months: f64,
    /// Implementation risk, 0..1.
    pub risk_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityLevel {
    Critical,
    High,
    Medium,
    Low,
}

/// What the recommendation actually changes. The variant carries the
/// implementation payload so type dispatch is checked at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationDetail {
    Query {
        original_query: String,
        optimized_query: String,
        techniques: Vec<OptimizationType>,
    },
    Schema {
        dataset: String,
        table: String,
        ddl: String,
        /// DDL (or backup reference) used to undo the change.
        rollback_ddl: Option<String>,
    },
    Resource {
        target: String,
        settings_before: serde_json::Value,
        settings_after: serde_json::Value,
    },
}

impl RecommendationDetail {
    /// True when the payload is complete enough to auto-implement.
    pub fn has_implementation_details(&self) -> bool {
        match self {
            RecommendationDetail::Query { optimized_query, .. } => !optimized_query.is_empty(),
            RecommendationDetail::Schema { ddl, .. } => !ddl.is_empty(),
            RecommendationDetail::Resource { target, settings_after, .. } => {
                !target.is_empty() && !settings_after.is_null()
            },
        }
    }

    /// Identifier of the object the recommendation targets.
    pub fn target_id(&self) -> String {
        match self {
            RecommendationDetail::Query { original_query, .. } => {
                format!("query:{}", &original_query.chars().take(64).collect::<String>())
            },
            RecommendationDetail::Schema { dataset, table, .. } => {
                format!("table:{}.{}", dataset, table)
            },
            RecommendationDetail::Resource { target, .. } => format!("resource:{}", target),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationStatus {
    New,
    Reviewed,
    Approved,
    Rejected,
    Implemented,
    Expired,
}

impl RecommendationStatus {
    /// Lifecycle is one-directional:
    /// NEW -> {REVIEWED, APPROVED, REJECTED, EXPIRED},
    /// REVIEWED -> {APPROVED, REJECTED, EXPIRED},
    /// APPROVED -> IMPLEMENTED. Terminal states allow nothing.
    pub fn can_transition_to(&self, next: RecommendationStatus) -> bool {
        use RecommendationStatus::*;
        match self {
            New => matches!(next, Reviewed | Approved | Rejected | Expired),
            Reviewed => matches!(next, Approved | Rejected | Expired),
            Approved => matches!(next, Implemented),
            Rejected | Implemented | Expired => false,
        }
    }
}

/// Canonical recommendation record as persisted in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommendation_id: String,
    pub optimization_type: OptimizationType,
    pub detail: RecommendationDetail,
    pub description: String,
    pub rationale: String,
    pub impact: Impact,
    pub priority_score: f64,
    pub priority: PriorityLevel,
    /// Analyzer confidence that the change is beneficial, 0..1.
    pub confidence_score: f64,
    pub requires_manual_approval: bool,
    pub business_critical: bool,
    pub implementation_steps: Vec<String>,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn new(
        optimization_type: OptimizationType,
        detail: RecommendationDetail,
        description: impl Into<String>,
        rationale: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            recommendation_id: Uuid::new_v4().to_string(),
            optimization_type,
            detail,
            description: description.into(),
            rationale: rationale.into(),
            impact: Impact::default(),
            priority_score: 0.0,
            priority: PriorityLevel::Low,
            confidence_score: 0.0,
            requires_manual_approval: false,
            business_critical: false,
            implementation_steps: Vec::new(),
            status: RecommendationStatus::New,
            created_at: now,
            expires_at: now + ttl,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        // Only untouched records expire; anything already decided keeps
        // its terminal status.
        matches!(
            self.status,
            RecommendationStatus::New | RecommendationStatus::Reviewed
        ) && now >= self.expires_at
    }
}
