//! Pattern detection model
//!
//! A `Pattern` is one low-level finding produced by the pattern engine for a
//! single query analysis. Patterns are immutable once created and embedded
//! in analysis results; they are never persisted on their own.

use serde::{Deserialize, Serialize};

/// Where a pattern was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    /// Matched against the normalized query text.
    Syntax,
    /// Derived from the extracted table/join/predicate structure.
    Structure,
    /// Derived from an execution plan.
    Plan,
}

impl PatternType {
    /// Plan findings are backed by real execution data and weigh more than
    /// text-level matches.
    fn score_multiplier(&self) -> f64 {
        match self {
            PatternType::Plan => 1.2,
            PatternType::Structure => 1.0,
            PatternType::Syntax => 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Severity {
    fn base_score(&self) -> f64 {
        match self {
            Severity::High => 8.0,
            Severity::Medium => 5.0,
            Severity::Low => 2.0,
        }
    }
}

/// Optimization technique or change family implied by a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizationType {
    PredicatePushdown,
    JoinReordering,
    SubqueryFlattening,
    ColumnPruning,
    AggregationOptimization,
    CteConversion,
    PartitionFiltering,
    Partitioning,
    Clustering,
    SchemaChange,
    SlotAllocation,
}

impl OptimizationType {
    /// True for changes that alter table structure and therefore always go
    /// through the approval gate.
    pub fn is_schema_altering(&self) -> bool {
        matches!(
            self,
            OptimizationType::Partitioning
                | OptimizationType::Clustering
                | OptimizationType::SchemaChange
        )
    }
}

/// One detected inefficiency in a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Stable rule identifier, e.g. `CARTESIAN_JOIN`.
    pub pattern_id: String,
    pub pattern_type: PatternType,
    pub description: String,
    pub severity: Severity,
    pub optimization_type: OptimizationType,
    /// Rule-specific evidence (matched text, row counts, stage names).
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Pattern {
    /// Impact score in [0, 10]: severity base x pattern-type multiplier,
    /// nudged upward when the pattern evidences a large scan.
    pub fn get_impact_score(&self) -> f64 {
        let mut score = self.severity.base_score() * self.pattern_type.score_multiplier();

        if let Some(records) = self.details.get("records_scanned").and_then(|v| v.as_f64()) {
            if records > 1_000_000_000.0 {
                score += 1.5;
            } else if records > 1_000_000.0 {
                score += 0.5;
            }
        }

        score.clamp(0.0, 10.0)
    }
}

/// High-level description of an inefficiency, derived from one or more
/// patterns and de-duplicated by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiPattern {
    pub anti_pattern_id: String,
    pub description: String,
    pub impact: Severity,
    pub recommendation: String,
    #[serde(default)]
    pub details: serde_json::Value,
}
