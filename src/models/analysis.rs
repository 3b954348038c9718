//! Query analysis result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pattern::{AntiPattern, Pattern};
use super::recommendation::{Confidence, OptimizationRecommendation};

/// One join extracted from the query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinInfo {
    /// Normalized join keyword, e.g. `INNER`, `LEFT`, `CROSS`.
    pub join_type: String,
    pub table: String,
    /// ON condition text; `None` for joins written without one.
    pub condition: Option<String>,
}

/// Structural extraction of a query. Best-effort regex parsing, not a full
/// SQL parse; misfires degrade to empty collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureAnalysis {
    pub tables: Vec<String>,
    pub joins: Vec<JoinInfo>,
    /// Top-level WHERE predicates, split on AND/OR.
    pub predicates: Vec<String>,
    /// Aggregate function calls found in the select list.
    pub aggregations: Vec<String>,
    pub group_by_columns: Vec<String>,
    pub subquery_count: usize,
    pub cte_names: Vec<String>,
    pub select_star: bool,
    pub has_where: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

/// Weighted complexity of a query:
/// tables x1 + joins x2 + subqueries x3 + filters x1 + aggregations x2.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    pub table_count: usize,
    pub join_count: usize,
    pub subquery_count: usize,
    pub filter_count: usize,
    pub aggregation_count: usize,
    pub complexity_score: u32,
}

impl ComplexityMetrics {
    pub fn from_structure(structure: &StructureAnalysis) -> Self {
        let table_count = structure.tables.len();
        let join_count = structure.joins.len();
        let subquery_count = structure.subquery_count;
        let filter_count = structure.predicates.len();
        let aggregation_count = structure.aggregations.len();

        let complexity_score = (table_count
            + join_count * 2
            + subquery_count * 3
            + filter_count
            + aggregation_count * 2) as u32;

        Self {
            table_count,
            join_count,
            subquery_count,
            filter_count,
            aggregation_count,
            complexity_score,
        }
    }

    pub fn level(&self) -> ComplexityLevel {
        match self.complexity_score {
            0..=5 => ComplexityLevel::Low,
            6..=15 => ComplexityLevel::Medium,
            _ => ComplexityLevel::High,
        }
    }
}

/// One stage of an execution plan, normalized from BigQuery plan JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStage {
    pub name: String,
    pub slot_ms: f64,
    pub records_read: f64,
    pub records_written: f64,
    pub shuffle_output_bytes: f64,
    /// Step kinds observed in this stage (READ, FILTER, AGGREGATE, ...).
    pub step_kinds: Vec<String>,
    pub has_filter: bool,
}

/// Stage-level cost rollup of an execution plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanAnalysis {
    pub stage_count: usize,
    pub total_slot_ms: f64,
    pub total_records_read: f64,
    pub total_records_written: f64,
    pub total_shuffle_bytes: f64,
    pub aggregate_stage_count: usize,
    pub stages: Vec<PlanStage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTrend {
    Improving,
    Degrading,
    Stable,
    #[default]
    Unknown,
}

/// Historical execution statistics for one query hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPerformance {
    pub sample_count: usize,
    pub avg_elapsed_ms: f64,
    pub avg_bytes_processed: f64,
    pub trend: PerformanceTrend,
}

/// Consolidated result of analyzing one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query: String,
    /// SHA-256 of the normalized query text; cache key.
    pub query_hash: String,
    /// Structural fingerprint (tables/joins/predicates, literals ignored).
    pub query_fingerprint: String,
    pub structure: StructureAnalysis,
    pub complexity: ComplexityMetrics,
    pub plan_analysis: Option<PlanAnalysis>,
    pub patterns: Vec<Pattern>,
    pub anti_patterns: Vec<AntiPattern>,
    pub recommendations: Vec<OptimizationRecommendation>,
    pub historical_performance: HistoricalPerformance,
    pub analyzed_at: DateTime<Utc>,
}

/// Heuristic cost estimate for running a query once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub estimated_cost_usd: f64,
    pub confidence: Confidence,
    pub estimated_bytes_processed: f64,
    pub cost_factors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_weighted_sum() {
        let structure = StructureAnalysis {
            tables: vec!["a".into(), "b".into()],
            joins: vec![JoinInfo {
                join_type: "INNER".into(),
                table: "b".into(),
                condition: Some("a.id = b.id".into()),
            }],
            predicates: vec!["a.x = ?".into(), "b.y > ?".into()],
            aggregations: vec!["count(*)".into()],
            subquery_count: 1,
            ..Default::default()
        };
        let metrics = ComplexityMetrics::from_structure(&structure);
        // 2 + 1*2 + 1*3 + 2 + 1*2 = 11
        assert_eq!(metrics.complexity_score, 11);
        assert_eq!(metrics.level(), ComplexityLevel::Medium);
    }

    #[test]
    fn test_complexity_levels() {
        let empty = ComplexityMetrics::default();
        assert_eq!(empty.level(), ComplexityLevel::Low);

        let high = ComplexityMetrics { complexity_score: 16, ..Default::default() };
        assert_eq!(high.level(), ComplexityLevel::High);
    }

    #[test]
    fn test_trend_default_unknown() {
        let hist = HistoricalPerformance::default();
        assert_eq!(hist.trend, PerformanceTrend::Unknown);
        assert_eq!(hist.sample_count, 0);
    }
}
