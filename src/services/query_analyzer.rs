//! Query analyzer
//!
//! Orchestrates one query through normalization, pattern detection, plan
//! rollup, execution history and cost estimation. Backend failures degrade
//! to partial results; only an empty query is an input error.

use std::sync::Arc;

use crate::backends::{DocumentStore, QueryEngine};
use crate::models::{
    ComplexityMetrics, Confidence, CostEstimate, EstimatedImprovement, HistoricalPerformance,
    OptimizationRecommendation, Pattern, PerformanceTrend, PlanAnalysis, PlanStage, QueryAnalysis,
};
use crate::services::pattern_engine::{self, PatternEngine};
use crate::utils::{AdvisorError, AdvisorResult, TtlCache};

/// On-demand query pricing, USD per TiB scanned.
pub const PRICE_PER_TB_USD: f64 = 5.0;
const BYTES_PER_TB: f64 = 1_099_511_627_776.0;

/// Fallback per-table scan size when neither history nor a plan is
/// available.
const DEFAULT_TABLE_BYTES: f64 = 1_000_000_000.0;

/// Collection holding per-execution history documents keyed by query hash.
pub const QUERY_HISTORY_COLLECTION: &str = "query_history";

pub struct QueryAnalyzer {
    engine: Arc<dyn QueryEngine>,
    store: Arc<dyn DocumentStore>,
    pattern_engine: Arc<PatternEngine>,
    cache: TtlCache<String, QueryAnalysis>,
}

impl QueryAnalyzer {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        store: Arc<dyn DocumentStore>,
        pattern_engine: Arc<PatternEngine>,
        cache: TtlCache<String, QueryAnalysis>,
    ) -> Self {
        Self { engine, store, pattern_engine, cache }
    }

    /// Full analysis of one query. Plan and history lookups are best-effort:
    /// a failing backend downgrades the result instead of failing it.
    /// `get_plan = false` skips the plan round-trip entirely; a cache hit
    /// may still carry a plan from an earlier call.
    pub async fn analyze_query(
        &self,
        query: &str,
        use_cache: bool,
        get_plan: bool,
    ) -> AdvisorResult<QueryAnalysis> {
        if query.trim().is_empty() {
            return Err(AdvisorError::invalid_input("query must not be empty"));
        }

        let query_hash = pattern_engine::query_hash(query);
        if use_cache
            && let Some(cached) = self.cache.get(&query_hash)
        {
            tracing::debug!(query_hash = %query_hash, "analysis cache hit");
            return Ok(cached);
        }

        let plan_analysis = if get_plan {
            match self.engine.get_query_plan(query).await {
                Ok(plan_json) => parse_plan(&plan_json),
                Err(err) => {
                    tracing::warn!(error = %err, "plan fetch failed; continuing without plan");
                    None
                },
            }
        } else {
            None
        };

        let historical_performance = self.fetch_history(&query_hash).await;

        let structure = pattern_engine::extract_structure(query);
        let complexity = ComplexityMetrics::from_structure(&structure);
        let report =
            self.pattern_engine
                .identify_patterns(query, plan_analysis.as_ref(), use_cache);
        let recommendations = recommendations_from_patterns(&report.patterns);

        let analysis = QueryAnalysis {
            query: query.to_string(),
            query_hash: query_hash.clone(),
            query_fingerprint: report.query_fingerprint,
            structure,
            complexity,
            plan_analysis,
            patterns: report.patterns,
            anti_patterns: report.anti_patterns,
            recommendations,
            historical_performance,
            analyzed_at: chrono::Utc::now(),
        };

        if use_cache {
            self.cache.put(query_hash, analysis.clone());
        }
        Ok(analysis)
    }

    /// Recommendations only, sorted by descending impact.
    pub async fn get_optimization_recommendations(
        &self,
        query: &str,
    ) -> AdvisorResult<Vec<OptimizationRecommendation>> {
        let analysis = self.analyze_query(query, true, true).await?;
        let mut recs = analysis.recommendations;
        recs.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score));
        Ok(recs)
    }

    /// Cost estimate at on-demand pricing. Confidence tracks the data
    /// source: 10+ history samples is high, any history is medium, a
    /// structural guess is low.
    pub async fn estimate_query_cost(&self, query: &str) -> AdvisorResult<CostEstimate> {
        if query.trim().is_empty() {
            return Err(AdvisorError::invalid_input("query must not be empty"));
        }

        let query_hash = pattern_engine::query_hash(query);
        let history = self.fetch_history(&query_hash).await;

        let (bytes, confidence, mut cost_factors) = if history.sample_count >= 10 {
            (
                history.avg_bytes_processed,
                Confidence::High,
                vec![format!("average over {} recorded executions", history.sample_count)],
            )
        } else if history.sample_count > 0 {
            (
                history.avg_bytes_processed,
                Confidence::Medium,
                vec![format!(
                    "average over only {} recorded executions",
                    history.sample_count
                )],
            )
        } else {
            let structure = pattern_engine::extract_structure(query);
            let table_count = structure.tables.len().max(1);
            (
                table_count as f64 * DEFAULT_TABLE_BYTES,
                Confidence::Low,
                vec![format!(
                    "no execution history; assumed {} bytes per referenced table",
                    DEFAULT_TABLE_BYTES
                )],
            )
        };

        cost_factors.push(format!("on-demand pricing at ${}/TB", PRICE_PER_TB_USD));

        Ok(CostEstimate {
            estimated_cost_usd: bytes / BYTES_PER_TB * PRICE_PER_TB_USD,
            confidence,
            estimated_bytes_processed: bytes,
            cost_factors,
        })
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn fetch_history(&self, query_hash: &str) -> HistoricalPerformance {
        let filters = [("query_hash".to_string(), serde_json::json!(query_hash))];
        let docs = match self
            .store
            .query_documents(QUERY_HISTORY_COLLECTION, &filters)
            .await
        {
            Ok(docs) => docs,
            Err(err) => {
                tracing::warn!(error = %err, "history lookup failed; continuing without history");
                return HistoricalPerformance::default();
            },
        };
        summarize_history(&docs)
    }
}

pub(crate) fn json_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        // BigQuery job statistics serialize counters as strings.
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field_f64(obj: &serde_json::Value, field: &str) -> f64 {
    obj.get(field).and_then(json_f64).unwrap_or(0.0)
}

/// Roll execution history documents up into one summary. Trend compares
/// the recent half against the older half with a 10% dead band.
pub(crate) fn summarize_history(docs: &[serde_json::Value]) -> HistoricalPerformance {
    if docs.is_empty() {
        return HistoricalPerformance::default();
    }

    let mut runs: Vec<(String, f64, f64)> = docs
        .iter()
        .map(|d| {
            (
                d.get("executed_at")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                field_f64(d, "elapsed_ms"),
                field_f64(d, "bytes_processed"),
            )
        })
        .collect();
    runs.sort_by(|a, b| a.0.cmp(&b.0));

    let count = runs.len();
    let avg_elapsed_ms = runs.iter().map(|r| r.1).sum::<f64>() / count as f64;
    let avg_bytes_processed = runs.iter().map(|r| r.2).sum::<f64>() / count as f64;

    let trend = if count < 4 {
        PerformanceTrend::Unknown
    } else {
        let mid = count / 2;
        let older: f64 = runs[..mid].iter().map(|r| r.1).sum::<f64>() / mid as f64;
        let recent: f64 = runs[mid..].iter().map(|r| r.1).sum::<f64>() / (count - mid) as f64;
        if older <= 0.0 {
            PerformanceTrend::Unknown
        } else if recent < older * 0.9 {
            PerformanceTrend::Improving
        } else if recent > older * 1.1 {
            PerformanceTrend::Degrading
        } else {
            PerformanceTrend::Stable
        }
    };

    HistoricalPerformance { sample_count: count, avg_elapsed_ms, avg_bytes_processed, trend }
}

/// Parse BigQuery plan JSON into a stage rollup. Accepts `queryPlan` or
/// `executionPlan` wrappers or a bare stage array; anything else is `None`.
pub(crate) fn parse_plan(plan_json: &serde_json::Value) -> Option<PlanAnalysis> {
    let stages_json = plan_json
        .get("queryPlan")
        .or_else(|| plan_json.get("executionPlan"))
        .unwrap_or(plan_json)
        .as_array()?;

    let stages: Vec<PlanStage> = stages_json
        .iter()
        .map(|stage| {
            let step_kinds: Vec<String> = stage
                .get("steps")
                .and_then(|s| s.as_array())
                .map(|steps| {
                    steps
                        .iter()
                        .filter_map(|s| s.get("kind").and_then(|k| k.as_str()))
                        .map(|k| k.to_uppercase())
                        .collect()
                })
                .unwrap_or_default();
            let has_filter = step_kinds.iter().any(|k| k == "FILTER");

            PlanStage {
                name: stage
                    .get("name")
                    .and_then(|n| n.as_str())
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| {
                        stage
                            .get("id")
                            .and_then(json_f64)
                            .map(|id| format!("S{:02}", id as u64))
                            .unwrap_or_else(|| "S??".to_string())
                    }),
                slot_ms: field_f64(stage, "slotMs"),
                records_read: field_f64(stage, "recordsRead"),
                records_written: field_f64(stage, "recordsWritten"),
                shuffle_output_bytes: field_f64(stage, "shuffleOutputBytes"),
                step_kinds,
                has_filter,
            }
        })
        .collect();

    if stages.is_empty() {
        return None;
    }

    Some(PlanAnalysis {
        stage_count: stages.len(),
        total_slot_ms: stages.iter().map(|s| s.slot_ms).sum(),
        total_records_read: stages.iter().map(|s| s.records_read).sum(),
        total_records_written: stages.iter().map(|s| s.records_written).sum(),
        total_shuffle_bytes: stages.iter().map(|s| s.shuffle_output_bytes).sum(),
        aggregate_stage_count: stages
            .iter()
            .filter(|s| s.step_kinds.iter().any(|k| k == "AGGREGATE"))
            .count(),
        stages,
    })
}

/// Expected improvement per pattern, scaled by the pattern's impact score.
fn improvement_for(pattern: &Pattern) -> EstimatedImprovement {
    let (base_pct, confidence, metrics): (f64, Confidence, &[&str]) = match pattern
        .pattern_id
        .as_str()
    {
        "UNPARTITIONED_SCAN" => (80.0, Confidence::High, &["bytes_processed", "cost"]),
        "CARTESIAN_JOIN" | "MISSING_JOIN_CONDITION" => {
            (70.0, Confidence::High, &["elapsed_ms", "slot_ms"])
        },
        "FULL_SCAN_NO_FILTER" => (60.0, Confidence::High, &["bytes_processed", "elapsed_ms"]),
        "MISSING_WHERE_CLAUSE" => (50.0, Confidence::Medium, &["bytes_processed"]),
        "LARGE_SHUFFLE" => (40.0, Confidence::Medium, &["shuffle_bytes", "slot_ms"]),
        "NESTED_SUBQUERIES" | "NOT_IN_SUBQUERY" => (35.0, Confidence::Medium, &["elapsed_ms"]),
        "MULTI_STAGE_AGGREGATION" | "HIGH_IO_RATIO" => {
            (30.0, Confidence::Medium, &["slot_ms"])
        },
        "SELECT_STAR" | "UNNECESSARY_COLUMNS" | "DISTINCT_STAR" => {
            (25.0, Confidence::Medium, &["bytes_processed"])
        },
        "LIKE_LEADING_WILDCARD" | "FUNCTION_ON_FILTER_COLUMN" => {
            (20.0, Confidence::Low, &["elapsed_ms"])
        },
        _ => (15.0, Confidence::Low, &["elapsed_ms"]),
    };

    // A pattern scoring 10/10 keeps the full base percentage.
    let percentage = base_pct * (pattern.get_impact_score() / 10.0);
    EstimatedImprovement {
        percentage,
        confidence,
        metrics: metrics.iter().map(|m| m.to_string()).collect(),
    }
}

fn recommendations_from_patterns(patterns: &[Pattern]) -> Vec<OptimizationRecommendation> {
    let mut recs: Vec<OptimizationRecommendation> = patterns
        .iter()
        .map(|pattern| OptimizationRecommendation {
            optimization_type: pattern.optimization_type,
            description: pattern_engine::rules::optimization_hint(pattern.optimization_type)
                .to_string(),
            rationale: pattern.description.clone(),
            impact_score: pattern.get_impact_score(),
            original_snippet: String::new(),
            optimized_snippet: String::new(),
            estimated_improvement: improvement_for(pattern),
        })
        .collect();
    recs.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score));
    recs
}
