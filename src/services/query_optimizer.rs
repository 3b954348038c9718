//! Query optimizer
//!
//! Applies heuristic rewrite techniques to a query, optionally validates
//! result-set equivalence by sampled comparison and reports a plan-level
//! performance diff. Rewrites are conservative text transforms: a technique
//! that cannot prove its precondition leaves the query untouched.
//!
//! The equivalence check is sampling-based, not a proof: two queries that
//! agree on the sampled rows can still differ on full data.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backends::QueryEngine;
use crate::models::OptimizationType;
use crate::services::pattern_engine::{self, extract_structure};
use crate::services::query_analyzer::parse_plan;
use crate::utils::{AdvisorError, AdvisorResult, TtlCache};

/// Sampling parameters for the equivalence check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Rows sampled from each side. Higher catches more divergence at
    /// higher cost.
    pub row_limit: u32,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self { row_limit: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceReport {
    pub is_equivalent: bool,
    pub details: String,
    pub sampled_rows: u32,
}

/// Plan-level diff between the original and optimized query. Positive
/// percentages are improvements; negative values are regressions and are
/// reported as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceComparison {
    pub slot_ms_improvement_pct: f64,
    pub records_read_improvement_pct: f64,
    pub shuffle_bytes_improvement_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub original_query: String,
    pub optimized_query: String,
    /// Techniques that actually changed the query, in application order.
    pub applied_techniques: Vec<OptimizationType>,
    /// One line per applied technique describing what it did.
    pub notes: Vec<String>,
    pub performance_comparison: Option<PerformanceComparison>,
    pub equivalence: Option<EquivalenceReport>,
}

const REWRITE_TECHNIQUES: &[OptimizationType] = &[
    OptimizationType::PredicatePushdown,
    OptimizationType::JoinReordering,
    OptimizationType::SubqueryFlattening,
    OptimizationType::ColumnPruning,
    OptimizationType::AggregationOptimization,
    OptimizationType::CteConversion,
];

pub struct QueryOptimizer {
    engine: Arc<dyn QueryEngine>,
    cache: TtlCache<String, OptimizationResult>,
}

impl QueryOptimizer {
    pub fn new(engine: Arc<dyn QueryEngine>, cache: TtlCache<String, OptimizationResult>) -> Self {
        Self { engine, cache }
    }

    /// Apply the given techniques in order. Technique interaction is
    /// caller-controlled: each transform sees the output of the previous
    /// one and nothing is reordered automatically.
    pub async fn optimize_query(
        &self,
        query: &str,
        techniques: &[OptimizationType],
        validate: bool,
        use_cache: bool,
    ) -> AdvisorResult<OptimizationResult> {
        if query.trim().is_empty() {
            return Err(AdvisorError::invalid_input("query must not be empty"));
        }
        for technique in techniques {
            if !REWRITE_TECHNIQUES.contains(technique) {
                return Err(AdvisorError::invalid_input(format!(
                    "{:?} is not a query rewrite technique",
                    technique
                )));
            }
        }

        let cache_key = cache_key(query, techniques, validate);
        if use_cache
            && let Some(cached) = self.cache.get(&cache_key)
        {
            tracing::debug!("optimization cache hit");
            return Ok(cached);
        }

        let mut current = query.to_string();
        let mut applied_techniques = Vec::new();
        let mut notes = Vec::new();

        for &technique in techniques {
            let outcome = match technique {
                OptimizationType::PredicatePushdown => push_down_predicates(&current),
                OptimizationType::JoinReordering => rewrite_cross_join(&current),
                OptimizationType::SubqueryFlattening => flatten_not_in(&current),
                OptimizationType::ColumnPruning => self.prune_columns(&current).await,
                OptimizationType::AggregationOptimization => approximate_count_distinct(&current),
                OptimizationType::CteConversion => lift_repeated_subquery(&current),
                _ => None,
            };
            if let Some((rewritten, note)) = outcome
                && rewritten != current
            {
                tracing::debug!(technique = ?technique, "rewrite applied");
                current = rewritten;
                applied_techniques.push(technique);
                notes.push(note);
            }
        }

        let changed = current != query;
        let equivalence = if validate && changed {
            Some(
                self.validate_query_equivalence(query, &current, &ValidationOptions::default())
                    .await?,
            )
        } else {
            None
        };
        let performance_comparison = if changed {
            match self.compare_query_performance(query, &current).await {
                Ok(cmp) => Some(cmp),
                Err(err) => {
                    tracing::warn!(error = %err, "performance comparison unavailable");
                    None
                },
            }
        } else {
            None
        };

        let result = OptimizationResult {
            original_query: query.to_string(),
            optimized_query: current,
            applied_techniques,
            notes,
            performance_comparison,
            equivalence,
        };
        if use_cache {
            self.cache.put(cache_key, result.clone());
        }
        Ok(result)
    }

    /// Sampled equivalence check: run both queries with a row limit and
    /// compare column sets and row content. Any mismatch means not
    /// equivalent; a match is evidence, not proof.
    pub async fn validate_query_equivalence(
        &self,
        original: &str,
        optimized: &str,
        options: &ValidationOptions,
    ) -> AdvisorResult<EquivalenceReport> {
        let original_rows = self
            .engine
            .execute_query(&sampled(original, options.row_limit))
            .await?;
        let optimized_rows = self
            .engine
            .execute_query(&sampled(optimized, options.row_limit))
            .await?;

        let original_cols = column_set(&original_rows);
        let optimized_cols = column_set(&optimized_rows);
        if original_cols != optimized_cols {
            return Ok(EquivalenceReport {
                is_equivalent: false,
                details: format!(
                    "column mismatch: {:?} vs {:?}",
                    original_cols, optimized_cols
                ),
                sampled_rows: options.row_limit,
            });
        }

        if canonical_rows(&original_rows) != canonical_rows(&optimized_rows) {
            return Ok(EquivalenceReport {
                is_equivalent: false,
                details: format!(
                    "row content mismatch over {} vs {} sampled rows",
                    original_rows.len(),
                    optimized_rows.len()
                ),
                sampled_rows: options.row_limit,
            });
        }

        Ok(EquivalenceReport {
            is_equivalent: true,
            details: format!("{} sampled rows matched", original_rows.len()),
            sampled_rows: options.row_limit,
        })
    }

    /// Plan-level diff between two query versions. Negative improvement is
    /// a regression and is surfaced unclamped.
    pub async fn compare_query_performance(
        &self,
        original: &str,
        optimized: &str,
    ) -> AdvisorResult<PerformanceComparison> {
        let original_plan = parse_plan(&self.engine.get_query_plan(original).await?)
            .ok_or_else(|| AdvisorError::backend("unparseable plan for original query"))?;
        let optimized_plan = parse_plan(&self.engine.get_query_plan(optimized).await?)
            .ok_or_else(|| AdvisorError::backend("unparseable plan for optimized query"))?;

        Ok(PerformanceComparison {
            slot_ms_improvement_pct: improvement_pct(
                original_plan.total_slot_ms,
                optimized_plan.total_slot_ms,
            ),
            records_read_improvement_pct: improvement_pct(
                original_plan.total_records_read,
                optimized_plan.total_records_read,
            ),
            shuffle_bytes_improvement_pct: improvement_pct(
                original_plan.total_shuffle_bytes,
                optimized_plan.total_shuffle_bytes,
            ),
        })
    }

    pub fn clear_optimization_cache(&self) {
        self.cache.clear();
    }

    /// Replace `SELECT *` on a single-table query with the table's column
    /// list from the catalog. Catalog failures leave the query untouched.
    async fn prune_columns(&self, query: &str) -> Option<(String, String)> {
        let structure = extract_structure(query);
        if !structure.select_star || structure.tables.len() != 1 {
            return None;
        }
        let table_ref = &structure.tables[0];
        let (dataset, table) = table_ref.rsplit_once('.')?;

        let columns = match self.engine.get_table_schema(dataset, table).await {
            Ok(cols) => cols,
            Err(err) => {
                tracing::warn!(error = %err, table = %table_ref, "schema fetch failed; skipping column pruning");
                return None;
            },
        };
        if columns.is_empty() {
            return None;
        }

        let column_list = columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let rewritten = SELECT_STAR_RE
            .replace(query, format!("SELECT {}", column_list).as_str())
            .into_owned();
        Some((
            rewritten,
            format!("replaced SELECT * with {} explicit columns", columns.len()),
        ))
    }
}

fn cache_key(query: &str, techniques: &[OptimizationType], validate: bool) -> String {
    let technique_tags: Vec<String> = techniques.iter().map(|t| format!("{:?}", t)).collect();
    pattern_engine::sha256_hex(&format!(
        "{}|{}|{}",
        pattern_engine::normalize_query(query),
        technique_tags.join(","),
        validate
    ))
}

fn sampled(query: &str, row_limit: u32) -> String {
    format!("SELECT * FROM ({}) LIMIT {}", query.trim().trim_end_matches(';'), row_limit)
}

fn column_set(rows: &[serde_json::Value]) -> Vec<String> {
    let mut cols: Vec<String> = rows
        .iter()
        .filter_map(|r| r.as_object())
        .flat_map(|o| o.keys().cloned())
        .collect();
    cols.sort();
    cols.dedup();
    cols
}

fn canonical_rows(rows: &[serde_json::Value]) -> Vec<String> {
    let mut out: Vec<String> = rows.iter().map(|r| r.to_string()).collect();
    out.sort();
    out
}

fn improvement_pct(original: f64, optimized: f64) -> f64 {
    if original <= 0.0 {
        return 0.0;
    }
    (original - optimized) / original * 100.0
}

// ============================================================================
// Pure rewrite transforms
// ============================================================================

static SELECT_STAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bselect\s+\*").unwrap());

static DERIVED_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    // Non-nested derived table with an alias.
    Regex::new(r"(?i)(\(\s*select\b[^()]*\))\s+(?:as\s+)?([a-zA-Z_]\w*)").unwrap()
});

static CROSS_JOIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([a-zA-Z_][\w.]*)\s+cross\s+join\s+([a-zA-Z_][\w.]*)").unwrap()
});

static NOT_IN_SUBQUERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b([a-zA-Z_][\w.]*)\s+not\s+in\s*\(\s*select\s+([a-zA-Z_][\w.]*)\s+from\s+(`[^`]+`|[a-zA-Z_][\w.]*)\s*\)",
    )
    .unwrap()
});

static COUNT_DISTINCT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bcount\s*\(\s*distinct\s+([^()]+?)\s*\)").unwrap()
});

static FROM_DERIVED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:from|join)\s+(\(\s*select\b[^()]*\))").unwrap()
});

static INNER_TAIL_KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:group\s+by|order\s+by|limit|having)\b").unwrap());

static INNER_WHERE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwhere\b").unwrap());

/// Push an outer predicate on a derived-table alias into the derived table.
/// The outer copy stays in place, so the rewrite is equivalence-safe: the
/// inner filter only removes rows the outer filter would drop anyway.
fn push_down_predicates(query: &str) -> Option<(String, String)> {
    let structure = extract_structure(query);
    let captures = DERIVED_TABLE_RE.captures(query)?;
    let derived = captures.get(1)?;
    let alias = captures.get(2)?.as_str();

    // Joins may bind a bare word after the derived table; skip keywords.
    if matches!(alias.to_lowercase().as_str(), "on" | "where" | "inner" | "left" | "right" | "cross" | "join" | "group" | "order") {
        return None;
    }

    let prefix = format!("{}.", alias.to_lowercase());
    let predicate = structure
        .predicates
        .iter()
        .find(|p| p.to_lowercase().starts_with(&prefix))?;
    let alias_re = Regex::new(&format!(r"(?i)\b{}\.", regex::escape(alias))).ok()?;
    let pushed = strip_alias_qualifier(predicate, &alias_re);

    let inner = derived.as_str();
    // Appending at the end is only safe while the subquery has no tail
    // clauses after its WHERE.
    if INNER_TAIL_KEYWORD_RE.is_match(inner) {
        return None;
    }
    let body = inner[..inner.len() - 1].trim_end();
    let new_inner = if INNER_WHERE_RE.is_match(body) {
        format!("{} AND {})", body, pushed)
    } else {
        format!("{} WHERE {})", body, pushed)
    };

    let mut rewritten = String::with_capacity(query.len() + new_inner.len());
    rewritten.push_str(&query[..derived.start()]);
    rewritten.push_str(&new_inner);
    rewritten.push_str(&query[derived.end()..]);
    Some((
        rewritten,
        format!("pushed predicate `{}` into derived table {}", predicate, alias),
    ))
}

/// Remove `alias.` qualifiers from column references, leaving quoted
/// literals untouched and the predicate text otherwise as written.
/// Case-sensitive comparisons stay correct after the push.
fn strip_alias_qualifier(predicate: &str, alias_re: &Regex) -> String {
    predicate
        .split('\'')
        .enumerate()
        .map(|(i, segment)| {
            // Odd segments sit inside single-quoted literals.
            if i % 2 == 0 {
                alias_re.replace_all(segment, "").into_owned()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("'")
}

/// Turn a CROSS JOIN into an INNER JOIN when an outer predicate already
/// links the two tables. The predicate stays in the WHERE clause too.
fn rewrite_cross_join(query: &str) -> Option<(String, String)> {
    let structure = extract_structure(query);
    let captures = CROSS_JOIN_RE.captures(query)?;
    let whole = captures.get(0)?;
    let left = captures.get(1)?.as_str();
    let right = captures.get(2)?.as_str();

    let left_tag = format!("{}.", last_segment(left).to_lowercase());
    let right_tag = format!("{}.", last_segment(right).to_lowercase());
    let predicate = structure.predicates.iter().find(|p| {
        let p = p.to_lowercase();
        p.contains(&left_tag) && p.contains(&right_tag)
    })?;

    let mut rewritten = String::with_capacity(query.len() + predicate.len());
    rewritten.push_str(&query[..whole.start()]);
    rewritten.push_str(&format!("{} INNER JOIN {} ON {}", left, right, predicate));
    rewritten.push_str(&query[whole.end()..]);
    Some((
        rewritten,
        format!("converted CROSS JOIN to INNER JOIN on `{}`", predicate),
    ))
}

/// Rewrite `x NOT IN (SELECT col FROM t)` as a NOT EXISTS correlation.
/// Unlike NOT IN, NOT EXISTS ignores NULLs in the subquery output, which
/// is also why the rewrite is usually what the author meant.
fn flatten_not_in(query: &str) -> Option<(String, String)> {
    let captures = NOT_IN_SUBQUERY_RE.captures(query)?;
    let whole = captures.get(0)?;
    let outer = captures.get(1)?.as_str();
    let column = captures.get(2)?.as_str();
    let table = captures.get(3)?.as_str();

    let inner_column = if column.contains('.') {
        column.to_string()
    } else {
        format!("{}.{}", last_segment(&table.replace('`', "")), column)
    };
    let replacement = format!(
        "NOT EXISTS (SELECT 1 FROM {} WHERE {} = {})",
        table, inner_column, outer
    );

    let mut rewritten = String::with_capacity(query.len() + replacement.len());
    rewritten.push_str(&query[..whole.start()]);
    rewritten.push_str(&replacement);
    rewritten.push_str(&query[whole.end()..]);
    Some((
        rewritten,
        format!("rewrote `{} NOT IN (subquery)` as NOT EXISTS", outer),
    ))
}

/// Swap COUNT(DISTINCT x) for APPROX_COUNT_DISTINCT(x). Approximate:
/// expected to fail strict equivalence validation on high-cardinality
/// inputs, which the caller sees in the equivalence report.
fn approximate_count_distinct(query: &str) -> Option<(String, String)> {
    if !COUNT_DISTINCT_RE.is_match(query) {
        return None;
    }
    let rewritten = COUNT_DISTINCT_RE
        .replace_all(query, "APPROX_COUNT_DISTINCT($1)")
        .into_owned();
    Some((
        rewritten,
        "replaced COUNT(DISTINCT) with APPROX_COUNT_DISTINCT (approximate)".to_string(),
    ))
}

/// Lift a derived table that appears more than once into a WITH clause.
fn lift_repeated_subquery(query: &str) -> Option<(String, String)> {
    if query.trim_start().to_lowercase().starts_with("with") {
        return None;
    }

    let derived: Vec<&str> = FROM_DERIVED_RE
        .captures_iter(query)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    let repeated = derived
        .iter()
        .find(|d| derived.iter().filter(|o| o == d).count() > 1)?;

    let rewritten = format!(
        "WITH cte_1 AS {} {}",
        repeated,
        query.replace(repeated, "cte_1")
    );
    Some((rewritten, "lifted a repeated subquery into WITH cte_1".to_string()))
}

fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnInfo, TableMetadata};
    use crate::utils::AdvisorResult;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashMap;

    // ------------------------------------------------------------------
    // Pure transform tests
    // ------------------------------------------------------------------

    #[test]
    fn test_push_down_predicate_into_derived_table() {
        let q = "SELECT o.id FROM (SELECT id, total FROM sales.orders) o WHERE o.total > 100";
        let (rewritten, _) = push_down_predicates(q).expect("rewrite");
        assert!(rewritten.to_lowercase().contains("where total > 100) o"));
        // The outer filter stays.
        assert!(rewritten.contains("WHERE o.total > 100"));
    }

    #[test]
    fn test_push_down_preserves_literal_case() {
        let q = "SELECT o.id FROM (SELECT id, name FROM sales.orders) o WHERE o.name = 'Bob'";
        let (rewritten, _) = push_down_predicates(q).expect("rewrite");
        // The inner copy must filter on the literal exactly as written;
        // string comparison is case-sensitive.
        assert!(rewritten.contains("WHERE name = 'Bob') o"));
        assert!(rewritten.contains("WHERE o.name = 'Bob'"));
    }

    #[test]
    fn test_push_down_leaves_alias_inside_literal_alone() {
        let q = "SELECT o.id FROM (SELECT id, tag FROM events) o WHERE o.tag = 'o.special'";
        let (rewritten, _) = push_down_predicates(q).expect("rewrite");
        assert!(rewritten.contains("WHERE tag = 'o.special') o"));
    }

    #[test]
    fn test_push_down_skips_subquery_with_tail_clauses() {
        let q = "SELECT o.id FROM (SELECT id FROM t GROUP BY id) o WHERE o.id > 5";
        assert!(push_down_predicates(q).is_none());
    }

    #[test]
    fn test_cross_join_rewrite_uses_linking_predicate() {
        let q = "SELECT * FROM orders CROSS JOIN users WHERE orders.user_id = users.id";
        let (rewritten, _) = rewrite_cross_join(q).expect("rewrite");
        assert!(rewritten.contains("INNER JOIN users ON orders.user_id = users.id"));
        assert!(!rewritten.to_lowercase().contains("cross join"));
    }

    #[test]
    fn test_cross_join_without_link_untouched() {
        let q = "SELECT * FROM a CROSS JOIN b WHERE a.x = 1";
        assert!(rewrite_cross_join(q).is_none());
    }

    #[test]
    fn test_flatten_not_in() {
        let q = "SELECT id FROM orders WHERE user_id NOT IN (SELECT id FROM banned)";
        let (rewritten, _) = flatten_not_in(q).expect("rewrite");
        assert!(rewritten.contains("NOT EXISTS (SELECT 1 FROM banned WHERE banned.id = user_id)"));
    }

    #[test]
    fn test_approx_count_distinct() {
        let q = "SELECT COUNT(DISTINCT user_id) FROM events";
        let (rewritten, note) = approximate_count_distinct(q).expect("rewrite");
        assert!(rewritten.contains("APPROX_COUNT_DISTINCT(user_id)"));
        assert!(note.contains("approximate"));
    }

    #[test]
    fn test_cte_lift_requires_repetition() {
        let repeated = "SELECT * FROM (SELECT id FROM t) a JOIN (SELECT id FROM t) b ON a.id = b.id";
        let (rewritten, _) = lift_repeated_subquery(repeated).expect("rewrite");
        assert!(rewritten.starts_with("WITH cte_1 AS (SELECT id FROM t)"));
        assert!(rewritten.matches("cte_1").count() >= 3);

        let single = "SELECT * FROM (SELECT id FROM t) a";
        assert!(lift_repeated_subquery(single).is_none());
    }

    #[test]
    fn test_cte_lift_skips_existing_with() {
        let q = "WITH x AS (SELECT 1) SELECT * FROM (SELECT id FROM t) a JOIN (SELECT id FROM t) b ON a.id = b.id";
        assert!(lift_repeated_subquery(q).is_none());
    }

    #[test]
    fn test_improvement_pct_signs() {
        assert_eq!(improvement_pct(200.0, 100.0), 50.0);
        assert_eq!(improvement_pct(100.0, 150.0), -50.0);
        assert_eq!(improvement_pct(0.0, 10.0), 0.0);
    }

    // ------------------------------------------------------------------
    // Engine-backed tests
    // ------------------------------------------------------------------

    /// Rows per exact query text; other calls fail or return defaults.
    struct ScriptedEngine {
        rows: HashMap<String, Vec<serde_json::Value>>,
        default_rows: Vec<serde_json::Value>,
        plan: serde_json::Value,
        schema: Vec<ColumnInfo>,
    }

    impl ScriptedEngine {
        fn with_rows(default_rows: Vec<serde_json::Value>) -> Self {
            Self {
                rows: HashMap::new(),
                default_rows,
                plan: serde_json::json!({ "queryPlan": [
                    { "name": "S00", "slotMs": "100", "recordsRead": "1000",
                      "recordsWritten": "1000", "shuffleOutputBytes": "0",
                      "steps": [{ "kind": "READ" }] }
                ]}),
                schema: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl QueryEngine for ScriptedEngine {
        async fn execute_query(&self, sql: &str) -> AdvisorResult<Vec<serde_json::Value>> {
            Ok(self.rows.get(sql).cloned().unwrap_or_else(|| self.default_rows.clone()))
        }

        async fn execute_statement(&self, _sql: &str) -> AdvisorResult<u64> {
            Ok(0)
        }

        async fn get_query_plan(&self, _sql: &str) -> AdvisorResult<serde_json::Value> {
            Ok(self.plan.clone())
        }

        async fn get_table_metadata(
            &self,
            _dataset: &str,
            _table: &str,
        ) -> AdvisorResult<TableMetadata> {
            Err(AdvisorError::backend("not scripted"))
        }

        async fn get_table_schema(
            &self,
            _dataset: &str,
            _table: &str,
        ) -> AdvisorResult<Vec<ColumnInfo>> {
            Ok(self.schema.clone())
        }
    }

    fn optimizer(engine: ScriptedEngine) -> QueryOptimizer {
        QueryOptimizer::new(Arc::new(engine), TtlCache::new(Duration::minutes(5), 16))
    }

    #[tokio::test]
    async fn test_optimize_rejects_non_rewrite_technique() {
        let opt = optimizer(ScriptedEngine::with_rows(vec![]));
        let err = opt
            .optimize_query("SELECT 1", &[OptimizationType::Partitioning], false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_optimize_applies_in_order_and_reports() {
        let opt = optimizer(ScriptedEngine::with_rows(vec![]));
        let q = "SELECT COUNT(DISTINCT user_id) FROM events WHERE user_id NOT IN (SELECT id FROM banned)";
        let result = opt
            .optimize_query(
                q,
                &[
                    OptimizationType::SubqueryFlattening,
                    OptimizationType::AggregationOptimization,
                ],
                false,
                false,
            )
            .await
            .unwrap();
        assert_eq!(
            result.applied_techniques,
            vec![
                OptimizationType::SubqueryFlattening,
                OptimizationType::AggregationOptimization
            ]
        );
        assert!(result.optimized_query.contains("NOT EXISTS"));
        assert!(result.optimized_query.contains("APPROX_COUNT_DISTINCT"));
        assert_eq!(result.notes.len(), 2);
    }

    #[tokio::test]
    async fn test_optimize_no_applicable_technique_is_identity() {
        let opt = optimizer(ScriptedEngine::with_rows(vec![]));
        let q = "SELECT id FROM t WHERE id = 1";
        let result = opt
            .optimize_query(q, REWRITE_TECHNIQUES, true, false)
            .await
            .unwrap();
        assert_eq!(result.optimized_query, q);
        assert!(result.applied_techniques.is_empty());
        // Nothing changed, so neither validation nor comparison ran.
        assert!(result.equivalence.is_none());
        assert!(result.performance_comparison.is_none());
    }

    #[tokio::test]
    async fn test_column_pruning_uses_catalog_schema() {
        let mut engine = ScriptedEngine::with_rows(vec![]);
        engine.schema = vec![
            ColumnInfo { name: "id".into(), data_type: "INT64".into(), is_nullable: false },
            ColumnInfo { name: "total".into(), data_type: "NUMERIC".into(), is_nullable: true },
        ];
        let opt = optimizer(engine);
        let result = opt
            .optimize_query(
                "SELECT * FROM sales.orders WHERE id = 1",
                &[OptimizationType::ColumnPruning],
                false,
                false,
            )
            .await
            .unwrap();
        assert!(result.optimized_query.starts_with("SELECT id, total FROM"));
    }

    #[tokio::test]
    async fn test_equivalence_matching_samples() {
        let rows = vec![
            serde_json::json!({ "id": 1, "total": 10 }),
            serde_json::json!({ "id": 2, "total": 20 }),
        ];
        let opt = optimizer(ScriptedEngine::with_rows(rows));
        let report = opt
            .validate_query_equivalence("SELECT a", "SELECT b", &ValidationOptions::default())
            .await
            .unwrap();
        assert!(report.is_equivalent);
    }

    #[tokio::test]
    async fn test_equivalence_detects_row_mismatch() {
        let mut engine = ScriptedEngine::with_rows(vec![serde_json::json!({ "id": 1 })]);
        engine.rows.insert(
            sampled("SELECT b", 100),
            vec![serde_json::json!({ "id": 2 })],
        );
        let opt = optimizer(engine);
        let report = opt
            .validate_query_equivalence("SELECT a", "SELECT b", &ValidationOptions::default())
            .await
            .unwrap();
        assert!(!report.is_equivalent);
        assert!(report.details.contains("row content mismatch"));
    }

    #[tokio::test]
    async fn test_equivalence_detects_column_mismatch() {
        let mut engine = ScriptedEngine::with_rows(vec![serde_json::json!({ "id": 1 })]);
        engine.rows.insert(
            sampled("SELECT b", 100),
            vec![serde_json::json!({ "renamed": 1 })],
        );
        let opt = optimizer(engine);
        let report = opt
            .validate_query_equivalence("SELECT a", "SELECT b", &ValidationOptions::default())
            .await
            .unwrap();
        assert!(!report.is_equivalent);
        assert!(report.details.contains("column mismatch"));
    }

    #[tokio::test]
    async fn test_performance_comparison_surfaces_regression() {
        // Same plan for both sides: zero improvement everywhere.
        let opt = optimizer(ScriptedEngine::with_rows(vec![]));
        let cmp = opt
            .compare_query_performance("SELECT a", "SELECT b")
            .await
            .unwrap();
        assert_eq!(cmp.slot_ms_improvement_pct, 0.0);
        assert_eq!(cmp.records_read_improvement_pct, 0.0);
    }

    #[tokio::test]
    async fn test_optimization_cache_cleared() {
        let opt = optimizer(ScriptedEngine::with_rows(vec![]));
        let q = "SELECT COUNT(DISTINCT x) FROM t";
        let first = opt
            .optimize_query(q, &[OptimizationType::AggregationOptimization], false, true)
            .await
            .unwrap();
        let second = opt
            .optimize_query(q, &[OptimizationType::AggregationOptimization], false, true)
            .await
            .unwrap();
        assert_eq!(first.optimized_query, second.optimized_query);
        opt.clear_optimization_cache();
    }
}
