//! Column usage statistics
//!
//! Shared input for the partition and clustering analyzers: per-column
//! filter/order/group frequency over a rolling job-history window, plus an
//! approximate distinct ratio from a cardinality probe. History parsing
//! reuses the pattern engine's structural extraction.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backends::QueryEngine;
use crate::models::{ColumnUsageStats, TableMetadata};
use crate::services::pattern_engine::extract_structure;
use crate::utils::AdvisorResult;

pub const DEFAULT_WINDOW_DAYS: u32 = 30;

static ORDER_BY_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\border\s+by\b(.+?)(?:\blimit\b|$)").unwrap()
});

pub struct UsageCollector {
    engine: Arc<dyn QueryEngine>,
}

impl UsageCollector {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    /// Usage stats for every column of one table. History and cardinality
    /// probes degrade independently: a failing probe zeroes its columns
    /// instead of failing the call.
    pub async fn collect(
        &self,
        metadata: &TableMetadata,
        window_days: u32,
    ) -> AdvisorResult<Vec<ColumnUsageStats>> {
        let mut stats: Vec<ColumnUsageStats> = metadata
            .columns
            .iter()
            .map(|c| ColumnUsageStats { column: c.name.clone(), ..Default::default() })
            .collect();

        match self
            .engine
            .execute_query(&job_history_sql(&metadata.dataset, &metadata.table, window_days))
            .await
        {
            Ok(rows) => {
                for row in &rows {
                    if let Some(query) = row.get("query").and_then(|q| q.as_str()) {
                        tally_query(query, &mut stats);
                    }
                }
                tracing::debug!(
                    table = %format!("{}.{}", metadata.dataset, metadata.table),
                    history_queries = rows.len(),
                    "usage history collected"
                );
            },
            Err(err) => {
                tracing::warn!(error = %err, "job history probe failed; usage counts default to zero");
            },
        }

        match self
            .engine
            .execute_query(&cardinality_sql(metadata))
            .await
        {
            Ok(rows) => {
                if let Some(row) = rows.first() {
                    apply_cardinality(row, metadata.row_count, &mut stats);
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "cardinality probe failed; distinct ratios default to zero");
            },
        }

        Ok(stats)
    }
}

/// Queries that touched the table within the window, newest first.
fn job_history_sql(dataset: &str, table: &str, window_days: u32) -> String {
    format!(
        "SELECT query FROM `region-us`.INFORMATION_SCHEMA.JOBS_BY_PROJECT \
         WHERE job_type = 'QUERY' AND state = 'DONE' \
         AND creation_time >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {} DAY) \
         AND query LIKE '%{}.{}%' \
         ORDER BY creation_time DESC",
        window_days, dataset, table
    )
}

/// One row: COUNT(*) plus APPROX_COUNT_DISTINCT per column.
fn cardinality_sql(metadata: &TableMetadata) -> String {
    let mut select_list = vec!["COUNT(*) AS row_count".to_string()];
    select_list.extend(
        metadata
            .columns
            .iter()
            .map(|c| format!("APPROX_COUNT_DISTINCT(`{}`) AS `{}`", c.name, c.name)),
    );
    format!(
        "SELECT {} FROM `{}.{}`",
        select_list.join(", "),
        metadata.dataset,
        metadata.table
    )
}

fn tally_query(query: &str, stats: &mut [ColumnUsageStats]) {
    let structure = extract_structure(query);
    let predicates_lower: Vec<String> =
        structure.predicates.iter().map(|p| p.to_lowercase()).collect();
    let group_lower: Vec<String> = structure
        .group_by_columns
        .iter()
        .map(|c| c.to_lowercase())
        .collect();
    let order_lower = ORDER_BY_CLAUSE
        .captures(query)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();

    for stat in stats.iter_mut() {
        let needle = stat.column.to_lowercase();
        if predicates_lower.iter().any(|p| mentions_column(p, &needle)) {
            stat.filter_count += 1;
        }
        if group_lower.iter().any(|g| mentions_column(g, &needle)) {
            stat.group_count += 1;
        }
        if mentions_column(&order_lower, &needle) {
            stat.order_count += 1;
        }
    }
}

/// Column-name match on word boundaries so `id` does not match `user_id`.
fn mentions_column(text: &str, column: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token == column)
}

fn apply_cardinality(row: &serde_json::Value, row_count_hint: i64, stats: &mut [ColumnUsageStats]) {
    let as_f64 = |v: &serde_json::Value| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    };
    let rows = row
        .get("row_count")
        .and_then(as_f64)
        .filter(|r| *r > 0.0)
        .unwrap_or(row_count_hint.max(1) as f64);

    for stat in stats.iter_mut() {
        if let Some(distinct) = row.get(&stat.column).and_then(as_f64) {
            stat.distinct_ratio = (distinct / rows).clamp(0.0, 1.0);
        }
    }
}
