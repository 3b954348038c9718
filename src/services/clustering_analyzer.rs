//! Clustering analyzer
//!
//! Ranks candidate columns by filter/group/order frequency, drops types
//! BigQuery cannot cluster on and caps the recommendation at four columns.

use std::sync::Arc;

use crate::backends::QueryEngine;
use crate::models::{
    ClusteringRecommendation, ColumnUsageStats, Confidence, EstimatedImprovement, TableMetadata,
};
use crate::services::usage_stats::{DEFAULT_WINDOW_DAYS, UsageCollector};
use crate::utils::AdvisorResult;

/// BigQuery's clustering limit.
pub const MAX_CLUSTERING_COLUMNS: usize = 4;

/// Types clustering cannot be defined on.
const UNCLUSTERABLE_TYPES: &[&str] = &["FLOAT64", "JSON", "GEOGRAPHY", "ARRAY", "STRUCT"];

pub struct ClusteringAnalyzer {
    engine: Arc<dyn QueryEngine>,
    collector: UsageCollector,
    window_days: u32,
}

impl ClusteringAnalyzer {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        let collector = UsageCollector::new(engine.clone());
        Self { engine, collector, window_days: DEFAULT_WINDOW_DAYS }
    }

    pub fn with_window_days(mut self, window_days: u32) -> Self {
        self.window_days = window_days;
        self
    }

    /// `None` when the table is already clustered or no column is ever
    /// filtered, grouped or ordered on.
    pub async fn analyze_table_clustering(
        &self,
        dataset: &str,
        table: &str,
    ) -> AdvisorResult<Option<ClusteringRecommendation>> {
        let metadata = self.engine.get_table_metadata(dataset, table).await?;
        if !metadata.clustering_columns.is_empty() {
            tracing::debug!(dataset, table, "already clustered; nothing to recommend");
            return Ok(None);
        }

        let stats = self.collector.collect(&metadata, self.window_days).await?;
        let columns = rank_clustering_columns(&metadata, &stats);
        if columns.is_empty() {
            return Ok(None);
        }

        let covered = usage_coverage(&stats, &columns);
        let ddl = clustering_ddl(&metadata, &columns);
        Ok(Some(ClusteringRecommendation {
            dataset: metadata.dataset,
            table: metadata.table,
            impact_score: (2.0 + 8.0 * covered).clamp(0.0, 10.0),
            estimated_improvement: EstimatedImprovement {
                // Block pruning helps the share of queries that touch the
                // clustered columns.
                percentage: 40.0 * covered,
                confidence: if covered > 0.5 { Confidence::Medium } else { Confidence::Low },
                metrics: vec!["bytes_processed".to_string(), "elapsed_ms".to_string()],
            },
            columns,
            ddl,
        }))
    }
}

/// Candidate columns ordered by usage score, at most four. Filters weigh
/// most because clustering prunes on them directly; near-constant columns
/// are excluded as useless sort keys.
pub(crate) fn rank_clustering_columns(
    metadata: &TableMetadata,
    stats: &[ColumnUsageStats],
) -> Vec<String> {
    let mut scored: Vec<(&ColumnUsageStats, u64)> = stats
        .iter()
        .filter(|s| {
            metadata.columns.iter().any(|c| {
                c.name == s.column
                    && !UNCLUSTERABLE_TYPES
                        .iter()
                        .any(|t| c.data_type.to_uppercase().starts_with(t))
            })
        })
        .filter(|s| s.distinct_ratio > 0.0001 || s.distinct_ratio == 0.0)
        .map(|s| (s, s.filter_count * 3 + s.group_count * 2 + s.order_count))
        .filter(|(_, score)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.column.cmp(&b.0.column)));

    scored
        .into_iter()
        .take(MAX_CLUSTERING_COLUMNS)
        .map(|(s, _)| s.column.clone())
        .collect()
}

fn clustering_ddl(metadata: &TableMetadata, columns: &[String]) -> String {
    let cluster_list = columns
        .iter()
        .map(|c| format!("`{}`", c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut ddl = format!(
        "CREATE OR REPLACE TABLE `{dataset}.{table}`",
        dataset = metadata.dataset,
        table = metadata.table,
    );
    // Re-creating a partitioned table must keep its partitioning.
    if let Some(partition_column) = &metadata.partition_column {
        ddl.push_str(&format!("\nPARTITION BY `{}`", partition_column));
    }
    ddl.push_str(&format!(
        "\nCLUSTER BY {}\nAS SELECT * FROM `{}.{}`",
        cluster_list, metadata.dataset, metadata.table
    ));
    ddl
}

/// Share of filtering queries that any of the chosen columns covers.
fn usage_coverage(stats: &[ColumnUsageStats], columns: &[String]) -> f64 {
    let total: u64 = stats.iter().map(|s| s.filter_count + s.group_count).sum();
    if total == 0 {
        return 0.0;
    }
    let covered: u64 = stats
        .iter()
        .filter(|s| columns.contains(&s.column))
        .map(|s| s.filter_count + s.group_count)
        .sum();
    (covered as f64 / total as f64).clamp(0.0, 1.0)
}
