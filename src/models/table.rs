//! Table metadata and table-design recommendation types

use serde::{Deserialize, Serialize};

use super::recommendation::EstimatedImprovement;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// BigQuery type name (STRING, INT64, TIMESTAMP, ...).
    pub data_type: String,
    pub is_nullable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub dataset: String,
    pub table: String,
    pub row_count: i64,
    pub size_bytes: i64,
    pub partition_column: Option<String>,
    pub clustering_columns: Vec<String>,
    pub columns: Vec<ColumnInfo>,
}

/// Per-column usage statistics over the rolling history window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnUsageStats {
    pub column: String,
    /// Queries filtering on this column.
    pub filter_count: u64,
    /// Queries ordering by this column.
    pub order_count: u64,
    /// Queries grouping by this column.
    pub group_count: u64,
    /// Approximate distinct values / row count, 0..1.
    pub distinct_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionUnit {
    Day,
    Month,
    Year,
}

impl PartitionUnit {
    pub fn as_sql(&self) -> &'static str {
        match self {
            PartitionUnit::Day => "DAY",
            PartitionUnit::Month => "MONTH",
            PartitionUnit::Year => "YEAR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTypeChange {
    pub column: String,
    pub from_type: String,
    pub to_type: String,
    pub reason: String,
}

/// Output of the schema analyzer for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecommendation {
    pub dataset: String,
    pub table: String,
    pub changes: Vec<ColumnTypeChange>,
    /// BigQuery DDL implementing the changes, handed verbatim to the engine.
    pub ddl: String,
    pub impact_score: f64,
    pub estimated_improvement: EstimatedImprovement,
}

/// Output of the partition analyzer for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRecommendation {
    pub dataset: String,
    pub table: String,
    pub column: String,
    pub unit: PartitionUnit,
    /// Optional partition expiration from the access-age distribution.
    pub expiration_days: Option<u32>,
    pub ddl: String,
    pub impact_score: f64,
    pub estimated_improvement: EstimatedImprovement,
}

/// Output of the clustering analyzer for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringRecommendation {
    pub dataset: String,
    pub table: String,
    /// Ordered clustering columns, at most 4 (BigQuery limit).
    pub columns: Vec<String>,
    pub ddl: String,
    pub impact_score: f64,
    pub estimated_improvement: EstimatedImprovement,
}

/// Combined table design from all three analyzers. Invalid combinations are
/// rejected with reasons, never silently merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDesign {
    pub dataset: String,
    pub table: String,
    pub schema: Option<SchemaRecommendation>,
    pub partitioning: Option<PartitionRecommendation>,
    pub clustering: Option<ClusteringRecommendation>,
    pub is_valid: bool,
    pub rejection_reasons: Vec<String>,
    /// Ordered steps: schema changes, then partitioning, then clustering.
    pub implementation_plan: Vec<String>,
    pub combined_improvement_pct: f64,
}
