//! Execution/catalog backend trait
//!
//! The advisor does not talk to BigQuery directly; everything goes through
//! this narrow interface so orchestration code can inject a real client and
//! tests can inject a scripted one. Plan JSON is expected in BigQuery shape
//! (`queryPlan`/`executionPlan`, stage `steps[].kind`, `slotMs`,
//! `shuffleOutputBytes`) but is parsed tolerantly.

use async_trait::async_trait;

use crate::models::{ColumnInfo, TableMetadata};
use crate::utils::AdvisorResult;

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run a query and return its rows as JSON objects keyed by column name.
    async fn execute_query(&self, sql: &str) -> AdvisorResult<Vec<serde_json::Value>>;

    /// Run a statement (DDL/DML) for its side effect.
    async fn execute_statement(&self, sql: &str) -> AdvisorResult<u64>;

    /// Fetch the execution plan for a query without running it to
    /// completion (dry-run / EXPLAIN path).
    async fn get_query_plan(&self, sql: &str) -> AdvisorResult<serde_json::Value>;

    async fn get_table_metadata(&self, dataset: &str, table: &str)
    -> AdvisorResult<TableMetadata>;

    async fn get_table_schema(&self, dataset: &str, table: &str)
    -> AdvisorResult<Vec<ColumnInfo>>;
}
