// Common test utilities and helpers

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::backends::{MemoryStore, Notifier, NotificationMessage, QueryEngine};
use crate::config::Config;
use crate::models::{ColumnInfo, TableMetadata};
use crate::utils::{AdvisorError, AdvisorResult};
use crate::AdvisorState;

/// Engine test double scripted with canned rows, plans and catalog data.
/// Unscripted queries fall back to `default_rows` / `default_plan` so the
/// sampled-equivalence path works without enumerating every wrapper query.
#[derive(Default)]
pub struct ScriptedEngine {
    rows: HashMap<String, Vec<serde_json::Value>>,
    default_rows: Vec<serde_json::Value>,
    plans: HashMap<String, serde_json::Value>,
    default_plan: Option<serde_json::Value>,
    tables: HashMap<String, TableMetadata>,
    pub statements: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            default_rows: vec![json!({"id": 1, "amount": 10.0})],
            default_plan: Some(simple_plan(100.0)),
            ..Default::default()
        }
    }

    pub fn script_rows(mut self, sql: &str, rows: Vec<serde_json::Value>) -> Self {
        self.rows.insert(sql.to_string(), rows);
        self
    }

    pub fn script_plan(mut self, sql: &str, plan: serde_json::Value) -> Self {
        self.plans.insert(sql.to_string(), plan);
        self
    }

    pub fn script_table(mut self, metadata: TableMetadata) -> Self {
        self.tables
            .insert(format!("{}.{}", metadata.dataset, metadata.table), metadata);
        self
    }
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    async fn execute_query(&self, sql: &str) -> AdvisorResult<Vec<serde_json::Value>> {
        Ok(self.rows.get(sql).cloned().unwrap_or_else(|| self.default_rows.clone()))
    }

    async fn execute_statement(&self, sql: &str) -> AdvisorResult<u64> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(0)
    }

    async fn get_query_plan(&self, sql: &str) -> AdvisorResult<serde_json::Value> {
        self.plans
            .get(sql)
            .cloned()
            .or_else(|| self.default_plan.clone())
            .ok_or_else(|| AdvisorError::backend("no plan scripted"))
    }

    async fn get_table_metadata(&self, dataset: &str, table: &str) -> AdvisorResult<TableMetadata> {
        self.tables
            .get(&format!("{}.{}", dataset, table))
            .cloned()
            .ok_or_else(|| AdvisorError::backend(format!("unknown table {}.{}", dataset, table)))
    }

    async fn get_table_schema(&self, dataset: &str, table: &str) -> AdvisorResult<Vec<ColumnInfo>> {
        Ok(self.get_table_metadata(dataset, table).await?.columns)
    }
}

/// Notifier test double capturing everything sent.
#[derive(Default)]
pub struct CapturingNotifier {
    pub sent: Mutex<Vec<NotificationMessage>>,
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn send_notification(
        &self,
        message: &NotificationMessage,
        _channels: &[String],
    ) -> AdvisorResult<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Single-stage plan in BigQuery shape.
pub fn simple_plan(slot_ms: f64) -> serde_json::Value {
    json!({
        "queryPlan": [{
            "id": 0,
            "name": "S00: Input",
            "slotMs": slot_ms,
            "recordsRead": 1000.0,
            "recordsWritten": 1000.0,
            "shuffleOutputBytes": 0.0,
            "steps": [{"kind": "READ"}]
        }]
    })
}

pub fn orders_metadata() -> TableMetadata {
    TableMetadata {
        dataset: "sales".into(),
        table: "orders".into(),
        row_count: 5_000_000,
        size_bytes: 2_000_000_000,
        partition_column: None,
        clustering_columns: vec![],
        columns: vec![
            ColumnInfo { name: "id".into(), data_type: "INT64".into(), is_nullable: false },
            ColumnInfo { name: "amount".into(), data_type: "FLOAT64".into(), is_nullable: true },
            ColumnInfo {
                name: "order_date".into(),
                data_type: "DATE".into(),
                is_nullable: false,
            },
        ],
    }
}

/// Full advisor state over an in-memory store and the given engine.
pub fn test_state(
    engine: Arc<ScriptedEngine>,
    notifier: Arc<CapturingNotifier>,
) -> AdvisorState {
    AdvisorState::new(&Config::default(), engine, Arc::new(MemoryStore::new()), notifier)
}
