//! Schema analyzer
//!
//! Flags columns whose declared type is wider than their content needs
//! (STRING dates, FLOAT64 identifiers, STRING booleans) and generates the
//! CREATE OR REPLACE / SELECT * REPLACE DDL implementing the tightening.

use std::sync::Arc;

use crate::backends::QueryEngine;
use crate::models::{
    ColumnInfo, ColumnTypeChange, Confidence, EstimatedImprovement, SchemaRecommendation,
    TableMetadata,
};
use crate::utils::AdvisorResult;

pub struct SchemaAnalyzer {
    engine: Arc<dyn QueryEngine>,
}

impl SchemaAnalyzer {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    /// `None` when no column qualifies for tightening.
    pub async fn analyze_table_schema(
        &self,
        dataset: &str,
        table: &str,
    ) -> AdvisorResult<Option<SchemaRecommendation>> {
        let metadata = self.engine.get_table_metadata(dataset, table).await?;

        let changes: Vec<ColumnTypeChange> = metadata
            .columns
            .iter()
            .filter_map(suggest_type_change)
            .collect();
        if changes.is_empty() {
            return Ok(None);
        }

        tracing::debug!(
            dataset,
            table,
            change_count = changes.len(),
            "schema tightening candidates found"
        );

        let ddl = schema_ddl(&metadata, &changes);
        let change_share = changes.len() as f64 / metadata.columns.len().max(1) as f64;
        Ok(Some(SchemaRecommendation {
            dataset: metadata.dataset,
            table: metadata.table,
            impact_score: (2.0 + changes.len() as f64).clamp(0.0, 10.0),
            estimated_improvement: EstimatedImprovement {
                // Narrower types cut storage and every full-column scan.
                percentage: (15.0 * change_share).clamp(0.0, 15.0),
                confidence: Confidence::Low,
                metrics: vec!["bytes_processed".to_string(), "storage".to_string()],
            },
            changes,
            ddl,
        }))
    }
}

/// Name/type heuristics for a tighter column type. Conservative: only
/// patterns with an unambiguous target type are suggested.
fn suggest_type_change(column: &ColumnInfo) -> Option<ColumnTypeChange> {
    let name = column.name.to_lowercase();
    let data_type = column.data_type.to_uppercase();

    let (to_type, reason) = match data_type.as_str() {
        "STRING" if name.ends_with("_date") || name == "date" => {
            ("DATE", "date-named STRING column; DATE stores and prunes better")
        },
        "STRING" if name.ends_with("_at") || name.ends_with("_time") || name.ends_with("_ts") => {
            ("TIMESTAMP", "time-named STRING column; TIMESTAMP stores and compares better")
        },
        "STRING" if name.starts_with("is_") || name.starts_with("has_") => {
            ("BOOL", "flag-named STRING column; BOOL is one byte")
        },
        "FLOAT64" if name.ends_with("_id") || name == "id" => {
            ("INT64", "identifier stored as FLOAT64; INT64 is exact and smaller")
        },
        _ => return None,
    };

    Some(ColumnTypeChange {
        column: column.name.clone(),
        from_type: column.data_type.clone(),
        to_type: to_type.to_string(),
        reason: reason.to_string(),
    })
}

fn schema_ddl(metadata: &TableMetadata, changes: &[ColumnTypeChange]) -> String {
    let replace_list = changes
        .iter()
        .map(|c| format!("CAST(`{col}` AS {to}) AS `{col}`", col = c.column, to = c.to_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE OR REPLACE TABLE `{dataset}.{table}`\nAS SELECT * REPLACE ({replace_list})\nFROM `{dataset}.{table}`",
        dataset = metadata.dataset,
        table = metadata.table,
        replace_list = replace_list,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::AdvisorError;
    use async_trait::async_trait;

    fn column(name: &str, data_type: &str) -> ColumnInfo {
        ColumnInfo { name: name.into(), data_type: data_type.into(), is_nullable: true }
    }

    struct StubEngine {
        metadata: TableMetadata,
    }

    #[async_trait]
    impl QueryEngine for StubEngine {
        async fn execute_query(&self, _sql: &str) -> AdvisorResult<Vec<serde_json::Value>> {
            Err(AdvisorError::backend("not scripted"))
        }

        async fn execute_statement(&self, _sql: &str) -> AdvisorResult<u64> {
            Err(AdvisorError::backend("not scripted"))
        }

        async fn get_query_plan(&self, _sql: &str) -> AdvisorResult<serde_json::Value> {
            Err(AdvisorError::backend("not scripted"))
        }

        async fn get_table_metadata(
            &self,
            _dataset: &str,
            _table: &str,
        ) -> AdvisorResult<TableMetadata> {
            Ok(self.metadata.clone())
        }

        async fn get_table_schema(
            &self,
            _dataset: &str,
            _table: &str,
        ) -> AdvisorResult<Vec<ColumnInfo>> {
            Ok(self.metadata.columns.clone())
        }
    }

    #[test]
    fn test_type_change_heuristics() {
        assert_eq!(
            suggest_type_change(&column("order_date", "STRING")).unwrap().to_type,
            "DATE"
        );
        assert_eq!(
            suggest_type_change(&column("created_at", "STRING")).unwrap().to_type,
            "TIMESTAMP"
        );
        assert_eq!(
            suggest_type_change(&column("is_active", "STRING")).unwrap().to_type,
            "BOOL"
        );
        assert_eq!(
            suggest_type_change(&column("user_id", "FLOAT64")).unwrap().to_type,
            "INT64"
        );

        assert!(suggest_type_change(&column("order_date", "DATE")).is_none());
        assert!(suggest_type_change(&column("amount", "FLOAT64")).is_none());
        assert!(suggest_type_change(&column("name", "STRING")).is_none());
    }

    #[tokio::test]
    async fn test_recommendation_with_ddl() {
        let engine = StubEngine {
            metadata: TableMetadata {
                dataset: "sales".into(),
                table: "orders".into(),
                columns: vec![
                    column("id", "INT64"),
                    column("order_date", "STRING"),
                    column("is_active", "STRING"),
                ],
                ..Default::default()
            },
        };
        let analyzer = SchemaAnalyzer::new(Arc::new(engine));
        let rec = analyzer
            .analyze_table_schema("sales", "orders")
            .await
            .unwrap()
            .expect("recommendation");
        assert_eq!(rec.changes.len(), 2);
        assert!(rec.ddl.contains("SELECT * REPLACE ("));
        assert!(rec.ddl.contains("CAST(`order_date` AS DATE) AS `order_date`"));
        assert!(rec.ddl.contains("CAST(`is_active` AS BOOL) AS `is_active`"));
    }

    #[tokio::test]
    async fn test_clean_schema_yields_none() {
        let engine = StubEngine {
            metadata: TableMetadata {
                dataset: "sales".into(),
                table: "orders".into(),
                columns: vec![column("id", "INT64"), column("order_date", "DATE")],
                ..Default::default()
            },
        };
        let analyzer = SchemaAnalyzer::new(Arc::new(engine));
        assert!(analyzer
            .analyze_table_schema("sales", "orders")
            .await
            .unwrap()
            .is_none());
    }
}
