//! Table designer
//!
//! Composes the schema, partition and clustering analyzers into a single
//! table design: pairwise compatibility is checked and an incompatible
//! combination is rejected with reasons, never silently merged. Steps are
//! ordered schema changes, then partitioning, then clustering.

use std::sync::Arc;

use crate::backends::QueryEngine;
use crate::models::{
    ClusteringRecommendation, PartitionRecommendation, SchemaRecommendation, TableDesign,
};
use crate::services::clustering_analyzer::ClusteringAnalyzer;
use crate::services::partition_analyzer::PartitionAnalyzer;
use crate::services::schema_analyzer::SchemaAnalyzer;
use crate::utils::AdvisorResult;

const TIME_TYPES: &[&str] = &["DATE", "DATETIME", "TIMESTAMP"];
const UNCLUSTERABLE_TYPES: &[&str] = &["FLOAT64", "JSON", "GEOGRAPHY"];

pub struct TableDesigner {
    schema: SchemaAnalyzer,
    partitioning: PartitionAnalyzer,
    clustering: ClusteringAnalyzer,
}

impl TableDesigner {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            schema: SchemaAnalyzer::new(engine.clone()),
            partitioning: PartitionAnalyzer::new(engine.clone()),
            clustering: ClusteringAnalyzer::new(engine),
        }
    }

    pub async fn design_table(&self, dataset: &str, table: &str) -> AdvisorResult<TableDesign> {
        let schema = self.schema.analyze_table_schema(dataset, table).await?;
        let partitioning = self
            .partitioning
            .analyze_table_partitioning(dataset, table)
            .await?;
        let clustering = self
            .clustering
            .analyze_table_clustering(dataset, table)
            .await?;

        let rejection_reasons =
            compatibility_violations(schema.as_ref(), partitioning.as_ref(), clustering.as_ref());
        let is_valid = rejection_reasons.is_empty();

        let implementation_plan = if is_valid {
            build_plan(schema.as_ref(), partitioning.as_ref(), clustering.as_ref())
        } else {
            tracing::warn!(
                dataset,
                table,
                reasons = ?rejection_reasons,
                "incompatible table design rejected"
            );
            Vec::new()
        };
        let combined_improvement_pct = if is_valid {
            combined_improvement(schema.as_ref(), partitioning.as_ref(), clustering.as_ref())
        } else {
            0.0
        };

        Ok(TableDesign {
            dataset: dataset.to_string(),
            table: table.to_string(),
            schema,
            partitioning,
            clustering,
            is_valid,
            rejection_reasons,
            implementation_plan,
            combined_improvement_pct,
        })
    }
}

/// Pairwise checks between the three recommendations.
fn compatibility_violations(
    schema: Option<&SchemaRecommendation>,
    partitioning: Option<&PartitionRecommendation>,
    clustering: Option<&ClusteringRecommendation>,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if let (Some(schema), Some(partitioning)) = (schema, partitioning) {
        for change in &schema.changes {
            if change.column == partitioning.column
                && !TIME_TYPES.contains(&change.to_type.as_str())
            {
                reasons.push(format!(
                    "column `{}` is retyped to {} but chosen as the partition column",
                    change.column, change.to_type
                ));
            }
        }
    }

    if let (Some(schema), Some(clustering)) = (schema, clustering) {
        for change in &schema.changes {
            if clustering.columns.contains(&change.column)
                && UNCLUSTERABLE_TYPES.contains(&change.to_type.as_str())
            {
                reasons.push(format!(
                    "column `{}` is retyped to {} but required for clustering",
                    change.column, change.to_type
                ));
            }
        }
    }

    if let (Some(partitioning), Some(clustering)) = (partitioning, clustering) {
        if clustering.columns.contains(&partitioning.column) {
            reasons.push(format!(
                "column `{}` is chosen for both partitioning and clustering",
                partitioning.column
            ));
        }
    }

    reasons
}

fn build_plan(
    schema: Option<&SchemaRecommendation>,
    partitioning: Option<&PartitionRecommendation>,
    clustering: Option<&ClusteringRecommendation>,
) -> Vec<String> {
    let mut plan = Vec::new();
    if let Some(schema) = schema {
        plan.push(schema.ddl.clone());
    }
    if let Some(partitioning) = partitioning {
        plan.push(partitioning.ddl.clone());
    }
    if let Some(clustering) = clustering {
        plan.push(clustering.ddl.clone());
    }
    plan
}

/// Improvements compose multiplicatively: each step applies to what the
/// previous steps left.
fn combined_improvement(
    schema: Option<&SchemaRecommendation>,
    partitioning: Option<&PartitionRecommendation>,
    clustering: Option<&ClusteringRecommendation>,
) -> f64 {
    let mut remaining = 1.0;
    for pct in [
        schema.map(|s| s.estimated_improvement.percentage),
        partitioning.map(|p| p.estimated_improvement.percentage),
        clustering.map(|c| c.estimated_improvement.percentage),
    ]
    .into_iter()
    .flatten()
    {
        remaining *= 1.0 - (pct / 100.0).clamp(0.0, 1.0);
    }
    (1.0 - remaining) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ColumnTypeChange, Confidence, EstimatedImprovement, PartitionUnit,
    };

    fn improvement(pct: f64) -> EstimatedImprovement {
        EstimatedImprovement {
            percentage: pct,
            confidence: Confidence::Medium,
            metrics: vec!["bytes_processed".into()],
        }
    }

    fn schema_rec(column: &str, to_type: &str) -> SchemaRecommendation {
        SchemaRecommendation {
            dataset: "sales".into(),
            table: "orders".into(),
            changes: vec![ColumnTypeChange {
                column: column.into(),
                from_type: "STRING".into(),
                to_type: to_type.into(),
                reason: "test".into(),
            }],
            ddl: "-- schema ddl".into(),
            impact_score: 3.0,
            estimated_improvement: improvement(10.0),
        }
    }

    fn partition_rec(column: &str) -> PartitionRecommendation {
        PartitionRecommendation {
            dataset: "sales".into(),
            table: "orders".into(),
            column: column.into(),
            unit: PartitionUnit::Day,
            expiration_days: None,
            ddl: "-- partition ddl".into(),
            impact_score: 8.0,
            estimated_improvement: improvement(50.0),
        }
    }

    fn clustering_rec(columns: &[&str]) -> ClusteringRecommendation {
        ClusteringRecommendation {
            dataset: "sales".into(),
            table: "orders".into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ddl: "-- clustering ddl".into(),
            impact_score: 5.0,
            estimated_improvement: improvement(20.0),
        }
    }

    #[test]
    fn test_compatible_design_has_no_violations() {
        let reasons = compatibility_violations(
            Some(&schema_rec("order_date", "DATE")),
            Some(&partition_rec("order_date")),
            Some(&clustering_rec(&["user_id", "region"])),
        );
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_partition_column_retyped_away_from_time() {
        let reasons = compatibility_violations(
            Some(&schema_rec("order_date", "BOOL")),
            Some(&partition_rec("order_date")),
            None,
        );
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("partition column"));
    }

    #[test]
    fn test_clustering_column_retyped_to_unclusterable() {
        let reasons = compatibility_violations(
            Some(&schema_rec("score", "FLOAT64")),
            None,
            Some(&clustering_rec(&["score"])),
        );
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("clustering"));
    }

    #[test]
    fn test_shared_partition_and_clustering_column() {
        let reasons = compatibility_violations(
            None,
            Some(&partition_rec("order_date")),
            Some(&clustering_rec(&["order_date", "user_id"])),
        );
        assert_eq!(reasons.len(), 1);
    }

    #[test]
    fn test_plan_ordering() {
        let plan = build_plan(
            Some(&schema_rec("order_date", "DATE")),
            Some(&partition_rec("order_date")),
            Some(&clustering_rec(&["user_id"])),
        );
        assert_eq!(plan, vec!["-- schema ddl", "-- partition ddl", "-- clustering ddl"]);
    }

    #[test]
    fn test_combined_improvement_composes() {
        let combined = combined_improvement(
            Some(&schema_rec("order_date", "DATE")),
            Some(&partition_rec("order_date")),
            None,
        );
        // 1 - (0.9 * 0.5) = 0.55
        assert!((combined - 55.0).abs() < 1e-9);

        assert_eq!(combined_improvement(None, None, None), 0.0);
    }
}
