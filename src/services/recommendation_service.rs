//! Recommendation generator
//!
//! Sole writer of canonical [`Recommendation`] records: wraps analyzer
//! output with identity, impact, priority, implementation steps and a
//! 30-day lifecycle, and persists everything to the document store.
//! Expiry is evaluated lazily on every read and flipped in place.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::backends::DocumentStore;
use crate::models::{
    Confidence, OptimizationRecommendation, OptimizationType, Recommendation,
    RecommendationDetail, RecommendationStatus, TableDesign,
};
use crate::services::approval_service::ApprovalPolicy;
use crate::services::impact::ImpactEstimator;
use crate::services::priority::PriorityRanker;
use crate::utils::{AdvisorError, AdvisorResult};

pub const RECOMMENDATIONS_COLLECTION: &str = "recommendations";

pub const DEFAULT_RECOMMENDATION_TTL_DAYS: i64 = 30;

/// Caller-supplied context about the recommendation's target.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Observed monthly spend attributable to the target, USD.
    pub monthly_spend_usd: f64,
    /// Business value of the target, 0..1.
    pub business_value: f64,
    pub business_critical: bool,
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self { monthly_spend_usd: 0.0, business_value: 0.5, business_critical: false }
    }
}

pub struct RecommendationGenerator {
    store: Arc<dyn DocumentStore>,
    estimator: ImpactEstimator,
    ranker: Arc<PriorityRanker>,
    policy: ApprovalPolicy,
    ttl: Duration,
}

impl RecommendationGenerator {
    pub fn new(store: Arc<dyn DocumentStore>, ranker: Arc<PriorityRanker>) -> Self {
        Self {
            store,
            estimator: ImpactEstimator::new(),
            ranker,
            policy: ApprovalPolicy::default(),
            ttl: Duration::days(DEFAULT_RECOMMENDATION_TTL_DAYS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Wrap one analyzer suggestion into a persisted canonical record.
    pub async fn generate(
        &self,
        suggestion: &OptimizationRecommendation,
        detail: RecommendationDetail,
        ctx: &GenerationContext,
    ) -> AdvisorResult<Recommendation> {
        if suggestion.description.trim().is_empty() {
            return Err(AdvisorError::invalid_input(
                "recommendation description must not be empty",
            ));
        }

        let mut rec = Recommendation::new(
            suggestion.optimization_type,
            detail,
            suggestion.description.clone(),
            suggestion.rationale.clone(),
            self.ttl,
        );

        rec.impact = self.estimator.estimate_impact(
            suggestion.optimization_type,
            suggestion.estimated_improvement.percentage,
            ctx.monthly_spend_usd,
        );
        // Effort is derived from the fixed implementation cost; $1000 caps
        // the scale.
        let effort = (rec.impact.implementation_cost_usd / 1000.0).clamp(0.0, 1.0);
        rec.priority_score = self.ranker.calculate_priority_score(
            ctx.business_value,
            rec.impact.performance_score,
            effort,
            rec.impact.risk_score,
        );
        rec.priority = self.ranker.determine_priority_level(rec.priority_score);
        rec.confidence_score = confidence_value(suggestion.estimated_improvement.confidence);
        rec.business_critical = ctx.business_critical;
        rec.requires_manual_approval = self.policy.requires_approval(&rec);
        rec.implementation_steps = implementation_steps(&rec.detail);

        self.persist_new(&rec).await?;
        tracing::info!(
            recommendation_id = %rec.recommendation_id,
            optimization_type = ?rec.optimization_type,
            priority = ?rec.priority,
            "recommendation generated"
        );
        Ok(rec)
    }

    /// One recommendation per accepted part of a valid table design.
    /// An invalid design produces nothing.
    pub async fn generate_from_table_design(
        &self,
        design: &TableDesign,
        ctx: &GenerationContext,
    ) -> AdvisorResult<Vec<Recommendation>> {
        if !design.is_valid {
            tracing::info!(
                dataset = %design.dataset,
                table = %design.table,
                "skipping recommendations for rejected table design"
            );
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        if let Some(schema) = &design.schema {
            let suggestion = OptimizationRecommendation {
                optimization_type: OptimizationType::SchemaChange,
                description: format!(
                    "Tighten {} column type(s) on {}.{}",
                    schema.changes.len(),
                    design.dataset,
                    design.table
                ),
                rationale: schema
                    .changes
                    .iter()
                    .map(|c| c.reason.clone())
                    .collect::<Vec<_>>()
                    .join("; "),
                impact_score: schema.impact_score,
                original_snippet: String::new(),
                optimized_snippet: schema.ddl.clone(),
                estimated_improvement: schema.estimated_improvement.clone(),
            };
            let detail = RecommendationDetail::Schema {
                dataset: design.dataset.clone(),
                table: design.table.clone(),
                ddl: schema.ddl.clone(),
                rollback_ddl: None,
            };
            out.push(self.generate(&suggestion, detail, ctx).await?);
        }
        if let Some(partitioning) = &design.partitioning {
            let suggestion = OptimizationRecommendation {
                optimization_type: OptimizationType::Partitioning,
                description: format!(
                    "Partition {}.{} by {} ({})",
                    design.dataset,
                    design.table,
                    partitioning.column,
                    partitioning.unit.as_sql()
                ),
                rationale: "queries filter on a time column the table is not partitioned by"
                    .to_string(),
                impact_score: partitioning.impact_score,
                original_snippet: String::new(),
                optimized_snippet: partitioning.ddl.clone(),
                estimated_improvement: partitioning.estimated_improvement.clone(),
            };
            let detail = RecommendationDetail::Schema {
                dataset: design.dataset.clone(),
                table: design.table.clone(),
                ddl: partitioning.ddl.clone(),
                rollback_ddl: None,
            };
            out.push(self.generate(&suggestion, detail, ctx).await?);
        }
        if let Some(clustering) = &design.clustering {
            let suggestion = OptimizationRecommendation {
                optimization_type: OptimizationType::Clustering,
                description: format!(
                    "Cluster {}.{} by {}",
                    design.dataset,
                    design.table,
                    clustering.columns.join(", ")
                ),
                rationale: "frequent filters and groupings are not backed by clustering"
                    .to_string(),
                impact_score: clustering.impact_score,
                original_snippet: String::new(),
                optimized_snippet: clustering.ddl.clone(),
                estimated_improvement: clustering.estimated_improvement.clone(),
            };
            let detail = RecommendationDetail::Schema {
                dataset: design.dataset.clone(),
                table: design.table.clone(),
                ddl: clustering.ddl.clone(),
                rollback_ddl: None,
            };
            out.push(self.generate(&suggestion, detail, ctx).await?);
        }
        Ok(out)
    }

    /// Fetch with lazy expiry: an overdue NEW/REVIEWED record is flipped to
    /// EXPIRED, persisted and returned in its flipped state.
    pub async fn get_recommendation(&self, id: &str) -> AdvisorResult<Option<Recommendation>> {
        let Some(doc) = self.store.get_document(RECOMMENDATIONS_COLLECTION, id).await? else {
            return Ok(None);
        };
        let rec: Recommendation = serde_json::from_value(doc)?;
        Ok(Some(self.expire_if_due(rec).await?))
    }

    /// All recommendations, optionally filtered by status after lazy
    /// expiry has been applied.
    pub async fn list_recommendations(
        &self,
        status: Option<RecommendationStatus>,
    ) -> AdvisorResult<Vec<Recommendation>> {
        let docs = self
            .store
            .query_documents(RECOMMENDATIONS_COLLECTION, &[])
            .await?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            let rec: Recommendation = serde_json::from_value(doc)?;
            let rec = self.expire_if_due(rec).await?;
            if status.is_none_or(|s| rec.status == s) {
                out.push(rec);
            }
        }
        out.sort_by(|a, b| b.priority_score.total_cmp(&a.priority_score));
        Ok(out)
    }

    /// Validated status transition; anything the lifecycle forbids is a
    /// state violation and leaves the record untouched.
    pub async fn update_status(
        &self,
        id: &str,
        next: RecommendationStatus,
    ) -> AdvisorResult<Recommendation> {
        let mut rec = self
            .get_recommendation(id)
            .await?
            .ok_or_else(|| AdvisorError::not_found(format!("recommendation {}", id)))?;

        if !rec.status.can_transition_to(next) {
            return Err(AdvisorError::state_violation(format!(
                "recommendation {} cannot move {:?} -> {:?}",
                id, rec.status, next
            )));
        }

        rec.status = next;
        rec.updated_at = Utc::now();
        self.store
            .update_document(
                RECOMMENDATIONS_COLLECTION,
                &rec.recommendation_id,
                serde_json::to_value(&rec)?,
            )
            .await?;
        tracing::info!(recommendation_id = %id, status = ?next, "recommendation status updated");
        Ok(rec)
    }

    async fn persist_new(&self, rec: &Recommendation) -> AdvisorResult<()> {
        self.store
            .create_document(
                RECOMMENDATIONS_COLLECTION,
                &rec.recommendation_id,
                serde_json::to_value(rec)?,
            )
            .await
    }

    async fn expire_if_due(&self, mut rec: Recommendation) -> AdvisorResult<Recommendation> {
        if rec.is_expired(Utc::now()) {
            rec.status = RecommendationStatus::Expired;
            rec.updated_at = Utc::now();
            self.store
                .update_document(
                    RECOMMENDATIONS_COLLECTION,
                    &rec.recommendation_id,
                    serde_json::to_value(&rec)?,
                )
                .await?;
            tracing::debug!(recommendation_id = %rec.recommendation_id, "recommendation expired on read");
        }
        Ok(rec)
    }
}

fn confidence_value(confidence: Confidence) -> f64 {
    match confidence {
        Confidence::High => 0.9,
        Confidence::Medium => 0.6,
        Confidence::Low => 0.3,
    }
}

fn implementation_steps(detail: &RecommendationDetail) -> Vec<String> {
    match detail {
        RecommendationDetail::Query { .. } => vec![
            "Review the rewritten query against the original".to_string(),
            "Validate equivalence on a sampled run".to_string(),
            "Update the owning job or view with the new text".to_string(),
        ],
        RecommendationDetail::Schema { .. } => vec![
            "Snapshot the current table".to_string(),
            "Run the generated DDL".to_string(),
            "Verify row counts and spot-check content".to_string(),
            "Repoint consumers and drop the snapshot after the burn-in window".to_string(),
        ],
        RecommendationDetail::Resource { .. } => vec![
            "Announce the reservation change to affected teams".to_string(),
            "Apply the new settings".to_string(),
            "Watch queue times over the next peak period".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::models::EstimatedImprovement;

    fn generator(store: Arc<MemoryStore>) -> RecommendationGenerator {
        RecommendationGenerator::new(store, Arc::new(PriorityRanker::default()))
    }

    fn suggestion(optimization_type: OptimizationType, pct: f64) -> OptimizationRecommendation {
        OptimizationRecommendation {
            optimization_type,
            description: "test suggestion".to_string(),
            rationale: "because".to_string(),
            impact_score: 6.0,
            original_snippet: String::new(),
            optimized_snippet: String::new(),
            estimated_improvement: EstimatedImprovement {
                percentage: pct,
                confidence: Confidence::High,
                metrics: vec!["bytes_processed".into()],
            },
        }
    }

    fn query_detail() -> RecommendationDetail {
        RecommendationDetail::Query {
            original_query: "SELECT * FROM t".into(),
            optimized_query: "SELECT id FROM t".into(),
            techniques: vec![OptimizationType::ColumnPruning],
        }
    }

    #[tokio::test]
    async fn test_generate_persists_and_fills_derived_fields() {
        let store = Arc::new(MemoryStore::new());
        let generator = generator(store.clone());
        let rec = generator
            .generate(
                &suggestion(OptimizationType::ColumnPruning, 40.0),
                query_detail(),
                &GenerationContext { monthly_spend_usd: 1000.0, ..Default::default() },
            )
            .await
            .unwrap();

        assert_eq!(rec.status, RecommendationStatus::New);
        assert!(rec.priority_score > 0.0);
        assert!(!rec.implementation_steps.is_empty());
        assert_eq!(rec.impact.monthly_savings_usd, 400.0);

        let fetched = generator
            .get_recommendation(&rec.recommendation_id)
            .await
            .unwrap()
            .expect("persisted");
        assert_eq!(fetched.recommendation_id, rec.recommendation_id);
    }

    #[tokio::test]
    async fn test_empty_description_rejected() {
        let generator = generator(Arc::new(MemoryStore::new()));
        let mut s = suggestion(OptimizationType::ColumnPruning, 10.0);
        s.description = "  ".to_string();
        let err = generator
            .generate(&s, query_detail(), &GenerationContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_status_transition_validated() {
        let generator = generator(Arc::new(MemoryStore::new()));
        let rec = generator
            .generate(
                &suggestion(OptimizationType::JoinReordering, 30.0),
                query_detail(),
                &GenerationContext::default(),
            )
            .await
            .unwrap();

        let approved = generator
            .update_status(&rec.recommendation_id, RecommendationStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.status, RecommendationStatus::Approved);

        // Approved records cannot be rejected.
        let err = generator
            .update_status(&rec.recommendation_id, RecommendationStatus::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::StateViolation(_)));
    }

    #[tokio::test]
    async fn test_lazy_expiry_on_read() {
        let store = Arc::new(MemoryStore::new());
        let generator =
            RecommendationGenerator::new(store.clone(), Arc::new(PriorityRanker::default()))
                .with_ttl(Duration::days(-1));
        let rec = generator
            .generate(
                &suggestion(OptimizationType::ColumnPruning, 10.0),
                query_detail(),
                &GenerationContext::default(),
            )
            .await
            .unwrap();

        let fetched = generator
            .get_recommendation(&rec.recommendation_id)
            .await
            .unwrap()
            .expect("persisted");
        assert_eq!(fetched.status, RecommendationStatus::Expired);

        // The flip is persisted, not just returned.
        let doc = store
            .get_document(RECOMMENDATIONS_COLLECTION, &rec.recommendation_id)
            .await
            .unwrap()
            .expect("doc");
        assert_eq!(doc["status"], "EXPIRED");
    }

    #[tokio::test]
    async fn test_schema_altering_requires_approval() {
        let generator = generator(Arc::new(MemoryStore::new()));
        let rec = generator
            .generate(
                &suggestion(OptimizationType::Partitioning, 10.0),
                RecommendationDetail::Schema {
                    dataset: "sales".into(),
                    table: "orders".into(),
                    ddl: "CREATE OR REPLACE TABLE ...".into(),
                    rollback_ddl: None,
                },
                &GenerationContext::default(),
            )
            .await
            .unwrap();
        assert!(rec.requires_manual_approval);
    }

    #[tokio::test]
    async fn test_table_design_generation() {
        let generator = generator(Arc::new(MemoryStore::new()));
        let design = TableDesign {
            dataset: "sales".into(),
            table: "orders".into(),
            schema: None,
            partitioning: Some(crate::models::PartitionRecommendation {
                dataset: "sales".into(),
                table: "orders".into(),
                column: "order_date".into(),
                unit: crate::models::PartitionUnit::Day,
                expiration_days: None,
                ddl: "CREATE OR REPLACE TABLE `sales.orders` ...".into(),
                impact_score: 8.0,
                estimated_improvement: EstimatedImprovement {
                    percentage: 60.0,
                    confidence: Confidence::High,
                    metrics: vec!["bytes_processed".into()],
                },
            }),
            clustering: None,
            is_valid: true,
            rejection_reasons: vec![],
            implementation_plan: vec!["ddl".into()],
            combined_improvement_pct: 60.0,
        };
        let recs = generator
            .generate_from_table_design(&design, &GenerationContext::default())
            .await
            .unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].optimization_type, OptimizationType::Partitioning);

        let invalid = TableDesign { is_valid: false, ..design };
        assert!(generator
            .generate_from_table_design(&invalid, &GenerationContext::default())
            .await
            .unwrap()
            .is_empty());
    }
}
