//! Implementation service
//!
//! Applies approved recommendations through the engine, tracks every
//! attempt as a [`ChangeRecord`] with a guarded state machine, schedules
//! effectiveness monitoring for completed changes, and supports
//! type-specific rollback.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backends::{DocumentStore, QueryEngine};
use crate::models::{ChangeRecord, ChangeStatus, ChangeType, Recommendation, RecommendationDetail};
use crate::utils::{AdvisorError, AdvisorResult};

pub const CHANGES_COLLECTION: &str = "change_records";
pub const MONITORING_COLLECTION: &str = "monitoring_schedules";

pub const DEFAULT_AUTO_CONFIDENCE_THRESHOLD: f64 = 0.7;
const DEFAULT_MONITOR_DELAY_HOURS: i64 = 24;

/// Pure auto-implementation gate: confident, complete, and not flagged for
/// a human.
pub fn is_auto_implementable(rec: &Recommendation, confidence_threshold: f64) -> bool {
    rec.confidence_score >= confidence_threshold
        && rec.detail.has_implementation_details()
        && !rec.requires_manual_approval
}

/// What `implement_optimization` produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImplementationOutcome {
    /// A change was attempted; the record's status says whether it stuck.
    Applied { record: ChangeRecord },
    /// Dry run: the payload that would have been applied.
    DryRun { preview: serde_json::Value },
    /// Not auto-implementable; hand these steps to an operator.
    ManualInstructions { steps: Vec<String> },
}

/// Follow-up measurement scheduled after a completed change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSchedule {
    pub schedule_id: String,
    pub change_id: String,
    pub target_id: String,
    pub due_at: DateTime<Utc>,
    /// Metrics captured before the change, for regression comparison.
    pub baseline: serde_json::Value,
    pub completed: bool,
}

pub struct Implementer {
    engine: Arc<dyn QueryEngine>,
    store: Arc<dyn DocumentStore>,
    confidence_threshold: f64,
    monitor_delay: Duration,
}

impl Implementer {
    pub fn new(engine: Arc<dyn QueryEngine>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            engine,
            store,
            confidence_threshold: DEFAULT_AUTO_CONFIDENCE_THRESHOLD,
            monitor_delay: Duration::hours(DEFAULT_MONITOR_DELAY_HOURS),
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_monitor_delay(mut self, delay: Duration) -> Self {
        self.monitor_delay = delay;
        self
    }

    /// Apply one recommendation. `force_auto` bypasses the confidence gate
    /// (not the payload-completeness check); `dry_run` previews without
    /// side effects. Engine failures surface as FAILED change records, not
    /// errors.
    pub async fn implement_optimization(
        &self,
        rec: &Recommendation,
        force_auto: bool,
        dry_run: bool,
    ) -> AdvisorResult<ImplementationOutcome> {
        if !rec.detail.has_implementation_details() {
            return Err(AdvisorError::invalid_input(
                "recommendation carries no implementation payload",
            ));
        }
        if !force_auto && !is_auto_implementable(rec, self.confidence_threshold) {
            return Ok(ImplementationOutcome::ManualInstructions {
                steps: rec.implementation_steps.clone(),
            });
        }

        let preview = preview_payload(&rec.detail);
        if dry_run {
            return Ok(ImplementationOutcome::DryRun { preview });
        }

        let mut record = ChangeRecord::new(change_type_of(&rec.detail), rec.detail.target_id());
        record.before_state = before_state(&rec.detail);
        record.after_state = preview;
        record.metadata = serde_json::json!({
            "recommendation_id": rec.recommendation_id,
            "rollback_ddl": rollback_ddl(&rec.detail),
        });
        self.persist_new(&record).await?;

        record.transition(ChangeStatus::InProgress);
        self.persist(&record).await?;

        match self.apply(&rec.detail).await {
            Ok(()) => {
                record.transition(ChangeStatus::Completed);
                self.persist(&record).await?;
                self.schedule_monitoring(&record).await?;
                tracing::info!(change_id = %record.change_id, "change applied");
            },
            Err(err) => {
                record.metadata["error"] = serde_json::json!(err.to_string());
                record.transition(ChangeStatus::Failed);
                self.persist(&record).await?;
                tracing::warn!(change_id = %record.change_id, error = %err, "change failed");
            },
        }
        Ok(ImplementationOutcome::Applied { record })
    }

    /// Undo a completed change. Writes a ROLLBACK-type record linking the
    /// original and marks the original ROLLED_BACK.
    pub async fn rollback_implementation(&self, change_id: &str) -> AdvisorResult<ChangeRecord> {
        let mut original = self.require_change(change_id).await?;
        if original.status != ChangeStatus::Completed {
            return Err(AdvisorError::state_violation(format!(
                "change {} is {:?}; only COMPLETED changes can be rolled back",
                change_id, original.status
            )));
        }

        let mut rollback = ChangeRecord::new(ChangeType::Rollback, original.target_id.clone());
        rollback.before_state = original.after_state.clone();
        rollback.after_state = original.before_state.clone();
        rollback.metadata = serde_json::json!({ "original_change_id": original.change_id });
        self.persist_new(&rollback).await?;

        rollback.transition(ChangeStatus::InProgress);
        self.persist(&rollback).await?;

        match self.apply_rollback(&original).await {
            Ok(()) => {
                rollback.transition(ChangeStatus::Completed);
                self.persist(&rollback).await?;
                original.transition(ChangeStatus::RolledBack);
                self.persist(&original).await?;
                tracing::info!(
                    change_id = %change_id,
                    rollback_id = %rollback.change_id,
                    "change rolled back"
                );
                Ok(rollback)
            },
            Err(err) => {
                rollback.metadata["error"] = serde_json::json!(err.to_string());
                rollback.transition(ChangeStatus::Failed);
                self.persist(&rollback).await?;
                Err(err)
            },
        }
    }

    pub async fn get_change(&self, change_id: &str) -> AdvisorResult<Option<ChangeRecord>> {
        let Some(doc) = self.store.get_document(CHANGES_COLLECTION, change_id).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(doc)?))
    }

    pub async fn list_changes(&self, target_id: Option<&str>) -> AdvisorResult<Vec<ChangeRecord>> {
        let filters = match target_id {
            Some(t) => vec![("target_id".to_string(), serde_json::json!(t))],
            None => vec![],
        };
        let docs = self.store.query_documents(CHANGES_COLLECTION, &filters).await?;
        let mut out = docs
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ChangeRecord>, _>>()?;
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn apply(&self, detail: &RecommendationDetail) -> AdvisorResult<()> {
        match detail {
            // Query rewrites change text consumers own; the engine only
            // confirms the new text still plans.
            RecommendationDetail::Query { optimized_query, .. } => {
                self.engine.get_query_plan(optimized_query).await?;
                Ok(())
            },
            RecommendationDetail::Schema { ddl, .. } => {
                self.engine.execute_statement(ddl).await?;
                Ok(())
            },
            // Reservation settings are applied by the embedder; the record
            // is the source of truth for what was requested.
            RecommendationDetail::Resource { .. } => Ok(()),
        }
    }

    async fn apply_rollback(&self, original: &ChangeRecord) -> AdvisorResult<()> {
        match original.change_type {
            ChangeType::Schema => {
                let ddl = original
                    .metadata
                    .get("rollback_ddl")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        AdvisorError::invalid_input(format!(
                            "change {} recorded no rollback DDL",
                            original.change_id
                        ))
                    })?;
                self.engine.execute_statement(ddl).await?;
                Ok(())
            },
            ChangeType::Query | ChangeType::Resource => Ok(()),
            ChangeType::Rollback => Err(AdvisorError::state_violation(
                "rollback records cannot themselves be rolled back",
            )),
        }
    }

    async fn schedule_monitoring(&self, record: &ChangeRecord) -> AdvisorResult<()> {
        let schedule = MonitoringSchedule {
            schedule_id: Uuid::new_v4().to_string(),
            change_id: record.change_id.clone(),
            target_id: record.target_id.clone(),
            due_at: Utc::now() + self.monitor_delay,
            baseline: record.before_state.clone(),
            completed: false,
        };
        self.store
            .create_document(
                MONITORING_COLLECTION,
                &schedule.schedule_id,
                serde_json::to_value(&schedule)?,
            )
            .await
    }

    async fn require_change(&self, change_id: &str) -> AdvisorResult<ChangeRecord> {
        self.get_change(change_id)
            .await?
            .ok_or_else(|| AdvisorError::not_found(format!("change record {}", change_id)))
    }

    async fn persist_new(&self, record: &ChangeRecord) -> AdvisorResult<()> {
        self.store
            .create_document(CHANGES_COLLECTION, &record.change_id, serde_json::to_value(record)?)
            .await
    }

    async fn persist(&self, record: &ChangeRecord) -> AdvisorResult<()> {
        self.store
            .update_document(CHANGES_COLLECTION, &record.change_id, serde_json::to_value(record)?)
            .await
    }
}

fn change_type_of(detail: &RecommendationDetail) -> ChangeType {
    match detail {
        RecommendationDetail::Query { .. } => ChangeType::Query,
        RecommendationDetail::Schema { .. } => ChangeType::Schema,
        RecommendationDetail::Resource { .. } => ChangeType::Resource,
    }
}

fn preview_payload(detail: &RecommendationDetail) -> serde_json::Value {
    match detail {
        RecommendationDetail::Query { optimized_query, techniques, .. } => serde_json::json!({
            "optimized_query": optimized_query,
            "techniques": techniques,
        }),
        RecommendationDetail::Schema { dataset, table, ddl, .. } => serde_json::json!({
            "table": format!("{}.{}", dataset, table),
            "ddl": ddl,
        }),
        RecommendationDetail::Resource { target, settings_after, .. } => serde_json::json!({
            "target": target,
            "settings": settings_after,
        }),
    }
}

fn before_state(detail: &RecommendationDetail) -> serde_json::Value {
    match detail {
        RecommendationDetail::Query { original_query, .. } => {
            serde_json::json!({ "query": original_query })
        },
        RecommendationDetail::Schema { dataset, table, .. } => {
            serde_json::json!({ "table": format!("{}.{}", dataset, table) })
        },
        RecommendationDetail::Resource { target, settings_before, .. } => {
            serde_json::json!({ "target": target, "settings": settings_before })
        },
    }
}

fn rollback_ddl(detail: &RecommendationDetail) -> Option<String> {
    match detail {
        RecommendationDetail::Schema { rollback_ddl, .. } => rollback_ddl.clone(),
        _ => None,
    }
}
