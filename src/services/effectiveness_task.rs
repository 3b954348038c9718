//! Effectiveness monitoring sweep
//!
//! Runs as a [`ScheduledTask`]: picks up due monitoring schedules written
//! by the implementation service, re-measures the changed target, and
//! raises a notification when a change made things worse instead of
//! better.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;

use crate::backends::{DocumentStore, NotificationLevel, NotificationMessage, Notifier, QueryEngine};
use crate::models::{ChangeRecord, ChangeType};
use crate::services::implementation_service::{
    CHANGES_COLLECTION, MONITORING_COLLECTION, MonitoringSchedule,
};
use crate::services::query_analyzer::parse_plan;
use crate::utils::{AdvisorResult, ScheduledTask};

const DEFAULT_REGRESSION_THRESHOLD_PCT: f64 = 10.0;

pub struct EffectivenessMonitor {
    engine: Arc<dyn QueryEngine>,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    notify_channels: Vec<String>,
    /// Slot-time growth (percent) above which a change counts as regressed.
    regression_threshold_pct: f64,
}

impl EffectivenessMonitor {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            engine,
            store,
            notifier,
            notify_channels: vec!["ops".to_string()],
            regression_threshold_pct: DEFAULT_REGRESSION_THRESHOLD_PCT,
        }
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.notify_channels = channels;
        self
    }

    pub fn with_regression_threshold(mut self, pct: f64) -> Self {
        self.regression_threshold_pct = pct;
        self
    }

    /// Process every due, uncompleted schedule. Returns the number of
    /// schedules swept. Individual measurement failures skip the schedule
    /// and leave it for the next sweep.
    pub async fn sweep_due(&self) -> AdvisorResult<usize> {
        let docs = self
            .store
            .query_documents(
                MONITORING_COLLECTION,
                &[("completed".to_string(), serde_json::json!(false))],
            )
            .await?;
        let now = Utc::now();
        let mut swept = 0;
        for doc in docs {
            let schedule: MonitoringSchedule = serde_json::from_value(doc)?;
            if schedule.due_at > now {
                continue;
            }
            match self.measure_and_report(&schedule).await {
                Ok(()) => {
                    self.mark_completed(&schedule).await?;
                    swept += 1;
                },
                Err(err) => {
                    tracing::warn!(
                        schedule_id = %schedule.schedule_id,
                        error = %err,
                        "effectiveness measurement failed; retrying next sweep"
                    );
                },
            }
        }
        Ok(swept)
    }

    async fn measure_and_report(&self, schedule: &MonitoringSchedule) -> AdvisorResult<()> {
        let Some(doc) = self
            .store
            .get_document(CHANGES_COLLECTION, &schedule.change_id)
            .await?
        else {
            tracing::warn!(change_id = %schedule.change_id, "monitored change record is gone");
            return Ok(());
        };
        let change: ChangeRecord = serde_json::from_value(doc)?;

        // Only query rewrites can be re-planned; schema and resource
        // changes are verified by their owning pipelines.
        if change.change_type != ChangeType::Query {
            tracing::debug!(change_id = %change.change_id, "no re-measurement for this change type");
            return Ok(());
        }

        let (Some(before_sql), Some(after_sql)) = (
            change.before_state.get("query").and_then(|v| v.as_str()),
            change.after_state.get("optimized_query").and_then(|v| v.as_str()),
        ) else {
            tracing::warn!(change_id = %change.change_id, "change record lacks query text");
            return Ok(());
        };

        let before_slot_ms = self.plan_slot_ms(before_sql).await?;
        let after_slot_ms = self.plan_slot_ms(after_sql).await?;
        if before_slot_ms <= 0.0 {
            return Ok(());
        }

        let delta_pct = (after_slot_ms - before_slot_ms) / before_slot_ms * 100.0;
        tracing::info!(
            change_id = %change.change_id,
            delta_pct = delta_pct,
            "effectiveness measured"
        );

        if delta_pct > self.regression_threshold_pct {
            let message = NotificationMessage {
                title: "optimization regressed".to_string(),
                body: format!(
                    "change {} on {} is {:.1}% slower than its baseline",
                    change.change_id, change.target_id, delta_pct
                ),
                level: NotificationLevel::Warning,
                metadata: serde_json::json!({
                    "change_id": change.change_id,
                    "target_id": change.target_id,
                    "delta_pct": delta_pct,
                }),
            };
            self.notifier
                .send_notification(&message, &self.notify_channels)
                .await?;
        }
        Ok(())
    }

    async fn plan_slot_ms(&self, sql: &str) -> AdvisorResult<f64> {
        let plan = self.engine.get_query_plan(sql).await?;
        Ok(parse_plan(&plan).map(|p| p.total_slot_ms).unwrap_or(0.0))
    }

    async fn mark_completed(&self, schedule: &MonitoringSchedule) -> AdvisorResult<()> {
        let mut updated = schedule.clone();
        updated.completed = true;
        self.store
            .update_document(
                MONITORING_COLLECTION,
                &updated.schedule_id,
                serde_json::to_value(&updated)?,
            )
            .await
    }
}

impl ScheduledTask for EffectivenessMonitor {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            let swept = self.sweep_due().await?;
            if swept > 0 {
                tracing::info!(count = swept, "effectiveness sweep completed");
            }
            Ok(())
        })
    }
}
