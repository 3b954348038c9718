//! Workload model for admission scheduling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadState {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Throttled,
    Canceled,
}

impl WorkloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkloadState::Completed | WorkloadState::Failed | WorkloadState::Canceled
        )
    }

    pub fn can_transition_to(&self, next: WorkloadState) -> bool {
        use WorkloadState::*;
        match self {
            Pending => matches!(next, Scheduled | Throttled | Canceled),
            Scheduled => matches!(next, Running | Canceled),
            Running => matches!(next, Completed | Failed | Canceled),
            Throttled => matches!(next, Pending | Canceled),
            Completed | Failed | Canceled => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadPriority {
    Critical,
    High,
    Normal,
    Low,
}

impl WorkloadPriority {
    /// Base contribution to the 0-100 priority score.
    pub fn base_score(&self) -> f64 {
        match self {
            WorkloadPriority::Critical => 90.0,
            WorkloadPriority::High => 70.0,
            WorkloadPriority::Normal => 50.0,
            WorkloadPriority::Low => 20.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub slots: u32,
    pub memory_gb: f64,
}

/// One unit of work competing for cluster admission. Owned exclusively by
/// the workload manager; state moves through a single keyed record, never
/// by moving the workload between queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub workload_id: String,
    pub workload_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub priority: WorkloadPriority,
    /// Effective score in [0, 100]; priority class plus wait-time aging.
    pub priority_score: f64,
    pub state: WorkloadState,
    pub resource_requirements: ResourceRequirements,
    pub dependencies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_metrics: serde_json::Value,
}

impl Workload {
    pub fn new(
        workload_type: impl Into<String>,
        parameters: serde_json::Value,
        priority: WorkloadPriority,
        resource_requirements: ResourceRequirements,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            workload_id: Uuid::new_v4().to_string(),
            workload_type: workload_type.into(),
            parameters,
            priority_score: priority.base_score(),
            priority,
            state: WorkloadState::Pending,
            resource_requirements,
            dependencies,
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            execution_metrics: serde_json::json!({}),
        }
    }

    /// Ready when every dependency id is in the completed set.
    pub fn is_ready(&self, completed: &HashSet<String>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }
}
