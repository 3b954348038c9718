//! Workload admission and scheduling
//!
//! All workloads live in one map keyed by workload id; a state transition
//! is a single in-place update of the record's state field, never a move
//! between queues. Scheduling order is priority score (class base plus
//! wait-time aging) with FIFO tie-breaking.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::{DashMap, DashSet};

use crate::models::{ResourceRequirements, Workload, WorkloadPriority, WorkloadState};
use crate::utils::{AdvisorError, AdvisorResult};

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 8;
/// Score points gained per minute of waiting.
const AGING_PER_MINUTE: f64 = 1.0;

pub struct WorkloadManager {
    workloads: DashMap<String, Workload>,
    completed_ids: DashSet<String>,
    concurrency_limit: usize,
}

impl Default for WorkloadManager {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY_LIMIT)
    }
}

impl WorkloadManager {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            workloads: DashMap::new(),
            completed_ids: DashSet::new(),
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub fn submit_workload(
        &self,
        workload_type: &str,
        parameters: serde_json::Value,
        priority: WorkloadPriority,
        resource_requirements: ResourceRequirements,
        dependencies: Vec<String>,
    ) -> AdvisorResult<Workload> {
        if workload_type.trim().is_empty() {
            return Err(AdvisorError::invalid_input("workload_type must not be empty"));
        }
        for dep in &dependencies {
            if !self.workloads.contains_key(dep) && !self.completed_ids.contains(dep) {
                return Err(AdvisorError::invalid_input(format!(
                    "unknown dependency workload {}",
                    dep
                )));
            }
        }

        let workload = Workload::new(
            workload_type,
            parameters,
            priority,
            resource_requirements,
            dependencies,
        );
        self.workloads.insert(workload.workload_id.clone(), workload.clone());
        tracing::debug!(workload_id = %workload.workload_id, "workload submitted");
        Ok(workload)
    }

    pub fn get_workload(&self, id: &str) -> Option<Workload> {
        self.workloads.get(id).map(|w| w.clone())
    }

    pub fn list_by_state(&self, state: WorkloadState) -> Vec<Workload> {
        self.workloads
            .iter()
            .filter(|entry| entry.state == state)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Admit ready pending workloads up to the concurrency limit, highest
    /// priority score first. Returns the ids admitted this pass.
    pub fn schedule_pending(&self) -> Vec<String> {
        self.refresh_priorities();

        let active = self.active_count();
        let capacity = self.concurrency_limit.saturating_sub(active);
        if capacity == 0 {
            return Vec::new();
        }

        let completed: HashSet<String> =
            self.completed_ids.iter().map(|id| id.clone()).collect();
        let mut candidates: Vec<(String, f64, chrono::DateTime<Utc>)> = self
            .workloads
            .iter()
            .filter(|entry| entry.state == WorkloadState::Pending && entry.is_ready(&completed))
            .map(|entry| (entry.workload_id.clone(), entry.priority_score, entry.created_at))
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));

        let mut admitted = Vec::new();
        for (id, _, _) in candidates.into_iter().take(capacity) {
            // Recheck under the entry lock; the state may have moved since
            // the snapshot.
            if let Some(mut entry) = self.workloads.get_mut(&id)
                && entry.state == WorkloadState::Pending
            {
                entry.state = WorkloadState::Scheduled;
                entry.scheduled_at = Some(Utc::now());
                admitted.push(id);
            }
        }
        if !admitted.is_empty() {
            tracing::info!(count = admitted.len(), "workloads scheduled");
        }
        admitted
    }

    pub fn start(&self, id: &str) -> AdvisorResult<Workload> {
        self.transition(id, WorkloadState::Running, |w| {
            w.started_at = Some(Utc::now());
        })
    }

    pub fn complete(&self, id: &str, execution_metrics: serde_json::Value) -> AdvisorResult<Workload> {
        let workload = self.transition(id, WorkloadState::Completed, |w| {
            w.completed_at = Some(Utc::now());
            w.execution_metrics = execution_metrics.clone();
        })?;
        self.completed_ids.insert(workload.workload_id.clone());
        Ok(workload)
    }

    pub fn fail(&self, id: &str) -> AdvisorResult<Workload> {
        self.transition(id, WorkloadState::Failed, |w| {
            w.completed_at = Some(Utc::now());
        })
    }

    pub fn cancel(&self, id: &str) -> AdvisorResult<Workload> {
        self.transition(id, WorkloadState::Canceled, |w| {
            w.completed_at = Some(Utc::now());
        })
    }

    pub fn throttle(&self, id: &str) -> AdvisorResult<Workload> {
        self.transition(id, WorkloadState::Throttled, |_| {})
    }

    /// Return a throttled workload to the pending pool.
    pub fn resume(&self, id: &str) -> AdvisorResult<Workload> {
        self.transition(id, WorkloadState::Pending, |_| {})
    }

    /// Recompute priority scores for waiting workloads: class base plus
    /// one point per waiting minute, clamped to [0, 100].
    pub fn refresh_priorities(&self) {
        let now = Utc::now();
        for mut entry in self.workloads.iter_mut() {
            if matches!(entry.state, WorkloadState::Pending | WorkloadState::Throttled) {
                let waited_minutes =
                    (now - entry.created_at).num_seconds().max(0) as f64 / 60.0;
                entry.priority_score = (entry.priority.base_score()
                    + waited_minutes * AGING_PER_MINUTE)
                    .clamp(0.0, 100.0);
            }
        }
    }

    fn active_count(&self) -> usize {
        self.workloads
            .iter()
            .filter(|entry| {
                matches!(entry.state, WorkloadState::Scheduled | WorkloadState::Running)
            })
            .count()
    }

    fn transition(
        &self,
        id: &str,
        next: WorkloadState,
        apply: impl FnOnce(&mut Workload),
    ) -> AdvisorResult<Workload> {
        let mut entry = self
            .workloads
            .get_mut(id)
            .ok_or_else(|| AdvisorError::not_found(format!("workload {}", id)))?;
        if !entry.state.can_transition_to(next) {
            return Err(AdvisorError::state_violation(format!(
                "workload {} cannot move {:?} -> {:?}",
                id, entry.state, next
            )));
        }
        entry.state = next;
        apply(&mut entry);
        tracing::debug!(workload_id = %id, state = ?next, "workload transitioned");
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(limit: usize) -> Arc<WorkloadManager> {
        Arc::new(WorkloadManager::new(limit))
    }

    fn submit(m: &WorkloadManager, priority: WorkloadPriority, deps: Vec<String>) -> Workload {
        m.submit_workload(
            "query_optimization",
            serde_json::json!({}),
            priority,
            ResourceRequirements::default(),
            deps,
        )
        .unwrap()
    }

    #[test]
    fn test_admission_respects_concurrency_limit() {
        let m = manager(2);
        for _ in 0..5 {
            submit(&m, WorkloadPriority::Normal, vec![]);
        }
        assert_eq!(m.schedule_pending().len(), 2);
        // Nothing frees up, nothing more admitted.
        assert!(m.schedule_pending().is_empty());
        assert_eq!(m.list_by_state(WorkloadState::Pending).len(), 3);
    }

    #[test]
    fn test_higher_priority_admitted_first() {
        let m = manager(1);
        submit(&m, WorkloadPriority::Low, vec![]);
        let critical = submit(&m, WorkloadPriority::Critical, vec![]);
        let admitted = m.schedule_pending();
        assert_eq!(admitted, vec![critical.workload_id]);
    }

    #[test]
    fn test_dependencies_gate_admission() {
        let m = manager(4);
        let upstream = submit(&m, WorkloadPriority::Normal, vec![]);
        let downstream =
            submit(&m, WorkloadPriority::Critical, vec![upstream.workload_id.clone()]);

        // Downstream is not ready while upstream is unfinished.
        let admitted = m.schedule_pending();
        assert_eq!(admitted, vec![upstream.workload_id.clone()]);

        m.start(&upstream.workload_id).unwrap();
        m.complete(&upstream.workload_id, serde_json::json!({"rows": 10})).unwrap();

        let admitted = m.schedule_pending();
        assert_eq!(admitted, vec![downstream.workload_id]);
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let m = manager(1);
        let err = m
            .submit_workload(
                "q",
                serde_json::json!({}),
                WorkloadPriority::Normal,
                ResourceRequirements::default(),
                vec!["missing".into()],
            )
            .unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidInput(_)));
    }

    #[test]
    fn test_lifecycle_transitions() {
        let m = manager(1);
        let w = submit(&m, WorkloadPriority::Normal, vec![]);
        m.schedule_pending();
        let running = m.start(&w.workload_id).unwrap();
        assert_eq!(running.state, WorkloadState::Running);
        assert!(running.started_at.is_some());

        let done = m.complete(&w.workload_id, serde_json::json!({})).unwrap();
        assert_eq!(done.state, WorkloadState::Completed);

        // Terminal; nothing else is legal.
        let err = m.cancel(&w.workload_id).unwrap_err();
        assert!(matches!(err, AdvisorError::StateViolation(_)));
    }

    #[test]
    fn test_throttle_and_resume() {
        let m = manager(1);
        let w = submit(&m, WorkloadPriority::Normal, vec![]);
        assert_eq!(m.throttle(&w.workload_id).unwrap().state, WorkloadState::Throttled);
        assert_eq!(m.resume(&w.workload_id).unwrap().state, WorkloadState::Pending);

        // Running workloads cannot be throttled.
        m.schedule_pending();
        m.start(&w.workload_id).unwrap();
        assert!(matches!(
            m.throttle(&w.workload_id),
            Err(AdvisorError::StateViolation(_))
        ));
    }

    #[test]
    fn test_priority_score_clamped() {
        let m = manager(1);
        let mut w = submit(&m, WorkloadPriority::Critical, vec![]);
        // Fake a long wait.
        w.created_at = Utc::now() - chrono::Duration::hours(5);
        m.workloads.insert(w.workload_id.clone(), w.clone());

        m.refresh_priorities();
        let refreshed = m.get_workload(&w.workload_id).unwrap();
        assert_eq!(refreshed.priority_score, 100.0);
    }

    #[test]
    fn test_failed_workload_does_not_satisfy_dependencies() {
        let m = manager(4);
        let upstream = submit(&m, WorkloadPriority::Normal, vec![]);
        let downstream = submit(&m, WorkloadPriority::Normal, vec![upstream.workload_id.clone()]);

        m.schedule_pending();
        m.start(&upstream.workload_id).unwrap();
        m.fail(&upstream.workload_id).unwrap();

        let admitted = m.schedule_pending();
        assert!(!admitted.contains(&downstream.workload_id));
    }
}
