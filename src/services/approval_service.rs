//! Approval workflow
//!
//! High-impact recommendations go through a human approval gate before they
//! may be implemented. Requests carry a 7-day TTL; expiry is checked lazily
//! on read and swept by the scheduled maintenance task.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::backends::DocumentStore;
use crate::models::{ApprovalRequest, ApprovalStatus, Recommendation};
use crate::utils::{AdvisorError, AdvisorResult};

pub const APPROVALS_COLLECTION: &str = "approval_requests";

pub const DEFAULT_APPROVAL_TTL_DAYS: i64 = 7;

/// Thresholds deciding which recommendations need a human sign-off.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalPolicy {
    /// Performance score above which approval is mandatory.
    pub performance_threshold: f64,
    /// Risk score above which approval is mandatory.
    pub risk_threshold: f64,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self { performance_threshold: 0.7, risk_threshold: 0.6 }
    }
}

impl ApprovalPolicy {
    /// Approval is required for big swings, risky changes, anything that
    /// rewrites a table, and anything touching a business-critical target.
    pub fn requires_approval(&self, rec: &Recommendation) -> bool {
        rec.impact.performance_score > self.performance_threshold
            || rec.impact.risk_score > self.risk_threshold
            || rec.optimization_type.is_schema_altering()
            || rec.business_critical
    }
}

pub struct ApprovalWorkflow {
    store: Arc<dyn DocumentStore>,
    policy: ApprovalPolicy,
    ttl: Duration,
}

impl ApprovalWorkflow {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            policy: ApprovalPolicy::default(),
            ttl: Duration::days(DEFAULT_APPROVAL_TTL_DAYS),
        }
    }

    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn requires_approval(&self, rec: &Recommendation) -> bool {
        self.policy.requires_approval(rec)
    }

    pub async fn create_approval_request(
        &self,
        recommendation: Recommendation,
        requester_id: &str,
        justification: &str,
    ) -> AdvisorResult<ApprovalRequest> {
        if requester_id.trim().is_empty() {
            return Err(AdvisorError::invalid_input("requester_id must not be empty"));
        }
        let request =
            ApprovalRequest::new(recommendation, requester_id, justification, self.ttl);
        self.store
            .create_document(
                APPROVALS_COLLECTION,
                &request.approval_id,
                serde_json::to_value(&request)?,
            )
            .await?;
        tracing::info!(
            approval_id = %request.approval_id,
            recommendation_id = %request.recommendation.recommendation_id,
            "approval request created"
        );
        Ok(request)
    }

    /// Fetch with lazy expiry: an overdue pending request is flipped to
    /// EXPIRED and persisted before it is returned.
    pub async fn get_approval_request(&self, id: &str) -> AdvisorResult<Option<ApprovalRequest>> {
        let Some(doc) = self.store.get_document(APPROVALS_COLLECTION, id).await? else {
            return Ok(None);
        };
        let request: ApprovalRequest = serde_json::from_value(doc)?;
        Ok(Some(self.expire_if_due(request).await?))
    }

    pub async fn list_pending(&self) -> AdvisorResult<Vec<ApprovalRequest>> {
        let docs = self
            .store
            .query_documents(
                APPROVALS_COLLECTION,
                &[("status".to_string(), serde_json::json!("PENDING"))],
            )
            .await?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            let request: ApprovalRequest = serde_json::from_value(doc)?;
            let request = self.expire_if_due(request).await?;
            if request.status == ApprovalStatus::Pending {
                out.push(request);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    pub async fn approve(&self, id: &str, approver_id: &str) -> AdvisorResult<ApprovalRequest> {
        self.decide(id, approver_id, ApprovalStatus::Approved).await
    }

    pub async fn reject(&self, id: &str, approver_id: &str) -> AdvisorResult<ApprovalRequest> {
        self.decide(id, approver_id, ApprovalStatus::Rejected).await
    }

    /// Mark an approved request as implemented, or as rolled back after the
    /// fact. Gatekeeping is the same state machine as the decisions.
    pub async fn mark_status(
        &self,
        id: &str,
        next: ApprovalStatus,
    ) -> AdvisorResult<ApprovalRequest> {
        let mut request = self.require(id).await?;
        if !request.status.can_transition_to(next) {
            return Err(AdvisorError::state_violation(format!(
                "approval {} cannot move {:?} -> {:?}",
                id, request.status, next
            )));
        }
        request.status = next;
        self.persist(&request).await?;
        Ok(request)
    }

    /// Sweep every overdue pending request to EXPIRED. Returns the number
    /// of requests flipped.
    pub async fn check_expired_requests(&self) -> AdvisorResult<usize> {
        let docs = self
            .store
            .query_documents(
                APPROVALS_COLLECTION,
                &[("status".to_string(), serde_json::json!("PENDING"))],
            )
            .await?;
        let now = Utc::now();
        let mut expired = 0;
        for doc in docs {
            let mut request: ApprovalRequest = serde_json::from_value(doc)?;
            if request.is_expired(now) {
                request.status = ApprovalStatus::Expired;
                self.persist(&request).await?;
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!(count = expired, "expired stale approval requests");
        }
        Ok(expired)
    }

    async fn decide(
        &self,
        id: &str,
        approver_id: &str,
        decision: ApprovalStatus,
    ) -> AdvisorResult<ApprovalRequest> {
        let mut request = self.require(id).await?;
        if !request.status.can_transition_to(decision) {
            return Err(AdvisorError::state_violation(format!(
                "approval {} cannot move {:?} -> {:?}",
                id, request.status, decision
            )));
        }
        request.status = decision;
        request.decided_by = Some(approver_id.to_string());
        request.decided_at = Some(Utc::now());
        self.persist(&request).await?;
        tracing::info!(
            approval_id = %id,
            decision = ?decision,
            approver = %approver_id,
            "approval decided"
        );
        Ok(request)
    }

    async fn require(&self, id: &str) -> AdvisorResult<ApprovalRequest> {
        self.get_approval_request(id)
            .await?
            .ok_or_else(|| AdvisorError::not_found(format!("approval request {}", id)))
    }

    async fn persist(&self, request: &ApprovalRequest) -> AdvisorResult<()> {
        self.store
            .update_document(
                APPROVALS_COLLECTION,
                &request.approval_id,
                serde_json::to_value(request)?,
            )
            .await
    }

    async fn expire_if_due(&self, mut request: ApprovalRequest) -> AdvisorResult<ApprovalRequest> {
        if request.is_expired(Utc::now()) {
            request.status = ApprovalStatus::Expired;
            self.persist(&request).await?;
            tracing::debug!(approval_id = %request.approval_id, "approval request expired on read");
        }
        Ok(request)
    }
}
