//! Implementation tracking: change records and approval requests

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::recommendation::Recommendation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Query,
    Schema,
    Resource,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

impl ChangeStatus {
    pub fn can_transition_to(&self, next: ChangeStatus) -> bool {
        use ChangeStatus::*;
        match self {
            Pending => matches!(next, InProgress | Failed),
            InProgress => matches!(next, Completed | Failed),
            Completed => matches!(next, RolledBack),
            Failed | RolledBack => false,
        }
    }
}

/// Record of one applied (or attempted) change. Created at implementation
/// start, mutated through status transitions, never hard-deleted outside
/// test cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub change_id: String,
    pub change_type: ChangeType,
    /// Object the change applies to (table, query hash, reservation, ...).
    pub target_id: String,
    pub before_state: serde_json::Value,
    pub after_state: serde_json::Value,
    pub status: ChangeStatus,
    /// Free-form context; rollback records link the original change here
    /// under `original_change_id`.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChangeRecord {
    pub fn new(change_type: ChangeType, target_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            change_id: Uuid::new_v4().to_string(),
            change_type,
            target_id: target_id.into(),
            before_state: serde_json::Value::Null,
            after_state: serde_json::Value::Null,
            status: ChangeStatus::Pending,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: ChangeStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Implemented,
    RolledBack,
}

impl ApprovalStatus {
    /// PENDING -> {APPROVED, REJECTED, EXPIRED};
    /// APPROVED -> {IMPLEMENTED, ROLLED_BACK}. Everything else is terminal.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        use ApprovalStatus::*;
        match self {
            Pending => matches!(next, Approved | Rejected | Expired),
            Approved => matches!(next, Implemented | RolledBack),
            Implemented => matches!(next, RolledBack),
            Rejected | Expired | RolledBack => false,
        }
    }
}

/// Human approval request for a high-impact recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: String,
    pub recommendation: Recommendation,
    pub requester_id: String,
    pub justification: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn new(
        recommendation: Recommendation,
        requester_id: impl Into<String>,
        justification: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            approval_id: Uuid::new_v4().to_string(),
            recommendation,
            requester_id: requester_id.into(),
            justification: justification.into(),
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            decided_by: None,
            decided_at: None,
        }
    }

    /// Expiry applies to still-pending requests only.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && now >= self.expires_at
    }
}
