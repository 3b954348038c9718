//! Crate-wide error type
//!
//! Expected business outcomes (non-equivalent rewrite, incompatible design,
//! rejected approval) are reported through structured result payloads, not
//! through this enum. `AdvisorError` covers contract violations and
//! collaborator failures only.

use thiserror::Error;

pub type AdvisorResult<T> = Result<T, AdvisorError>;

#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Malformed caller input: empty query, missing required fields.
    /// Raised immediately, never coerced.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A lifecycle transition that the state machine forbids,
    /// e.g. approving a non-PENDING request.
    #[error("invalid state transition: {0}")]
    StateViolation(String),

    /// Execution/catalog backend failure surfaced to the caller.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdvisorError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn state_violation(msg: impl Into<String>) -> Self {
        Self::StateViolation(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
