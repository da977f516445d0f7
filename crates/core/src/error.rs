//! Errors the domain layer is allowed to produce.

use thiserror::Error;

/// Shorthand for fallible domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// A deterministic business failure.
///
/// Every variant here means "the command was understood and refused", never
/// "something broke". Storage, transport and serialization failures live in
/// the infra layer's error types instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input a command handler refuses to accept (empty part number,
    /// negative quantity, actual count out of range).
    #[error("rejected by validation: {0}")]
    Validation(String),

    /// The aggregate is in the wrong state for the requested transition
    /// (e.g. recording a cancelled count, cancelling a completed one).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The count's variance has already been folded into stock.
    /// Reconciliation is one-way and exactly-once.
    #[error("count already reconciled")]
    AlreadyReconciled,

    /// A textual id that does not parse as the expected newtype.
    #[error("unparsable identifier: {0}")]
    InvalidId(String),

    /// The aggregate the command addresses has no events.
    #[error("no such aggregate")]
    NotFound,

    /// Two writers raced on the same stream. Callers may retry after
    /// re-reading.
    #[error("stream conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
