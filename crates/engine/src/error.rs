//! Engine error surface.

use thiserror::Error;

use fleetforge_infra::command_dispatcher::DispatchError;

/// Failure of an engine operation.
///
/// Folds the domain taxonomy and the dispatch pipeline into one surface:
/// callers see the same distinctions the aggregates draw (validation,
/// wrong-state, already-reconciled, not-found) plus `Conflict` for
/// optimistic-concurrency losses, which are retryable by re-invoking the
/// operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A value failed validation.
    #[error("rejected by validation: {0}")]
    Validation(String),

    /// The aggregate is in the wrong state for the requested transition.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The count's variance has already been folded into stock.
    #[error("count already reconciled")]
    AlreadyReconciled,

    /// The count or part does not exist.
    #[error("no such part or count")]
    NotFound,

    /// A concurrent writer moved the stream; reload and retry.
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    /// The store, bus, or a payload codec failed.
    #[error("infrastructure failure: {0}")]
    Infra(String),
}

impl From<DispatchError> for EngineError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) => EngineError::Validation(msg),
            DispatchError::InvalidState(msg) => EngineError::InvalidState(msg),
            DispatchError::AlreadyReconciled => EngineError::AlreadyReconciled,
            DispatchError::NotFound => EngineError::NotFound,
            DispatchError::Concurrency(msg) => EngineError::Conflict(msg),
            other => EngineError::Infra(other.to_string()),
        }
    }
}
