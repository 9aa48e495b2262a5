use thiserror::Error;
use uuid::Uuid;

/// A value rejected at the record boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("trait value {0} is outside 0..=100")]
    TraitOutOfRange(i64),
    #[error("feedback score {0} is not one of -1, 0, 1")]
    FeedbackOutOfRange(i64),
}

/// Failures reported by the persistence service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("persistence service unreachable: {0}")]
    Unreachable(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid record: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Transient failures are recovered through the cache or the outbox.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unreachable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by the completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion service returned no text")]
    EmptyResponse,
    #[error("completion client misconfigured: {0}")]
    Config(String),
}

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Invalid(String),
    #[error("unknown conversation {0}")]
    UnknownConversation(Uuid),
    #[error("unknown message {0}")]
    UnknownMessage(Uuid),
}

impl ChatError {
    /// True when the failure came from an unreachable persistence service.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Store(e) if e.is_transient())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
