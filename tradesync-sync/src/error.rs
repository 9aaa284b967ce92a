//! Error types for tradesync-sync.

use thiserror::Error;

use tradesync_core::JobId;

/// Failure of a call to the marketplace or ERP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Availability failure (timeout, connection refused, 5xx). Retryable.
    #[error("transient collaborator error: {0}")]
    Transient(String),

    /// Failure intrinsic to the request (validation, 4xx). Never retried.
    #[error("permanent collaborator error: {0}")]
    Permanent(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Transient(_))
    }
}

/// Errors returned by the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no job with id {0}")]
    JobNotFound(JobId),

    /// Cancel was requested for a job a worker already picked up.
    #[error("job {0} is already running")]
    AlreadyRunning(JobId),

    /// A queued job was reported finished without being dispatched.
    #[error("job {0} was never dispatched")]
    NotRunning(JobId),

    #[error("job {0} has already finished")]
    AlreadyFinished(JobId),

    #[error("job queue is closed")]
    Closed,
}

/// Failure of a single entity inside a job.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("local product {0} not found in ERP")]
    MissingLocal(String),
}

impl EntityError {
    /// Whether the underlying cause was an availability problem.
    pub fn is_transient(&self) -> bool {
        matches!(self, EntityError::Collaborator(e) if e.is_transient())
    }
}
