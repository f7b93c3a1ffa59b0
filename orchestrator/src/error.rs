//! Crate-root error type, layering each component's own error kind.

use thiserror::Error;

use crate::interaction::InteractionError;
use crate::scheduler::SchedulerError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error(transparent)]
    Interaction(#[from] InteractionError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl From<std::io::Error> for OrchestratorError {
    fn from(e: std::io::Error) -> Self {
        OrchestratorError::Internal(e.to_string())
    }
}
