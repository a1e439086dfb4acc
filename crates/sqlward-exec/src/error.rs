use sqlward_core::{Classify, ErrorKind};
use sqlward_state::{StateError, TicketStatus};
use thiserror::Error;

use crate::codec::CodecError;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("ticket {0} not found")]
    TicketNotFound(String),

    #[error("statement {0} not found")]
    StatementNotFound(String),

    #[error("cluster {0} not found")]
    ClusterNotFound(u64),

    #[error("ticket {uuid} is {status}, not executable")]
    NotExecutable { uuid: String, status: TicketStatus },

    #[error("cluster {0} is disabled")]
    ClusterDisabled(String),

    #[error("ticket {0} is already being executed")]
    AlreadyRunning(String),

    #[error("ticket {0} is delegated to the online schema change tool")]
    DelegatedToOsc(String),

    #[error("ticket {uuid} cannot move from {from} to {to}")]
    IllegalTransition {
        uuid: String,
        from: TicketStatus,
        to: TicketStatus,
    },

    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("environment variable {0} is not set")]
    MissingHookEnv(&'static str),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to commit execution result: {0}")]
    Commit(#[source] StateError),
}

impl Classify for ExecError {
    fn kind(&self) -> ErrorKind {
        match self {
            ExecError::TicketNotFound(_)
            | ExecError::StatementNotFound(_)
            | ExecError::ClusterNotFound(_) => ErrorKind::NotFound,
            ExecError::NotExecutable { .. }
            | ExecError::ClusterDisabled(_)
            | ExecError::AlreadyRunning(_)
            | ExecError::DelegatedToOsc(_)
            | ExecError::IllegalTransition { .. }
            | ExecError::InvalidSubmission(_) => ErrorKind::Precondition,
            ExecError::MissingHookEnv(_) => ErrorKind::Configuration,
            ExecError::Codec(e) => e.kind(),
            ExecError::State(e) => e.kind(),
            ExecError::Commit(_) => ErrorKind::Upstream,
        }
    }
}
