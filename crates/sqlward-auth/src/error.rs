use sqlward_core::{Classify, ErrorKind};
use thiserror::Error;

use crate::gate::DenyReason;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token not found")]
    TokenNotFound,

    #[error("token is obsolete")]
    TokenObsolete,

    #[error("unknown user")]
    UnknownUser,

    #[error("user has no role binding")]
    NoRoleBinding,

    #[error("{0}")]
    Forbidden(DenyReason),

    #[error("token configuration error: {0}")]
    Configuration(String),
}

impl Classify for AuthError {
    fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidToken(_)
            | AuthError::TokenNotFound
            | AuthError::TokenObsolete
            | AuthError::UnknownUser
            | AuthError::Forbidden(DenyReason::Unauthenticated) => ErrorKind::Authentication,
            AuthError::NoRoleBinding | AuthError::Forbidden(_) => ErrorKind::Authorization,
            AuthError::Configuration(_) => ErrorKind::Configuration,
        }
    }
}
