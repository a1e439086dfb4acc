//! Error taxonomy shared by all sqlward crates.
//!
//! Each crate keeps its own `thiserror` enum and implements [`Classify`] so
//! the request boundary can turn any failure into a [`PublicError`] without
//! knowing the concrete type.

use serde::Serialize;
use tracing::error;

/// Coarse failure categories exposed at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing, invalid, or obsolete token.
    Authentication,
    /// Role mismatch or account status.
    Authorization,
    /// Ticket, statement, cluster, or user absent.
    NotFound,
    /// Entity not in a state that permits the operation.
    Precondition,
    /// Primary store or target cluster I/O failure.
    Upstream,
    /// Bad secret or key material, unreadable configuration.
    Configuration,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Authentication => "unauthenticated",
            ErrorKind::Authorization => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Precondition => "precondition_failed",
            ErrorKind::Upstream | ErrorKind::Configuration => "unknown_error",
        }
    }

    /// Whether the error message may be shown to end users.
    pub fn is_public(self) -> bool {
        !matches!(self, ErrorKind::Upstream | ErrorKind::Configuration)
    }
}

/// Maps a crate-specific error onto the shared taxonomy.
pub trait Classify: std::error::Error {
    fn kind(&self) -> ErrorKind;
}

/// The error shape handed to the (external) transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicError {
    pub code: &'static str,
    pub message: String,
}

impl PublicError {
    /// Convert an internal error into its public form.
    ///
    /// Upstream and configuration failures are masked as "unknown error";
    /// their full detail only reaches the server log.
    pub fn from_error<E: Classify + ?Sized>(err: &E) -> Self {
        let kind = err.kind();
        if kind.is_public() {
            Self {
                code: kind.code(),
                message: err.to_string(),
            }
        } else {
            error!(kind = ?kind, error = %err, "internal failure at request boundary");
            Self {
                code: kind.code(),
                message: "unknown error".to_string(),
            }
        }
    }
}
