//! sqlward-exec — from approved ticket to executed statements.
//!
//! - [`TicketLifecycle`] moves tickets through validation and review.
//! - [`ExecutionEngine`] runs an `LGTM` ticket against its cluster and
//!   records the outcome atomically.
//! - [`HookDispatcher`] routes online-schema-change hook callbacks to a
//!   [`HookHandler`].
//! - [`SecretCodec`] encrypts and decrypts stored cluster passwords.

pub mod cluster;
pub mod codec;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod sentinel;

pub use cluster::{
    ClusterConnector, ClusterError, ClusterFuture, ClusterSession, ClusterTarget, MySqlConnector,
};
pub use codec::{CodecError, SecretCodec};
pub use engine::{ExecutionEngine, ExecutionReport};
pub use error::{ExecError, ExecResult};
pub use hooks::{
    HookContext, HookDispatcher, HookHandler, HookInvocation, HookKind, HookOutcome,
    LoggingHookHandler,
};
pub use lifecycle::{TicketLifecycle, ValidationVerdict};
pub use sentinel::{SentinelRecord, SentinelWriter};
