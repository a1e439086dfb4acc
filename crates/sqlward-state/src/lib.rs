//! sqlward-state — primary store for sqlward.
//!
//! Backed by [redb](https://docs.rs/redb), holds reference data (users,
//! roles, edges, clusters, rules, options, statistics, glossaries, avatars,
//! templates) and the change tickets with their statements.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Keys are zero-padded numeric ids so a table scan yields rows in id order.
//! Statements use the composite key `{ticket_id}:{sequence}` and are also
//! indexed by their UUID for hook correlation.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. redb serializes write transactions,
//! which is what makes the conditional ticket transitions race-free.

pub mod error;
pub mod events;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use events::{Event, EventKind, Notifier, TracingNotifier};
pub use store::StateStore;
pub use types::*;
