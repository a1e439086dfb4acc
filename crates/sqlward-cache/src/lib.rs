//! sqlward-cache — in-memory reference data for sqlward.
//!
//! Every reference entity lives in a [`SnapshotSlot`]: an immutable,
//! indexed [`Snapshot`] replaced wholesale by refreshes and read without
//! touching the primary store. [`Snapshots`] groups the slots and the
//! relation helpers built on the Edge snapshot; [`RefreshScheduler`] keeps
//! the fast and slow groups current.

pub mod registry;
pub mod scheduler;
pub mod snapshot;

pub use registry::{Entity, RefreshGroup, SnapshotLoader, Snapshots};
pub use scheduler::{RefreshSchedule, RefreshScheduler};
pub use snapshot::{RefreshOutcome, Snapshot, SnapshotSlot};
