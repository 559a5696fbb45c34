//! Abstract interfaces invoked by the host actor runtime.
//!
//! These traits define the contracts for:
//! - Event journaling (write, highest sequence, replay, delete-to)
//! - Snapshot storage (load by criteria, save, delete)

pub mod journal;
pub mod snapshot_store;

pub use journal::{Journal, PersistentRepr};
pub use snapshot_store::{
    SelectedSnapshot, SnapshotMetadata, SnapshotSelectionCriteria, SnapshotStore,
};
