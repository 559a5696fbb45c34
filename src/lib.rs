//! shardjournal - sharded event journal and snapshot stores
//!
//! Maps an event-sourced entity's ordered event log and its periodic
//! snapshots onto partitioned table storage (partition key + sortable row
//! key) and flat object storage, sharded statically across several backend
//! accounts.

pub mod config;
pub mod interfaces;
pub mod persistence;
pub mod serialization;
pub mod storage;
pub mod utils;

pub use interfaces::{
    Journal, PersistentRepr, SelectedSnapshot, SnapshotMetadata, SnapshotSelectionCriteria,
    SnapshotStore,
};
pub use config::PersistenceConfig;
pub use persistence::{Persistence, PersistenceError};
pub use serialization::{Payload, TypeRegistry};
pub use storage::{ErrorKind, Result, StorageError};
