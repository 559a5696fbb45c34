//! Snapshot stores: one table row or one object per snapshot.
//!
//! Both variants store the same JSON envelope (metadata plus registry
//! encoded payload) and duplicate the timestamp outside it, so candidates
//! can be filtered without downloading or decoding them.

mod object;
mod table;

pub use object::{ObjectSnapshotStore, DEFAULT_EXTENSION, TIMESTAMP_METADATA, VERSION_METADATA};
pub use table::TableSnapshotStore;

use super::{Result, StorageError};
use crate::interfaces::{SelectedSnapshot, SnapshotMetadata};
use crate::serialization::{Payload, SnapshotEnvelope, TypeRegistry};

/// Encode a snapshot into envelope bytes.
pub(crate) fn encode_snapshot(
    registry: &TypeRegistry,
    metadata: &SnapshotMetadata,
    snapshot: &Payload,
) -> Result<Vec<u8>> {
    let payload = registry.encode(snapshot)?;
    let envelope = SnapshotEnvelope::new(
        &metadata.persistence_id,
        metadata.sequence_nr,
        metadata.timestamp,
        snapshot.type_tag(),
        &payload,
    );
    Ok(envelope.to_bytes()?)
}

/// Decode envelope bytes back into a snapshot.
pub(crate) fn decode_snapshot(registry: &TypeRegistry, bytes: &[u8]) -> Result<SelectedSnapshot> {
    let envelope = SnapshotEnvelope::from_bytes(bytes)?;
    let payload = envelope.payload_bytes()?;
    let snapshot = registry.decode(&envelope.type_tag, &payload)?;
    Ok(SelectedSnapshot {
        metadata: SnapshotMetadata {
            timestamp: envelope.timestamp()?,
            persistence_id: envelope.persistence_id,
            sequence_nr: envelope.sequence_nr,
        },
        snapshot,
    })
}

/// Reject a snapshot whose envelope belongs to another stream position.
pub(crate) fn check_identity(
    selected: &SelectedSnapshot,
    persistence_id: &str,
    sequence_nr: u64,
) -> Result<()> {
    if selected.metadata.persistence_id != persistence_id
        || selected.metadata.sequence_nr != sequence_nr
    {
        return Err(StorageError::CorruptRecord(format!(
            "snapshot stored as {}@{} contains {}@{}",
            persistence_id,
            sequence_nr,
            selected.metadata.persistence_id,
            selected.metadata.sequence_nr
        )));
    }
    Ok(())
}
