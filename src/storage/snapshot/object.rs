//! Object snapshot store.
//!
//! One object per snapshot, named `{persistence_id}.{sequence:010}.{ext}`.
//! Object metadata duplicates the save timestamp and the encoded sequence
//! number so listings can be filtered before any body is downloaded.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, error, warn};

use super::{check_identity, decode_snapshot, encode_snapshot};
use crate::interfaces::{
    SelectedSnapshot, SnapshotMetadata, SnapshotSelectionCriteria, SnapshotStore,
};
use crate::serialization::{timestamp_from_micros, Payload, TypeRegistry};
use crate::storage::key_codec::{encode_sequence, object_name, object_prefix, parse_object_name};
use crate::storage::{ObjectBackend, ObjectInfo, Result, Shards, StorageError};

/// Metadata key holding the save time in microseconds since the Unix epoch.
pub const TIMESTAMP_METADATA: &str = "snapshot-timestamp";
/// Metadata key holding the encoded sequence number.
pub const VERSION_METADATA: &str = "version";

/// Default object name extension.
pub const DEFAULT_EXTENSION: &str = "json";

struct Candidate {
    object: ObjectInfo,
    sequence_nr: u64,
}

/// Snapshot store keeping one object per snapshot.
pub struct ObjectSnapshotStore {
    shards: Shards<dyn ObjectBackend>,
    container: String,
    extension: String,
    registry: Arc<TypeRegistry>,
}

impl ObjectSnapshotStore {
    pub fn new(
        shards: Shards<dyn ObjectBackend>,
        container: impl Into<String>,
        registry: Arc<TypeRegistry>,
    ) -> Self {
        Self {
            shards,
            container: container.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            registry,
        }
    }

    /// Use `extension` instead of `json` for object names.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn shards(&self) -> &Shards<dyn ObjectBackend> {
        &self.shards
    }

    fn log_failure(&self, persistence_id: &str, operation: &str, e: &StorageError) {
        error!(
            persistence_id = %persistence_id,
            container = %self.container,
            backend = %self.shards.resolve(persistence_id).name(),
            error = %e,
            "Snapshot {} failed",
            operation
        );
    }

    fn timestamp_of(object: &ObjectInfo) -> Result<chrono::DateTime<chrono::Utc>> {
        let raw = object.metadata.get(TIMESTAMP_METADATA).ok_or_else(|| {
            StorageError::CorruptRecord(format!("{} has no {} metadata", object.name, TIMESTAMP_METADATA))
        })?;
        let micros: i64 = raw.parse().map_err(|_| {
            StorageError::CorruptRecord(format!(
                "{} has invalid {} metadata {:?}",
                object.name, TIMESTAMP_METADATA, raw
            ))
        })?;
        timestamp_from_micros(micros).map_err(|e| StorageError::CorruptRecord(format!("{}: {}", object.name, e)))
    }

    /// Objects of the stream at or below `max_sequence_nr`, youngest first.
    ///
    /// Metadata is not inspected here; see [`Self::accepts`].
    async fn candidates(&self, persistence_id: &str, max_sequence_nr: u64) -> Result<Vec<Candidate>> {
        let objects = self
            .shards
            .resolve(persistence_id)
            .list(&self.container, &object_prefix(persistence_id))
            .await
            .inspect_err(|e| self.log_failure(persistence_id, "list", e))?;

        let mut candidates: Vec<Candidate> = objects
            .into_iter()
            .filter_map(|object| {
                parse_object_name(&object.name, persistence_id, &self.extension)
                    .filter(|&sequence_nr| sequence_nr <= max_sequence_nr)
                    .map(|sequence_nr| Candidate { object, sequence_nr })
            })
            .collect();
        candidates.sort_by(|a, b| b.sequence_nr.cmp(&a.sequence_nr));
        debug!(
            persistence_id = %persistence_id,
            count = candidates.len(),
            "Listed snapshot candidates"
        );
        Ok(candidates)
    }

    /// Whether a candidate's save time satisfies `criteria`.
    fn accepts(candidate: &Candidate, criteria: &SnapshotSelectionCriteria) -> Result<bool> {
        Ok(Self::timestamp_of(&candidate.object)? <= criteria.max_timestamp)
    }

    async fn delete_objects(&self, persistence_id: &str, names: Vec<String>) -> Result<()> {
        let backend = self.shards.resolve(persistence_id);
        try_join_all(names.iter().map(|name| async move {
            let existed = backend.delete_if_exists(&self.container, name).await?;
            debug!(persistence_id = %persistence_id, object = %name, existed, "Deleted snapshot object");
            Ok::<_, StorageError>(())
        }))
        .await
        .inspect_err(|e| self.log_failure(persistence_id, "delete", e))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for ObjectSnapshotStore {
    async fn load(
        &self,
        persistence_id: &str,
        criteria: &SnapshotSelectionCriteria,
    ) -> Result<Option<SelectedSnapshot>> {
        let backend = self.shards.resolve(persistence_id);
        for candidate in self
            .candidates(persistence_id, criteria.max_sequence_nr)
            .await?
        {
            if !Self::accepts(&candidate, criteria)? {
                continue;
            }
            let body = backend
                .download(&self.container, &candidate.object.name)
                .await
                .inspect_err(|e| self.log_failure(persistence_id, "download", e))?;
            let Some(body) = body else {
                warn!(
                    persistence_id = %persistence_id,
                    object = %candidate.object.name,
                    "Snapshot object vanished after listing"
                );
                continue;
            };

            let selected = decode_snapshot(&self.registry, &body)?;
            check_identity(&selected, persistence_id, candidate.sequence_nr)?;
            debug!(
                persistence_id = %persistence_id,
                sequence_nr = candidate.sequence_nr,
                "Loaded snapshot"
            );
            return Ok(Some(selected));
        }
        Ok(None)
    }

    async fn save(&self, metadata: &SnapshotMetadata, snapshot: &Payload) -> Result<()> {
        let persistence_id = metadata.persistence_id.as_str();
        let name = object_name(persistence_id, metadata.sequence_nr, &self.extension)?;
        let body = encode_snapshot(&self.registry, metadata, snapshot)?;
        let object_metadata = HashMap::from([
            (
                TIMESTAMP_METADATA.to_string(),
                metadata.timestamp.timestamp_micros().to_string(),
            ),
            (
                VERSION_METADATA.to_string(),
                encode_sequence(metadata.sequence_nr)?,
            ),
        ]);

        self.shards
            .resolve(persistence_id)
            .upload(&self.container, &name, body, object_metadata)
            .await
            .inspect_err(|e| self.log_failure(persistence_id, "save", e))?;

        debug!(persistence_id = %persistence_id, object = %name, "Saved snapshot");
        Ok(())
    }

    async fn delete(&self, metadata: &SnapshotMetadata) -> Result<()> {
        let persistence_id = metadata.persistence_id.as_str();
        let name = object_name(persistence_id, metadata.sequence_nr, &self.extension)?;

        let names: Vec<String> = self
            .shards
            .resolve(persistence_id)
            .list(&self.container, &name)
            .await
            .inspect_err(|e| self.log_failure(persistence_id, "list", e))?
            .into_iter()
            .filter(|object| object.name == name)
            .map(|object| object.name)
            .collect();

        self.delete_objects(persistence_id, names).await
    }

    async fn delete_matching(
        &self,
        persistence_id: &str,
        criteria: &SnapshotSelectionCriteria,
    ) -> Result<()> {
        let mut names = Vec::new();
        for candidate in self
            .candidates(persistence_id, criteria.max_sequence_nr)
            .await?
        {
            if Self::accepts(&candidate, criteria)? {
                names.push(candidate.object.name);
            }
        }
        self.delete_objects(persistence_id, names).await
    }
}
