//! Keyed-record snapshot store.
//!
//! One row per snapshot: partition key = persistence id, row key = encoded
//! sequence number. Besides the envelope the row keeps `timestamp` as
//! microseconds since the Unix epoch so selection can filter rows without
//! decoding them.

use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};
use uuid::Uuid;

use super::{check_identity, decode_snapshot, encode_snapshot};
use crate::interfaces::{
    SelectedSnapshot, SnapshotMetadata, SnapshotSelectionCriteria, SnapshotStore,
};
use crate::serialization::{timestamp_from_micros, Payload, TypeRegistry};
use crate::storage::key_codec::{decode_sequence, encode_sequence, upper_bound};
use crate::storage::{
    PropertyValue, Result, RowRange, Shards, StorageError, TableBackend, TableBatch, TableEntity,
    TableOperation,
};

const ID: &str = "id";
const PERSISTENCE_ID: &str = "persistence_id";
const TYPE_TAG: &str = "type_tag";
const SEQUENCE_NR: &str = "sequence_nr";
const TIMESTAMP: &str = "timestamp";
const SNAPSHOT: &str = "snapshot";

/// Snapshot store keeping one table row per snapshot.
pub struct TableSnapshotStore {
    shards: Shards<dyn TableBackend>,
    table: String,
    registry: Arc<TypeRegistry>,
}

impl TableSnapshotStore {
    pub fn new(
        shards: Shards<dyn TableBackend>,
        table: impl Into<String>,
        registry: Arc<TypeRegistry>,
    ) -> Self {
        Self {
            shards,
            table: table.into(),
            registry,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn shards(&self) -> &Shards<dyn TableBackend> {
        &self.shards
    }

    fn log_failure(&self, persistence_id: &str, operation: &str, e: &StorageError) {
        error!(
            persistence_id = %persistence_id,
            table = %self.table,
            backend = %self.shards.resolve(persistence_id).name(),
            error = %e,
            "Snapshot {} failed",
            operation
        );
    }

    /// Rows satisfying `criteria`, youngest sequence first.
    async fn matching_rows(
        &self,
        persistence_id: &str,
        criteria: &SnapshotSelectionCriteria,
    ) -> Result<Vec<(u64, TableEntity)>> {
        let range = RowRange::new(
            persistence_id,
            Bound::Unbounded,
            upper_bound(criteria.max_sequence_nr),
        );
        let rows = self
            .shards
            .resolve(persistence_id)
            .query(&self.table, &range)
            .await
            .inspect_err(|e| self.log_failure(persistence_id, "query", e))?;

        let mut matching = Vec::new();
        for row in rows.into_iter().rev() {
            let sequence_nr = decode_sequence(&row.row_key)?;
            let timestamp = timestamp_from_micros(row.get_i64(TIMESTAMP)?)?;
            if criteria.matches(sequence_nr, timestamp) {
                matching.push((sequence_nr, row));
            }
        }
        Ok(matching)
    }
}

#[async_trait]
impl SnapshotStore for TableSnapshotStore {
    async fn load(
        &self,
        persistence_id: &str,
        criteria: &SnapshotSelectionCriteria,
    ) -> Result<Option<SelectedSnapshot>> {
        let rows = self.matching_rows(persistence_id, criteria).await?;
        let Some((sequence_nr, row)) = rows.into_iter().next() else {
            debug!(persistence_id = %persistence_id, "No matching snapshot");
            return Ok(None);
        };

        let selected = decode_snapshot(&self.registry, row.get_binary(SNAPSHOT)?)?;
        check_identity(&selected, persistence_id, sequence_nr)?;
        debug!(persistence_id = %persistence_id, sequence_nr, "Loaded snapshot");
        Ok(Some(selected))
    }

    async fn save(&self, metadata: &SnapshotMetadata, snapshot: &Payload) -> Result<()> {
        let persistence_id = metadata.persistence_id.as_str();
        let sequence = i64::try_from(metadata.sequence_nr)
            .map_err(|_| StorageError::KeyOutOfRange(metadata.sequence_nr))?;
        let body = encode_snapshot(&self.registry, metadata, snapshot)?;

        let entity = TableEntity::new(persistence_id, encode_sequence(metadata.sequence_nr)?)
            .with(ID, PropertyValue::String(Uuid::new_v4().to_string()))
            .with(PERSISTENCE_ID, PropertyValue::String(persistence_id.to_string()))
            .with(TYPE_TAG, PropertyValue::String(snapshot.type_tag().to_string()))
            .with(SEQUENCE_NR, PropertyValue::I64(sequence))
            .with(TIMESTAMP, PropertyValue::I64(metadata.timestamp.timestamp_micros()))
            .with(SNAPSHOT, PropertyValue::Binary(body));

        self.shards
            .resolve(persistence_id)
            .insert(&self.table, entity)
            .await
            .inspect_err(|e| self.log_failure(persistence_id, "save", e))?;

        debug!(
            persistence_id = %persistence_id,
            sequence_nr = metadata.sequence_nr,
            "Saved snapshot"
        );
        Ok(())
    }

    async fn delete(&self, metadata: &SnapshotMetadata) -> Result<()> {
        let persistence_id = metadata.persistence_id.as_str();
        let row_key = encode_sequence(metadata.sequence_nr)?;
        let backend = self.shards.resolve(persistence_id);

        let existing = backend
            .retrieve(&self.table, persistence_id, &row_key)
            .await
            .inspect_err(|e| self.log_failure(persistence_id, "lookup", e))?;
        if existing.is_none() {
            return Ok(());
        }

        match backend.delete(&self.table, persistence_id, &row_key).await {
            // Removed concurrently between lookup and delete.
            Err(StorageError::NotFound { .. }) => Ok(()),
            Err(e) => {
                self.log_failure(persistence_id, "delete", &e);
                Err(e)
            }
            Ok(()) => {
                debug!(
                    persistence_id = %persistence_id,
                    sequence_nr = metadata.sequence_nr,
                    "Deleted snapshot"
                );
                Ok(())
            }
        }
    }

    async fn delete_matching(
        &self,
        persistence_id: &str,
        criteria: &SnapshotSelectionCriteria,
    ) -> Result<()> {
        let rows = self.matching_rows(persistence_id, criteria).await?;
        if rows.is_empty() {
            return Ok(());
        }

        let mut batch = TableBatch::new(persistence_id);
        for (_, row) in rows {
            batch.push(TableOperation::Delete {
                row_key: row.row_key,
            })?;
        }
        let count = batch.len();

        self.shards
            .resolve(persistence_id)
            .execute_batch(&self.table, batch)
            .await
            .inspect_err(|e| self.log_failure(persistence_id, "delete", e))?;

        debug!(persistence_id = %persistence_id, count, "Deleted matching snapshots");
        Ok(())
    }
}
