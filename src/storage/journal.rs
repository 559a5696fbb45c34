//! Sharded event journal over partitioned table storage.
//!
//! Row layout (table `events` by default):
//!
//! ```text
//! partition key = persistence id
//! row key       = zero-padded sequence number (10 digits)
//!
//! id             String  UUID v5 of persistence id + sequence number
//! persistence_id String
//! type_tag       String  TypeRegistry tag of the payload
//! sequence_nr    I64
//! payload        Binary  registry-encoded payload
//! deleted        Bool    tombstone
//! ```

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, error};
use uuid::Uuid;

use super::key_codec::{decode_sequence, encode_sequence, lower_bound, upper_bound};
use super::{
    PropertyValue, Result, RowRange, Shards, StorageError, TableBackend, TableBatch, TableEntity,
    TableOperation, MAX_BATCH_OPERATIONS,
};
use crate::interfaces::{Journal, PersistentRepr};
use crate::serialization::TypeRegistry;

const ID: &str = "id";
const PERSISTENCE_ID: &str = "persistence_id";
const TYPE_TAG: &str = "type_tag";
const SEQUENCE_NR: &str = "sequence_nr";
const PAYLOAD: &str = "payload";
const DELETED: &str = "deleted";

/// Deterministic event id: the same stream position always maps to the same id.
pub fn event_id(persistence_id: &str, sequence_nr: u64) -> Uuid {
    let name = format!("{}:{}", persistence_id, sequence_nr);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// A stored journal row with its payload still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: Uuid,
    pub persistence_id: String,
    pub sequence_nr: u64,
    pub type_tag: String,
    pub payload: Vec<u8>,
    pub deleted: bool,
}

impl JournalEntry {
    fn to_entity(&self) -> Result<TableEntity> {
        let sequence = i64::try_from(self.sequence_nr)
            .map_err(|_| StorageError::KeyOutOfRange(self.sequence_nr))?;
        Ok(TableEntity::new(
            self.persistence_id.clone(),
            encode_sequence(self.sequence_nr)?,
        )
        .with(ID, PropertyValue::String(self.id.to_string()))
        .with(
            PERSISTENCE_ID,
            PropertyValue::String(self.persistence_id.clone()),
        )
        .with(TYPE_TAG, PropertyValue::String(self.type_tag.clone()))
        .with(SEQUENCE_NR, PropertyValue::I64(sequence))
        .with(PAYLOAD, PropertyValue::Binary(self.payload.clone()))
        .with(DELETED, PropertyValue::Bool(self.deleted)))
    }

    fn from_entity(entity: &TableEntity) -> Result<Self> {
        let sequence_nr = decode_sequence(&entity.row_key)?;
        let id = entity.get_str(ID)?;
        let id = Uuid::parse_str(id).map_err(|e| {
            StorageError::CorruptRecord(format!(
                "{}/{} has invalid id {}: {}",
                entity.partition_key, entity.row_key, id, e
            ))
        })?;
        Ok(Self {
            id,
            persistence_id: entity.get_str(PERSISTENCE_ID)?.to_string(),
            sequence_nr,
            type_tag: entity.get_str(TYPE_TAG)?.to_string(),
            payload: entity.get_binary(PAYLOAD)?.to_vec(),
            deleted: entity.get_bool(DELETED)?,
        })
    }
}

/// Journal storing each stream in one partition of a sharded table.
pub struct TableJournal {
    shards: Shards<dyn TableBackend>,
    table: String,
    registry: Arc<TypeRegistry>,
}

impl TableJournal {
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

    async fn query(&self, persistence_id: &str, range: RowRange) -> Result<Vec<TableEntity>> {
        let backend = self.shards.resolve(persistence_id);
        backend.query(&self.table, &range).await.map_err(|e| {
            error!(
                persistence_id = %persistence_id,
                table = %self.table,
                backend = %backend.name(),
                error = %e,
                "Journal query failed"
            );
            e
        })
    }

    async fn execute(&self, persistence_id: &str, batch: TableBatch) -> Result<()> {
        let backend = self.shards.resolve(persistence_id);
        let size = batch.len();
        backend.execute_batch(&self.table, batch).await.map_err(|e| {
            error!(
                persistence_id = %persistence_id,
                table = %self.table,
                backend = %backend.name(),
                operations = size,
                error = %e,
                "Journal batch failed"
            );
            e
        })
    }

    /// Raw rows of a stream in `[from, to]`, tombstones included.
    pub async fn scan_entries(
        &self,
        persistence_id: &str,
        from_sequence_nr: u64,
        to_sequence_nr: u64,
    ) -> Result<Vec<JournalEntry>> {
        if to_sequence_nr < from_sequence_nr {
            return Ok(Vec::new());
        }
        let Some(lower) = lower_bound(from_sequence_nr) else {
            return Ok(Vec::new());
        };
        let range = RowRange::new(persistence_id, lower, upper_bound(to_sequence_nr));
        self.query(persistence_id, range)
            .await?
            .iter()
            .map(JournalEntry::from_entity)
            .collect()
    }

    fn build_batch(&self, persistence_id: &str, mut messages: Vec<PersistentRepr>) -> Result<TableBatch> {
        messages.sort_by_key(|m| m.sequence_nr);
        if let Some(pair) = messages
            .windows(2)
            .find(|pair| pair[0].sequence_nr == pair[1].sequence_nr)
        {
            return Err(StorageError::DuplicateSequence {
                persistence_id: persistence_id.to_string(),
                sequence_nr: pair[0].sequence_nr,
            });
        }

        let mut batch = TableBatch::new(persistence_id);
        for message in messages {
            let entry = JournalEntry {
                id: event_id(persistence_id, message.sequence_nr),
                persistence_id: persistence_id.to_string(),
                sequence_nr: message.sequence_nr,
                type_tag: message.payload.type_tag().to_string(),
                payload: self.registry.encode(&message.payload)?,
                deleted: message.deleted,
            };
            batch.push(TableOperation::Insert(entry.to_entity()?))?;
        }
        Ok(batch)
    }
}

#[async_trait]
impl Journal for TableJournal {
    async fn write_messages(&self, messages: Vec<PersistentRepr>) -> Result<()> {
        let mut streams: BTreeMap<String, Vec<PersistentRepr>> = BTreeMap::new();
        for message in messages {
            streams
                .entry(message.persistence_id.clone())
                .or_default()
                .push(message);
        }

        let mut batches = Vec::with_capacity(streams.len());
        for (persistence_id, messages) in streams {
            let batch = self.build_batch(&persistence_id, messages).map_err(|e| {
                error!(persistence_id = %persistence_id, error = %e, "Rejected journal write");
                e
            })?;
            batches.push((persistence_id, batch));
        }

        let results = join_all(batches.into_iter().map(|(persistence_id, batch)| async move {
            let count = batch.len();
            self.execute(&persistence_id, batch).await?;
            debug!(persistence_id = %persistence_id, count, "Wrote events");
            Ok::<_, StorageError>(())
        }))
        .await;

        results.into_iter().collect()
    }

    async fn read_highest_sequence_nr(
        &self,
        persistence_id: &str,
        from_sequence_nr: u64,
    ) -> Result<u64> {
        let Some(lower) = lower_bound(from_sequence_nr) else {
            return Ok(0);
        };
        let range = RowRange::new(persistence_id, lower, Bound::Unbounded);
        let rows = self.query(persistence_id, range).await?;

        let mut highest = 0;
        for row in &rows {
            highest = highest.max(decode_sequence(&row.row_key)?);
        }
        debug!(persistence_id = %persistence_id, highest, "Read highest sequence number");
        Ok(highest)
    }

    async fn replay_messages(
        &self,
        persistence_id: &str,
        from_sequence_nr: u64,
        to_sequence_nr: u64,
        max: u64,
        callback: &mut (dyn FnMut(PersistentRepr) + Send),
    ) -> Result<u64> {
        if max == 0 || to_sequence_nr < from_sequence_nr {
            return Ok(0);
        }

        let entries = self
            .scan_entries(persistence_id, from_sequence_nr, to_sequence_nr)
            .await?;

        let mut delivered = 0;
        for entry in entries.into_iter().filter(|e| !e.deleted) {
            let payload = self.registry.decode(&entry.type_tag, &entry.payload)?;
            callback(PersistentRepr {
                persistence_id: entry.persistence_id,
                sequence_nr: entry.sequence_nr,
                payload,
                deleted: false,
            });
            delivered += 1;
            if delivered >= max {
                break;
            }
        }

        debug!(
            persistence_id = %persistence_id,
            from = from_sequence_nr,
            to = to_sequence_nr,
            delivered,
            "Replayed events"
        );
        Ok(delivered)
    }

    async fn delete_messages_to(
        &self,
        persistence_id: &str,
        to_sequence_nr: u64,
        permanent: bool,
    ) -> Result<()> {
        let range = RowRange::new(persistence_id, Bound::Unbounded, upper_bound(to_sequence_nr));
        let rows = self.query(persistence_id, range).await?;

        let mut operations = Vec::new();
        for mut row in rows {
            if permanent {
                operations.push(TableOperation::Delete {
                    row_key: row.row_key,
                });
            } else if !row.get_bool(DELETED)? {
                row.set(DELETED, PropertyValue::Bool(true));
                operations.push(TableOperation::Replace(row));
            }
        }
        if operations.is_empty() {
            return Ok(());
        }

        // Ascending chunks: a failure part-way leaves a deleted prefix.
        let count = operations.len();
        let mut operations = operations.into_iter().peekable();
        while operations.peek().is_some() {
            let mut batch = TableBatch::new(persistence_id);
            for operation in operations.by_ref().take(MAX_BATCH_OPERATIONS) {
                batch.push(operation)?;
            }
            self.execute(persistence_id, batch).await?;
        }
        debug!(
            persistence_id = %persistence_id,
            to = to_sequence_nr,
            permanent,
            count,
            "Deleted events"
        );
        Ok(())
    }
}
