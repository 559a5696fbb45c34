//! In-memory TableBackend implementation.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{
    Result, RowRange, StorageError, TableBackend, TableBatch, TableEntity, TableOperation,
    MAX_BATCH_OPERATIONS,
};

/// Rows of one partition, keyed by row key.
type Partition = BTreeMap<String, TableEntity>;

/// Table storage held in process memory.
pub struct MemoryTableBackend {
    name: String,
    tables: RwLock<HashMap<String, HashMap<String, Partition>>>,
    batch_limit: usize,
    fail_on_write: RwLock<bool>,
    fail_on_read: RwLock<bool>,
    batches_executed: RwLock<usize>,
}

impl Default for MemoryTableBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryTableBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(HashMap::new()),
            batch_limit: MAX_BATCH_OPERATIONS,
            fail_on_write: RwLock::new(false),
            fail_on_read: RwLock::new(false),
            batches_executed: RwLock::new(0),
        }
    }

    /// Override the per-batch operation limit.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Make every subsequent write fail with a transient error.
    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Make every subsequent read fail with a transient error.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Number of batches applied successfully.
    pub async fn batches_executed(&self) -> usize {
        *self.batches_executed.read().await
    }

    /// Total rows stored in `table` across all partitions.
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|partitions| partitions.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub async fn has_table(&self, table: &str) -> bool {
        self.tables.read().await.contains_key(table)
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Unavailable(format!(
                "{}: injected read failure",
                self.name
            )));
        }
        Ok(())
    }

    fn missing_table(table: &str) -> StorageError {
        StorageError::MissingResource(format!("table {}", table))
    }

    /// Apply one operation to a working copy of a partition.
    fn apply(partition_key: &str, rows: &mut Partition, operation: TableOperation) -> Result<()> {
        match operation {
            TableOperation::Insert(entity) => {
                if rows.contains_key(&entity.row_key) {
                    return Err(StorageError::Conflict {
                        partition_key: partition_key.to_string(),
                        row_key: entity.row_key,
                    });
                }
                rows.insert(entity.row_key.clone(), entity);
            }
            TableOperation::Replace(entity) => {
                if !rows.contains_key(&entity.row_key) {
                    return Err(StorageError::NotFound {
                        partition_key: partition_key.to_string(),
                        row_key: entity.row_key,
                    });
                }
                rows.insert(entity.row_key.clone(), entity);
            }
            TableOperation::Delete { row_key } => {
                if rows.remove(&row_key).is_none() {
                    return Err(StorageError::NotFound {
                        partition_key: partition_key.to_string(),
                        row_key,
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TableBackend for MemoryTableBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(table) {
            return Ok(false);
        }
        tables.insert(table.to_string(), HashMap::new());
        Ok(true)
    }

    async fn query(&self, table: &str, range: &RowRange) -> Result<Vec<TableEntity>> {
        self.check_read().await?;
        let tables = self.tables.read().await;
        let partitions = tables.get(table).ok_or_else(|| Self::missing_table(table))?;

        Ok(partitions
            .get(&range.partition_key)
            .map(|rows| {
                rows.values()
                    .filter(|e| range.contains(&e.row_key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn retrieve(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>> {
        self.check_read().await?;
        let tables = self.tables.read().await;
        let partitions = tables.get(table).ok_or_else(|| Self::missing_table(table))?;

        Ok(partitions
            .get(partition_key)
            .and_then(|rows| rows.get(row_key))
            .cloned())
    }

    async fn execute_batch(&self, table: &str, batch: TableBatch) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable(format!(
                "{}: injected write failure",
                self.name
            )));
        }
        if batch.len() > self.batch_limit {
            return Err(StorageError::BatchTooLarge {
                size: batch.len(),
                limit: self.batch_limit,
            });
        }

        let mut tables = self.tables.write().await;
        let partitions = tables
            .get_mut(table)
            .ok_or_else(|| Self::missing_table(table))?;

        let partition_key = batch.partition_key().to_string();
        let mut working = partitions.get(&partition_key).cloned().unwrap_or_default();
        for operation in batch.into_operations() {
            Self::apply(&partition_key, &mut working, operation)?;
        }

        if working.is_empty() {
            partitions.remove(&partition_key);
        } else {
            partitions.insert(partition_key, working);
        }
        *self.batches_executed.write().await += 1;
        Ok(())
    }
}
