//! Backend abstractions for partitioned table storage and object storage.
//!
//! The engine treats the storage service as a black box with these
//! documented constraints:
//!
//! - Table rows are addressed by `(partition_key, row_key)`; range queries
//!   stay inside one partition and return rows in ascending row key order.
//! - A batch is atomic only when every operation targets one partition.
//!   [`TableBatch`] enforces that when operations are added.
//! - Objects live in a flat namespace per container, can be listed by name
//!   prefix and carry string metadata alongside the body.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;

use super::{Result, StorageError};

/// Maximum operations in one atomic table batch.
pub const MAX_BATCH_OPERATIONS: usize = 100;

/// A typed table property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    String(String),
    Binary(Vec<u8>),
    Bool(bool),
    I64(i64),
}

/// A table row: key pair plus named properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntity {
    pub partition_key: String,
    pub row_key: String,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl TableEntity {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn set(&mut self, name: &str, value: PropertyValue) {
        self.properties.insert(name.to_string(), value);
    }

    fn property(&self, name: &str) -> Result<&PropertyValue> {
        self.properties.get(name).ok_or_else(|| {
            StorageError::CorruptRecord(format!(
                "{}/{} missing property {}",
                self.partition_key, self.row_key, name
            ))
        })
    }

    fn wrong_type(&self, name: &str, expected: &str) -> StorageError {
        StorageError::CorruptRecord(format!(
            "{}/{} property {} is not {}",
            self.partition_key, self.row_key, name, expected
        ))
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        match self.property(name)? {
            PropertyValue::String(s) => Ok(s),
            _ => Err(self.wrong_type(name, "a string")),
        }
    }

    pub fn get_binary(&self, name: &str) -> Result<&[u8]> {
        match self.property(name)? {
            PropertyValue::Binary(b) => Ok(b),
            _ => Err(self.wrong_type(name, "binary")),
        }
    }

    pub fn get_i64(&self, name: &str) -> Result<i64> {
        match self.property(name)? {
            PropertyValue::I64(n) => Ok(*n),
            _ => Err(self.wrong_type(name, "an integer")),
        }
    }

    /// Boolean property; an absent property reads as `false`.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.properties.get(name) {
            None => Ok(false),
            Some(PropertyValue::Bool(b)) => Ok(*b),
            Some(_) => Err(self.wrong_type(name, "a boolean")),
        }
    }
}

/// Row key range inside a single partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRange {
    pub partition_key: String,
    pub lower: Bound<String>,
    pub upper: Bound<String>,
}

impl RowRange {
    pub fn new(partition_key: impl Into<String>, lower: Bound<String>, upper: Bound<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            lower,
            upper,
        }
    }

    /// Whether `row_key` falls inside this range.
    pub fn contains(&self, row_key: &str) -> bool {
        let above = match &self.lower {
            Bound::Included(lower) => row_key >= lower.as_str(),
            Bound::Excluded(lower) => row_key > lower.as_str(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(upper) => row_key <= upper.as_str(),
            Bound::Excluded(upper) => row_key < upper.as_str(),
            Bound::Unbounded => true,
        };
        above && below
    }
}

/// One write inside a [`TableBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOperation {
    /// Insert a new row; fails with a conflict if the key exists.
    Insert(TableEntity),
    /// Replace an existing row; fails with not-found if it is absent.
    Replace(TableEntity),
    /// Remove an existing row; fails with not-found if it is absent.
    Delete { row_key: String },
}

impl TableOperation {
    pub fn row_key(&self) -> &str {
        match self {
            TableOperation::Insert(e) | TableOperation::Replace(e) => &e.row_key,
            TableOperation::Delete { row_key } => row_key,
        }
    }
}

/// Atomic, single-partition batch of table operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBatch {
    partition_key: String,
    operations: Vec<TableOperation>,
}

impl TableBatch {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            operations: Vec::new(),
        }
    }

    /// Append an operation, rejecting entities from another partition.
    pub fn push(&mut self, operation: TableOperation) -> Result<()> {
        if let TableOperation::Insert(e) | TableOperation::Replace(e) = &operation {
            if e.partition_key != self.partition_key {
                return Err(StorageError::PartitionMismatch {
                    expected: self.partition_key.clone(),
                    actual: e.partition_key.clone(),
                });
            }
        }
        self.operations.push(operation);
        Ok(())
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn operations(&self) -> &[TableOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<TableOperation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Partitioned table storage (one account / endpoint).
///
/// Implementations:
/// - `MemoryTableBackend`: in-process storage for tests and local development
/// - `DynamoTableBackend` (feature: dynamo): Amazon DynamoDB
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Human-readable backend identity for logs.
    fn name(&self) -> &str;

    /// Create `table` if absent. Returns `true` when it was created.
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool>;

    /// All rows inside `range`, ordered by row key ascending.
    async fn query(&self, table: &str, range: &RowRange) -> Result<Vec<TableEntity>>;

    /// Point lookup.
    async fn retrieve(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>>;

    /// Execute every operation of `batch` atomically, or none of them.
    async fn execute_batch(&self, table: &str, batch: TableBatch) -> Result<()>;

    /// Insert a single row; fails with a conflict if the key exists.
    async fn insert(&self, table: &str, entity: TableEntity) -> Result<()> {
        let mut batch = TableBatch::new(entity.partition_key.clone());
        batch.push(TableOperation::Insert(entity))?;
        self.execute_batch(table, batch).await
    }

    /// Delete a single row.
    async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> Result<()> {
        let mut batch = TableBatch::new(partition_key);
        batch.push(TableOperation::Delete {
            row_key: row_key.to_string(),
        })?;
        self.execute_batch(table, batch).await
    }
}

/// Object listing entry: name plus custom metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: String,
    pub metadata: HashMap<String, String>,
}

/// Flat object storage (one account / endpoint).
///
/// Implementations:
/// - `MemoryObjectBackend`: in-process storage for tests and local development
/// - `S3ObjectBackend` (feature: s3): Amazon S3 and S3-compatible services
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Human-readable backend identity for logs.
    fn name(&self) -> &str;

    /// Create `container` if absent. Returns `true` when it was created.
    async fn create_container_if_not_exists(&self, container: &str) -> Result<bool>;

    /// Objects whose name starts with `prefix`, with their metadata.
    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Store `body` under `name`, replacing any previous object.
    async fn upload(
        &self,
        container: &str,
        name: &str,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()>;

    /// Object body, or `None` if absent.
    async fn download(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>>;

    /// Remove an object. Returns `true` if it existed.
    async fn delete_if_exists(&self, container: &str, name: &str) -> Result<bool>;
}
