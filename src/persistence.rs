//! Persistence context: configured shards and the stores built on them.
//!
//! The host constructs one [`Persistence`] at startup and shares the stores
//! it hands out. Backend clients are created once per shard here and live as
//! long as the stores holding them.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::info;

use crate::config::{
    ConfigError, JournalSettings, ObjectSnapshotSettings, PersistenceConfig, TableSnapshotSettings,
};
use crate::serialization::TypeRegistry;
use crate::storage::{
    connect_object_backend, connect_table_backend, ensure_journal_schema,
    ensure_snapshot_container_schema, ensure_snapshot_table_schema, ObjectBackend,
    ObjectSnapshotStore, Shards, StorageError, TableBackend, TableJournal, TableSnapshotStore,
};

/// Errors raised while building the persistence context.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Connect one table backend per connection string, in order.
pub async fn connect_table_shards(
    connection_strings: &[String],
) -> Result<Shards<dyn TableBackend>, StorageError> {
    let backends = try_join_all(connection_strings.iter().map(|c| connect_table_backend(c))).await?;
    Shards::new(backends)
}

/// Connect one object backend per connection string, in order.
pub async fn connect_object_shards(
    connection_strings: &[String],
) -> Result<Shards<dyn ObjectBackend>, StorageError> {
    let backends =
        try_join_all(connection_strings.iter().map(|c| connect_object_backend(c))).await?;
    Shards::new(backends)
}

/// Configured journal and snapshot stores.
pub struct Persistence {
    journal: Option<Arc<TableJournal>>,
    table_snapshot_store: Option<Arc<TableSnapshotStore>>,
    object_snapshot_store: Option<Arc<ObjectSnapshotStore>>,
}

impl Persistence {
    /// Connect every configured section and provision the ones with
    /// `auto_initialize` set.
    pub async fn init(
        config: &PersistenceConfig,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self, PersistenceError> {
        config.validate()?;

        let journal = match &config.journal {
            Some(settings) => Some(Arc::new(build_journal(settings, Arc::clone(&registry)).await?)),
            None => None,
        };
        let table_snapshot_store = match &config.table_snapshot_store {
            Some(settings) => Some(Arc::new(
                build_table_snapshot_store(settings, Arc::clone(&registry)).await?,
            )),
            None => None,
        };
        let object_snapshot_store = match &config.object_snapshot_store {
            Some(settings) => Some(Arc::new(
                build_object_snapshot_store(settings, Arc::clone(&registry)).await?,
            )),
            None => None,
        };

        info!(
            journal = journal.is_some(),
            table_snapshots = table_snapshot_store.is_some(),
            object_snapshots = object_snapshot_store.is_some(),
            "Persistence initialized"
        );

        Ok(Self {
            journal,
            table_snapshot_store,
            object_snapshot_store,
        })
    }

    /// Provision every configured section, ignoring `auto_initialize`.
    pub async fn provision(config: &PersistenceConfig) -> Result<(), PersistenceError> {
        config.validate()?;

        if let Some(settings) = &config.journal {
            let shards = connect_table_shards(&settings.connection_strings).await?;
            ensure_journal_schema(&shards, &settings.table_name).await?;
        }
        if let Some(settings) = &config.table_snapshot_store {
            let shards = connect_table_shards(&settings.connection_strings).await?;
            ensure_snapshot_table_schema(&shards, &settings.table_name).await?;
        }
        if let Some(settings) = &config.object_snapshot_store {
            let shards = connect_object_shards(&settings.connection_strings).await?;
            ensure_snapshot_container_schema(&shards, &settings.container_name).await?;
        }
        Ok(())
    }

    pub fn journal(&self) -> Option<Arc<TableJournal>> {
        self.journal.clone()
    }

    pub fn table_snapshot_store(&self) -> Option<Arc<TableSnapshotStore>> {
        self.table_snapshot_store.clone()
    }

    pub fn object_snapshot_store(&self) -> Option<Arc<ObjectSnapshotStore>> {
        self.object_snapshot_store.clone()
    }
}

async fn build_journal(
    settings: &JournalSettings,
    registry: Arc<TypeRegistry>,
) -> Result<TableJournal, StorageError> {
    let shards = connect_table_shards(&settings.connection_strings).await?;
    if settings.auto_initialize {
        ensure_journal_schema(&shards, &settings.table_name).await?;
    }
    Ok(TableJournal::new(shards, &settings.table_name, registry))
}

async fn build_table_snapshot_store(
    settings: &TableSnapshotSettings,
    registry: Arc<TypeRegistry>,
) -> Result<TableSnapshotStore, StorageError> {
    let shards = connect_table_shards(&settings.connection_strings).await?;
    if settings.auto_initialize {
        ensure_snapshot_table_schema(&shards, &settings.table_name).await?;
    }
    Ok(TableSnapshotStore::new(shards, &settings.table_name, registry))
}

async fn build_object_snapshot_store(
    settings: &ObjectSnapshotSettings,
    registry: Arc<TypeRegistry>,
) -> Result<ObjectSnapshotStore, StorageError> {
    let shards = connect_object_shards(&settings.connection_strings).await?;
    if settings.auto_initialize {
        ensure_snapshot_container_schema(&shards, &settings.container_name).await?;
    }
    Ok(ObjectSnapshotStore::new(shards, &settings.container_name, registry)
        .with_extension(settings.extension.trim()))
}
