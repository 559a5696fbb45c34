//! Idempotent provisioning of tables and containers on every shard.

use futures::future::try_join_all;
use tracing::{error, info};

use super::{ObjectBackend, Result, Shards, TableBackend};

async fn ensure_tables(shards: &Shards<dyn TableBackend>, table: &str, purpose: &str) -> Result<()> {
    try_join_all(shards.all().iter().map(|backend| async move {
        match backend.create_table_if_not_exists(table).await {
            Ok(created) => {
                info!(backend = %backend.name(), table = %table, created, "{} table ready", purpose);
                Ok(())
            }
            Err(e) => {
                error!(backend = %backend.name(), table = %table, error = %e, "Failed to create {} table", purpose);
                Err(e)
            }
        }
    }))
    .await?;
    Ok(())
}

/// Create the journal table on every shard if absent.
pub async fn ensure_journal_schema(shards: &Shards<dyn TableBackend>, table: &str) -> Result<()> {
    ensure_tables(shards, table, "Journal").await
}

/// Create the snapshot table on every shard if absent.
pub async fn ensure_snapshot_table_schema(
    shards: &Shards<dyn TableBackend>,
    table: &str,
) -> Result<()> {
    ensure_tables(shards, table, "Snapshot").await
}

/// Create the snapshot container on every shard if absent.
pub async fn ensure_snapshot_container_schema(
    shards: &Shards<dyn ObjectBackend>,
    container: &str,
) -> Result<()> {
    try_join_all(shards.all().iter().map(|backend| async move {
        match backend.create_container_if_not_exists(container).await {
            Ok(created) => {
                info!(backend = %backend.name(), container = %container, created, "Snapshot container ready");
                Ok(())
            }
            Err(e) => {
                error!(backend = %backend.name(), container = %container, error = %e, "Failed to create snapshot container");
                Err(e)
            }
        }
    }))
    .await?;
    Ok(())
}
