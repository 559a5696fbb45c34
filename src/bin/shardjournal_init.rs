//! shardjournal-init: provisioning tool
//!
//! Creates the journal table, snapshot table and snapshot container on
//! every configured shard. Safe to run repeatedly; existing resources are
//! left untouched.
//!
//! ## Usage
//! ```text
//! shardjournal-init [CONFIG_PATH]
//! ```
//!
//! ## Configuration
//! - CONFIG_PATH argument or SHARDJOURNAL_CONFIG: YAML configuration file
//! - SHARDJOURNAL__*: environment overrides
//! - SHARDJOURNAL_LOG: log filter (default: info)

use std::time::Duration;

use backon::Retryable;
use tracing::{error, info, warn};

use shardjournal::config::PersistenceConfig;
use shardjournal::utils::bootstrap::init_tracing;
use shardjournal::utils::retry::provisioning_backoff;
use shardjournal::{Persistence, PersistenceError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = PersistenceConfig::load(path.as_deref()).inspect_err(|e| {
        error!(error = %e, "Failed to load configuration");
    })?;

    if config.journal.is_none()
        && config.table_snapshot_store.is_none()
        && config.object_snapshot_store.is_none()
    {
        info!("Nothing configured; no resources to create");
        return Ok(());
    }

    // Emulators and freshly created accounts may not accept requests yet.
    (|| Persistence::provision(&config))
        .retry(provisioning_backoff())
        .when(|e: &PersistenceError| matches!(e, PersistenceError::Storage(se) if se.is_retryable()))
        .notify(|e: &PersistenceError, dur: Duration| {
            warn!(error = %e, delay = ?dur, "Provisioning failed, retrying");
        })
        .await
        .inspect_err(|e| {
            error!(error = %e, "Provisioning failed");
        })?;

    info!("shardjournal-init complete");
    Ok(())
}
