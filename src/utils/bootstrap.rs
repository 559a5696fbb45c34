//! Bootstrap utilities for shardjournal binaries and hosts.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the SHARDJOURNAL_LOG environment variable.
///
/// Defaults to "info" level if SHARDJOURNAL_LOG is not set. Hosts that
/// install their own subscriber should not call this.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
