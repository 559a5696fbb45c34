//! Static sharding of streams across backend accounts.
//!
//! Every operation on a stream goes to the backend chosen by a pure function
//! of the persistence id, so a stream never moves between shards at runtime.

use std::sync::Arc;

use tracing::warn;

use super::{Result, StorageError};

/// Maps a persistence id to a shard index.
///
/// Implementations must be deterministic and return an index below
/// `shard_count` (which is never zero).
pub trait ShardRouter: Send + Sync {
    fn route(&self, persistence_id: &str, shard_count: usize) -> usize;
}

/// Routes by the persistence id's first character read as a hex digit.
///
/// `"3f..."` goes to shard 3 and `"A1..."` / `"a1..."` to shard 10 when that
/// many shards exist. Empty ids, non-hex leading characters and digits
/// without a matching shard fall back to shard 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeadingHexRouter;

/// Highest shard count [`LeadingHexRouter`] can address.
pub const MAX_HEX_SHARDS: usize = 16;

impl ShardRouter for LeadingHexRouter {
    fn route(&self, persistence_id: &str, shard_count: usize) -> usize {
        persistence_id
            .chars()
            .next()
            .and_then(|c| c.to_digit(16))
            .map(|digit| digit as usize)
            .filter(|&index| index < shard_count)
            .unwrap_or(0)
    }
}

/// Ordered, immutable set of backends plus the router that picks one.
pub struct Shards<B: ?Sized> {
    backends: Vec<Arc<B>>,
    router: Arc<dyn ShardRouter>,
}

impl<B: ?Sized> Clone for Shards<B> {
    fn clone(&self) -> Self {
        Self {
            backends: self.backends.clone(),
            router: Arc::clone(&self.router),
        }
    }
}

impl<B: ?Sized> Shards<B> {
    /// Shards routed by [`LeadingHexRouter`].
    pub fn new(backends: Vec<Arc<B>>) -> Result<Self> {
        Self::with_router(backends, Arc::new(LeadingHexRouter))
    }

    pub fn with_router(backends: Vec<Arc<B>>, router: Arc<dyn ShardRouter>) -> Result<Self> {
        if backends.is_empty() {
            return Err(StorageError::NoBackends);
        }
        if backends.len() > MAX_HEX_SHARDS {
            warn!(
                configured = backends.len(),
                addressable = MAX_HEX_SHARDS,
                "More backends configured than leading-hex routing can address"
            );
        }
        Ok(Self { backends, router })
    }

    /// Backend responsible for `persistence_id`.
    pub fn resolve(&self, persistence_id: &str) -> &Arc<B> {
        let index = self.index_of(persistence_id);
        &self.backends[index]
    }

    /// Shard index for `persistence_id`, clamped into range.
    pub fn index_of(&self, persistence_id: &str) -> usize {
        let index = self.router.route(persistence_id, self.backends.len());
        if index < self.backends.len() {
            index
        } else {
            0
        }
    }

    /// Every configured backend, in configuration order.
    pub fn all(&self) -> &[Arc<B>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
