//! Cache Loaders
//!
//! A loader supplies entries the data container does not hold. The only
//! loader shipped here asks the other members of the cluster.

mod cluster;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::container::InternalCacheEntry;
use crate::context::InvocationContext;
use crate::error::Result;
use crate::marshall::Object;

pub use cluster::ClusterCacheLoader;

/// Source of entries missing from the data container
#[async_trait]
pub trait CacheLoader: Send + Sync {
    /// Load the entry under `key`, or `None` on a miss
    async fn load(&self, key: &Object, ctx: &InvocationContext) -> Result<Option<InternalCacheEntry>>;

    /// Every entry the loader can supply
    async fn load_all(&self) -> Result<Vec<InternalCacheEntry>>;

    /// At most `max_entries` entries
    async fn load_some(&self, max_entries: usize) -> Result<Vec<InternalCacheEntry>>;

    /// Every key the loader can supply, minus `exclude`
    async fn load_all_keys(&self, exclude: &HashSet<Object>) -> Result<HashSet<Object>>;

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}
