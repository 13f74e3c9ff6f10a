use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{Interceptor, Next};
use crate::commands::{Command, Reply};
use crate::container::DataContainer;
use crate::context::{Flag, InvocationContext};
use crate::error::Result;
use crate::loaders::CacheLoader;
use crate::marshall::Object;
use crate::stats::CacheStats;

/// Fills local misses from a [`CacheLoader`] before the command reaches the
/// data container
///
/// Reads always consult the loader. Writes only do when the cache must
/// return previous values, and only for local callers.
pub struct CacheLoaderInterceptor {
    loader: Arc<dyn CacheLoader>,
    container: Arc<DataContainer>,
    stats: Arc<CacheStats>,
    force_return_values: bool,
}

impl CacheLoaderInterceptor {
    pub const NAME: &'static str = "cache-loader";

    pub fn new(
        loader: Arc<dyn CacheLoader>,
        container: Arc<DataContainer>,
        stats: Arc<CacheStats>,
        force_return_values: bool,
    ) -> Self {
        Self {
            loader,
            container,
            stats,
            force_return_values,
        }
    }

    fn key_to_load<'c>(&self, ctx: &InvocationContext, command: &'c Command) -> Option<&'c Object> {
        if ctx.has_flag(Flag::SkipCacheLoad) {
            return None;
        }
        match command {
            Command::Get(c) => Some(&c.key),
            Command::ContainsKey(c) => Some(&c.key),
            Command::Put(c) if self.force_return_values && ctx.is_origin_local() => Some(&c.key),
            Command::Remove(c) if self.force_return_values && ctx.is_origin_local() => Some(&c.key),
            _ => None,
        }
    }

    async fn load_if_missing(&self, ctx: &InvocationContext, key: &Object) -> Result<()> {
        if self.container.contains_key(key) {
            return Ok(());
        }
        match self.loader.load(key, ctx).await? {
            Some(entry) => {
                debug!("loaded missing key");
                self.container.put_entry(entry);
                self.stats.record_cluster_load();
            }
            None => {
                trace!("loader had nothing for key");
                self.stats.record_cluster_load_miss();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Interceptor for CacheLoaderInterceptor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn handle(&self, ctx: &mut InvocationContext, command: Command, next: Next<'_>) -> Result<Reply> {
        if let Some(key) = self.key_to_load(ctx, &command) {
            self.load_if_missing(ctx, key).await?;
        }
        next.run(ctx, command).await
    }
}
