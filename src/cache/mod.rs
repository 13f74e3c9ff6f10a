//! Cache
//!
//! A named cache: data container, interceptor chain and optional cluster
//! loader, assembled from a [`CacheConfig`].
//!
//! Local calls enter through the public API. Peers reach the same chain
//! through [`Cache::handle_remote_write`] and [`Cache::handle_clustered_get`],
//! dispatched by the owning [`CacheManager`](crate::manager::CacheManager).

mod views;

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::commands::{
    ClearCommand, Command, ContainsKeyCommand, GetKeyValueCommand, PutKeyValueCommand, RemoveCommand,
    Reply, WriteCommand,
};
use crate::config::CacheConfig;
use crate::container::{now_millis, DataContainer, UNBOUNDED};
use crate::context::{ComponentStatus, Flag, InvocationContext, StatusCell};
use crate::error::{Error, Result};
use crate::interceptors::{
    CacheLoaderInterceptor, CallInterceptor, Interceptor, InterceptorChain, InvocationContextInterceptor,
    MarshalledValueInterceptor, ReplicationInterceptor,
};
use crate::loaders::{CacheLoader, ClusterCacheLoader};
use crate::marshall::{Object, VersionAwareMarshaller};
use crate::remoting::{Address, Response, RpcManager};
use crate::stats::CacheStats;

pub use views::{EntrySet, KeySet, UnmodifiableCollection, UnmodifiableEntry, Values};

pub struct Cache {
    name: String,
    config: CacheConfig,
    marshaller: VersionAwareMarshaller,
    container: Arc<DataContainer>,
    chain: InterceptorChain,
    status: Arc<StatusCell>,
    stats: Arc<CacheStats>,
    loader: Option<Arc<dyn CacheLoader>>,
}

impl Cache {
    /// Assemble a cache; it accepts invocations once started
    ///
    /// Clustered modes need `rpc`.
    pub fn new(
        name: impl Into<String>,
        config: CacheConfig,
        marshaller: VersionAwareMarshaller,
        rpc: Option<Arc<dyn RpcManager>>,
    ) -> Result<Self> {
        let name = name.into();
        config.validate()?;
        let rpc = match (config.cache_mode.is_clustered(), rpc) {
            (true, None) => {
                return Err(Error::Config(format!(
                    "cache {name} is {} but no transport was supplied",
                    config.cache_mode
                )))
            }
            (true, rpc) => rpc,
            (false, _) => None,
        };

        let container = Arc::new(DataContainer::new());
        let status = Arc::new(StatusCell::default());
        let stats = Arc::new(CacheStats::new());

        let loader: Option<Arc<dyn CacheLoader>> = match (&config.cluster_loader, &rpc) {
            (Some(loader_config), Some(rpc)) => Some(Arc::new(ClusterCacheLoader::new(
                name.clone(),
                loader_config.clone(),
                Arc::clone(rpc),
                marshaller.clone(),
                Arc::clone(&status),
            ))),
            _ => None,
        };

        let mut stages: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(InvocationContextInterceptor::new(name.clone(), Arc::clone(&status)))];
        if config.use_lazy_deserialization {
            stages.push(Arc::new(MarshalledValueInterceptor::new(marshaller.clone())));
        }
        if let Some(loader) = &loader {
            stages.push(Arc::new(CacheLoaderInterceptor::new(
                Arc::clone(loader),
                Arc::clone(&container),
                Arc::clone(&stats),
                config.force_return_values,
            )));
        }
        if let Some(rpc) = rpc {
            stages.push(Arc::new(ReplicationInterceptor::new(
                name.clone(),
                rpc,
                marshaller.clone(),
                config.cache_mode,
                config.sync_repl_timeout(),
                Arc::clone(&stats),
            )));
        }
        stages.push(Arc::new(CallInterceptor::new(Arc::clone(&container), Arc::clone(&stats))));

        let chain = InterceptorChain::new(stages);
        debug!(cache = %name, stages = ?chain.names(), "assembled interceptor chain");

        Ok(Self {
            name,
            config,
            marshaller,
            container,
            chain,
            status,
            stats,
            loader,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn status(&self) -> ComponentStatus {
        self.status.get()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// The interceptor chain, for adding or removing stages
    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    /// Direct access to stored entries, bypassing every stage
    pub fn data_container(&self) -> &DataContainer {
        &self.container
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub async fn start(&self) -> Result<()> {
        if self.status.get() == ComponentStatus::Running {
            return Ok(());
        }
        if let Some(loader) = &self.loader {
            loader.start().await?;
        }
        self.status.set(ComponentStatus::Running);
        info!(cache = %self.name, mode = %self.config.cache_mode, "cache started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if self.status.get() == ComponentStatus::Terminated {
            return Ok(());
        }
        self.status.set(ComponentStatus::Stopping);
        if let Some(loader) = &self.loader {
            loader.stop().await?;
        }
        self.status.set(ComponentStatus::Terminated);
        info!(cache = %self.name, "cache stopped");
        Ok(())
    }

    // =========================================================================
    // Local API
    // =========================================================================

    /// Operate with per-invocation flags
    pub fn with_flags(&self, flags: &[Flag]) -> FlaggedCache<'_> {
        FlaggedCache {
            cache: self,
            flags: flags.to_vec(),
        }
    }

    async fn invoke(&self, flags: &[Flag], command: Command) -> Result<Reply> {
        let mut ctx = InvocationContext::local(flags);
        self.chain.invoke(&mut ctx, command).await
    }

    /// Store `value`, returning the previous one
    pub async fn put(&self, key: impl Into<Object>, value: impl Into<Object>) -> Result<Option<Object>> {
        self.with_flags(&[]).put(key, value).await
    }

    /// Store `value` for at most `lifespan_ms`
    pub async fn put_with_lifespan(
        &self,
        key: impl Into<Object>,
        value: impl Into<Object>,
        lifespan_ms: i64,
    ) -> Result<Option<Object>> {
        self.with_flags(&[]).put_with_expiry(key, value, lifespan_ms, UNBOUNDED).await
    }

    /// Store `value` until it expires or sits unread for `max_idle_ms`
    pub async fn put_with_expiry(
        &self,
        key: impl Into<Object>,
        value: impl Into<Object>,
        lifespan_ms: i64,
        max_idle_ms: i64,
    ) -> Result<Option<Object>> {
        self.with_flags(&[]).put_with_expiry(key, value, lifespan_ms, max_idle_ms).await
    }

    pub async fn get(&self, key: impl Into<Object>) -> Result<Option<Object>> {
        self.with_flags(&[]).get(key).await
    }

    pub async fn remove(&self, key: impl Into<Object>) -> Result<Option<Object>> {
        self.with_flags(&[]).remove(key).await
    }

    pub async fn contains_key(&self, key: impl Into<Object>) -> Result<bool> {
        self.with_flags(&[]).contains_key(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.with_flags(&[]).clear().await
    }

    pub async fn size(&self) -> Result<usize> {
        self.invoke(&[], Command::Size).await?.into_size()
    }

    pub async fn key_set(&self) -> Result<KeySet> {
        let keys = self.invoke(&[], Command::KeySet).await?.into_objects()?;
        Ok(UnmodifiableCollection::new(keys))
    }

    pub async fn values(&self) -> Result<Values> {
        let values = self.invoke(&[], Command::Values).await?.into_objects()?;
        Ok(UnmodifiableCollection::new(values))
    }

    pub async fn entry_set(&self) -> Result<EntrySet> {
        let entries = self.invoke(&[], Command::EntrySet).await?.into_entries()?;
        Ok(UnmodifiableCollection::new(
            entries
                .into_iter()
                .map(|(k, v)| UnmodifiableEntry::new(k, v))
                .collect(),
        ))
    }

    /// Reduce every stored wrapper to its serialized form
    pub fn compact(&self) -> Result<()> {
        let mut compacted = 0usize;
        for entry in self.container.entries() {
            for object in [entry.key(), entry.value()] {
                if let Some(mv) = object.as_marshalled() {
                    mv.compact()?;
                    compacted += 1;
                }
            }
        }
        debug!(cache = %self.name, compacted, "compacted marshalled values");
        Ok(())
    }

    /// Drop expired entries, returning how many went
    pub fn purge_expired(&self) -> usize {
        self.container.purge_expired()
    }

    // =========================================================================
    // Remote API
    // =========================================================================

    /// Apply a write replicated from `origin`
    #[instrument(skip(self, command), fields(cache = %self.name))]
    pub async fn handle_remote_write(&self, origin: Address, command: WriteCommand) -> Result<Response> {
        if !self.status.get().allows_invocations() {
            debug!("rejecting replicated write on a cache that is not running");
            return Ok(Response::Invalid);
        }
        let mut ctx = InvocationContext::remote(origin);
        self.chain.invoke(&mut ctx, command.into()).await?;
        Ok(Response::ack())
    }

    /// Answer a peer's clustered get from the local container only
    ///
    /// The entry is not touched, so every holder of a replicated entry
    /// answers with the same record.
    #[instrument(skip(self, key), fields(cache = %self.name))]
    pub fn handle_clustered_get(&self, key: &Object) -> Result<Response> {
        if !self.status.get().allows_invocations() {
            return Ok(Response::Invalid);
        }
        match self.container.peek_live(key) {
            Some(entry) => Response::with_result(&self.marshaller, &entry.to_internal_cache_value().to_object()),
            None => Ok(Response::Unsuccessful),
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("status", &self.status.get())
            .field("mode", &self.config.cache_mode)
            .field("chain", &self.chain)
            .finish()
    }
}

/// A [`Cache`] handle whose invocations carry a fixed set of flags
#[derive(Debug)]
pub struct FlaggedCache<'a> {
    cache: &'a Cache,
    flags: Vec<Flag>,
}

impl FlaggedCache<'_> {
    pub async fn put(&self, key: impl Into<Object>, value: impl Into<Object>) -> Result<Option<Object>> {
        self.put_with_expiry(key, value, UNBOUNDED, UNBOUNDED).await
    }

    pub async fn put_with_expiry(
        &self,
        key: impl Into<Object>,
        value: impl Into<Object>,
        lifespan_ms: i64,
        max_idle_ms: i64,
    ) -> Result<Option<Object>> {
        let command = Command::Put(PutKeyValueCommand {
            key: key.into(),
            value: value.into(),
            lifespan_ms,
            max_idle_ms,
            created_ms: now_millis(),
        });
        self.cache.invoke(&self.flags, command).await?.into_value()
    }

    pub async fn get(&self, key: impl Into<Object>) -> Result<Option<Object>> {
        let command = Command::Get(GetKeyValueCommand { key: key.into() });
        self.cache.invoke(&self.flags, command).await?.into_value()
    }

    pub async fn remove(&self, key: impl Into<Object>) -> Result<Option<Object>> {
        let command = Command::Remove(RemoveCommand { key: key.into() });
        self.cache.invoke(&self.flags, command).await?.into_value()
    }

    pub async fn contains_key(&self, key: impl Into<Object>) -> Result<bool> {
        let command = Command::ContainsKey(ContainsKeyCommand { key: key.into() });
        self.cache.invoke(&self.flags, command).await?.into_bool()
    }

    pub async fn clear(&self) -> Result<()> {
        self.cache.invoke(&self.flags, Command::Clear(ClearCommand)).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
