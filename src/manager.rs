//! Cache Manager
//!
//! One per member. Owns the member's caches, its transport, and answers
//! commands sent by other members of the cluster.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use crate::cache::Cache;
use crate::commands::ReplicableCommand;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::marshall::VersionAwareMarshaller;
use crate::remoting::{Address, CommandHandler, LocalCluster, LocalTransport, Response, RpcManager};

pub struct CacheManager {
    address: Address,
    marshaller: VersionAwareMarshaller,
    cluster: Option<Arc<LocalCluster>>,
    transport: Option<Arc<dyn RpcManager>>,
    caches: DashMap<String, Arc<Cache>>,
}

impl CacheManager {
    /// A manager that can only host local caches
    pub fn local(marshaller: VersionAwareMarshaller) -> Arc<Self> {
        Arc::new(Self {
            address: Address::random(),
            marshaller,
            cluster: None,
            transport: None,
            caches: DashMap::new(),
        })
    }

    /// Join `cluster` under a generated address
    pub fn clustered(cluster: &Arc<LocalCluster>, marshaller: VersionAwareMarshaller) -> Arc<Self> {
        Self::clustered_as(cluster, Address::random(), marshaller)
    }

    /// Join `cluster` under `address`
    pub fn clustered_as(
        cluster: &Arc<LocalCluster>,
        address: Address,
        marshaller: VersionAwareMarshaller,
    ) -> Arc<Self> {
        let transport: Arc<dyn RpcManager> = Arc::new(LocalTransport::new(
            address.clone(),
            Arc::clone(cluster),
            marshaller.clone(),
        ));
        let manager = Arc::new(Self {
            address: address.clone(),
            marshaller,
            cluster: Some(Arc::clone(cluster)),
            transport: Some(transport),
            caches: DashMap::new(),
        });
        let handler: Weak<CacheManager> = Arc::downgrade(&manager);
        cluster.join(address, handler);
        info!(address = %manager.address, "cache manager joined cluster");
        manager
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn marshaller(&self) -> &VersionAwareMarshaller {
        &self.marshaller
    }

    /// Current cluster view; just this member when not clustered
    pub fn members(&self) -> Vec<Address> {
        match &self.transport {
            Some(transport) => transport.members(),
            None => vec![self.address.clone()],
        }
    }

    /// Create and start a cache
    pub async fn define_cache(&self, name: impl Into<String>, config: CacheConfig) -> Result<Arc<Cache>> {
        let name = name.into();
        let cache = Arc::new(Cache::new(
            name.clone(),
            config,
            self.marshaller.clone(),
            self.transport.clone(),
        )?);
        match self.caches.entry(name.clone()) {
            Entry::Occupied(_) => return Err(Error::Config(format!("cache {name} is already defined"))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&cache));
            }
        }
        cache.start().await?;
        debug!(cache = %name, node = %self.address, "cache defined");
        Ok(cache)
    }

    pub fn cache(&self, name: &str) -> Result<Arc<Cache>> {
        self.caches
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| Error::CacheNotDefined(name.to_string()))
    }

    pub fn cache_names(&self) -> Vec<String> {
        self.caches.iter().map(|c| c.key().clone()).collect()
    }

    /// Stop every cache and leave the cluster
    pub async fn stop(&self) -> Result<()> {
        let caches: Vec<Arc<Cache>> = self.caches.iter().map(|c| Arc::clone(c.value())).collect();
        for cache in caches {
            cache.stop().await?;
        }
        if let Some(cluster) = &self.cluster {
            cluster.leave(&self.address);
        }
        info!(address = %self.address, "cache manager stopped");
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for CacheManager {
    #[instrument(skip(self, payload), fields(node = %self.address))]
    async fn handle(&self, origin: Address, payload: Bytes) -> Result<Bytes> {
        let command = ReplicableCommand::decode(&self.marshaller, payload)?;
        let cache = self
            .caches
            .get(command.cache_name())
            .map(|c| Arc::clone(c.value()));

        let response = match (cache, command) {
            (None, command) => {
                warn!(cache = command.cache_name(), "command for a cache that is not defined here");
                Response::Invalid
            }
            (Some(cache), ReplicableCommand::Single(single)) => {
                cache.handle_remote_write(origin, single.command).await?
            }
            (Some(cache), ReplicableCommand::ClusteredGet(get)) => cache.handle_clustered_get(&get.key)?,
        };
        self.marshaller.object_to_bytes(&response.to_object())
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("address", &self.address)
            .field("caches", &self.cache_names())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
