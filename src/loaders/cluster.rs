//! Cluster Cache Loader
//!
//! Services a local miss by asking every other member for the entry.
//!
//! ```text
//!  load(k) ──▶ ClusteredGet(k, cache) ──▶ members − self
//!                                            │  wait for valid response
//!                                            ▼
//!             successful responses ──▶ collapse equal ──▶ 0: miss
//!                                                         1: entry
//!                                                        >1: divergence
//! ```
//!
//! Only local invocations on a running cache consult the cluster; a peer
//! servicing someone else's clustered get never forwards it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, instrument};

use super::CacheLoader;
use crate::commands::{ClusteredGetCommand, ReplicableCommand};
use crate::config::ClusterLoaderConfig;
use crate::container::{InternalCacheEntry, InternalCacheValue};
use crate::context::{ComponentStatus, InvocationContext, StatusCell};
use crate::error::{Error, Result};
use crate::marshall::{Object, VersionAwareMarshaller};
use crate::remoting::{Address, ClusteredGetResponseValidityFilter, Response, ResponseMode, RpcManager};

/// Loader backed by the other members of the cluster
pub struct ClusterCacheLoader {
    cache_name: String,
    config: ClusterLoaderConfig,
    rpc: Arc<dyn RpcManager>,
    marshaller: VersionAwareMarshaller,
    status: Arc<StatusCell>,
}

impl ClusterCacheLoader {
    pub fn new(
        cache_name: impl Into<String>,
        config: ClusterLoaderConfig,
        rpc: Arc<dyn RpcManager>,
        marshaller: VersionAwareMarshaller,
        status: Arc<StatusCell>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            config,
            rpc,
            marshaller,
            status,
        }
    }

    fn is_cache_ready(&self) -> bool {
        self.status.get() == ComponentStatus::Running
    }

    async fn remote_call(&self, payload: bytes::Bytes) -> Result<Vec<Response>> {
        let me = self.rpc.address().clone();
        let valid_members: Vec<Address> = self.rpc.members().into_iter().filter(|m| m != &me).collect();
        if valid_members.is_empty() {
            return Ok(Vec::new());
        }

        let filter = ClusteredGetResponseValidityFilter::new(valid_members.iter().cloned());
        let responses = self
            .rpc
            .invoke_remotely(
                Some(&valid_members),
                payload,
                ResponseMode::WaitForValidResponse,
                self.config.remote_call_timeout(),
                Some(Box::new(filter)),
            )
            .await
            .map_err(|e| {
                error!("Clustered get failed: {}", e);
                Error::LoaderTransport { source: Box::new(e) }
            })?;
        Ok(responses.into_values().collect())
    }
}

#[async_trait]
impl CacheLoader for ClusterCacheLoader {
    #[instrument(skip(self, ctx), fields(cache = %self.cache_name))]
    async fn load(&self, key: &Object, ctx: &InvocationContext) -> Result<Option<InternalCacheEntry>> {
        if !(self.is_cache_ready() && ctx.is_origin_local()) {
            return Ok(None);
        }

        let command = ReplicableCommand::ClusteredGet(ClusteredGetCommand {
            key: key.clone(),
            cache_name: self.cache_name.clone(),
        });
        let payload = command.encode(&self.marshaller)?;
        let responses = self.remote_call(payload).await?;

        // Equal answers from different members collapse into one
        let successful: HashSet<Response> = responses
            .into_iter()
            .filter(Response::is_successful)
            .collect();

        match successful.len() {
            0 => {
                debug!("no member holds the key");
                Ok(None)
            }
            1 => {
                let Some(response) = successful.into_iter().next() else {
                    return Ok(None);
                };
                let Some(record) = response.result(&self.marshaller)? else {
                    return Ok(None);
                };
                let value = InternalCacheValue::from_object(&record)?;
                debug!("loaded entry from cluster");
                Ok(Some(value.to_internal_cache_entry(key.clone())))
            }
            count => {
                error!(count, "members disagree on the value, refusing to pick one");
                Err(Error::LoaderDivergence {
                    key: format!("{key:?}"),
                    count,
                })
            }
        }
    }

    async fn load_all(&self) -> Result<Vec<InternalCacheEntry>> {
        Ok(Vec::new())
    }

    async fn load_some(&self, _max_entries: usize) -> Result<Vec<InternalCacheEntry>> {
        Ok(Vec::new())
    }

    async fn load_all_keys(&self, _exclude: &HashSet<Object>) -> Result<HashSet<Object>> {
        Ok(HashSet::new())
    }
}

impl std::fmt::Debug for ClusterCacheLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCacheLoader")
            .field("cache_name", &self.cache_name)
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
