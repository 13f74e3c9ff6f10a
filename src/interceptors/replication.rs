use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use super::{Interceptor, Next};
use crate::commands::{Command, ReplicableCommand, Reply, SingleRpcCommand};
use crate::config::CacheMode;
use crate::context::{Flag, InvocationContext};
use crate::error::Result;
use crate::marshall::VersionAwareMarshaller;
use crate::remoting::{ResponseMode, RpcManager};
use crate::stats::CacheStats;

/// Sends local writes to every other member
///
/// The outgoing command is encoded before the write is applied. A value that
/// cannot be marshalled therefore fails the call without touching the local
/// container, and the wrappers it carries are serialized exactly once no
/// matter how many members receive them.
pub struct ReplicationInterceptor {
    cache_name: String,
    rpc: Arc<dyn RpcManager>,
    marshaller: VersionAwareMarshaller,
    mode: ResponseMode,
    timeout: Duration,
    stats: Arc<CacheStats>,
}

impl ReplicationInterceptor {
    pub const NAME: &'static str = "replication";

    pub fn new(
        cache_name: impl Into<String>,
        rpc: Arc<dyn RpcManager>,
        marshaller: VersionAwareMarshaller,
        cache_mode: CacheMode,
        timeout: Duration,
        stats: Arc<CacheStats>,
    ) -> Self {
        let mode = if cache_mode.is_synchronous() {
            ResponseMode::Synchronous
        } else {
            ResponseMode::Asynchronous
        };
        Self {
            cache_name: cache_name.into(),
            rpc,
            marshaller,
            mode,
            timeout,
            stats,
        }
    }
}

#[async_trait]
impl Interceptor for ReplicationInterceptor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn handle(&self, ctx: &mut InvocationContext, command: Command, next: Next<'_>) -> Result<Reply> {
        let write = match command.to_write() {
            Some(write) if ctx.is_origin_local() && !ctx.has_flag(Flag::CacheModeLocal) => write,
            _ => return next.run(ctx, command).await,
        };

        let payload = ReplicableCommand::Single(SingleRpcCommand {
            cache_name: self.cache_name.clone(),
            command: write,
        })
        .encode(&self.marshaller)?;

        let name = command.name();
        let reply = next.run(ctx, command).await?;

        self.rpc
            .invoke_remotely(None, payload, self.mode, self.timeout, None)
            .await
            .map_err(|e| {
                error!(command = name, "Replication failed: {}", e);
                e
            })?;
        self.stats.record_replication();
        debug!(command = name, mode = ?self.mode, "replicated");
        Ok(reply)
    }
}
