use std::sync::Arc;

use async_trait::async_trait;
use tracing::{trace, Instrument};

use super::{Interceptor, Next};
use crate::commands::{Command, Reply};
use crate::context::{InvocationContext, Origin, StatusCell};
use crate::error::{Error, Result};

/// First stage: refuses invocations on a cache that is not running and opens
/// a tracing span for the rest of the chain
pub struct InvocationContextInterceptor {
    cache_name: String,
    status: Arc<StatusCell>,
}

impl InvocationContextInterceptor {
    pub const NAME: &'static str = "invocation-context";

    pub fn new(cache_name: impl Into<String>, status: Arc<StatusCell>) -> Self {
        Self {
            cache_name: cache_name.into(),
            status,
        }
    }
}

#[async_trait]
impl Interceptor for InvocationContextInterceptor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn handle(&self, ctx: &mut InvocationContext, command: Command, next: Next<'_>) -> Result<Reply> {
        let status = self.status.get();
        if !status.allows_invocations() {
            return Err(Error::CacheNotRunning {
                name: self.cache_name.clone(),
                status: status.to_string(),
            });
        }

        let origin = match ctx.origin() {
            Origin::Local => "local".to_string(),
            Origin::Remote(sender) => sender.to_string(),
        };
        let span = tracing::trace_span!("invoke", cache = %self.cache_name, command = command.name(), %origin);
        async move {
            trace!("invocation started");
            let reply = next.run(ctx, command).await;
            if let Err(e) = &reply {
                trace!("invocation failed: {}", e);
            }
            reply
        }
        .instrument(span)
        .await
    }
}
