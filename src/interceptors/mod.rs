//! Interceptor Chain
//!
//! Every invocation runs through an ordered list of stages. Each stage sees
//! the command, may rewrite it, and decides whether and when to hand it to
//! the rest of the chain through [`Next`]. The last stage applies the command
//! to the data container.
//!
//! ```text
//!  Cache API
//!     │
//!     ▼
//!  InvocationContextInterceptor   status check, tracing
//!     │
//!     ▼
//!  MarshalledValueInterceptor     wrap keys/values, unwrap replies   (lazy only)
//!     │
//!     ▼
//!  CacheLoaderInterceptor         load misses from the cluster       (loader only)
//!     │
//!     ▼
//!  ReplicationInterceptor         encode once, apply, dispatch       (clustered only)
//!     │
//!     ▼
//!  CallInterceptor                data container
//! ```
//!
//! The chain is held as an immutable snapshot; adding or removing a stage
//! swaps in a new list and never affects invocations already in flight.

mod cache_loader;
mod call;
mod invocation_context;
mod marshalled_value;
mod replication;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::commands::{Command, Reply};
use crate::context::InvocationContext;
use crate::error::{Error, Result};

pub use cache_loader::CacheLoaderInterceptor;
pub use call::CallInterceptor;
pub use invocation_context::InvocationContextInterceptor;
pub use marshalled_value::MarshalledValueInterceptor;
pub use replication::ReplicationInterceptor;

/// One stage of the invocation pipeline
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Unique name used to position stages
    fn name(&self) -> &'static str;

    /// Handle `command`, usually by delegating to `next`
    async fn handle(&self, ctx: &mut InvocationContext, command: Command, next: Next<'_>) -> Result<Reply>;
}

/// The remainder of the chain after the current stage
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
}

impl<'a> Next<'a> {
    /// Pass the command to the next stage
    pub async fn run(self, ctx: &mut InvocationContext, command: Command) -> Result<Reply> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(ctx, command, Next { chain: rest }).await,
            None => Err(Error::Internal(format!(
                "{} fell off the end of the interceptor chain",
                command.name()
            ))),
        }
    }
}

/// Ordered, swappable list of interceptors
pub struct InterceptorChain {
    interceptors: RwLock<Arc<Vec<Arc<dyn Interceptor>>>>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: RwLock::new(Arc::new(interceptors)),
        }
    }

    /// Run a command through every stage
    pub async fn invoke(&self, ctx: &mut InvocationContext, command: Command) -> Result<Reply> {
        let snapshot = self.interceptors.read().clone();
        Next { chain: &snapshot }.run(ctx, command).await
    }

    /// Insert `interceptor` directly after the stage named `after`
    ///
    /// Returns `false` if no such stage exists.
    pub fn add_interceptor_after(&self, interceptor: Arc<dyn Interceptor>, after: &str) -> bool {
        self.splice(|list| {
            let position = list.iter().position(|i| i.name() == after)?;
            list.insert(position + 1, interceptor);
            Some(())
        })
    }

    /// Insert `interceptor` directly before the stage named `before`
    pub fn add_interceptor_before(&self, interceptor: Arc<dyn Interceptor>, before: &str) -> bool {
        self.splice(|list| {
            let position = list.iter().position(|i| i.name() == before)?;
            list.insert(position, interceptor);
            Some(())
        })
    }

    /// Remove the stage named `name`
    pub fn remove_interceptor(&self, name: &str) -> bool {
        self.splice(|list| {
            let position = list.iter().position(|i| i.name() == name)?;
            list.remove(position);
            Some(())
        })
    }

    fn splice(&self, edit: impl FnOnce(&mut Vec<Arc<dyn Interceptor>>) -> Option<()>) -> bool {
        let mut guard = self.interceptors.write();
        let mut list = (**guard).clone();
        if edit(&mut list).is_none() {
            return false;
        }
        debug!(stages = ?list.iter().map(|i| i.name()).collect::<Vec<_>>(), "interceptor chain updated");
        *guard = Arc::new(list);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.interceptors.read().iter().any(|i| i.name() == name)
    }

    /// Stage names in invocation order
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.read().iter().map(|i| i.name()).collect()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
