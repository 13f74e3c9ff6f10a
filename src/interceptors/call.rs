use std::sync::Arc;

use async_trait::async_trait;

use super::{Interceptor, Next};
use crate::commands::{Command, Reply};
use crate::container::DataContainer;
use crate::context::InvocationContext;
use crate::error::Result;
use crate::stats::CacheStats;

/// Terminal stage: applies the command to the data container
pub struct CallInterceptor {
    container: Arc<DataContainer>,
    stats: Arc<CacheStats>,
}

impl CallInterceptor {
    pub const NAME: &'static str = "call";

    pub fn new(container: Arc<DataContainer>, stats: Arc<CacheStats>) -> Self {
        Self { container, stats }
    }
}

#[async_trait]
impl Interceptor for CallInterceptor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn handle(&self, _ctx: &mut InvocationContext, command: Command, _next: Next<'_>) -> Result<Reply> {
        let reply = match command {
            Command::Put(put) => {
                let previous = self
                    .container
                    .put(put.key, put.value, put.lifespan_ms, put.max_idle_ms, put.created_ms);
                self.stats.record_store();
                Reply::Value(previous.map(|e| e.value().clone()))
            }
            Command::Remove(remove) => {
                let previous = self.container.remove(&remove.key);
                if previous.is_some() {
                    self.stats.record_removal();
                }
                Reply::Value(previous.map(|e| e.value().clone()))
            }
            Command::Clear(_) => {
                self.container.clear();
                Reply::None
            }
            Command::Get(get) => match self.container.get(&get.key) {
                Some(entry) => {
                    self.stats.record_hit();
                    Reply::Value(Some(entry.value().clone()))
                }
                None => {
                    self.stats.record_miss();
                    Reply::Value(None)
                }
            },
            Command::ContainsKey(contains) => Reply::Bool(self.container.contains_key(&contains.key)),
            Command::Size => Reply::Size(self.container.size()),
            Command::KeySet => Reply::Objects(self.container.keys()),
            Command::Values => Reply::Objects(self.container.values()),
            Command::EntrySet => Reply::Entries(
                self.container
                    .entries()
                    .into_iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect(),
            ),
        };
        Ok(reply)
    }
}
