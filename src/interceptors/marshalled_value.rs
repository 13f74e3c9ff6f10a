//! Marshalled-Value Interceptor
//!
//! Keeps application objects out of the lower stages. On the way down, keys
//! and values are wrapped in [`MarshalledValue`]s; on the way back, replies to
//! local callers are unwrapped. Replication serializes the wrappers it sends,
//! so receivers store bytes and only pay for deserialization on first read.

use async_trait::async_trait;
use tracing::{trace, warn};

use super::{Interceptor, Next};
use crate::commands::{Command, Reply};
use crate::context::InvocationContext;
use crate::error::{Error, Result};
use crate::marshall::{unwrap_object, MarshalledValue, Object, VersionAwareMarshaller};

pub struct MarshalledValueInterceptor {
    marshaller: VersionAwareMarshaller,
}

impl MarshalledValueInterceptor {
    pub const NAME: &'static str = "marshalled-value";

    pub fn new(marshaller: VersionAwareMarshaller) -> Self {
        Self { marshaller }
    }

    /// Wrap `object` unless it already is a wrapper
    ///
    /// Objects no codec can write are rejected here, before any lower stage
    /// sees the command.
    fn wrap(&self, object: Object, fresh: &mut Vec<Object>) -> Result<Object> {
        if object.is_marshalled() {
            return Ok(object);
        }
        if !self.marshaller.is_marshallable(&object) {
            return Err(Error::non_serializable(
                object.type_name(),
                "no codec registered for this type or one of its elements",
            ));
        }
        let wrapped = Object::from(MarshalledValue::new(object, true, self.marshaller.clone()));
        fresh.push(wrapped.clone());
        Ok(wrapped)
    }

    fn wrap_command(&self, command: Command, fresh: &mut Vec<Object>) -> Result<Command> {
        Ok(match command {
            Command::Put(mut put) => {
                put.key = self.wrap(put.key, fresh)?;
                put.value = self.wrap(put.value, fresh)?;
                Command::Put(put)
            }
            Command::Remove(mut remove) => {
                remove.key = self.wrap(remove.key, fresh)?;
                Command::Remove(remove)
            }
            Command::Get(mut get) => {
                get.key = self.wrap(get.key, fresh)?;
                Command::Get(get)
            }
            Command::ContainsKey(mut contains) => {
                contains.key = self.wrap(contains.key, fresh)?;
                Command::ContainsKey(contains)
            }
            other => other,
        })
    }

    fn unwrap_reply(reply: Reply) -> Result<Reply> {
        Ok(match reply {
            Reply::Value(Some(value)) => Reply::Value(Some(unwrap_object(value)?)),
            Reply::Objects(objects) => Reply::Objects(
                objects
                    .into_iter()
                    .map(unwrap_object)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Reply::Entries(entries) => Reply::Entries(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((unwrap_object(k)?, unwrap_object(v)?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => other,
        })
    }
}

#[async_trait]
impl Interceptor for MarshalledValueInterceptor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn handle(&self, ctx: &mut InvocationContext, command: Command, next: Next<'_>) -> Result<Reply> {
        let mut fresh = Vec::new();
        let command = self.wrap_command(command, &mut fresh)?;
        if !fresh.is_empty() {
            trace!(wrapped = fresh.len(), command = command.name(), "wrapped command arguments");
        }

        let reply = next.run(ctx, command).await;

        // Local wrappers keep the instance; bytes produced for replication
        // are released once the command is done with them
        for wrapper in &fresh {
            if let Some(mv) = wrapper.as_marshalled() {
                if let Err(e) = mv.compact_with(false, false) {
                    warn!("Failed to compact marshalled value: {}", e);
                }
            }
        }

        let reply = reply?;
        if ctx.is_origin_local() {
            Self::unwrap_reply(reply)
        } else {
            Ok(reply)
        }
    }
}
