//! In-Process Transport
//!
//! Connects the members of a cluster living in one process. Each remote call
//! spawns one task per target; the target decodes the command with its own
//! marshaller and its encoded reply travels back over a channel, so bytes are
//! the only thing shared between members.
//!
//! ```text
//!  caller ──payload──▶ spawn(target.handle) ──reply bytes──▶ mpsc ──▶ filter
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

use super::address::Address;
use super::filter::{ResponseFilter, Verdict};
use super::response::Response;
use super::rpc::{CommandHandler, ResponseMode, RpcManager};
use crate::error::{Error, Result};
use crate::marshall::VersionAwareMarshaller;

// =============================================================================
// Cluster Registry
// =============================================================================

struct Member {
    address: Address,
    handler: Weak<dyn CommandHandler>,
}

/// Membership registry shared by every member in the process
#[derive(Default)]
pub struct LocalCluster {
    members: RwLock<Vec<Member>>,
}

impl LocalCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a member; a member rejoining replaces its old handler
    pub fn join(&self, address: Address, handler: Weak<dyn CommandHandler>) {
        let mut members = self.members.write();
        members.retain(|m| m.address != address);
        debug!(%address, size = members.len() + 1, "member joined");
        members.push(Member { address, handler });
    }

    pub fn leave(&self, address: &Address) {
        let mut members = self.members.write();
        members.retain(|m| &m.address != address);
        debug!(%address, size = members.len(), "member left");
    }

    /// Members in join order
    pub fn members(&self) -> Vec<Address> {
        self.members.read().iter().map(|m| m.address.clone()).collect()
    }

    fn handler(&self, address: &Address) -> Option<Arc<dyn CommandHandler>> {
        self.members
            .read()
            .iter()
            .find(|m| &m.address == address)
            .and_then(|m| m.handler.upgrade())
    }
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("members", &self.members())
            .finish()
    }
}

// =============================================================================
// Transport
// =============================================================================

type Reply = (Address, Result<Bytes>);

/// [`RpcManager`] for one member of a [`LocalCluster`]
pub struct LocalTransport {
    address: Address,
    cluster: Arc<LocalCluster>,
    marshaller: VersionAwareMarshaller,
}

impl LocalTransport {
    pub fn new(address: Address, cluster: Arc<LocalCluster>, marshaller: VersionAwareMarshaller) -> Self {
        Self {
            address,
            cluster,
            marshaller,
        }
    }

    fn decode_reply(&self, sender: &Address, reply: Result<Bytes>) -> Result<Response> {
        let bytes = reply.map_err(|e| Error::RemoteException {
            sender: sender.to_string(),
            message: e.to_string(),
        })?;
        Response::from_object(&self.marshaller.object_from_bytes(bytes)?)
    }

    fn offer(
        filter: Option<&mut (dyn ResponseFilter + 'static)>,
        sender: Address,
        response: Response,
        accepted: &mut HashMap<Address, Response>,
    ) -> Verdict {
        let Some(filter) = filter else {
            accepted.insert(sender, response);
            return Verdict::Continue;
        };
        let decision = filter.accept(&sender, &response);
        if decision.keep {
            accepted.insert(sender, response);
        }
        decision.verdict
    }
}

#[async_trait]
impl RpcManager for LocalTransport {
    fn address(&self) -> &Address {
        &self.address
    }

    fn members(&self) -> Vec<Address> {
        self.cluster.members()
    }

    #[instrument(skip(self, targets, payload, filter), fields(node = %self.address, len = payload.len()))]
    async fn invoke_remotely(
        &self,
        targets: Option<&[Address]>,
        payload: Bytes,
        mode: ResponseMode,
        timeout: Duration,
        mut filter: Option<Box<dyn ResponseFilter>>,
    ) -> Result<HashMap<Address, Response>> {
        let targets: Vec<Address> = match targets {
            Some(targets) => targets.to_vec(),
            None => self.cluster.members(),
        }
        .into_iter()
        .filter(|a| a != &self.address)
        .collect();
        if targets.is_empty() {
            return Ok(HashMap::new());
        }

        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            let handler = self.cluster.handler(&target);
            if handler.is_none() && mode == ResponseMode::Synchronous {
                return Err(Error::MemberUnreachable(target.to_string()));
            }
            resolved.push((target, handler));
        }

        let expected = resolved.len();
        let (tx, mut rx) = mpsc::unbounded_channel::<Reply>();
        for (target, handler) in resolved {
            let tx = tx.clone();
            let Some(handler) = handler else {
                // Departed members answer as stale
                let invalid = self.marshaller.object_to_bytes(&Response::Invalid.to_object());
                let _ = tx.send((target, invalid));
                continue;
            };
            let origin = self.address.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                let reply = handler.handle(origin, payload).await;
                if let Err(e) = &reply {
                    warn!(%target, "remote command failed: {}", e);
                }
                let _ = tx.send((target, reply));
            });
        }
        drop(tx);

        if mode == ResponseMode::Asynchronous {
            trace!(targets = expected, "dispatched asynchronously");
            return Ok(HashMap::new());
        }

        let deadline = Instant::now() + timeout;
        let mut accepted = HashMap::new();
        let mut pending = expected;
        while pending > 0 {
            let (sender, reply) = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(reply)) => reply,
                Ok(None) => break,
                Err(_) if mode == ResponseMode::Synchronous => {
                    return Err(Error::RpcTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                        pending,
                    });
                }
                Err(_) => {
                    debug!(pending, "deadline passed, returning responses received so far");
                    break;
                }
            };
            pending -= 1;
            let response = self.decode_reply(&sender, reply)?;
            if Self::offer(filter.as_deref_mut(), sender, response, &mut accepted) == Verdict::Done {
                // Deliver whatever already arrived; later replies are dropped
                while let Ok((sender, reply)) = rx.try_recv() {
                    let response = self.decode_reply(&sender, reply)?;
                    Self::offer(filter.as_deref_mut(), sender, response, &mut accepted);
                }
                break;
            }
        }
        trace!(accepted = accepted.len(), "remote call complete");
        Ok(accepted)
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("address", &self.address)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
