//! RPC Ports
//!
//! The cache talks to its peers only through [`RpcManager`]; a node receives
//! commands only through [`CommandHandler`]. Both sides exchange encoded
//! bytes, so every hop goes through the marshaller.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::address::Address;
use super::filter::ResponseFilter;
use super::response::Response;
use crate::error::Result;

/// How long a remote call waits and what it returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Wait for every target; a missed deadline is an error
    Synchronous,
    /// Wait until the filter is satisfied; a missed deadline returns what arrived
    WaitForValidResponse,
    /// Fire and forget
    Asynchronous,
}

/// Receiving end of the transport
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle an encoded command sent by `origin`, returning an encoded response
    async fn handle(&self, origin: Address, payload: Bytes) -> Result<Bytes>;
}

/// Sending end of the transport
#[async_trait]
pub trait RpcManager: Send + Sync {
    /// This member
    fn address(&self) -> &Address;

    /// Current membership, self included, in join order
    fn members(&self) -> Vec<Address>;

    /// Send `payload` to `targets` (every other member when `None`)
    ///
    /// Returns the responses the filter kept, keyed by sender.
    async fn invoke_remotely(
        &self,
        targets: Option<&[Address]>,
        payload: Bytes,
        mode: ResponseMode,
        timeout: Duration,
        filter: Option<Box<dyn ResponseFilter>>,
    ) -> Result<HashMap<Address, Response>>;
}
