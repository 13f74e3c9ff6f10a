//! Remoting
//!
//! Member addresses, responses, response filters and the RPC ports, plus an
//! in-process transport connecting the members of a [`LocalCluster`].

mod address;
mod filter;
mod local;
mod response;
mod rpc;

pub use address::Address;
pub use filter::{ClusteredGetResponseValidityFilter, Decision, ResponseFilter, Verdict};
pub use local::{LocalCluster, LocalTransport};
pub use response::Response;
pub use rpc::{CommandHandler, ResponseMode, RpcManager};

pub(crate) use response::codecs as response_codecs;
