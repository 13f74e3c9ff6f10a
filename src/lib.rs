//! gridcache - Lazy Deserialization for a Replicated In-Memory Cache
//!
//! Keys and values can be stored as [`MarshalledValue`]s that hold an
//! application object, its serialized bytes, or both. Bytes produced for
//! replication are computed once and shared by every recipient; receivers keep
//! them as-is and only pay for deserialization when a value is actually read.
//! Local misses can be served by the other members through the
//! [`ClusterCacheLoader`].
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────────────── CacheManager ────────────────────────────┐
//!  │                                                                       │
//!  │  Cache ──▶ InterceptorChain ──▶ DataContainer                         │
//!  │              │  invocation-context                                    │
//!  │              │  marshalled-value ── VersionAwareMarshaller ── Codecs   │
//!  │              │  cache-loader ───── ClusterCacheLoader ─┐              │
//!  │              │  replication ─────────────────────────┐ │              │
//!  │              │  call                                 ▼ ▼              │
//!  │                                                   RpcManager          │
//!  └───────────────────────────────────────────────────────┬──────────────┘
//!                                                          │ bytes
//!                                                   other members
//! ```
//!
//! # Modules
//!
//! - [`marshall`] - Codec registry, versioned marshaller, marshalled values
//! - [`container`] - Data container and value records
//! - [`commands`] - Commands, replies, and remote commands
//! - [`interceptors`] - Interceptor chain and its stages
//! - [`loaders`] - Cache loader port and the cluster loader
//! - [`remoting`] - RPC port, responses, filters, in-process transport
//! - [`cache`] - The cache facade and unmodifiable views
//! - [`manager`] - Per-member cache registry and command dispatch
//! - [`config`] - Cache configuration
//! - [`stats`] - Cache statistics
//! - [`error`] - Error types

pub mod cache;
pub mod commands;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod interceptors;
pub mod loaders;
pub mod manager;
pub mod marshall;
pub mod remoting;
pub mod stats;

// Re-export commonly used types
pub use cache::{Cache, EntrySet, FlaggedCache, KeySet, Values};
pub use config::{CacheConfig, CacheMode, ClusterLoaderConfig};
pub use context::{ComponentStatus, Flag};
pub use error::{Error, Result};
pub use loaders::{CacheLoader, ClusterCacheLoader};
pub use manager::CacheManager;
pub use marshall::{Codec, CodecRegistry, MarshalledValue, Object, VersionAwareMarshaller};
pub use remoting::{Address, LocalCluster};
pub use stats::{CacheStats, StatsSnapshot};
