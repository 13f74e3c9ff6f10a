//! Data Container and Entry Types
//!
//! Entries as stored locally and the value records exchanged with peers.

mod data_container;
mod entries;

pub use data_container::DataContainer;
pub use entries::{
    now_millis, ImmortalCacheValue, InternalCacheEntry, InternalCacheValue, MortalCacheValue,
    TransientCacheValue, TransientMortalCacheValue, UNBOUNDED,
};
