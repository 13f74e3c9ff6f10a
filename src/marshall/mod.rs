//! Marshalling Layer
//!
//! Type-erased objects, the codec registry, the versioned marshaller and the
//! lazily (de)serialized [`MarshalledValue`] wrapper.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                  VersionAwareMarshaller                    │
//! │   magic 0x4C01 │ output/input sessions │ buffer pool       │
//! ├────────────────────────────────────────────────────────────┤
//! │                      CodecRegistry                         │
//! │   tag → (write, read)      type → tag                      │
//! ├──────────────┬──────────────┬──────────────┬───────────────┤
//! │   scalars    │  sequences   │ value records│ marshalled    │
//! │              │              │              │ values        │
//! └──────────────┴──────────────┴──────────────┴───────────────┘
//! ```

pub mod builtin;
mod codec;
mod marshalled_value;
mod marshaller;
mod object;
pub mod varint;

#[cfg(test)]
mod proptest;

pub use codec::{Codec, CodecRegistry, USER_TAG_START};
pub use marshalled_value::{unwrap_object, MarshalledValue, RepresentationState};
pub use marshaller::{
    InputSession, OutputSession, VersionAwareMarshaller, MAX_OBJECT_DEPTH, SUPPORTED_VERSIONS,
    VERSION_MAGIC,
};
pub use object::{stable_hash, CacheObject, Object, StableHasher};
