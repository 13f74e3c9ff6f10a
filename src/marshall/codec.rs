//! Codec Registry
//!
//! Maps compact one-byte type tags to `(write, read)` pairs. Codecs are plain
//! values built from closures; the registry resolves them by tag when reading
//! and by the runtime type of an [`Object`] when writing.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use super::builtin;
use super::marshaller::{InputSession, OutputSession};
use super::object::{CacheObject, Object};
use crate::error::{Error, Result};

/// First tag available to application codecs; lower tags are built-ins
pub const USER_TAG_START: u8 = 0x40;

type WriteFn = dyn Fn(&mut OutputSession<'_>, &Object) -> Result<()> + Send + Sync;
type ReadFn = dyn Fn(&mut InputSession<'_>) -> Result<Object> + Send + Sync;

// =============================================================================
// Codec
// =============================================================================

/// A `(write, read)` pair registered under a type tag
///
/// `write` emits exactly the payload that follows the tag and `read` consumes
/// exactly that payload.
#[derive(Clone)]
pub struct Codec {
    tag: u8,
    type_id: TypeId,
    type_name: &'static str,
    write: Arc<WriteFn>,
    read: Arc<ReadFn>,
}

impl Codec {
    /// Build a codec for `T`
    pub fn new<T, W, R>(tag: u8, write: W, read: R) -> Self
    where
        T: CacheObject,
        W: Fn(&mut OutputSession<'_>, &T) -> Result<()> + Send + Sync + 'static,
        R: Fn(&mut InputSession<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let write: Arc<WriteFn> = Arc::new(move |out: &mut OutputSession<'_>, object: &Object| {
            let value = object.downcast_ref::<T>().ok_or_else(|| {
                Error::non_serializable(
                    object.type_name(),
                    format!("codec 0x{tag:02x} only writes {}", type_name::<T>()),
                )
            })?;
            write(out, value)
        });
        let read: Arc<ReadFn> =
            Arc::new(move |input: &mut InputSession<'_>| read(input).map(Object::new));

        Self {
            tag,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            write,
            read,
        }
    }

    /// The type tag
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Name of the type this codec handles
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Emit the payload for `object`
    pub fn write(&self, out: &mut OutputSession<'_>, object: &Object) -> Result<()> {
        (self.write)(out, object)
    }

    /// Consume one payload
    pub fn read(&self, input: &mut InputSession<'_>) -> Result<Object> {
        (self.read)(input)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("tag", &format_args!("0x{:02x}", self.tag))
            .field("type", &self.type_name)
            .finish()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Tag and type indexed codec table
#[derive(Clone, Debug, Default)]
pub struct CodecRegistry {
    by_tag: HashMap<u8, Codec>,
    by_type: HashMap<TypeId, u8>,
}

impl CodecRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in codec
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for codec in builtin::codecs() {
            registry.insert(codec);
        }
        registry
    }

    fn insert(&mut self, codec: Codec) {
        self.by_type.insert(codec.type_id, codec.tag);
        self.by_tag.insert(codec.tag, codec);
    }

    /// Register a codec, refusing duplicate tags or types
    pub fn register(&mut self, codec: Codec) -> Result<()> {
        if let Some(existing) = self.by_tag.get(&codec.tag) {
            return Err(Error::Config(format!(
                "type tag 0x{:02x} already registered for {}",
                codec.tag, existing.type_name
            )));
        }
        if self.by_type.contains_key(&codec.type_id) {
            return Err(Error::Config(format!(
                "type {} already has a codec",
                codec.type_name
            )));
        }
        tracing::debug!(tag = codec.tag, type_name = codec.type_name, "registered codec");
        self.insert(codec);
        Ok(())
    }

    /// Codec for a tag read off the wire
    pub fn codec_for_tag(&self, tag: u8) -> Result<&Codec> {
        self.by_tag.get(&tag).ok_or(Error::CodecMissing { tag })
    }

    /// Codec for the runtime type of `object`
    pub fn codec_for_object(&self, object: &Object) -> Result<&Codec> {
        self.by_type
            .get(&object.type_id())
            .and_then(|tag| self.by_tag.get(tag))
            .ok_or_else(|| Error::non_serializable(object.type_name(), "no codec registered"))
    }

    /// Whether a codec exists for `T`
    pub fn contains_type<T: 'static>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered codecs
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
