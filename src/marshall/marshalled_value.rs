//! Marshalled Value
//!
//! Dual-representation wrapper for cache keys and values: a live instance, a
//! serialized byte form, or both.
//!
//! # Representation
//!
//! ```text
//!   new(obj) ──▶ Instance ──serialize()──▶ Both ◀──deserialize()── Raw ◀── wire
//!                   ▲                        │                       ▲
//!                   └── compact(prefer=inst) ┴ compact(prefer=raw) ──┘
//! ```
//!
//! The hash is taken from the instance when the wrapper is created and then
//! travels with the bytes, so it never changes while the wrapper moves between
//! states or between nodes. Transitions run under a per-wrapper mutex; the raw
//! buffer is an immutable [`Bytes`] once published.

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::marshaller::VersionAwareMarshaller;
use super::object::Object;
use crate::error::{Error, Result};

/// Current representation of a wrapper
#[derive(Clone)]
enum Representation {
    Instance(Object),
    Raw(Bytes),
    Both { instance: Object, raw: Bytes },
}

impl Representation {
    fn instance(&self) -> Option<&Object> {
        match self {
            Representation::Instance(instance) | Representation::Both { instance, .. } => {
                Some(instance)
            }
            Representation::Raw(_) => None,
        }
    }

    fn raw(&self) -> Option<&Bytes> {
        match self {
            Representation::Raw(raw) | Representation::Both { raw, .. } => Some(raw),
            Representation::Instance(_) => None,
        }
    }
}

/// Observable representation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepresentationState {
    /// Only the deserialized instance is held
    InstanceOnly,
    /// Only the serialized bytes are held
    RawOnly,
    /// Both forms are held
    Both,
}

/// Wrapper holding a value in instance form, serialized form, or both
pub struct MarshalledValue {
    state: Mutex<Representation>,
    cached_hash: i32,
    equality_preserved: bool,
    marshaller: VersionAwareMarshaller,
}

impl MarshalledValue {
    /// Wrap a live instance; nothing is serialized yet
    pub fn new(instance: Object, equality_preserved: bool, marshaller: VersionAwareMarshaller) -> Self {
        Self {
            cached_hash: instance.stable_hash(),
            state: Mutex::new(Representation::Instance(instance)),
            equality_preserved,
            marshaller,
        }
    }

    /// Rebuild a wrapper from bytes received off the wire
    pub fn from_raw(
        raw: Bytes,
        cached_hash: i32,
        equality_preserved: bool,
        marshaller: VersionAwareMarshaller,
    ) -> Self {
        Self {
            state: Mutex::new(Representation::Raw(raw)),
            cached_hash,
            equality_preserved,
            marshaller,
        }
    }

    /// Hash computed from the instance at creation
    pub fn hash_code(&self) -> i32 {
        self.cached_hash
    }

    /// Whether the wrapped type provides structural equality
    pub fn equality_preserved(&self) -> bool {
        self.equality_preserved
    }

    /// Current representation
    pub fn state(&self) -> RepresentationState {
        match &*self.state.lock() {
            Representation::Instance(_) => RepresentationState::InstanceOnly,
            Representation::Raw(_) => RepresentationState::RawOnly,
            Representation::Both { .. } => RepresentationState::Both,
        }
    }

    /// The instance form, if currently held
    pub fn instance(&self) -> Option<Object> {
        self.state.lock().instance().cloned()
    }

    /// The serialized form, if currently held
    pub fn raw(&self) -> Option<Bytes> {
        self.state.lock().raw().cloned()
    }

    pub fn has_instance(&self) -> bool {
        self.state.lock().instance().is_some()
    }

    pub fn has_raw(&self) -> bool {
        self.state.lock().raw().is_some()
    }

    /// Produce the serialized form if it is missing; the instance is kept
    pub fn serialize(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::serialize_locked(&mut state, &self.marshaller)
    }

    fn serialize_locked(state: &mut Representation, marshaller: &VersionAwareMarshaller) -> Result<()> {
        if let Representation::Instance(instance) = &*state {
            let instance = instance.clone();
            let raw = marshaller.object_to_bytes(&instance)?;
            trace!(len = raw.len(), "serialized marshalled value");
            *state = Representation::Both { instance, raw };
        }
        Ok(())
    }

    /// Produce the instance form if it is missing; the bytes are kept
    pub fn deserialize(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::deserialize_locked(&mut state, &self.marshaller)
    }

    fn deserialize_locked(state: &mut Representation, marshaller: &VersionAwareMarshaller) -> Result<()> {
        if let Representation::Raw(raw) = &*state {
            let raw = raw.clone();
            let instance = marshaller.object_from_bytes(raw.clone())?;
            trace!(type_name = instance.type_name(), "deserialized marshalled value");
            *state = Representation::Both { instance, raw };
        }
        Ok(())
    }

    /// Keep only the serialized form, serializing first if needed
    pub fn compact(&self) -> Result<()> {
        self.compact_with(true, true)
    }

    /// Drop one representation
    ///
    /// With `force`, the preferred form is materialized when missing. When
    /// both forms are present the non-preferred one is released. A wrapper
    /// holding a single form is otherwise left alone.
    pub fn compact_with(&self, prefer_serialized: bool, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        if force {
            if prefer_serialized {
                Self::serialize_locked(&mut state, &self.marshaller)?;
            } else {
                Self::deserialize_locked(&mut state, &self.marshaller)?;
            }
        }
        let kept = match &*state {
            Representation::Both { raw, .. } if prefer_serialized => Representation::Raw(raw.clone()),
            Representation::Both { instance, .. } => Representation::Instance(instance.clone()),
            _ => return Ok(()),
        };
        *state = kept;
        Ok(())
    }

    /// The instance, materializing it from bytes when needed
    pub fn get(&self) -> Result<Object> {
        let mut state = self.state.lock();
        Self::deserialize_locked(&mut state, &self.marshaller)?;
        state
            .instance()
            .cloned()
            .ok_or_else(|| Error::Internal("marshalled value lost its instance".into()))
    }

    /// The bytes, serializing when needed
    pub fn serialized(&self) -> Result<Bytes> {
        let mut state = self.state.lock();
        Self::serialize_locked(&mut state, &self.marshaller)?;
        state
            .raw()
            .cloned()
            .ok_or_else(|| Error::Internal("marshalled value lost its bytes".into()))
    }

    fn snapshot(&self) -> Representation {
        self.state.lock().clone()
    }

    fn try_equals(&self, other: &MarshalledValue) -> Result<bool> {
        let (mine, theirs) = (self.snapshot(), other.snapshot());

        if let (Some(a), Some(b)) = (mine.instance(), theirs.instance()) {
            return Ok(a == b);
        }
        if let (Some(a), Some(b)) = (mine.raw(), theirs.raw()) {
            if a == b {
                return Ok(true);
            }
            // Equal objects may encode differently; only types with structural
            // equality can be compared beyond their bytes.
            if !(self.equality_preserved && other.equality_preserved) {
                return Ok(false);
            }
        }
        Ok(self.get()? == other.get()?)
    }
}

impl PartialEq for MarshalledValue {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.cached_hash != other.cached_hash {
            return false;
        }
        match self.try_equals(other) {
            Ok(equal) => equal,
            Err(e) => {
                warn!("Comparing marshalled values failed, treating as unequal: {}", e);
                false
            }
        }
    }
}

impl Eq for MarshalledValue {}

impl Hash for MarshalledValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.cached_hash);
    }
}

impl fmt::Debug for MarshalledValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.snapshot();
        f.debug_struct("MarshalledValue")
            .field("instance", &state.instance())
            .field("raw_len", &state.raw().map(Bytes::len))
            .field("cached_hash", &self.cached_hash)
            .finish()
    }
}

/// Return the instance behind a wrapper, or the object itself
pub fn unwrap_object(object: Object) -> Result<Object> {
    match object.as_marshalled() {
        Some(mv) => mv.get(),
        None => Ok(object),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn marshaller() -> VersionAwareMarshaller {
        VersionAwareMarshaller::with_builtins()
    }

    fn wrap(value: impl Into<Object>) -> MarshalledValue {
        MarshalledValue::new(value.into(), true, marshaller())
    }

    #[test]
    fn test_new_holds_instance_only() {
        let mv = wrap("value");
        assert_eq!(mv.state(), RepresentationState::InstanceOnly);
        assert_eq!(mv.hash_code(), Object::from("value").stable_hash());
    }

    #[test]
    fn test_serialize_keeps_instance() {
        let mv = wrap("value");
        mv.serialize().unwrap();
        assert_eq!(mv.state(), RepresentationState::Both);

        let raw = mv.raw().unwrap();
        mv.serialize().unwrap();
        assert_eq!(mv.raw().unwrap(), raw, "second serialize must be a no-op");
    }

    #[test]
    fn test_compact_prefers_serialized_form() {
        let mv = wrap(vec![Object::from(1i32), Object::from("two")]);
        mv.compact().unwrap();
        assert_eq!(mv.state(), RepresentationState::RawOnly);

        // Already compact: nothing changes
        mv.compact().unwrap();
        assert_eq!(mv.state(), RepresentationState::RawOnly);
    }

    #[test]
    fn test_compact_without_force_keeps_single_form() {
        let mv = wrap("value");
        mv.compact_with(true, false).unwrap();
        assert_eq!(mv.state(), RepresentationState::InstanceOnly);

        mv.serialize().unwrap();
        mv.compact_with(false, false).unwrap();
        assert_eq!(mv.state(), RepresentationState::InstanceOnly);
    }

    #[test]
    fn test_get_materializes_from_raw() {
        let original = wrap("value");
        let raw = original.serialized().unwrap();

        let received = MarshalledValue::from_raw(raw, original.hash_code(), true, marshaller());
        assert_eq!(received.state(), RepresentationState::RawOnly);
        assert_eq!(received.get().unwrap(), Object::from("value"));
        assert_eq!(received.state(), RepresentationState::Both);
    }

    #[test]
    fn test_hash_is_stable_across_transitions() {
        let mv = wrap(42i64);
        let hash = mv.hash_code();
        mv.serialize().unwrap();
        assert_eq!(mv.hash_code(), hash);
        mv.compact().unwrap();
        assert_eq!(mv.hash_code(), hash);
        mv.deserialize().unwrap();
        assert_eq!(mv.hash_code(), hash);
    }

    #[test]
    fn test_equality_across_representations() {
        let a = wrap("key");
        let b = wrap("key");
        a.compact().unwrap();

        // raw-only vs instance-only
        assert_eq!(a, b);
        assert_eq!(b, a);

        // raw vs raw
        b.compact().unwrap();
        assert_eq!(a, b);

        assert_ne!(a, wrap("other"));
    }

    #[test]
    fn test_mixed_comparison_deserializes_raw_side() {
        let lookup = wrap("key");
        let stored =
            MarshalledValue::from_raw(wrap("key").serialized().unwrap(), lookup.hash_code(), true, marshaller());

        assert_eq!(lookup, stored);
        assert_eq!(lookup.state(), RepresentationState::InstanceOnly);
        assert_eq!(stored.state(), RepresentationState::Both);
    }

    #[test]
    fn test_differing_bytes_without_preserved_equality() {
        let a = MarshalledValue::from_raw(Bytes::from_static(b"\x4c\x01\x04\x01"), 7, false, marshaller());
        let b = MarshalledValue::from_raw(Bytes::from_static(b"\x4c\x01\x04\x00"), 7, false, marshaller());
        assert_ne!(a, b);
        // Neither side had to be decoded
        assert_eq!(a.state(), RepresentationState::RawOnly);
        assert_eq!(b.state(), RepresentationState::RawOnly);
    }

    #[test]
    fn test_corrupt_bytes_compare_unequal() {
        let good = wrap("key");
        let bad = MarshalledValue::from_raw(Bytes::from_static(b"\x00\x00"), good.hash_code(), true, marshaller());
        assert_ne!(good, bad);
        assert!(bad.get().is_err());
    }

    #[test]
    fn test_failed_serialize_leaves_state_untouched() {
        #[derive(Debug, PartialEq, Eq, Hash)]
        struct Opaque;

        let mv = MarshalledValue::new(Object::new(Opaque), true, marshaller());
        assert!(matches!(mv.compact(), Err(Error::NonSerializable { .. })));
        assert_eq!(mv.state(), RepresentationState::InstanceOnly);
    }

    #[test]
    fn test_unwrap_object() {
        let wrapped = Object::from(wrap(5i32));
        assert_eq!(unwrap_object(wrapped).unwrap(), Object::from(5i32));
        assert_eq!(unwrap_object(Object::from("plain")).unwrap(), Object::from("plain"));
    }

    #[test]
    fn test_concurrent_materialization_is_consistent() {
        use std::sync::Arc;

        let raw = wrap("shared").serialized().unwrap();
        let mv = Arc::new(MarshalledValue::from_raw(raw, Object::from("shared").stable_hash(), true, marshaller()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mv = Arc::clone(&mv);
                std::thread::spawn(move || mv.get().unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Object::from("shared"));
        }
        assert_eq!(mv.state(), RepresentationState::Both);
    }
}
