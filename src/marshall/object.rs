//! Type-Erased Cache Objects
//!
//! Keys and values travel through the cache as [`Object`]s: shared,
//! type-erased handles that still compare structurally and hash with a
//! stable, process-independent hash.
//!
//! The hash must agree between nodes: a key wrapped on one member carries its
//! hash on the wire, and a lookup on another member recomputes it locally.
//! `std`'s `RandomState` is seeded per process, so objects hash through
//! [`StableHasher`] instead.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::Bytes;

use super::marshalled_value::MarshalledValue;

// =============================================================================
// Stable Hasher
// =============================================================================

/// Deterministic FxHash-style hasher
///
/// Not cryptographic. Output depends only on the bytes fed in, never on
/// process state.
#[derive(Debug, Clone)]
pub struct StableHasher {
    hash: u64,
}

impl StableHasher {
    const SEED: u64 = 0x517c_c1b7_2722_0a95;

    pub fn new() -> Self {
        Self { hash: Self::SEED }
    }

    #[inline]
    fn mix(&mut self, word: u64) {
        self.hash = (self.hash.rotate_left(5) ^ word).wrapping_mul(Self::SEED);
    }

    /// Fold the 64-bit state into the 32-bit hash carried by wrappers
    pub fn finish_i32(&self) -> i32 {
        let h = self.finish();
        ((h >> 32) ^ h) as u32 as i32
    }
}

impl Default for StableHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for StableHasher {
    fn finish(&self) -> u64 {
        self.hash
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.mix(byte as u64);
        }
    }

    fn write_u32(&mut self, n: u32) {
        self.mix(n as u64);
    }

    fn write_u64(&mut self, n: u64) {
        self.mix(n);
    }

    fn write_usize(&mut self, n: usize) {
        // Fixed width so 32- and 64-bit builds agree
        self.mix(n as u64);
    }
}

/// Stable 32-bit hash of any hashable value
pub fn stable_hash<T: Hash + ?Sized>(value: &T) -> i32 {
    let mut hasher = StableHasher::new();
    value.hash(&mut hasher);
    hasher.finish_i32()
}

// =============================================================================
// CacheObject
// =============================================================================

/// Behaviour every value stored in the cache must provide
///
/// Implemented automatically for any `'static` type that is `Eq + Hash +
/// Debug + Send + Sync`.
pub trait CacheObject: Any + Send + Sync + fmt::Debug {
    /// Upcast for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Name of the concrete type (diagnostics only)
    fn type_name(&self) -> &'static str;

    /// Structural equality against another erased object
    fn object_eq(&self, other: &dyn CacheObject) -> bool;

    /// Stable 32-bit hash
    fn object_hash(&self) -> i32;
}

impl<T> CacheObject for T
where
    T: Any + Send + Sync + fmt::Debug + Eq + Hash,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn object_eq(&self, other: &dyn CacheObject) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn object_hash(&self) -> i32 {
        stable_hash(self)
    }
}

// =============================================================================
// Object
// =============================================================================

/// Shared handle to a type-erased cache object
#[derive(Clone)]
pub struct Object(Arc<dyn CacheObject>);

impl Object {
    /// Wrap a value
    ///
    /// Wrapping an `Object` returns it unchanged rather than nesting it.
    pub fn new<T: CacheObject>(value: T) -> Self {
        if let Some(object) = (&value as &dyn Any).downcast_ref::<Object>() {
            return object.clone();
        }
        Self(Arc::new(value))
    }

    /// Runtime type of the wrapped value
    pub fn type_id(&self) -> TypeId {
        Any::type_id(self.0.as_any())
    }

    /// Name of the wrapped type
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Whether the wrapped value is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.0.as_any().is::<T>()
    }

    /// Borrow the wrapped value as a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Stable 32-bit hash of the wrapped value
    pub fn stable_hash(&self) -> i32 {
        self.0.object_hash()
    }

    /// The wrapper, if this object is a marshalled value
    pub fn as_marshalled(&self) -> Option<&MarshalledValue> {
        self.downcast_ref::<MarshalledValue>()
    }

    /// Whether this object is a marshalled value
    pub fn is_marshalled(&self) -> bool {
        self.is::<MarshalledValue>()
    }

    /// Whether two handles point at the same allocation
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Convenience accessor for string values
    pub fn as_str(&self) -> Option<&str> {
        self.downcast_ref::<String>().map(String::as_str)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0.object_eq(other.0.as_ref())
    }
}

impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.stable_hash());
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Object::new(value.to_string())
    }
}

impl From<String> for Object {
    fn from(value: String) -> Self {
        Object::new(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::new(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::new(value)
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::new(value)
    }
}

impl From<Bytes> for Object {
    fn from(value: Bytes) -> Self {
        Object::new(value)
    }
}

impl From<Vec<Object>> for Object {
    fn from(value: Vec<Object>) -> Self {
        Object::new(value)
    }
}

impl From<MarshalledValue> for Object {
    fn from(value: MarshalledValue) -> Self {
        Object::new(value)
    }
}

// =============================================================================
// Tests
// =============================================================================
