//! Internal Cache Entries and Value Records
//!
//! An [`InternalCacheEntry`] is what the data container stores: key, value
//! and the four expiry fields. An [`InternalCacheValue`] is the same record
//! without the key, in one of four concrete kinds chosen by which bounds are
//! set. Only the fields a kind needs go on the wire; the rest read back as
//! [`UNBOUNDED`].
//!
//! | Kind             | lifespan | max idle |
//! |------------------|----------|----------|
//! | Immortal         | < 0      | < 0      |
//! | Mortal           | ≥ 0      | < 0      |
//! | Transient        | < 0      | ≥ 0      |
//! | Transient-mortal | ≥ 0      | ≥ 0      |

use crate::error::{Error, Result};
use crate::marshall::Object;

/// Marker for an unknown timestamp or an unbounded duration
pub const UNBOUNDED: i64 = -1;

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// =============================================================================
// Value Records
// =============================================================================

/// Value that never expires
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImmortalCacheValue {
    pub value: Object,
}

/// Value with a lifespan measured from creation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MortalCacheValue {
    pub value: Object,
    pub created: i64,
    pub lifespan: i64,
}

/// Value that expires after a period without access
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransientCacheValue {
    pub value: Object,
    pub last_used: i64,
    pub max_idle: i64,
}

/// Value bounded by both lifespan and idle time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransientMortalCacheValue {
    pub value: Object,
    pub created: i64,
    pub lifespan: i64,
    pub last_used: i64,
    pub max_idle: i64,
}

/// Value record as exchanged between nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InternalCacheValue {
    Immortal(ImmortalCacheValue),
    Mortal(MortalCacheValue),
    Transient(TransientCacheValue),
    TransientMortal(TransientMortalCacheValue),
}

impl InternalCacheValue {
    /// Pick the narrowest kind able to carry the given bounds
    pub fn create(value: Object, created: i64, lifespan: i64, last_used: i64, max_idle: i64) -> Self {
        match (lifespan >= 0, max_idle >= 0) {
            (false, false) => Self::Immortal(ImmortalCacheValue { value }),
            (true, false) => Self::Mortal(MortalCacheValue {
                value,
                created,
                lifespan,
            }),
            (false, true) => Self::Transient(TransientCacheValue {
                value,
                last_used,
                max_idle,
            }),
            (true, true) => Self::TransientMortal(TransientMortalCacheValue {
                value,
                created,
                lifespan,
                last_used,
                max_idle,
            }),
        }
    }

    pub fn value(&self) -> &Object {
        match self {
            Self::Immortal(v) => &v.value,
            Self::Mortal(v) => &v.value,
            Self::Transient(v) => &v.value,
            Self::TransientMortal(v) => &v.value,
        }
    }

    pub fn created(&self) -> i64 {
        match self {
            Self::Mortal(v) => v.created,
            Self::TransientMortal(v) => v.created,
            _ => UNBOUNDED,
        }
    }

    pub fn lifespan(&self) -> i64 {
        match self {
            Self::Mortal(v) => v.lifespan,
            Self::TransientMortal(v) => v.lifespan,
            _ => UNBOUNDED,
        }
    }

    pub fn last_used(&self) -> i64 {
        match self {
            Self::Transient(v) => v.last_used,
            Self::TransientMortal(v) => v.last_used,
            _ => UNBOUNDED,
        }
    }

    pub fn max_idle(&self) -> i64 {
        match self {
            Self::Transient(v) => v.max_idle,
            Self::TransientMortal(v) => v.max_idle,
            _ => UNBOUNDED,
        }
    }

    /// Attach a key
    pub fn to_internal_cache_entry(&self, key: Object) -> InternalCacheEntry {
        InternalCacheEntry {
            key,
            value: self.value().clone(),
            created: self.created(),
            lifespan: self.lifespan(),
            last_used: self.last_used(),
            max_idle: self.max_idle(),
        }
    }

    /// The concrete record as an object, so it encodes under its own tag
    pub fn to_object(&self) -> Object {
        match self {
            Self::Immortal(v) => Object::new(v.clone()),
            Self::Mortal(v) => Object::new(v.clone()),
            Self::Transient(v) => Object::new(v.clone()),
            Self::TransientMortal(v) => Object::new(v.clone()),
        }
    }

    /// Recover a record from a decoded object
    pub fn from_object(object: &Object) -> Result<Self> {
        if let Some(v) = object.downcast_ref::<ImmortalCacheValue>() {
            return Ok(Self::Immortal(v.clone()));
        }
        if let Some(v) = object.downcast_ref::<MortalCacheValue>() {
            return Ok(Self::Mortal(v.clone()));
        }
        if let Some(v) = object.downcast_ref::<TransientCacheValue>() {
            return Ok(Self::Transient(v.clone()));
        }
        if let Some(v) = object.downcast_ref::<TransientMortalCacheValue>() {
            return Ok(Self::TransientMortal(v.clone()));
        }
        Err(Error::UnexpectedResponse(format!(
            "expected a value record, got {}",
            object.type_name()
        )))
    }
}

// =============================================================================
// Internal Cache Entry
// =============================================================================

/// Entry held by the data container
#[derive(Debug, Clone)]
pub struct InternalCacheEntry {
    key: Object,
    value: Object,
    created: i64,
    lifespan: i64,
    last_used: i64,
    max_idle: i64,
}

impl InternalCacheEntry {
    /// Create an entry stamped with `now`
    pub fn new(key: Object, value: Object, lifespan: i64, max_idle: i64, now: i64) -> Self {
        Self {
            key,
            value,
            created: now,
            lifespan: lifespan.max(UNBOUNDED),
            last_used: now,
            max_idle: max_idle.max(UNBOUNDED),
        }
    }

    /// Create an entry that never expires
    pub fn immortal(key: Object, value: Object) -> Self {
        Self {
            key,
            value,
            created: UNBOUNDED,
            lifespan: UNBOUNDED,
            last_used: UNBOUNDED,
            max_idle: UNBOUNDED,
        }
    }

    #[inline]
    pub fn key(&self) -> &Object {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &Object {
        &self.value
    }

    #[inline]
    pub fn created(&self) -> i64 {
        self.created
    }

    #[inline]
    pub fn lifespan(&self) -> i64 {
        self.lifespan
    }

    #[inline]
    pub fn last_used(&self) -> i64 {
        self.last_used
    }

    #[inline]
    pub fn max_idle(&self) -> i64 {
        self.max_idle
    }

    /// Whether the entry has a lifespan
    pub fn is_mortal(&self) -> bool {
        self.lifespan >= 0
    }

    /// Whether the entry has an idle bound
    pub fn is_transient(&self) -> bool {
        self.max_idle >= 0
    }

    /// Earliest instant at which the entry is considered expired
    pub fn expiry_time(&self) -> Option<i64> {
        let by_lifespan = (self.lifespan >= 0 && self.created >= 0).then(|| self.created + self.lifespan);
        let by_idle = (self.max_idle >= 0 && self.last_used >= 0).then(|| self.last_used + self.max_idle);
        match (by_lifespan, by_idle) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether the entry is expired at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry_time().is_some_and(|at| now > at)
    }

    /// Record an access
    pub fn touch(&mut self, now: i64) {
        if self.is_transient() {
            self.last_used = now;
        }
    }

    /// Strip the key for transfer to another node
    pub fn to_internal_cache_value(&self) -> InternalCacheValue {
        InternalCacheValue::create(
            self.value.clone(),
            self.created,
            self.lifespan,
            self.last_used,
            self.max_idle,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
