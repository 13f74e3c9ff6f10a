//! Invocation Context and Lifecycle State
//!
//! Per-invocation metadata (origin and flags) plus the component status shared
//! between a cache and the stages that must check it.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::remoting::Address;

// =============================================================================
// Flags
// =============================================================================

/// Per-invocation behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Apply locally only; do not replicate
    CacheModeLocal,
    /// Do not consult the cache loader on a miss
    SkipCacheLoad,
}

/// Where an invocation came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote(Address),
}

/// State carried alongside a command through the interceptor chain
#[derive(Debug, Clone)]
pub struct InvocationContext {
    origin: Origin,
    flags: Vec<Flag>,
}

impl InvocationContext {
    pub fn local(flags: &[Flag]) -> Self {
        Self {
            origin: Origin::Local,
            flags: flags.to_vec(),
        }
    }

    pub fn remote(sender: Address) -> Self {
        Self {
            origin: Origin::Remote(sender),
            flags: Vec::new(),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn is_origin_local(&self) -> bool {
        self.origin == Origin::Local
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }
}

// =============================================================================
// Component Status
// =============================================================================

/// Lifecycle state of a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ComponentStatus {
    Instantiated = 0,
    Running = 1,
    Stopping = 2,
    Terminated = 3,
}

impl ComponentStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ComponentStatus::Running,
            2 => ComponentStatus::Stopping,
            3 => ComponentStatus::Terminated,
            _ => ComponentStatus::Instantiated,
        }
    }

    pub fn allows_invocations(&self) -> bool {
        *self == ComponentStatus::Running
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentStatus::Instantiated => "INSTANTIATED",
            ComponentStatus::Running => "RUNNING",
            ComponentStatus::Stopping => "STOPPING",
            ComponentStatus::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// Status shared by a cache and its stages
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: ComponentStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn get(&self) -> ComponentStatus {
        ComponentStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, status: ComponentStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(ComponentStatus::Instantiated)
    }
}
