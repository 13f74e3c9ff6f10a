//! Commands
//!
//! Every cache operation travels through the interceptor chain as a
//! [`Command`] and comes back as a [`Reply`]. Writes that must reach other
//! members are wrapped in a [`SingleRpcCommand`]; misses serviced by peers use
//! a [`ClusteredGetCommand`]. Both are [`ReplicableCommand`]s and encode
//! through the marshaller like any other object.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::marshall::builtin::tags;
use crate::marshall::{Codec, Object, VersionAwareMarshaller};

// =============================================================================
// Local Commands
// =============================================================================

/// Store a value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PutKeyValueCommand {
    pub key: Object,
    pub value: Object,
    /// Negative for no lifespan
    pub lifespan_ms: i64,
    /// Negative for no idle bound
    pub max_idle_ms: i64,
    /// Stamped once by the originator so every replica expires together
    pub created_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoveCommand {
    pub key: Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClearCommand;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GetKeyValueCommand {
    pub key: Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainsKeyCommand {
    pub key: Object,
}

/// A write that may be replicated
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WriteCommand {
    Put(PutKeyValueCommand),
    Remove(RemoveCommand),
    Clear(ClearCommand),
}

impl WriteCommand {
    pub fn to_object(&self) -> Object {
        match self {
            WriteCommand::Put(c) => Object::new(c.clone()),
            WriteCommand::Remove(c) => Object::new(c.clone()),
            WriteCommand::Clear(c) => Object::new(*c),
        }
    }

    pub fn from_object(object: &Object) -> Result<Self> {
        if let Some(c) = object.downcast_ref::<PutKeyValueCommand>() {
            return Ok(WriteCommand::Put(c.clone()));
        }
        if let Some(c) = object.downcast_ref::<RemoveCommand>() {
            return Ok(WriteCommand::Remove(c.clone()));
        }
        if let Some(c) = object.downcast_ref::<ClearCommand>() {
            return Ok(WriteCommand::Clear(*c));
        }
        Err(Error::malformed(format!("expected a write command, got {}", object.type_name())))
    }
}

/// Operation flowing through the interceptor chain
#[derive(Debug, Clone)]
pub enum Command {
    Put(PutKeyValueCommand),
    Remove(RemoveCommand),
    Clear(ClearCommand),
    Get(GetKeyValueCommand),
    ContainsKey(ContainsKeyCommand),
    Size,
    KeySet,
    Values,
    EntrySet,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Put(_) => "put",
            Command::Remove(_) => "remove",
            Command::Clear(_) => "clear",
            Command::Get(_) => "get",
            Command::ContainsKey(_) => "contains_key",
            Command::Size => "size",
            Command::KeySet => "key_set",
            Command::Values => "values",
            Command::EntrySet => "entry_set",
        }
    }

    /// The key this command targets, if any
    pub fn key(&self) -> Option<&Object> {
        match self {
            Command::Put(c) => Some(&c.key),
            Command::Remove(c) => Some(&c.key),
            Command::Get(c) => Some(&c.key),
            Command::ContainsKey(c) => Some(&c.key),
            _ => None,
        }
    }

    /// The replicable form of a write
    pub fn to_write(&self) -> Option<WriteCommand> {
        match self {
            Command::Put(c) => Some(WriteCommand::Put(c.clone())),
            Command::Remove(c) => Some(WriteCommand::Remove(c.clone())),
            Command::Clear(c) => Some(WriteCommand::Clear(*c)),
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Command::Put(_) | Command::Remove(_) | Command::Clear(_))
    }
}

impl From<WriteCommand> for Command {
    fn from(write: WriteCommand) -> Self {
        match write {
            WriteCommand::Put(c) => Command::Put(c),
            WriteCommand::Remove(c) => Command::Remove(c),
            WriteCommand::Clear(c) => Command::Clear(c),
        }
    }
}

// =============================================================================
// Replies
// =============================================================================

/// Result of a command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    None,
    Value(Option<Object>),
    Bool(bool),
    Size(usize),
    Objects(Vec<Object>),
    Entries(Vec<(Object, Object)>),
}

impl Reply {
    fn mismatch(&self, expected: &str) -> Error {
        Error::Internal(format!("expected a {expected} reply, got {self:?}"))
    }

    pub fn into_value(self) -> Result<Option<Object>> {
        match self {
            Reply::Value(value) => Ok(value),
            Reply::None => Ok(None),
            other => Err(other.mismatch("value")),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            Reply::Bool(b) => Ok(b),
            other => Err(other.mismatch("boolean")),
        }
    }

    pub fn into_size(self) -> Result<usize> {
        match self {
            Reply::Size(n) => Ok(n),
            other => Err(other.mismatch("size")),
        }
    }

    pub fn into_objects(self) -> Result<Vec<Object>> {
        match self {
            Reply::Objects(objects) => Ok(objects),
            other => Err(other.mismatch("collection")),
        }
    }

    pub fn into_entries(self) -> Result<Vec<(Object, Object)>> {
        match self {
            Reply::Entries(entries) => Ok(entries),
            other => Err(other.mismatch("entry")),
        }
    }
}

// =============================================================================
// Remote Commands
// =============================================================================

/// Ask peers for their entry under `key`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusteredGetCommand {
    pub key: Object,
    pub cache_name: String,
}

/// A write addressed to a named cache on other members
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SingleRpcCommand {
    pub cache_name: String,
    pub command: WriteCommand,
}

/// Anything a member can send to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicableCommand {
    Single(SingleRpcCommand),
    ClusteredGet(ClusteredGetCommand),
}

impl ReplicableCommand {
    /// Encode as a top-level stream
    ///
    /// Marshalled values inside the command are serialized here, once, and
    /// every recipient receives the same buffer.
    pub fn encode(&self, marshaller: &VersionAwareMarshaller) -> Result<Bytes> {
        let object = match self {
            ReplicableCommand::Single(c) => Object::new(c.clone()),
            ReplicableCommand::ClusteredGet(c) => Object::new(c.clone()),
        };
        marshaller.object_to_bytes(&object)
    }

    pub fn decode(marshaller: &VersionAwareMarshaller, bytes: Bytes) -> Result<Self> {
        let object = marshaller.object_from_bytes(bytes)?;
        if let Some(c) = object.downcast_ref::<SingleRpcCommand>() {
            return Ok(ReplicableCommand::Single(c.clone()));
        }
        if let Some(c) = object.downcast_ref::<ClusteredGetCommand>() {
            return Ok(ReplicableCommand::ClusteredGet(c.clone()));
        }
        Err(Error::malformed(format!("expected a replicable command, got {}", object.type_name())))
    }

    pub fn cache_name(&self) -> &str {
        match self {
            ReplicableCommand::Single(c) => &c.cache_name,
            ReplicableCommand::ClusteredGet(c) => &c.cache_name,
        }
    }
}

/// Codecs for commands that cross the wire
pub(crate) fn codecs() -> Vec<Codec> {
    vec![
        Codec::new::<PutKeyValueCommand, _, _>(
            tags::PUT_KEY_VALUE,
            |out, c| {
                out.write_object(&c.key)?;
                out.write_object(&c.value)?;
                out.write_i64(c.lifespan_ms);
                out.write_i64(c.max_idle_ms);
                out.write_i64(c.created_ms);
                Ok(())
            },
            |input| {
                Ok(PutKeyValueCommand {
                    key: input.read_object()?,
                    value: input.read_object()?,
                    lifespan_ms: input.read_i64()?,
                    max_idle_ms: input.read_i64()?,
                    created_ms: input.read_i64()?,
                })
            },
        ),
        Codec::new::<RemoveCommand, _, _>(
            tags::REMOVE,
            |out, c| out.write_object(&c.key),
            |input| Ok(RemoveCommand { key: input.read_object()? }),
        ),
        Codec::new::<ClearCommand, _, _>(tags::CLEAR, |_, _| Ok(()), |_| Ok(ClearCommand)),
        Codec::new::<ClusteredGetCommand, _, _>(
            tags::CLUSTERED_GET,
            |out, c| {
                out.write_object(&c.key)?;
                out.write_str(&c.cache_name);
                Ok(())
            },
            |input| {
                Ok(ClusteredGetCommand {
                    key: input.read_object()?,
                    cache_name: input.read_string()?,
                })
            },
        ),
        Codec::new::<SingleRpcCommand, _, _>(
            tags::SINGLE_RPC,
            |out, c| {
                out.write_str(&c.cache_name);
                out.write_object(&c.command.to_object())
            },
            |input| {
                let cache_name = input.read_string()?;
                let command = WriteCommand::from_object(&input.read_object()?)?;
                Ok(SingleRpcCommand { cache_name, command })
            },
        ),
    ]
}

// =============================================================================
// Tests
// =============================================================================
