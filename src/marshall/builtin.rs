//! Built-in Codecs
//!
//! Codecs for scalars, ordered sequences, expiring value records and
//! marshalled values. Response and command codecs are contributed by the
//! remoting and command modules and collected here so that every marshaller
//! built with [`CodecRegistry::with_builtins`](super::CodecRegistry::with_builtins)
//! can speak the cluster protocol.
//!
//! # Payload Layouts
//!
//! ```text
//! string / bytes   := uvarint(len) data
//! int / long       := big-endian i32 / i64
//! bool             := 0x00 | 0x01
//! sequence         := uvarint(count) object*
//! immortal value   := object
//! mortal value     := object uvarint(created) i64(lifespan)
//! transient value  := object uvarint(last_used) i64(max_idle)
//! transient mortal := object uvarint(created) i64(lifespan) uvarint(last_used) i64(max_idle)
//! marshalled value := uvarint(len) raw i32(hash) bool(equality_preserved)
//! ```

use bytes::Bytes;

use super::codec::Codec;
use super::marshaller::{InputSession, OutputSession};
use super::marshalled_value::MarshalledValue;
use super::object::Object;
use crate::container::{
    ImmortalCacheValue, MortalCacheValue, TransientCacheValue, TransientMortalCacheValue,
};
use crate::error::{Error, Result};

/// Type tags reserved by the built-in codecs
pub mod tags {
    pub const STRING: u8 = 0x01;
    pub const INT: u8 = 0x02;
    pub const LONG: u8 = 0x03;
    pub const BOOL: u8 = 0x04;
    pub const BYTES: u8 = 0x05;
    pub const SEQUENCE: u8 = 0x06;

    pub const IMMORTAL_VALUE: u8 = 0x10;
    pub const MORTAL_VALUE: u8 = 0x11;
    pub const TRANSIENT_VALUE: u8 = 0x12;
    pub const TRANSIENT_MORTAL_VALUE: u8 = 0x13;

    pub const MARSHALLED_VALUE: u8 = 0x18;

    pub const SUCCESSFUL_RESPONSE: u8 = 0x20;
    pub const UNSUCCESSFUL_RESPONSE: u8 = 0x21;
    pub const INVALID_RESPONSE: u8 = 0x22;

    pub const PUT_KEY_VALUE: u8 = 0x28;
    pub const REMOVE: u8 = 0x29;
    pub const CLEAR: u8 = 0x2a;
    pub const CLUSTERED_GET: u8 = 0x2b;
    pub const SINGLE_RPC: u8 = 0x2c;
}

/// Every built-in codec
pub(crate) fn codecs() -> Vec<Codec> {
    let mut codecs = vec![
        string_codec(),
        int_codec(),
        long_codec(),
        bool_codec(),
        bytes_codec(),
        sequence_codec(),
        immortal_value_codec(),
        mortal_value_codec(),
        transient_value_codec(),
        transient_mortal_value_codec(),
        marshalled_value_codec(),
    ];
    codecs.extend(crate::remoting::response_codecs());
    codecs.extend(crate::commands::codecs());
    codecs
}

// =============================================================================
// Scalars
// =============================================================================

fn string_codec() -> Codec {
    Codec::new::<String, _, _>(
        tags::STRING,
        |out, value| {
            out.write_str(value);
            Ok(())
        },
        |input| input.read_string(),
    )
}

fn int_codec() -> Codec {
    Codec::new::<i32, _, _>(
        tags::INT,
        |out, value| {
            out.write_i32(*value);
            Ok(())
        },
        |input| input.read_i32(),
    )
}

fn long_codec() -> Codec {
    Codec::new::<i64, _, _>(
        tags::LONG,
        |out, value| {
            out.write_i64(*value);
            Ok(())
        },
        |input| input.read_i64(),
    )
}

fn bool_codec() -> Codec {
    Codec::new::<bool, _, _>(
        tags::BOOL,
        |out, value| {
            out.write_bool(*value);
            Ok(())
        },
        |input| input.read_bool(),
    )
}

fn bytes_codec() -> Codec {
    Codec::new::<Bytes, _, _>(
        tags::BYTES,
        |out, value| {
            out.write_bytes(value);
            Ok(())
        },
        |input| input.read_bytes(),
    )
}

// =============================================================================
// Sequences
// =============================================================================

fn sequence_codec() -> Codec {
    Codec::new::<Vec<Object>, _, _>(
        tags::SEQUENCE,
        |out, elements| {
            out.write_unsigned_long(elements.len() as u64);
            for element in elements {
                out.write_object(element)?;
            }
            Ok(())
        },
        |input| {
            let count = input.read_unsigned_int()? as usize;
            // Each element takes at least one byte, so a bogus count cannot
            // force a large allocation
            let mut elements = Vec::with_capacity(count.min(input.remaining()));
            for _ in 0..count {
                elements.push(input.read_object()?);
            }
            Ok(elements)
        },
    )
}

// =============================================================================
// Value Records
// =============================================================================

fn write_timestamp(out: &mut OutputSession<'_>, field: &str, value: i64) -> Result<()> {
    let value = u64::try_from(value).map_err(|_| {
        Error::non_serializable("timestamp", format!("{field} must not be negative, got {value}"))
    })?;
    out.write_unsigned_long(value);
    Ok(())
}

fn read_timestamp(input: &mut InputSession<'_>) -> Result<i64> {
    let value = input.read_unsigned_long()?;
    i64::try_from(value).map_err(|_| Error::malformed(format!("timestamp {value} out of range")))
}

fn immortal_value_codec() -> Codec {
    Codec::new::<ImmortalCacheValue, _, _>(
        tags::IMMORTAL_VALUE,
        |out, v| out.write_object(&v.value),
        |input| {
            Ok(ImmortalCacheValue {
                value: input.read_object()?,
            })
        },
    )
}

fn mortal_value_codec() -> Codec {
    Codec::new::<MortalCacheValue, _, _>(
        tags::MORTAL_VALUE,
        |out, v| {
            out.write_object(&v.value)?;
            write_timestamp(out, "created", v.created)?;
            out.write_i64(v.lifespan);
            Ok(())
        },
        |input| {
            let value = input.read_object()?;
            let created = read_timestamp(input)?;
            let lifespan = input.read_i64()?;
            Ok(MortalCacheValue {
                value,
                created,
                lifespan,
            })
        },
    )
}

fn transient_value_codec() -> Codec {
    Codec::new::<TransientCacheValue, _, _>(
        tags::TRANSIENT_VALUE,
        |out, v| {
            out.write_object(&v.value)?;
            write_timestamp(out, "last_used", v.last_used)?;
            out.write_i64(v.max_idle);
            Ok(())
        },
        |input| {
            let value = input.read_object()?;
            let last_used = read_timestamp(input)?;
            let max_idle = input.read_i64()?;
            Ok(TransientCacheValue {
                value,
                last_used,
                max_idle,
            })
        },
    )
}

fn transient_mortal_value_codec() -> Codec {
    Codec::new::<TransientMortalCacheValue, _, _>(
        tags::TRANSIENT_MORTAL_VALUE,
        |out, v| {
            out.write_object(&v.value)?;
            write_timestamp(out, "created", v.created)?;
            out.write_i64(v.lifespan);
            write_timestamp(out, "last_used", v.last_used)?;
            out.write_i64(v.max_idle);
            Ok(())
        },
        |input| {
            let value = input.read_object()?;
            let created = read_timestamp(input)?;
            let lifespan = input.read_i64()?;
            let last_used = read_timestamp(input)?;
            let max_idle = input.read_i64()?;
            Ok(TransientMortalCacheValue {
                value,
                created,
                lifespan,
                last_used,
                max_idle,
            })
        },
    )
}

// =============================================================================
// Marshalled Values
// =============================================================================

fn marshalled_value_codec() -> Codec {
    Codec::new::<MarshalledValue, _, _>(
        tags::MARSHALLED_VALUE,
        |out, mv| {
            let raw = mv.serialized()?;
            out.write_bytes(&raw);
            out.write_i32(mv.hash_code());
            out.write_bool(mv.equality_preserved());
            Ok(())
        },
        |input| {
            let raw = input.read_bytes()?;
            let hash = input.read_i32()?;
            let equality_preserved = input.read_bool()?;
            Ok(MarshalledValue::from_raw(
                raw,
                hash,
                equality_preserved,
                input.marshaller().clone(),
            ))
        },
    )
}

// =============================================================================
// Tests
// =============================================================================
