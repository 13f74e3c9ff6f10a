//! Unsigned variable-length integers
//!
//! Seven payload bits per byte, least significant group first, high bit set
//! on every byte except the last. Small values (counts, recent timestamps
//! relative to their magnitude) stay short; a `u64` takes at most 10 bytes.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Longest encoding of a `u64`
pub const MAX_VARINT_LEN: usize = 10;

/// Append `value` as an unsigned varint
pub fn write_unsigned_long<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Consume an unsigned varint
pub fn read_unsigned_long<B: Buf>(buf: &mut B) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(Error::malformed("truncated varint"));
        }
        let byte = buf.get_u8();
        let shift = 7 * i as u32;
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(Error::malformed("varint overflows 64 bits"));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Error::malformed("varint longer than 10 bytes"))
}

/// Consume an unsigned varint that must fit in a `u32`
pub fn read_unsigned_int<B: Buf>(buf: &mut B) -> Result<u32> {
    let value = read_unsigned_long(buf)?;
    u32::try_from(value).map_err(|_| Error::malformed(format!("varint {value} exceeds u32")))
}

/// Number of bytes `value` occupies once encoded
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

// =============================================================================
// Tests
// =============================================================================
