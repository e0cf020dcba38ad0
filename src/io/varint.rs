//! Variable-length integer helpers.
//!
//! Avro writes `int` and `long` as zig-zag mapped base-128 varints:
//! - 7 data bits per byte, least significant group first
//! - the high bit of each byte is set when more bytes follow
//! - zig-zag maps 0, -1, 1, -2, ... to 0, 1, 2, 3, ...
//!
//! The slice-based decoders here serve header and block parsing; the streaming
//! [`BinaryDecoder`](super::BinaryDecoder) runs the same loop over its buffer.

use crate::error::DecodeError;

/// Longest valid encoding of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

// ============================================================================
// Zig-zag mapping
// ============================================================================

/// Map a signed value to its zig-zag unsigned form.
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Map a zig-zag unsigned value back to its signed form.
#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode an unsigned varint from the front of `data`, advancing it.
///
/// # Errors
/// - `DecodeError::UnexpectedEof` if the input ends inside the varint
/// - `DecodeError::InvalidVarint` if the varint runs past ten bytes
#[inline]
pub fn decode_varint(data: &mut &[u8]) -> Result<u64, DecodeError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    for (consumed, &byte) in data.iter().enumerate() {
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            *data = &data[consumed + 1..];
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(DecodeError::InvalidVarint);
        }
    }

    Err(DecodeError::UnexpectedEof)
}

/// Decode a zig-zag varint (an Avro `long`) from the front of `data`.
#[inline]
pub fn decode_zigzag(data: &mut &[u8]) -> Result<i64, DecodeError> {
    decode_varint(data).map(zigzag_decode)
}

// ============================================================================
// Encoding
// ============================================================================

/// Append the varint encoding of `value` to `out`.
#[inline]
pub fn encode_varint_into(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Append the zig-zag varint encoding of `value` (an Avro `long`) to `out`.
#[inline]
pub fn encode_zigzag_into(value: i64, out: &mut Vec<u8>) {
    encode_varint_into(zigzag_encode(value), out);
}

/// Encode `value` as a zig-zag varint into a fresh buffer.
pub fn encode_zigzag(value: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_VARINT_LEN);
    encode_zigzag_into(value, &mut out);
    out
}
