//! Output cursor for Avro binary data.

use std::io::Write;

use super::recycler;
use super::varint::{encode_zigzag_into, MAX_VARINT_LEN};
use crate::error::EncodeError;

/// Growable output buffer that encodes Avro primitives.
///
/// Bytes stay in the buffer until they are drained to a sink; the generator uses that to
/// patch block headers and reorder record fields before anything is committed.
pub struct BinaryEncoder {
    buf: Vec<u8>,
}

impl BinaryEncoder {
    /// Create an encoder, reusing this thread's spare buffer when present.
    pub fn new() -> Self {
        recycler::acquire_encoder()
    }

    pub(crate) fn with_buffer(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// Encoded bytes not yet drained.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    pub fn write_long(&mut self, value: i64) {
        encode_zigzag_into(value, &mut self.buf);
    }

    pub fn write_int(&mut self, value: i32) {
        encode_zigzag_into(value as i64, &mut self.buf);
    }

    pub fn write_boolean(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn write_float(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_double(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write length-prefixed bytes.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.write_long(value.len() as i64);
        self.buf.extend_from_slice(value);
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Write raw bytes with no prefix, checking the declared size.
    pub fn write_fixed(&mut self, value: &[u8], size: usize) -> Result<(), EncodeError> {
        if value.len() != size {
            return Err(EncodeError::InvalidValue(format!(
                "Fixed value has {} bytes, schema declares {}",
                value.len(),
                size
            )));
        }
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Append bytes that are already encoded.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    // ========================================================================
    // Framing
    // ========================================================================

    /// Insert an array/map block header in front of the items written since `start`.
    ///
    /// With `with_byte_size` the count is written negated and followed by the byte size of
    /// the items, which lets readers skip the block without decoding it.
    pub fn insert_block_header(&mut self, start: usize, count: u64, with_byte_size: bool) {
        let mut header = Vec::with_capacity(2 * MAX_VARINT_LEN);
        if with_byte_size {
            let size = (self.buf.len() - start) as i64;
            encode_zigzag_into(-(count as i64), &mut header);
            encode_zigzag_into(size, &mut header);
        } else {
            encode_zigzag_into(count as i64, &mut header);
        }
        self.buf.splice(start..start, header);
    }

    /// Remove and return the bytes from `start` to the end.
    pub fn split_off(&mut self, start: usize) -> Vec<u8> {
        self.buf.split_off(start)
    }

    /// Drop the bytes from `len` to the end.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// Write every buffered byte to `sink` and clear the buffer.
    pub fn drain_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<(), EncodeError> {
        sink.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    /// Take the buffered bytes, leaving the encoder empty.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

impl Default for BinaryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BinaryEncoder {
    fn drop(&mut self) {
        recycler::return_encoder_buffer(std::mem::take(&mut self.buf));
    }
}

impl std::fmt::Debug for BinaryEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryEncoder")
            .field("buffered", &self.buf.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_primitives() {
        let mut e = BinaryEncoder::new();
        e.write_int(1);
        e.write_long(-1);
        e.write_boolean(true);
        e.write_string("hi");
        assert_eq!(e.as_slice(), &[0x02, 0x01, 0x01, 0x04, b'h', b'i']);
    }

    #[test]
    fn test_fixed_size_checked() {
        let mut e = BinaryEncoder::new();
        assert!(e.write_fixed(&[1, 2, 3], 3).is_ok());
        assert!(matches!(
            e.write_fixed(&[1, 2], 3),
            Err(EncodeError::InvalidValue(_))
        ));
        assert_eq!(e.len(), 3);
    }

    #[test]
    fn test_insert_block_header() {
        let mut e = BinaryEncoder::new();
        e.write_raw(&[0xFF]);
        let start = e.len();
        e.write_long(1);
        e.write_long(2);
        e.insert_block_header(start, 2, false);
        assert_eq!(e.as_slice(), &[0xFF, 0x04, 0x02, 0x04]);
    }

    #[test]
    fn test_insert_block_header_with_byte_size() {
        let mut e = BinaryEncoder::new();
        e.write_long(1);
        e.write_long(2);
        e.insert_block_header(0, 2, true);
        // count -2, size 2
        assert_eq!(e.as_slice(), &[0x03, 0x04, 0x02, 0x04]);
    }

    #[test]
    fn test_drain_to_clears() {
        let mut e = BinaryEncoder::new();
        e.write_long(3);
        let mut out = Vec::new();
        e.drain_to(&mut out).unwrap();
        assert_eq!(out, vec![0x06]);
        assert!(e.is_empty());
    }
}
