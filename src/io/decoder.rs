//! Streaming cursor over Avro binary input.
//!
//! `BinaryDecoder` pulls bytes from any `Read` through a read-ahead buffer and decodes
//! the primitive wire shapes. It knows nothing about schemas.

use std::io::{self, Read};

use super::recycler;
use super::varint::zigzag_decode;
use crate::error::DecodeError;

/// Byte cursor that decodes Avro primitives from a `Read` source.
pub struct BinaryDecoder<'a> {
    source: Box<dyn Read + 'a>,
    buf: Vec<u8>,
    pos: usize,
    filled: usize,
    /// Bytes consumed since the decoder was created.
    offset: u64,
}

impl<'a> BinaryDecoder<'a> {
    /// Create a decoder with a freshly allocated buffer.
    ///
    /// Prefer [`recycler::acquire_decoder`] on hot paths; both return their buffer to the
    /// thread's pool when dropped.
    pub fn new(source: impl Read + 'a) -> Self {
        recycler::acquire_decoder(source)
    }

    pub(crate) fn with_buffer(source: Box<dyn Read + 'a>, buf: Vec<u8>) -> Self {
        Self {
            source,
            buf,
            pos: 0,
            filled: 0,
            offset: 0,
        }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Refill the buffer if it is drained. Returns the number of buffered bytes.
    fn fill(&mut self) -> Result<usize, DecodeError> {
        if self.pos < self.filled {
            return Ok(self.filled - self.pos);
        }
        self.pos = 0;
        self.filled = 0;
        loop {
            match self.source.read(&mut self.buf) {
                Ok(n) => {
                    self.filled = n;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }
    }

    /// Whether the source is exhausted. Only meaningful at a datum boundary.
    pub fn is_at_end(&mut self) -> Result<bool, DecodeError> {
        Ok(self.fill()? == 0)
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.pos += n;
        self.offset += n as u64;
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.fill()? == 0 {
            return Err(DecodeError::UnexpectedEof);
        }
        let byte = self.buf[self.pos];
        self.advance(1);
        Ok(byte)
    }

    /// Fill `out` completely from the input.
    pub fn read_exact(&mut self, mut out: &mut [u8]) -> Result<(), DecodeError> {
        while !out.is_empty() {
            let available = self.fill()?;
            if available == 0 {
                return Err(DecodeError::UnexpectedEof);
            }
            let n = available.min(out.len());
            out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.advance(n);
            out = &mut out[n..];
        }
        Ok(())
    }

    /// Discard `n` bytes of input.
    pub fn skip(&mut self, mut n: u64) -> Result<(), DecodeError> {
        while n > 0 {
            let available = self.fill()?;
            if available == 0 {
                return Err(DecodeError::UnexpectedEof);
            }
            let step = (available as u64).min(n) as usize;
            self.advance(step);
            n -= step as u64;
        }
        Ok(())
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Read a zig-zag varint as an Avro `long`.
    pub fn read_long(&mut self) -> Result<i64, DecodeError> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(zigzag_decode(result));
            }
            shift += 7;
            if shift >= 64 {
                return Err(DecodeError::InvalidVarint);
            }
        }
    }

    /// Read an Avro `int`, rejecting values outside the i32 range.
    pub fn read_int(&mut self) -> Result<i32, DecodeError> {
        let value = self.read_long()?;
        i32::try_from(value).map_err(|_| {
            DecodeError::InvalidData(format!("Integer overflow: {} does not fit in i32", value))
        })
    }

    /// Read a boolean byte. Anything but 0 or 1 is malformed.
    pub fn read_boolean(&mut self) -> Result<bool, DecodeError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidData(format!(
                "Invalid boolean value: {}, expected 0 or 1",
                other
            ))),
        }
    }

    /// Read a little-endian IEEE 754 float.
    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        let mut raw = [0u8; 4];
        self.read_exact(&mut raw)?;
        Ok(f32::from_le_bytes(raw))
    }

    /// Read a little-endian IEEE 754 double.
    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        let mut raw = [0u8; 8];
        self.read_exact(&mut raw)?;
        Ok(f64::from_le_bytes(raw))
    }

    /// Read a non-negative length prefix.
    pub fn read_length(&mut self) -> Result<usize, DecodeError> {
        let len = self.read_long()?;
        if len < 0 {
            return Err(DecodeError::NegativeLength(len));
        }
        usize::try_from(len)
            .map_err(|_| DecodeError::InvalidData(format!("Length {} too large", len)))
    }

    /// Read length-prefixed bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_length()?;
        self.read_fixed(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Read exactly `size` raw bytes.
    pub fn read_fixed(&mut self, size: usize) -> Result<Vec<u8>, DecodeError> {
        // Grow with the data instead of trusting a length read off the wire.
        let mut out = Vec::with_capacity(size.min(self.buf.len().max(64)));
        let mut remaining = size;
        while remaining > 0 {
            let available = self.fill()?;
            if available == 0 {
                return Err(DecodeError::UnexpectedEof);
            }
            let n = available.min(remaining);
            out.extend_from_slice(&self.buf[self.pos..self.pos + n]);
            self.advance(n);
            remaining -= n;
        }
        Ok(out)
    }

    /// Skip length-prefixed bytes or a string without materializing them.
    pub fn skip_bytes(&mut self) -> Result<(), DecodeError> {
        let len = self.read_length()?;
        self.skip(len as u64)
    }

    /// Read an array or map block header.
    ///
    /// Returns the item count and, for negative-count blocks, the byte size of the
    /// block's items. A count of zero terminates the sequence.
    pub fn read_block_header(&mut self) -> Result<(u64, Option<u64>), DecodeError> {
        let count = self.read_long()?;
        if count >= 0 {
            return Ok((count as u64, None));
        }
        let size = self.read_long()?;
        if size < 0 {
            return Err(DecodeError::NegativeLength(size));
        }
        Ok((count.unsigned_abs(), Some(size as u64)))
    }
}

impl Drop for BinaryDecoder<'_> {
    fn drop(&mut self) {
        recycler::return_decoder_buffer(std::mem::take(&mut self.buf));
    }
}

impl std::fmt::Debug for BinaryDecoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryDecoder")
            .field("offset", &self.offset)
            .field("buffered", &(self.filled - self.pos))
            .finish()
    }
}
