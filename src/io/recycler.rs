//! Per-thread recycling of cursor buffers.
//!
//! Each thread keeps at most one spare decoder buffer and one spare encoder buffer.
//! Acquiring takes the spare out of its slot (or allocates when the slot is empty), so a
//! buffer is never lent to two live cursors at once, even when streams interleave on the
//! same thread. Cursors hand their buffer back from `Drop`, which makes release happen
//! exactly once on every exit path.

use std::cell::RefCell;
use std::io::Read;

use tracing::trace;

use super::{BinaryDecoder, BinaryEncoder};

/// Buffers above this capacity are dropped instead of being kept as the spare.
pub const MAX_RETAINED_CAPACITY: usize = 1 << 20;

/// Default size of the decoder's read-ahead buffer.
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

thread_local! {
    static SPARE_DECODER: RefCell<Option<Vec<u8>>> = const { RefCell::new(None) };
    static SPARE_ENCODER: RefCell<Option<Vec<u8>>> = const { RefCell::new(None) };
}

/// Acquire a decoder over `source`, reusing this thread's spare buffer when present.
pub fn acquire_decoder<'a>(source: impl Read + 'a) -> BinaryDecoder<'a> {
    acquire_decoder_with_capacity(source, DEFAULT_READ_BUFFER)
}

/// Acquire a decoder whose read-ahead buffer holds at least `capacity` bytes.
pub fn acquire_decoder_with_capacity<'a>(
    source: impl Read + 'a,
    capacity: usize,
) -> BinaryDecoder<'a> {
    BinaryDecoder::with_buffer(Box::new(source), claim_decoder_buffer(capacity))
}

/// Acquire an empty encoder, reusing this thread's spare buffer when present.
pub fn acquire_encoder() -> BinaryEncoder {
    BinaryEncoder::with_buffer(claim_encoder_buffer())
}

/// Release a decoder. Its buffer returns to the pool when it is dropped here.
pub fn release_decoder(decoder: BinaryDecoder<'_>) {
    drop(decoder);
}

/// Release an encoder. Its buffer returns to the pool when it is dropped here.
pub fn release_encoder(encoder: BinaryEncoder) {
    drop(encoder);
}

/// Whether this thread currently holds a spare `(decoder, encoder)` buffer.
pub fn spare_buffers() -> (bool, bool) {
    let decoder = SPARE_DECODER
        .try_with(|slot| slot.borrow().is_some())
        .unwrap_or(false);
    let encoder = SPARE_ENCODER
        .try_with(|slot| slot.borrow().is_some())
        .unwrap_or(false);
    (decoder, encoder)
}

pub(crate) fn claim_decoder_buffer(capacity: usize) -> Vec<u8> {
    let capacity = capacity.max(16);
    let spare = SPARE_DECODER
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten();

    let mut buf = match spare {
        Some(buf) => {
            trace!(capacity = buf.capacity(), "reusing spare decoder buffer");
            buf
        }
        None => {
            trace!(capacity, "allocating decoder buffer");
            Vec::with_capacity(capacity)
        }
    };
    // The spare was cleared on release, so this zero-fills: nothing from a previous
    // stream is visible.
    buf.resize(capacity.max(buf.capacity().min(MAX_RETAINED_CAPACITY)), 0);
    buf
}

pub(crate) fn return_decoder_buffer(mut buf: Vec<u8>) {
    if buf.capacity() == 0 || buf.capacity() > MAX_RETAINED_CAPACITY {
        return;
    }
    buf.clear();
    // try_with: a cursor dropped during thread teardown just frees its buffer.
    let _ = SPARE_DECODER.try_with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(buf);
        }
    });
}

pub(crate) fn claim_encoder_buffer() -> Vec<u8> {
    SPARE_ENCODER
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
        .map(|buf| {
            trace!(capacity = buf.capacity(), "reusing spare encoder buffer");
            buf
        })
        .unwrap_or_default()
}

pub(crate) fn return_encoder_buffer(mut buf: Vec<u8>) {
    if buf.capacity() == 0 || buf.capacity() > MAX_RETAINED_CAPACITY {
        return;
    }
    buf.clear();
    let _ = SPARE_ENCODER.try_with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(buf);
        }
    });
}
