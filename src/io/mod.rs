//! Schema-unaware byte cursors and their per-thread recycler.

pub mod decoder;
pub mod encoder;
pub mod recycler;
pub mod varint;

pub use decoder::BinaryDecoder;
pub use encoder::BinaryEncoder;
pub use recycler::{acquire_decoder, acquire_encoder, release_decoder, release_encoder};
