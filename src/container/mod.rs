//! Object container files: header, compressed blocks and sync markers.

mod header;
mod reader;
mod writer;

pub use header::{ContainerHeader, AVRO_MAGIC, CODEC_KEY, SCHEMA_KEY, SYNC_SIZE};
pub use reader::{Block, BlockReader};
pub use writer::ContainerWriter;
