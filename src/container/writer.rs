//! Block-buffered writing of object container files.

use std::io::Write;

use rand::RngCore;
use tracing::{debug, trace};

use super::header::{ContainerHeader, SYNC_SIZE};
use crate::codec::Codec;
use crate::error::{EncodeError, StreamError};
use crate::io::{acquire_encoder, BinaryEncoder};
use crate::schema::Schema;
use crate::stream::ContainerOptions;

/// Writes the header on creation, then buffers datums into compressed blocks.
pub struct ContainerWriter<W: Write> {
    sink: W,
    codec: Codec,
    sync_marker: [u8; SYNC_SIZE],
    sync_interval: usize,
    block: BinaryEncoder,
    count: u64,
    blocks_written: usize,
}

impl<W: Write> ContainerWriter<W> {
    /// Write the header for `schema` to `sink`.
    pub fn new(mut sink: W, schema: &Schema, options: &ContainerOptions) -> Result<Self, StreamError> {
        if !options.codec.is_enabled() {
            return Err(StreamError::Configuration(format!(
                "Codec '{}' is not enabled in this build",
                options.codec
            )));
        }

        let sync_marker = random_sync_marker();
        let mut header = acquire_encoder();
        ContainerHeader::write(
            &mut header,
            schema,
            options.codec,
            &options.metadata,
            &sync_marker,
        );
        header.drain_to(&mut sink)?;
        debug!(codec = options.codec.name(), "wrote container header");

        Ok(Self {
            sink,
            codec: options.codec,
            sync_marker,
            sync_interval: options.sync_interval,
            block: acquire_encoder(),
            count: 0,
            blocks_written: 0,
        })
    }

    /// Append one serialized datum, flushing the block once it reaches the sync interval.
    pub fn append(&mut self, datum: &[u8]) -> Result<(), StreamError> {
        self.block.write_raw(datum);
        self.count += 1;
        if self.block.len() >= self.sync_interval {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Append every byte buffered in `encoder` as one datum and clear it.
    pub(crate) fn append_from(&mut self, encoder: &mut BinaryEncoder) -> Result<(), StreamError> {
        self.append(encoder.as_slice())?;
        encoder.truncate(0);
        Ok(())
    }

    /// Write out the pending block, if any.
    pub fn flush_block(&mut self) -> Result<(), StreamError> {
        if self.count == 0 {
            return Ok(());
        }
        let compressed = self.codec.compress(self.block.as_slice())?;

        let mut frame = acquire_encoder();
        frame.write_long(self.count as i64);
        frame.write_long(compressed.len() as i64);
        frame.drain_to(&mut self.sink)?;
        self.sink.write_all(&compressed).map_err(EncodeError::from)?;
        self.sink
            .write_all(&self.sync_marker)
            .map_err(EncodeError::from)?;

        trace!(
            block = self.blocks_written,
            count = self.count,
            raw = self.block.len(),
            compressed = compressed.len(),
            "wrote container block"
        );
        self.block.truncate(0);
        self.count = 0;
        self.blocks_written += 1;
        Ok(())
    }

    /// Write out the pending block and flush the sink.
    pub fn flush(&mut self) -> Result<(), StreamError> {
        self.flush_block()?;
        self.sink.flush().map_err(EncodeError::from)?;
        Ok(())
    }

    /// Flush everything and return the sink.
    pub fn finish(mut self) -> Result<W, StreamError> {
        self.flush()?;
        Ok(self.sink)
    }

    pub fn sync_marker(&self) -> &[u8; SYNC_SIZE] {
        &self.sync_marker
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }
}

/// A sync marker unlikely to occur in block data or in another file.
fn random_sync_marker() -> [u8; SYNC_SIZE] {
    let mut marker = [0u8; SYNC_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut marker);
    marker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_markers_differ() {
        assert_ne!(random_sync_marker(), random_sync_marker());
    }

    #[test]
    fn test_block_flushed_at_interval() {
        let schema = Schema::parse(r#""long""#).unwrap();
        let options = ContainerOptions::default().with_sync_interval(3);
        let mut writer = ContainerWriter::new(Vec::new(), &schema, &options).unwrap();
        let header_len = writer.get_ref().len();

        writer.append(&[0x02]).unwrap();
        writer.append(&[0x04]).unwrap();
        assert_eq!(writer.get_ref().len(), header_len);
        writer.append(&[0x06]).unwrap();
        assert_eq!(writer.blocks_written(), 1);

        let sync = *writer.sync_marker();
        let file = writer.finish().unwrap();
        // count 3, size 3, payload, sync
        assert_eq!(&file[header_len..header_len + 5], &[0x06, 0x06, 0x02, 0x04, 0x06]);
        assert_eq!(&file[file.len() - SYNC_SIZE..], &sync);
    }

    #[test]
    fn test_finish_without_datums_writes_header_only() {
        let schema = Schema::parse(r#""string""#).unwrap();
        let writer = ContainerWriter::new(Vec::new(), &schema, &ContainerOptions::default()).unwrap();
        let header_len = writer.get_ref().len();
        assert_eq!(writer.finish().unwrap().len(), header_len);
    }
}
