//! Block-by-block reading of object container files.

use std::io::Read;

use bytes::Bytes;
use tracing::{debug, trace};

use super::header::{ContainerHeader, SYNC_SIZE};
use crate::error::{DecodeError, StreamError};
use crate::io::{acquire_decoder, BinaryDecoder};

/// A decompressed block.
#[derive(Debug, Clone)]
pub struct Block {
    /// Number of datums in the block.
    pub count: u64,
    /// Serialized datums, back to back.
    pub data: Bytes,
    /// Zero-based position of the block in the file.
    pub index: usize,
}

/// Reads the header, then yields verified, decompressed blocks.
pub struct BlockReader<'a> {
    decoder: BinaryDecoder<'a>,
    header: ContainerHeader,
    block_index: usize,
}

impl<'a> BlockReader<'a> {
    /// Open a container file and read its header.
    pub fn new(source: impl Read + 'a) -> Result<Self, StreamError> {
        let mut decoder = acquire_decoder(source);
        let header = ContainerHeader::read(&mut decoder)?;
        Ok(Self {
            decoder,
            header,
            block_index: 0,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Number of blocks read so far.
    pub fn block_index(&self) -> usize {
        self.block_index
    }

    /// Read the next block, or `None` at end of file.
    ///
    /// # Errors
    /// - `StreamError::InvalidSyncMarker` if the block is not followed by the file's marker
    /// - `StreamError::Codec` if the payload fails to decompress
    pub fn next_block(&mut self) -> Result<Option<Block>, StreamError> {
        if self.decoder.is_at_end().map_err(|e| self.fail(e))? {
            debug!(blocks = self.block_index, "reached end of container");
            return Ok(None);
        }

        let count = self.decoder.read_long().map_err(|e| self.fail(e))?;
        if count < 0 {
            return Err(self.fail(DecodeError::NegativeLength(count)));
        }
        let size = self.decoder.read_length().map_err(|e| self.fail(e))?;
        let compressed = self.decoder.read_fixed(size).map_err(|e| self.fail(e))?;

        let mut sync = [0u8; SYNC_SIZE];
        self.decoder.read_exact(&mut sync).map_err(|e| self.fail(e))?;
        if sync != self.header.sync_marker {
            return Err(StreamError::InvalidSyncMarker {
                block_index: self.block_index,
            });
        }

        let data = self.header.codec.decompress(&compressed)?;
        trace!(
            block = self.block_index,
            count,
            compressed = size,
            decompressed = data.len(),
            "read container block"
        );

        let block = Block {
            count: count as u64,
            data,
            index: self.block_index,
        };
        self.block_index += 1;
        Ok(Some(block))
    }

    fn fail(&self, source: DecodeError) -> StreamError {
        StreamError::Decode {
            offset: self.decoder.offset(),
            source,
        }
    }
}

impl Iterator for BlockReader<'_> {
    type Item = Result<Block, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::container::ContainerWriter;
    use crate::schema::Schema;
    use crate::stream::ContainerOptions;

    fn write_file(codec: Codec, datums: &[&[u8]]) -> Vec<u8> {
        let schema = Schema::parse(r#""long""#).unwrap();
        let options = ContainerOptions::default()
            .with_codec(codec)
            .with_sync_interval(2);
        let mut writer = ContainerWriter::new(Vec::new(), &schema, &options).unwrap();
        for datum in datums {
            writer.append(datum).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_reads_blocks_in_order() {
        let file = write_file(Codec::Null, &[&[0x02], &[0x04], &[0x06]]);
        let mut reader = BlockReader::new(&file[..]).unwrap();

        let first = reader.next_block().unwrap().unwrap();
        assert_eq!(first.count, 2);
        assert_eq!(first.data.as_ref(), &[0x02, 0x04]);
        let second = reader.next_block().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.data.as_ref(), &[0x06]);
        assert!(reader.next_block().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_sync_marker() {
        let mut file = write_file(Codec::Null, &[&[0x02], &[0x04]]);
        let last = file.len() - 1;
        file[last] ^= 0xFF;
        let mut reader = BlockReader::new(&file[..]).unwrap();
        assert!(matches!(
            reader.next_block(),
            Err(StreamError::InvalidSyncMarker { block_index: 0 })
        ));
    }

    #[test]
    fn test_truncated_block() {
        let file = write_file(Codec::Null, &[&[0x02], &[0x04]]);
        let truncated = &file[..file.len() - 3];
        let mut reader = BlockReader::new(truncated).unwrap();
        assert!(matches!(
            reader.next_block(),
            Err(StreamError::Decode {
                source: DecodeError::UnexpectedEof,
                ..
            })
        ));
    }
}
