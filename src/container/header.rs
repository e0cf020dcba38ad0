//! Object container file header.
//!
//! Layout:
//! - magic bytes `Obj\x01`
//! - metadata map (string keys, bytes values) holding `avro.schema` and `avro.codec`
//! - 16-byte sync marker repeated after every block

use std::sync::Arc;

use tracing::debug;

use crate::codec::Codec;
use crate::error::{SchemaError, StreamError};
use crate::io::{BinaryDecoder, BinaryEncoder};
use crate::schema::Schema;

/// The magic bytes that open an object container file.
pub const AVRO_MAGIC: [u8; 4] = [b'O', b'b', b'j', 0x01];

/// Size of the sync marker in bytes.
pub const SYNC_SIZE: usize = 16;

pub const SCHEMA_KEY: &str = "avro.schema";
pub const CODEC_KEY: &str = "avro.codec";

/// Parsed container header.
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    /// Every metadata entry, in file order, including the reserved `avro.*` keys.
    pub metadata: Vec<(String, Vec<u8>)>,
    pub sync_marker: [u8; SYNC_SIZE],
    pub codec: Codec,
    /// The schema the file was written with.
    pub schema: Arc<Schema>,
}

impl ContainerHeader {
    /// Read a header from the start of a container file.
    ///
    /// # Errors
    /// - `StreamError::InvalidMagic` if the file does not start with `Obj\x01`
    /// - `StreamError::Schema` if `avro.schema` is missing or invalid
    /// - `StreamError::Codec` if `avro.codec` names an unknown codec
    pub fn read(decoder: &mut BinaryDecoder<'_>) -> Result<Self, StreamError> {
        let mut magic = [0u8; 4];
        decoder.read_exact(&mut magic)?;
        if magic != AVRO_MAGIC {
            return Err(StreamError::InvalidMagic(magic));
        }

        let mut metadata = Vec::new();
        loop {
            let (count, _) = decoder.read_block_header()?;
            if count == 0 {
                break;
            }
            for _ in 0..count {
                let key = decoder.read_string()?;
                let value = decoder.read_bytes()?;
                metadata.push((key, value));
            }
        }

        let mut sync_marker = [0u8; SYNC_SIZE];
        decoder.read_exact(&mut sync_marker)?;

        let schema_json = metadata_str(&metadata, SCHEMA_KEY)?.ok_or_else(|| {
            SchemaError::InvalidSchema(format!("Missing '{}' in container metadata", SCHEMA_KEY))
        })?;
        let schema = Arc::new(Schema::parse(schema_json)?);

        let codec = match metadata_str(&metadata, CODEC_KEY)? {
            Some(name) => Codec::from_name(name)?,
            None => Codec::Null,
        };

        debug!(
            codec = codec.name(),
            entries = metadata.len(),
            "read container header"
        );

        Ok(Self {
            metadata,
            sync_marker,
            codec,
            schema,
        })
    }

    /// Serialize a header.
    pub fn write(
        encoder: &mut BinaryEncoder,
        schema: &Schema,
        codec: Codec,
        user_metadata: &[(String, Vec<u8>)],
        sync_marker: &[u8; SYNC_SIZE],
    ) {
        encoder.write_raw(&AVRO_MAGIC);

        let reserved = [
            (SCHEMA_KEY, schema.to_json().into_bytes()),
            (CODEC_KEY, codec.name().as_bytes().to_vec()),
        ];
        let user = user_metadata
            .iter()
            .filter(|(key, _)| !key.starts_with("avro."));
        let count = reserved.len() + user.clone().count();

        encoder.write_long(count as i64);
        for (key, value) in &reserved {
            encoder.write_string(key);
            encoder.write_bytes(value);
        }
        for (key, value) in user {
            encoder.write_string(key);
            encoder.write_bytes(value);
        }
        encoder.write_long(0);

        encoder.write_raw(sync_marker);
    }

    /// Look up a metadata entry.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }
}

fn metadata_str<'m>(
    metadata: &'m [(String, Vec<u8>)],
    key: &str,
) -> Result<Option<&'m str>, SchemaError> {
    metadata
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| {
            std::str::from_utf8(v).map_err(|e| {
                SchemaError::InvalidSchema(format!("Metadata '{}' is not valid UTF-8: {}", key, e))
            })
        })
        .transpose()
}
