//! Parser and generator settings.

use crate::codec::Codec;
use crate::custom::CustomEncodings;
use crate::error::StreamError;
use crate::io::recycler::DEFAULT_READ_BUFFER;

/// Default number of uncompressed bytes buffered per container block.
pub const DEFAULT_SYNC_INTERVAL: usize = 64_000;

/// Configuration for [`AvroParser`](super::AvroParser).
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Fail on writer fields the reader schema does not declare (default: false, skip them).
    pub fail_on_unknown_fields: bool,
    /// Initial read buffer size in bytes (default: 8 KiB).
    pub read_buffer: usize,
    /// Plugins for types declaring a custom encoding.
    pub custom: CustomEncodings,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            fail_on_unknown_fields: false,
            read_buffer: DEFAULT_READ_BUFFER,
            custom: CustomEncodings::default(),
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `UnknownField` instead of skipping writer-only fields.
    pub fn strict(mut self) -> Self {
        self.fail_on_unknown_fields = true;
        self
    }

    pub fn with_fail_on_unknown_fields(mut self, fail: bool) -> Self {
        self.fail_on_unknown_fields = fail;
        self
    }

    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer = bytes;
        self
    }

    pub fn with_custom_encodings(mut self, custom: CustomEncodings) -> Self {
        self.custom = custom;
        self
    }
}

/// Container file settings for the generator.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Block compression codec (default: null).
    pub codec: Codec,
    /// Flush a block once this many uncompressed bytes are buffered.
    pub sync_interval: usize,
    /// User metadata. Keys starting with `avro.` are reserved and dropped.
    pub metadata: Vec<(String, Vec<u8>)>,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            codec: Codec::Null,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            metadata: Vec::new(),
        }
    }
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_sync_interval(mut self, bytes: usize) -> Self {
        self.sync_interval = bytes;
        self
    }

    /// Add a user metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Configuration for [`AvroGenerator`](super::AvroGenerator).
#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    /// Drop values written under undeclared field names instead of failing (default: false).
    pub ignore_unknown: bool,
    /// Maximum items per array/map block (default: None, one block per array/map).
    pub block_size: Option<usize>,
    /// Frame blocks with a negative count followed by their byte size (default: false).
    pub block_byte_sizes: bool,
    /// Write an object container file instead of bare datums (default: None).
    pub container: Option<ContainerOptions>,
    /// Plugins for types declaring a custom encoding.
    pub custom: CustomEncodings,
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_unknown(mut self, ignore: bool) -> Self {
        self.ignore_unknown = ignore;
        self
    }

    pub fn with_block_size(mut self, items: usize) -> Self {
        self.block_size = Some(items);
        self
    }

    pub fn with_block_byte_sizes(mut self, enabled: bool) -> Self {
        self.block_byte_sizes = enabled;
        self
    }

    pub fn with_container(mut self, options: ContainerOptions) -> Self {
        self.container = Some(options);
        self
    }

    pub fn with_custom_encodings(mut self, custom: CustomEncodings) -> Self {
        self.custom = custom;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), StreamError> {
        if self.block_size == Some(0) {
            return Err(StreamError::Configuration(
                "block_size must be at least 1".to_string(),
            ));
        }
        if let Some(container) = &self.container {
            if container.sync_interval == 0 {
                return Err(StreamError::Configuration(
                    "sync_interval must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_defaults() {
        let config = ParserConfig::default();
        assert!(!config.fail_on_unknown_fields);
        assert_eq!(config.read_buffer, DEFAULT_READ_BUFFER);
        assert!(ParserConfig::new().strict().fail_on_unknown_fields);
    }

    #[test]
    fn test_generator_validation() {
        assert!(GeneratorConfig::new().validate().is_ok());
        assert!(matches!(
            GeneratorConfig::new().with_block_size(0).validate(),
            Err(StreamError::Configuration(_))
        ));
        let zero_interval = ContainerOptions::new().with_sync_interval(0);
        assert!(GeneratorConfig::new()
            .with_container(zero_interval)
            .validate()
            .is_err());
    }

    #[test]
    fn test_container_metadata() {
        let options = ContainerOptions::new()
            .with_codec(Codec::Deflate)
            .with_metadata("app.source", "sensor-7");
        assert_eq!(options.codec, Codec::Deflate);
        assert_eq!(options.metadata[0].1, b"sensor-7".to_vec());
    }
}
