//! Error types for the Avro token codec

use std::io;
use thiserror::Error;

/// Errors that can occur while parsing, compiling or resolving schemas
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Invalid schema format
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// Unsupported schema type
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
    /// Schema text is not valid JSON
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Reference to a named type that was never defined
    #[error("Unknown type reference: {0}")]
    UnknownType(String),
    /// A named type was defined twice
    #[error("Duplicate definition of named type: {0}")]
    DuplicateName(String),
    /// Union violates Avro's branch rules
    #[error("Invalid union: {0}")]
    InvalidUnion(String),
    /// Writer and reader schemas cannot be resolved against each other
    #[error("Incompatible schemas: {0}")]
    IncompatibleSchemas(String),
}

/// Errors that can occur with container block codecs
#[derive(Debug, Error)]
pub enum CodecError {
    /// Unsupported codec
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),
    /// Compression error
    #[error("Compression error: {0}")]
    CompressionError(String),
    /// Decompression error
    #[error("Decompression error: {0}")]
    DecompressionError(String),
}

/// Errors raised by the byte cursor while decoding malformed input
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Invalid Avro data
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// Input ended in the middle of a value
    #[error("Unexpected end of input")]
    UnexpectedEof,
    /// Type mismatch
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    /// IO error from the underlying source
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Invalid varint encoding
    #[error("Invalid varint encoding")]
    InvalidVarint,
    /// String is not valid UTF-8
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// Union branch index outside the declared branches
    #[error("Union index {index} out of range (0..{branches})")]
    InvalidUnionIndex { index: i64, branches: usize },
    /// Enum symbol index outside the declared symbols
    #[error("Enum index {index} out of range for enum '{name}' with {symbols} symbols")]
    InvalidEnumIndex {
        index: i64,
        name: String,
        symbols: usize,
    },
    /// Negative length or block size
    #[error("Negative length: {0}")]
    NegativeLength(i64),
}

/// Errors raised by the byte cursor or the encoder while writing
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The value cannot be written against the expected schema node
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    /// The value is of the right kind but violates a schema constraint
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    /// IO error from the underlying sink
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Top-level stream error type
///
/// Every variant aborts the stream that raised it. Only `UnknownField` has an
/// opt-out, via the `ignore_unknown` (generator) and `fail_on_unknown_fields`
/// (parser) settings.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Schema parse, compile or resolution error
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Malformed input
    #[error("Decode error at byte {offset}: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: DecodeError,
    },

    /// Encoding failure
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Container block codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Field not declared by the schema while strict
    #[error("Unknown field '{field}' for record '{record}'")]
    UnknownField { record: String, field: String },

    /// Token requested or written in the wrong place
    #[error("Structural violation: {0}")]
    Structural(String),

    /// Missing or invalid custom encoding, invalid options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid container magic bytes
    #[error("Invalid magic bytes: expected 'Obj\\x01', found {0:?}")]
    InvalidMagic([u8; 4]),

    /// Container block followed by a foreign sync marker
    #[error("Invalid sync marker after block {block_index}")]
    InvalidSyncMarker { block_index: usize },
}

impl From<DecodeError> for StreamError {
    fn from(err: DecodeError) -> Self {
        StreamError::Decode {
            offset: 0,
            source: err,
        }
    }
}

impl StreamError {
    /// Build a structural violation error.
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        StreamError::Structural(message.into())
    }

    /// Whether this error came from writer/reader schema resolution.
    pub fn is_resolution(&self) -> bool {
        matches!(self, StreamError::Schema(SchemaError::IncompatibleSchemas(_)))
    }
}
