//! Schema-driven token codec for the Avro binary encoding.
//!
//! Avro data is read through a pull parser that yields JSON-like tokens one at a time and
//! written through a generator that accepts the same tokens, so client code handles
//! objects, arrays and scalars without knowing the wire format behind them.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use jetcodec::{AvroGenerator, AvroParser, GeneratorConfig, ParserConfig, Schema, Token};
//!
//! let schema = Arc::new(Schema::parse(r#"{"type": "array", "items": "string"}"#).unwrap());
//!
//! let mut generator =
//!     AvroGenerator::new(Vec::new(), Arc::clone(&schema), GeneratorConfig::default()).unwrap();
//! generator.write_start_array().unwrap();
//! generator.write_string("avro").unwrap();
//! generator.write_end_array().unwrap();
//! let bytes = generator.finish().unwrap();
//!
//! let mut parser = AvroParser::new(&bytes[..], schema, ParserConfig::default()).unwrap();
//! assert_eq!(parser.next_token().unwrap(), Token::StartArray);
//! assert_eq!(parser.next_token().unwrap(), Token::ValueString);
//! assert_eq!(parser.text_value().unwrap(), "avro");
//! assert_eq!(parser.next_token().unwrap(), Token::EndArray);
//! assert_eq!(parser.next_token().unwrap(), Token::EndOfStream);
//! ```

pub mod codec;
pub mod container;
pub mod custom;
pub mod datum;
pub mod error;
pub mod io;
pub mod schema;
pub mod stream;
pub mod value;

// Re-export main types
pub use codec::Codec;
pub use container::{BlockReader, ContainerHeader, ContainerWriter};
pub use custom::{CustomEncoding, CustomEncodings};
pub use datum::{from_datum, from_datum_with, to_datum, to_datum_with};
pub use error::{CodecError, DecodeError, EncodeError, SchemaError, StreamError};
pub use io::{
    acquire_decoder, acquire_encoder, release_decoder, release_encoder, BinaryDecoder,
    BinaryEncoder,
};
pub use schema::{
    parse_schema, AvroSchema, EnumSchema, FieldSchema, FixedSchema, LogicalType,
    LogicalTypeName, ReadPlan, RecordSchema, Schema, SchemaPair,
};
pub use stream::{
    AvroGenerator, AvroParser, ContainerOptions, Event, GeneratorConfig, Number, ParserConfig,
    Token,
};
pub use value::{AvroValue, ValueBuilder};
