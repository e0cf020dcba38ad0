//! One-call conversions between values and bare datums.
//!
//! Both directions run through the token stream, never the wire directly.

use std::sync::Arc;

use crate::error::StreamError;
use crate::schema::{Schema, SchemaPair};
use crate::stream::{AvroGenerator, AvroParser, GeneratorConfig, ParserConfig};
use crate::value::AvroValue;

/// Encode one value as a bare datum of `schema`.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use jetcodec::{to_datum, AvroValue, Schema};
///
/// let schema = Arc::new(Schema::parse(r#"{"type": "record", "name": "Point", "fields": [
///     {"name": "x", "type": "int"}, {"name": "y", "type": "int"}
/// ]}"#).unwrap());
/// let point = AvroValue::object([("x", 1.into()), ("y", (-1).into())]);
/// assert_eq!(to_datum(&schema, &point).unwrap(), vec![0x02, 0x01]);
/// ```
pub fn to_datum(schema: &Arc<Schema>, value: &AvroValue) -> Result<Vec<u8>, StreamError> {
    to_datum_with(schema, value, GeneratorConfig::default())
}

/// Encode one value with explicit generator settings.
pub fn to_datum_with(
    schema: &Arc<Schema>,
    value: &AvroValue,
    config: GeneratorConfig,
) -> Result<Vec<u8>, StreamError> {
    if config.container.is_some() {
        return Err(StreamError::Configuration(
            "Bare datums cannot be written in container mode".to_string(),
        ));
    }
    let mut generator = AvroGenerator::new(Vec::new(), Arc::clone(schema), config)?;
    generator.write_value(value)?;
    generator.finish()
}

/// Decode every datum in `bytes`, resolving writer to reader as `schemas` says.
pub fn from_datum(bytes: &[u8], schemas: &SchemaPair) -> Result<Vec<AvroValue>, StreamError> {
    from_datum_with(bytes, schemas, ParserConfig::default())
}

/// Decode every datum with explicit parser settings.
pub fn from_datum_with(
    bytes: &[u8],
    schemas: &SchemaPair,
    config: ParserConfig,
) -> Result<Vec<AvroValue>, StreamError> {
    let mut parser = AvroParser::raw(bytes, schemas.clone(), config)?;
    let mut values = Vec::new();
    while let Some(value) = parser.next_value()? {
        values.push(value);
    }
    Ok(values)
}
