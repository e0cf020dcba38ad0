//! Generic value model.
//!
//! `AvroValue` is exactly what the token stream can express: records and maps are
//! objects, enums are strings, fixed values are bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::error::{SchemaError, StreamError};
use crate::schema::{Node, NodeId, Schema};
use crate::stream::{Event, Number};

/// A decoded or to-be-encoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum AvroValue {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Array(Vec<AvroValue>),
    /// Record or map entries, in stream order.
    Object(Vec<(String, AvroValue)>),
}

impl AvroValue {
    /// Build an object from `(name, value)` pairs.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, AvroValue)>) -> Self {
        AvroValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up an object entry by name.
    pub fn get(&self, name: &str) -> Option<&AvroValue> {
        match self {
            AvroValue::Object(entries) => entries.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AvroValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as i64 for either integer width.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            AvroValue::Int(v) => Some(v as i64),
            AvroValue::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to JSON. Bytes are base64 encoded.
    pub fn to_json(&self) -> Value {
        match self {
            AvroValue::Null => Value::Null,
            AvroValue::Boolean(b) => json!(b),
            AvroValue::Int(v) => json!(v),
            AvroValue::Long(v) => json!(v),
            AvroValue::Float(v) => json!(v),
            AvroValue::Double(v) => json!(v),
            AvroValue::Bytes(b) => json!(BASE64.encode(b)),
            AvroValue::String(s) => json!(s),
            AvroValue::Array(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            AvroValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Append this value's token events to `out`.
    pub fn push_events(&self, out: &mut Vec<Event>) {
        match self {
            AvroValue::Null => out.push(Event::Null),
            AvroValue::Boolean(b) => out.push(Event::Boolean(*b)),
            AvroValue::Int(v) => out.push(Event::Number(Number::Int(*v))),
            AvroValue::Long(v) => out.push(Event::Number(Number::Long(*v))),
            AvroValue::Float(v) => out.push(Event::Number(Number::Float(*v))),
            AvroValue::Double(v) => out.push(Event::Number(Number::Double(*v))),
            AvroValue::Bytes(b) => out.push(Event::Binary(b.clone())),
            AvroValue::String(s) => out.push(Event::String(s.clone())),
            AvroValue::Array(items) => {
                out.push(Event::StartArray);
                for item in items {
                    item.push_events(out);
                }
                out.push(Event::EndArray);
            }
            AvroValue::Object(entries) => {
                out.push(Event::StartObject);
                for (name, value) in entries {
                    out.push(Event::FieldName(name.clone()));
                    value.push_events(out);
                }
                out.push(Event::EndObject);
            }
        }
    }

    /// The token events of this value.
    pub fn events(&self) -> Vec<Event> {
        let mut out = Vec::new();
        self.push_events(&mut out);
        out
    }

    /// Convert a JSON default declared for `node` of `schema` into a value.
    ///
    /// Follows Avro's default rules: bytes and fixed defaults are strings whose code
    /// points are byte values, union defaults belong to the first branch, and record
    /// defaults fill absent fields from the fields' own defaults.
    pub fn from_default(json: &Value, schema: &Schema, node: NodeId) -> Result<Self, SchemaError> {
        let invalid = || {
            SchemaError::InvalidSchema(format!(
                "Default {} does not match type '{}'",
                json,
                schema
                    .node(node)
                    .fullname()
                    .unwrap_or(schema.node(node).kind().name())
            ))
        };

        Ok(match (schema.node(node), json) {
            (Node::Null, Value::Null) => AvroValue::Null,
            (Node::Boolean, Value::Bool(b)) => AvroValue::Boolean(*b),
            (Node::Int, Value::Number(n)) => {
                let v = n.as_i64().ok_or_else(invalid)?;
                AvroValue::Int(i32::try_from(v).map_err(|_| invalid())?)
            }
            (Node::Long, Value::Number(n)) => AvroValue::Long(n.as_i64().ok_or_else(invalid)?),
            (Node::Float, Value::Number(n)) => AvroValue::Float(n.as_f64().ok_or_else(invalid)? as f32),
            (Node::Double, Value::Number(n)) => AvroValue::Double(n.as_f64().ok_or_else(invalid)?),
            (Node::String, Value::String(s)) => AvroValue::String(s.clone()),
            (Node::Bytes, Value::String(s)) => AvroValue::Bytes(latin1_bytes(s).ok_or_else(invalid)?),
            (Node::Fixed { size, .. }, Value::String(s)) => {
                let bytes = latin1_bytes(s).ok_or_else(invalid)?;
                if bytes.len() != *size {
                    return Err(invalid());
                }
                AvroValue::Bytes(bytes)
            }
            (Node::Enum { symbols, .. }, Value::String(s)) => {
                if !symbols.contains(s) {
                    return Err(invalid());
                }
                AvroValue::String(s.clone())
            }
            (Node::Array(item), Value::Array(items)) => AvroValue::Array(
                items
                    .iter()
                    .map(|v| Self::from_default(v, schema, *item))
                    .collect::<Result<_, _>>()?,
            ),
            (Node::Map(values), Value::Object(entries)) => AvroValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Self::from_default(v, schema, *values)?)))
                    .collect::<Result<_, SchemaError>>()?,
            ),
            (Node::Record { fields, .. }, Value::Object(entries)) => AvroValue::Object(
                fields
                    .iter()
                    .map(|field| {
                        let declared = entries.get(&field.name).or(field.default.as_ref());
                        let value = match declared {
                            Some(v) => Self::from_default(v, schema, field.node)?,
                            None => return Err(invalid()),
                        };
                        Ok((field.name.clone(), value))
                    })
                    .collect::<Result<_, SchemaError>>()?,
            ),
            (Node::Union(branches), _) => {
                let first = *branches.first().ok_or_else(invalid)?;
                Self::from_default(json, schema, first)?
            }
            _ => return Err(invalid()),
        })
    }
}

fn latin1_bytes(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

impl From<bool> for AvroValue {
    fn from(v: bool) -> Self {
        AvroValue::Boolean(v)
    }
}

impl From<i32> for AvroValue {
    fn from(v: i32) -> Self {
        AvroValue::Int(v)
    }
}

impl From<i64> for AvroValue {
    fn from(v: i64) -> Self {
        AvroValue::Long(v)
    }
}

impl From<f32> for AvroValue {
    fn from(v: f32) -> Self {
        AvroValue::Float(v)
    }
}

impl From<f64> for AvroValue {
    fn from(v: f64) -> Self {
        AvroValue::Double(v)
    }
}

impl From<&str> for AvroValue {
    fn from(v: &str) -> Self {
        AvroValue::String(v.to_string())
    }
}

impl From<String> for AvroValue {
    fn from(v: String) -> Self {
        AvroValue::String(v)
    }
}

impl From<Vec<u8>> for AvroValue {
    fn from(v: Vec<u8>) -> Self {
        AvroValue::Bytes(v)
    }
}

impl From<Number> for AvroValue {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(v) => AvroValue::Int(v),
            Number::Long(v) => AvroValue::Long(v),
            Number::Float(v) => AvroValue::Float(v),
            Number::Double(v) => AvroValue::Double(v),
        }
    }
}

/// Assembles token events back into values.
#[derive(Debug, Default)]
pub struct ValueBuilder {
    stack: Vec<Partial>,
}

#[derive(Debug)]
enum Partial {
    Array(Vec<AvroValue>),
    Object {
        entries: Vec<(String, AvroValue)>,
        pending: Option<String>,
    },
}

impl ValueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of structures currently open.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Feed one event. Returns the value once a top-level value is complete.
    pub fn push(&mut self, event: Event) -> Result<Option<AvroValue>, StreamError> {
        let value = match event {
            Event::StartArray => {
                self.stack.push(Partial::Array(Vec::new()));
                return Ok(None);
            }
            Event::StartObject => {
                self.stack.push(Partial::Object {
                    entries: Vec::new(),
                    pending: None,
                });
                return Ok(None);
            }
            Event::FieldName(name) => {
                return match self.stack.last_mut() {
                    Some(Partial::Object { pending, .. }) if pending.is_none() => {
                        *pending = Some(name);
                        Ok(None)
                    }
                    _ => Err(StreamError::structural(format!(
                        "Unexpected field name '{}'",
                        name
                    ))),
                };
            }
            Event::EndArray => match self.stack.pop() {
                Some(Partial::Array(items)) => AvroValue::Array(items),
                _ => return Err(StreamError::structural("Unexpected end of array")),
            },
            Event::EndObject => match self.stack.pop() {
                Some(Partial::Object {
                    entries,
                    pending: None,
                }) => AvroValue::Object(entries),
                _ => return Err(StreamError::structural("Unexpected end of object")),
            },
            Event::String(s) => AvroValue::String(s),
            Event::Number(n) => n.into(),
            Event::Boolean(b) => AvroValue::Boolean(b),
            Event::Null => AvroValue::Null,
            Event::Binary(b) => AvroValue::Bytes(b),
        };
        self.attach(value)
    }

    fn attach(&mut self, value: AvroValue) -> Result<Option<AvroValue>, StreamError> {
        match self.stack.last_mut() {
            None => Ok(Some(value)),
            Some(Partial::Array(items)) => {
                items.push(value);
                Ok(None)
            }
            Some(Partial::Object { entries, pending }) => match pending.take() {
                Some(name) => {
                    entries.push((name, value));
                    Ok(None)
                }
                None => Err(StreamError::structural(
                    "Value written where a field name was expected",
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AvroValue {
        AvroValue::object([
            ("id", AvroValue::Long(7)),
            ("tags", AvroValue::Array(vec!["a".into(), "b".into()])),
            ("blob", AvroValue::Bytes(vec![0, 255])),
            ("none", AvroValue::Null),
        ])
    }

    #[test]
    fn test_events_rebuild_value() {
        let value = sample();
        let mut builder = ValueBuilder::new();
        let mut rebuilt = None;
        for event in value.events() {
            rebuilt = builder.push(event).unwrap();
        }
        assert_eq!(rebuilt, Some(value));
        assert_eq!(builder.depth(), 0);
    }

    #[test]
    fn test_builder_rejects_value_without_name() {
        let mut builder = ValueBuilder::new();
        builder.push(Event::StartObject).unwrap();
        assert!(matches!(
            builder.push(Event::Null),
            Err(StreamError::Structural(_))
        ));
    }

    #[test]
    fn test_to_json_encodes_bytes() {
        let json = sample().to_json();
        assert_eq!(json["id"], 7);
        assert_eq!(json["blob"], "AP8=");
        assert_eq!(json["none"], Value::Null);
    }

    #[test]
    fn test_from_default_record_and_union() {
        let schema = Schema::parse(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": "int", "default": 1},
                {"name": "b", "type": ["null", "string"]},
                {"name": "c", "type": {"type": "fixed", "name": "F", "size": 2}}
            ]}"#,
        )
        .unwrap();
        let value = AvroValue::from_default(
            &json!({"b": null, "c": "\u{00ff}\u{0001}"}),
            &schema,
            schema.root(),
        )
        .unwrap();
        assert_eq!(
            value,
            AvroValue::object([
                ("a", AvroValue::Int(1)),
                ("b", AvroValue::Null),
                ("c", AvroValue::Bytes(vec![255, 1])),
            ])
        );
    }

    #[test]
    fn test_from_default_rejects_mismatch() {
        let schema = Schema::parse(r#""int""#).unwrap();
        assert!(AvroValue::from_default(&json!("x"), &schema, schema.root()).is_err());
        assert!(AvroValue::from_default(&json!(1u64 << 40), &schema, schema.root()).is_err());
    }
}
