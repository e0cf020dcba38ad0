//! JSON schema parser for Avro schemas.
//!
//! Parses Avro schema JSON into the [`AvroSchema`] tree. Named types must be defined
//! before they are referenced; a record's own name is usable inside its fields.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::SchemaError;
use crate::schema::{
    AvroSchema, EnumSchema, FieldOrder, FieldSchema, FixedSchema, LogicalType, LogicalTypeName,
    RecordSchema,
};

/// Parse an Avro schema from a JSON string.
///
/// # Example
/// ```
/// use jetcodec::schema::parse_schema;
///
/// let schema = parse_schema(r#"{"type": "array", "items": "int"}"#).unwrap();
/// assert!(!schema.is_primitive());
/// ```
pub fn parse_schema(json: &str) -> Result<AvroSchema, SchemaError> {
    parse_schema_with_options(json, false)
}

/// Parse an Avro schema from a JSON string with name validation options.
///
/// In strict mode names that break Avro naming rules (start with a letter or underscore,
/// then only alphanumerics and underscores) are rejected. In permissive mode they are
/// logged as warnings. Union rules, unknown references and duplicate definitions are
/// errors in both modes.
///
/// # Example
/// ```
/// use jetcodec::schema::parse_schema_with_options;
///
/// let lenient = r#"{"type": "enum", "name": "E", "symbols": ["a-b"]}"#;
/// assert!(parse_schema_with_options(lenient, false).is_ok());
/// assert!(parse_schema_with_options(lenient, true).is_err());
/// ```
pub fn parse_schema_with_options(json: &str, strict: bool) -> Result<AvroSchema, SchemaError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| SchemaError::ParseError(format!("Invalid JSON: {}", e)))?;

    let mut parser = SchemaParser::new().with_strict(strict);
    parser.parse(&value)
}

/// Schema parser with named type resolution context.
#[derive(Debug, Default)]
pub struct SchemaParser {
    /// Kinds of the named types defined so far, by fully qualified name
    named_types: HashMap<String, &'static str>,
    /// Namespace inherited by unqualified names
    current_namespace: Option<String>,
    /// Whether invalid names are errors rather than warnings
    strict_names: bool,
}

impl SchemaParser {
    /// Create a new SchemaParser in permissive mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether invalid names are rejected.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict_names = strict;
        self
    }

    /// Whether a named type with this fully qualified name has been defined.
    pub fn is_defined(&self, fullname: &str) -> bool {
        self.named_types.contains_key(fullname)
    }

    /// Parse a JSON value into an AvroSchema.
    pub fn parse(&mut self, value: &Value) -> Result<AvroSchema, SchemaError> {
        match value {
            Value::String(s) => self.parse_type_name(s),
            Value::Object(obj) => self.parse_object_schema(obj),
            Value::Array(arr) => self.parse_union_schema(arr),
            _ => Err(SchemaError::InvalidSchema(format!(
                "Expected string, object, or array, found: {}",
                value
            ))),
        }
    }

    /// Parse a primitive name or a reference to an already defined named type.
    fn parse_type_name(&self, s: &str) -> Result<AvroSchema, SchemaError> {
        Ok(match s {
            "null" => AvroSchema::Null,
            "boolean" => AvroSchema::Boolean,
            "int" => AvroSchema::Int,
            "long" => AvroSchema::Long,
            "float" => AvroSchema::Float,
            "double" => AvroSchema::Double,
            "bytes" => AvroSchema::Bytes,
            "string" => AvroSchema::String,
            name => AvroSchema::Named(self.resolve_reference(name)?),
        })
    }

    /// Parse a complex type from a JSON object.
    fn parse_object_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let type_value = obj
            .get("type")
            .ok_or_else(|| SchemaError::InvalidSchema("Missing 'type' field".to_string()))?;

        let type_str = match type_value {
            Value::String(s) => s.as_str(),
            // {"type": {...}} or {"type": [...]}: the wrapper adds nothing.
            nested => return self.parse(nested),
        };

        let base = match type_str {
            "record" | "error" => self.parse_record_schema(obj)?,
            "enum" => self.parse_enum_schema(obj)?,
            "array" => self.parse_array_schema(obj)?,
            "map" => self.parse_map_schema(obj)?,
            "fixed" => self.parse_fixed_schema(obj)?,
            other => self.parse_type_name(other)?,
        };

        match obj.get("logicalType") {
            Some(logical) => self.parse_logical_type(obj, logical, base),
            None => Ok(base),
        }
    }

    /// Parse a union schema from a JSON array.
    fn parse_union_schema(&mut self, arr: &[Value]) -> Result<AvroSchema, SchemaError> {
        if arr.is_empty() {
            return Err(SchemaError::InvalidUnion(
                "Union schema cannot be empty".to_string(),
            ));
        }

        let variants = arr
            .iter()
            .map(|v| self.parse(v))
            .collect::<Result<Vec<_>, _>>()?;

        validate_union(&variants)?;
        Ok(AvroSchema::Union(variants))
    }

    /// Parse a record schema.
    fn parse_record_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let (name, namespace, fullname) = self.named_header(obj, "Record")?;

        // Register before the fields so they can refer back to the record.
        self.define(&fullname, "record")?;

        let prev_namespace = std::mem::replace(&mut self.current_namespace, namespace.clone());

        let fields_value = obj
            .get("fields")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                SchemaError::InvalidSchema(format!("Record '{}' missing 'fields' array", fullname))
            });
        let fields = fields_value.and_then(|fields| {
            fields
                .iter()
                .map(|f| self.parse_field_schema(f))
                .collect::<Result<Vec<_>, _>>()
        });

        self.current_namespace = prev_namespace;
        let fields = fields?;

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::InvalidSchema(format!(
                    "Record '{}' declares field '{}' twice",
                    fullname, field.name
                )));
            }
        }

        Ok(AvroSchema::Record(RecordSchema {
            name,
            namespace,
            fields,
            doc: string_attr(obj, "doc"),
            aliases: aliases(obj),
            custom_encoding: string_attr(obj, "customEncoding"),
        }))
    }

    /// Parse a field schema within a record.
    fn parse_field_schema(&mut self, value: &Value) -> Result<FieldSchema, SchemaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaError::InvalidSchema("Field must be an object".to_string()))?;

        let name = string_attr(obj, "name")
            .ok_or_else(|| SchemaError::InvalidSchema("Field missing 'name'".to_string()))?;
        self.validate_name(&name, "Field")?;

        let type_value = obj.get("type").ok_or_else(|| {
            SchemaError::InvalidSchema(format!("Field '{}' missing 'type'", name))
        })?;
        let schema = self.parse(type_value)?;

        let order = match obj.get("order").and_then(|v| v.as_str()) {
            None | Some("ascending") => FieldOrder::Ascending,
            Some("descending") => FieldOrder::Descending,
            Some("ignore") => FieldOrder::Ignore,
            Some(other) => {
                return Err(SchemaError::InvalidSchema(format!(
                    "Field '{}' has invalid order '{}'",
                    name, other
                )))
            }
        };

        Ok(FieldSchema {
            name,
            schema,
            default: obj.get("default").cloned(),
            doc: string_attr(obj, "doc"),
            order,
            aliases: aliases(obj),
        })
    }

    /// Parse an enum schema.
    fn parse_enum_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let (name, namespace, fullname) = self.named_header(obj, "Enum")?;

        let symbols = obj
            .get("symbols")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                SchemaError::InvalidSchema(format!("Enum '{}' missing 'symbols' array", fullname))
            })?
            .iter()
            .map(|v| {
                v.as_str().map(String::from).ok_or_else(|| {
                    SchemaError::InvalidSchema(format!("Enum '{}' has a non-string symbol", fullname))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if symbols.is_empty() {
            return Err(SchemaError::InvalidSchema(format!(
                "Enum '{}' must have at least one symbol",
                fullname
            )));
        }

        let mut seen = HashSet::new();
        for symbol in &symbols {
            self.validate_name(symbol, "Enum symbol")?;
            if !seen.insert(symbol.as_str()) {
                return Err(SchemaError::InvalidSchema(format!(
                    "Enum '{}' declares symbol '{}' twice",
                    fullname, symbol
                )));
            }
        }

        self.define(&fullname, "enum")?;

        Ok(AvroSchema::Enum(EnumSchema {
            name,
            namespace,
            symbols,
            doc: string_attr(obj, "doc"),
            aliases: aliases(obj),
        }))
    }

    /// Parse an array schema.
    fn parse_array_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let items = obj
            .get("items")
            .ok_or_else(|| SchemaError::InvalidSchema("Array missing 'items' field".to_string()))?;
        Ok(AvroSchema::Array(Box::new(self.parse(items)?)))
    }

    /// Parse a map schema.
    fn parse_map_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let values = obj
            .get("values")
            .ok_or_else(|| SchemaError::InvalidSchema("Map missing 'values' field".to_string()))?;
        Ok(AvroSchema::Map(Box::new(self.parse(values)?)))
    }

    /// Parse a fixed schema.
    fn parse_fixed_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let (name, namespace, fullname) = self.named_header(obj, "Fixed")?;

        let size = obj.get("size").and_then(|v| v.as_u64()).ok_or_else(|| {
            SchemaError::InvalidSchema(format!("Fixed '{}' missing 'size' field", fullname))
        })? as usize;

        self.define(&fullname, "fixed")?;

        Ok(AvroSchema::Fixed(FixedSchema {
            name,
            namespace,
            size,
            doc: string_attr(obj, "doc"),
            aliases: aliases(obj),
            custom_encoding: string_attr(obj, "customEncoding"),
        }))
    }

    /// Wrap an already parsed base type in its logical type annotation.
    ///
    /// Unknown logical types, and known ones on the wrong base, fall back to the base
    /// type as Avro requires.
    fn parse_logical_type(
        &self,
        obj: &Map<String, Value>,
        logical_value: &Value,
        base: AvroSchema,
    ) -> Result<AvroSchema, SchemaError> {
        let Some(logical_name) = logical_value.as_str() else {
            return Err(SchemaError::InvalidSchema(
                "logicalType must be a string".to_string(),
            ));
        };

        let logical_type = match (logical_name, &base) {
            ("decimal", AvroSchema::Bytes | AvroSchema::Fixed(_)) => {
                let precision = obj
                    .get("precision")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| {
                        SchemaError::InvalidSchema("Decimal missing 'precision'".to_string())
                    })? as u32;
                let scale = obj.get("scale").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                LogicalTypeName::Decimal { precision, scale }
            }
            ("uuid", AvroSchema::String | AvroSchema::Fixed(_)) => LogicalTypeName::Uuid,
            ("date", AvroSchema::Int) => LogicalTypeName::Date,
            ("time-millis", AvroSchema::Int) => LogicalTypeName::TimeMillis,
            ("time-micros", AvroSchema::Long) => LogicalTypeName::TimeMicros,
            ("timestamp-millis", AvroSchema::Long) => LogicalTypeName::TimestampMillis,
            ("timestamp-micros", AvroSchema::Long) => LogicalTypeName::TimestampMicros,
            ("duration", AvroSchema::Fixed(f)) if f.size == 12 => LogicalTypeName::Duration,
            _ => {
                warn!(logical_type = logical_name, "ignoring unsupported logical type");
                return Ok(base);
            }
        };

        Ok(AvroSchema::Logical(LogicalType::new(base, logical_type)))
    }

    /// Read and validate `name`/`namespace` of a named type.
    ///
    /// Returns the simple name, the effective namespace and the full name.
    fn named_header(
        &self,
        obj: &Map<String, Value>,
        context: &str,
    ) -> Result<(String, Option<String>, String), SchemaError> {
        let raw = string_attr(obj, "name").ok_or_else(|| {
            SchemaError::InvalidSchema(format!("{} missing 'name' field", context))
        })?;

        let (name, namespace) = match raw.rsplit_once('.') {
            Some((ns, simple)) => (simple.to_string(), Some(ns.to_string())),
            None => {
                let ns = string_attr(obj, "namespace").or_else(|| self.current_namespace.clone());
                (raw.clone(), ns.filter(|ns| !ns.is_empty()))
            }
        };

        self.validate_name(&name, context)?;
        if let Some(ns) = &namespace {
            for part in ns.split('.') {
                self.validate_name(part, "Namespace")?;
            }
        }

        let fullname = super::types::fullname(&name, namespace.as_deref());
        Ok((name, namespace, fullname))
    }

    fn define(&mut self, fullname: &str, kind: &'static str) -> Result<(), SchemaError> {
        if self.named_types.insert(fullname.to_string(), kind).is_some() {
            return Err(SchemaError::DuplicateName(fullname.to_string()));
        }
        Ok(())
    }

    /// Resolve a reference against the current namespace, then the null namespace.
    fn resolve_reference(&self, name: &str) -> Result<String, SchemaError> {
        if name.contains('.') {
            return if self.is_defined(name) {
                Ok(name.to_string())
            } else {
                Err(SchemaError::UnknownType(name.to_string()))
            };
        }
        if let Some(ns) = &self.current_namespace {
            let qualified = format!("{}.{}", ns, name);
            if self.is_defined(&qualified) {
                return Ok(qualified);
            }
        }
        if self.is_defined(name) {
            Ok(name.to_string())
        } else {
            Err(SchemaError::UnknownType(name.to_string()))
        }
    }

    /// Validate that a name follows Avro naming rules.
    fn validate_name(&self, name: &str, context: &str) -> Result<(), SchemaError> {
        let mut chars = name.chars();
        let problem = match chars.next() {
            None => Some(format!("{} name cannot be empty", context)),
            Some(first) if !first.is_ascii_alphabetic() && first != '_' => Some(format!(
                "{} name '{}' must start with a letter or underscore",
                context, name
            )),
            Some(_) => chars
                .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_')
                .map(|ch| {
                    format!(
                        "{} name '{}' contains invalid character '{}'",
                        context, name, ch
                    )
                }),
        };

        match problem {
            Some(msg) if self.strict_names => Err(SchemaError::InvalidSchema(msg)),
            Some(msg) => {
                warn!("{}", msg);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Enforce Avro's union rules: no nested unions, at most one branch per kind, with named
/// types told apart by full name.
fn validate_union(variants: &[AvroSchema]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for (i, variant) in variants.iter().enumerate() {
        let key = union_key(variant);
        if key == "union" {
            return Err(SchemaError::InvalidUnion(format!(
                "Union contains nested union at position {}",
                i
            )));
        }
        if !seen.insert(key.clone()) {
            return Err(SchemaError::InvalidUnion(format!(
                "Union contains duplicate type '{}' at position {}",
                key, i
            )));
        }
    }
    Ok(())
}

fn union_key(schema: &AvroSchema) -> String {
    match schema {
        AvroSchema::Record(_) | AvroSchema::Enum(_) | AvroSchema::Fixed(_) | AvroSchema::Named(_) => {
            schema.fullname().unwrap_or_default()
        }
        AvroSchema::Logical(lt) => union_key(&lt.base),
        other => other
            .kind()
            .map(|kind| kind.name().to_string())
            .unwrap_or_default(),
    }
}

fn string_attr(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn aliases(obj: &Map<String, Value>) -> Vec<String> {
    obj.get("aliases")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
