//! Avro schema tree.
//!
//! `AvroSchema` is the shape the JSON parser produces and the shape users build by
//! hand. It still carries named-type references by name; [`Schema`](super::Schema)
//! compiles it into an arena where those references become node indices.

use serde_json::{json, Map, Value};

/// Represents an Avro schema as declared.
#[derive(Debug, Clone, PartialEq)]
pub enum AvroSchema {
    /// Null type - no value.
    Null,
    /// Boolean type.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE 754 floating-point.
    Float,
    /// 64-bit IEEE 754 floating-point.
    Double,
    /// Sequence of bytes.
    Bytes,
    /// Unicode string.
    String,

    /// Record type with named fields.
    Record(RecordSchema),
    /// Enumeration type.
    Enum(EnumSchema),
    /// Array of items with a single schema.
    Array(Box<AvroSchema>),
    /// Map with string keys and values of a single schema.
    Map(Box<AvroSchema>),
    /// Union of multiple schemas.
    Union(Vec<AvroSchema>),
    /// Fixed-size byte array.
    Fixed(FixedSchema),

    /// Reference to a named type by its fully qualified name.
    Named(String),

    /// Logical type annotation over a base type.
    Logical(LogicalType),
}

/// Coarse classification of a schema, used for union rules and branch matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Record,
    Enum,
    Array,
    Map,
    Union,
    Fixed,
}

impl SchemaKind {
    /// The Avro type name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::Null => "null",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Int => "int",
            SchemaKind::Long => "long",
            SchemaKind::Float => "float",
            SchemaKind::Double => "double",
            SchemaKind::Bytes => "bytes",
            SchemaKind::String => "string",
            SchemaKind::Record => "record",
            SchemaKind::Enum => "enum",
            SchemaKind::Array => "array",
            SchemaKind::Map => "map",
            SchemaKind::Union => "union",
            SchemaKind::Fixed => "fixed",
        }
    }

    /// Whether values of this kind are identified by name rather than by kind alone.
    pub fn is_named(&self) -> bool {
        matches!(self, SchemaKind::Record | SchemaKind::Enum | SchemaKind::Fixed)
    }
}

/// Schema for a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    /// The name of the record.
    pub name: String,
    /// Optional namespace for the record.
    pub namespace: Option<String>,
    /// The fields of the record.
    pub fields: Vec<FieldSchema>,
    /// Optional documentation.
    pub doc: Option<String>,
    /// Aliases for this record.
    pub aliases: Vec<String>,
    /// Key of a registered custom encoding that reads and writes this record.
    pub custom_encoding: Option<String>,
}

impl RecordSchema {
    /// Create a new RecordSchema with the given name and fields.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            fields,
            doc: None,
            aliases: Vec::new(),
            custom_encoding: None,
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Route reads and writes of this record through a custom encoding.
    pub fn with_custom_encoding(mut self, key: impl Into<String>) -> Self {
        self.custom_encoding = Some(key.into());
        self
    }

    /// Get the fully qualified name.
    pub fn fullname(&self) -> String {
        fullname(&self.name, self.namespace.as_deref())
    }

    /// Serialize the record schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        let mut obj = named_header(
            "record",
            &self.name,
            self.namespace.as_deref(),
            self.doc.as_deref(),
            &self.aliases,
        );
        let fields: Vec<Value> = self.fields.iter().map(|f| f.to_json_value()).collect();
        obj.insert("fields".to_string(), Value::Array(fields));
        if let Some(key) = &self.custom_encoding {
            obj.insert("customEncoding".to_string(), json!(key));
        }
        Value::Object(obj)
    }
}

/// Schema for a field within a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// The name of the field.
    pub name: String,
    /// The schema of the field's value.
    pub schema: AvroSchema,
    /// Optional default value for the field, as declared in JSON.
    pub default: Option<Value>,
    /// Optional documentation.
    pub doc: Option<String>,
    /// Field ordering (ascending, descending, ignore).
    pub order: FieldOrder,
    /// Aliases for this field.
    pub aliases: Vec<String>,
}

impl FieldSchema {
    /// Create a new FieldSchema with the given name and schema.
    pub fn new(name: impl Into<String>, schema: AvroSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            default: None,
            doc: None,
            order: FieldOrder::Ascending,
            aliases: Vec::new(),
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Add an alias the field can be matched by during resolution.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Serialize the field schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("name".to_string(), json!(&self.name));
        obj.insert("type".to_string(), self.schema.to_json_value());

        if let Some(default) = &self.default {
            obj.insert("default".to_string(), default.clone());
        }
        if let Some(doc) = &self.doc {
            obj.insert("doc".to_string(), json!(doc));
        }
        if self.order != FieldOrder::Ascending {
            obj.insert("order".to_string(), json!(self.order.name()));
        }
        if !self.aliases.is_empty() {
            obj.insert("aliases".to_string(), json!(&self.aliases));
        }

        Value::Object(obj)
    }
}

/// Field ordering for record comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldOrder {
    #[default]
    Ascending,
    Descending,
    Ignore,
}

impl FieldOrder {
    fn name(&self) -> &'static str {
        match self {
            FieldOrder::Ascending => "ascending",
            FieldOrder::Descending => "descending",
            FieldOrder::Ignore => "ignore",
        }
    }
}

/// Schema for an enumeration type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    /// The name of the enum.
    pub name: String,
    /// Optional namespace for the enum.
    pub namespace: Option<String>,
    /// The symbols of the enum, in wire index order.
    pub symbols: Vec<String>,
    /// Optional documentation.
    pub doc: Option<String>,
    /// Aliases for this enum.
    pub aliases: Vec<String>,
}

impl EnumSchema {
    /// Create a new EnumSchema with the given name and symbols.
    pub fn new(name: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            symbols,
            doc: None,
            aliases: Vec::new(),
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Get the fully qualified name.
    pub fn fullname(&self) -> String {
        fullname(&self.name, self.namespace.as_deref())
    }

    /// Serialize the enum schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        let mut obj = named_header(
            "enum",
            &self.name,
            self.namespace.as_deref(),
            self.doc.as_deref(),
            &self.aliases,
        );
        obj.insert("symbols".to_string(), json!(&self.symbols));
        Value::Object(obj)
    }
}

/// Schema for a fixed-size byte array.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedSchema {
    /// The name of the fixed type.
    pub name: String,
    /// Optional namespace for the fixed type.
    pub namespace: Option<String>,
    /// The size in bytes.
    pub size: usize,
    /// Optional documentation.
    pub doc: Option<String>,
    /// Aliases for this fixed type.
    pub aliases: Vec<String>,
    /// Key of a registered custom encoding that reads and writes this value.
    pub custom_encoding: Option<String>,
}

impl FixedSchema {
    /// Create a new FixedSchema with the given name and size.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            size,
            doc: None,
            aliases: Vec::new(),
            custom_encoding: None,
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Route reads and writes of this value through a custom encoding.
    pub fn with_custom_encoding(mut self, key: impl Into<String>) -> Self {
        self.custom_encoding = Some(key.into());
        self
    }

    /// Get the fully qualified name.
    pub fn fullname(&self) -> String {
        fullname(&self.name, self.namespace.as_deref())
    }

    /// Serialize the fixed schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        let mut obj = named_header(
            "fixed",
            &self.name,
            self.namespace.as_deref(),
            self.doc.as_deref(),
            &self.aliases,
        );
        obj.insert("size".to_string(), json!(self.size));
        if let Some(key) = &self.custom_encoding {
            obj.insert("customEncoding".to_string(), json!(key));
        }
        Value::Object(obj)
    }
}

/// Logical type annotation around a base schema.
///
/// Logical types do not change the wire shape; the compiled schema uses the base.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalType {
    /// The underlying Avro schema.
    pub base: Box<AvroSchema>,
    /// The logical type name and parameters.
    pub logical_type: LogicalTypeName,
}

impl LogicalType {
    /// Create a new LogicalType.
    pub fn new(base: AvroSchema, logical_type: LogicalTypeName) -> Self {
        Self {
            base: Box::new(base),
            logical_type,
        }
    }

    /// Serialize as the base type object plus `logicalType` and its parameters.
    pub fn to_json_value(&self) -> Value {
        let mut obj = match self.base.to_json_value() {
            Value::Object(m) => m,
            other => {
                let mut m = Map::new();
                m.insert("type".to_string(), other);
                m
            }
        };

        obj.insert("logicalType".to_string(), json!(self.logical_type.name()));
        if let LogicalTypeName::Decimal { precision, scale } = &self.logical_type {
            obj.insert("precision".to_string(), json!(precision));
            if *scale > 0 {
                obj.insert("scale".to_string(), json!(scale));
            }
        }

        Value::Object(obj)
    }
}

/// Logical type names with their parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalTypeName {
    /// Decimal with precision and scale.
    Decimal { precision: u32, scale: u32 },
    /// UUID (string or fixed[16]).
    Uuid,
    /// Days since Unix epoch.
    Date,
    /// Time of day in milliseconds.
    TimeMillis,
    /// Time of day in microseconds.
    TimeMicros,
    /// Milliseconds since Unix epoch.
    TimestampMillis,
    /// Microseconds since Unix epoch.
    TimestampMicros,
    /// Months, days, milliseconds in a fixed[12].
    Duration,
}

impl LogicalTypeName {
    /// Get the string name of the logical type.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalTypeName::Decimal { .. } => "decimal",
            LogicalTypeName::Uuid => "uuid",
            LogicalTypeName::Date => "date",
            LogicalTypeName::TimeMillis => "time-millis",
            LogicalTypeName::TimeMicros => "time-micros",
            LogicalTypeName::TimestampMillis => "timestamp-millis",
            LogicalTypeName::TimestampMicros => "timestamp-micros",
            LogicalTypeName::Duration => "duration",
        }
    }
}

impl AvroSchema {
    /// Check if this schema is a primitive type.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            AvroSchema::Null
                | AvroSchema::Boolean
                | AvroSchema::Int
                | AvroSchema::Long
                | AvroSchema::Float
                | AvroSchema::Double
                | AvroSchema::Bytes
                | AvroSchema::String
        )
    }

    /// Check if this schema is a named type definition (record, enum, or fixed).
    pub fn is_named(&self) -> bool {
        matches!(
            self,
            AvroSchema::Record(_) | AvroSchema::Enum(_) | AvroSchema::Fixed(_)
        )
    }

    /// Get the fully qualified name of a named type or reference, if applicable.
    pub fn fullname(&self) -> Option<String> {
        match self {
            AvroSchema::Record(r) => Some(r.fullname()),
            AvroSchema::Enum(e) => Some(e.fullname()),
            AvroSchema::Fixed(f) => Some(f.fullname()),
            AvroSchema::Named(n) => Some(n.clone()),
            AvroSchema::Logical(l) => l.base.fullname(),
            _ => None,
        }
    }

    /// The kind of this schema, or `None` for an unresolved named reference.
    pub fn kind(&self) -> Option<SchemaKind> {
        Some(match self {
            AvroSchema::Null => SchemaKind::Null,
            AvroSchema::Boolean => SchemaKind::Boolean,
            AvroSchema::Int => SchemaKind::Int,
            AvroSchema::Long => SchemaKind::Long,
            AvroSchema::Float => SchemaKind::Float,
            AvroSchema::Double => SchemaKind::Double,
            AvroSchema::Bytes => SchemaKind::Bytes,
            AvroSchema::String => SchemaKind::String,
            AvroSchema::Record(_) => SchemaKind::Record,
            AvroSchema::Enum(_) => SchemaKind::Enum,
            AvroSchema::Array(_) => SchemaKind::Array,
            AvroSchema::Map(_) => SchemaKind::Map,
            AvroSchema::Union(_) => SchemaKind::Union,
            AvroSchema::Fixed(_) => SchemaKind::Fixed,
            AvroSchema::Named(_) => return None,
            AvroSchema::Logical(l) => return l.base.kind(),
        })
    }

    /// Check if this schema represents a nullable type (union with null).
    pub fn is_nullable(&self) -> bool {
        match self {
            AvroSchema::Union(variants) => variants.iter().any(|v| matches!(v, AvroSchema::Null)),
            _ => false,
        }
    }

    /// Serialize the schema to a JSON string.
    ///
    /// # Example
    /// ```
    /// use jetcodec::schema::AvroSchema;
    ///
    /// let schema = AvroSchema::Array(Box::new(AvroSchema::Long));
    /// assert_eq!(schema.to_json(), r#"{"items":"long","type":"array"}"#);
    /// ```
    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Serialize the schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        match self {
            AvroSchema::Null => json!("null"),
            AvroSchema::Boolean => json!("boolean"),
            AvroSchema::Int => json!("int"),
            AvroSchema::Long => json!("long"),
            AvroSchema::Float => json!("float"),
            AvroSchema::Double => json!("double"),
            AvroSchema::Bytes => json!("bytes"),
            AvroSchema::String => json!("string"),

            AvroSchema::Record(r) => r.to_json_value(),
            AvroSchema::Enum(e) => e.to_json_value(),
            AvroSchema::Array(items) => json!({
                "type": "array",
                "items": items.to_json_value()
            }),
            AvroSchema::Map(values) => json!({
                "type": "map",
                "values": values.to_json_value()
            }),
            AvroSchema::Union(variants) => {
                Value::Array(variants.iter().map(|v| v.to_json_value()).collect())
            }
            AvroSchema::Fixed(f) => f.to_json_value(),
            AvroSchema::Named(name) => json!(name),
            AvroSchema::Logical(lt) => lt.to_json_value(),
        }
    }
}

/// Join a name and an optional namespace.
pub(crate) fn fullname(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() && !name.contains('.') => format!("{}.{}", ns, name),
        _ => name.to_string(),
    }
}

/// The attributes every named type serializes the same way.
fn named_header(
    type_name: &str,
    name: &str,
    namespace: Option<&str>,
    doc: Option<&str>,
    aliases: &[String],
) -> Map<String, Value> {
    let mut obj = Map::new();
    obj.insert("type".to_string(), json!(type_name));
    obj.insert("name".to_string(), json!(name));
    if let Some(ns) = namespace {
        obj.insert("namespace".to_string(), json!(ns));
    }
    if let Some(doc) = doc {
        obj.insert("doc".to_string(), json!(doc));
    }
    if !aliases.is_empty() {
        obj.insert("aliases".to_string(), json!(aliases));
    }
    obj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullname_joins_namespace() {
        let record = RecordSchema::new("Point", vec![]).with_namespace("geo");
        assert_eq!(record.fullname(), "geo.Point");
        assert_eq!(RecordSchema::new("Point", vec![]).fullname(), "Point");
    }

    #[test]
    fn test_fullname_keeps_dotted_name() {
        let fixed = FixedSchema::new("a.b.Hash", 16).with_namespace("ignored");
        assert_eq!(fixed.fullname(), "a.b.Hash");
    }

    #[test]
    fn test_logical_kind_is_base_kind() {
        let schema = AvroSchema::Logical(LogicalType::new(AvroSchema::Int, LogicalTypeName::Date));
        assert_eq!(schema.kind(), Some(SchemaKind::Int));
        assert_eq!(AvroSchema::Named("X".into()).kind(), None);
    }

    #[test]
    fn test_record_to_json_includes_custom_encoding() {
        let record = RecordSchema::new("Money", vec![FieldSchema::new("cents", AvroSchema::Long)])
            .with_custom_encoding("money");
        let json = record.to_json_value();
        assert_eq!(json["customEncoding"], "money");
        assert_eq!(json["fields"][0]["type"], "long");
    }

    #[test]
    fn test_field_to_json_default_and_order() {
        let mut field = FieldSchema::new("n", AvroSchema::Int).with_default(json!(7));
        field.order = FieldOrder::Descending;
        let json = field.to_json_value();
        assert_eq!(json["default"], 7);
        assert_eq!(json["order"], "descending");
    }

    #[test]
    fn test_decimal_to_json() {
        let schema = AvroSchema::Logical(LogicalType::new(
            AvroSchema::Bytes,
            LogicalTypeName::Decimal {
                precision: 9,
                scale: 2,
            },
        ));
        let json = schema.to_json_value();
        assert_eq!(json["type"], "bytes");
        assert_eq!(json["logicalType"], "decimal");
        assert_eq!(json["precision"], 9);
        assert_eq!(json["scale"], 2);
    }
}
