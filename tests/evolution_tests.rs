//! Schema evolution tests.
//!
//! Data is always written with the writer schema and read back through a resolved
//! `SchemaPair`, so the tokens follow the reader schema's shape.

use std::sync::Arc;

use jetcodec::schema::{FieldSchema, RecordSchema};
use jetcodec::{
    from_datum, from_datum_with, to_datum, AvroParser, AvroSchema, AvroValue, ParserConfig,
    Schema, SchemaError, SchemaPair, StreamError, Token,
};

// ============================================================================
// Helpers
// ============================================================================

fn schema(text: &str) -> Arc<Schema> {
    Arc::new(Schema::parse(text).expect("valid schema"))
}

fn record(name: &str, fields: &str) -> Arc<Schema> {
    schema(&format!(
        r#"{{"type": "record", "name": "{}", "fields": [{}]}}"#,
        name, fields
    ))
}

fn read_as(writer: &Arc<Schema>, reader: &Arc<Schema>, value: &AvroValue) -> AvroValue {
    let bytes = to_datum(writer, value).expect("encode");
    let pair = SchemaPair::resolve(Arc::clone(writer), Arc::clone(reader)).expect("resolve");
    let mut decoded = from_datum(&bytes, &pair).expect("decode");
    assert_eq!(decoded.len(), 1);
    decoded.remove(0)
}

// ============================================================================
// Field changes
// ============================================================================

#[test]
fn test_added_field_takes_default() {
    let writer = record("User", r#"{"name": "name", "type": "string"}"#);
    let reader = record(
        "User",
        r#"{"name": "name", "type": "string"},
           {"name": "tags", "type": {"type": "array", "items": "string"}, "default": ["new"]},
           {"name": "score", "type": "double", "default": 1.5}"#,
    );
    let value = AvroValue::object([("name", "ada".into())]);
    assert_eq!(
        read_as(&writer, &reader, &value),
        AvroValue::object([
            ("name", "ada".into()),
            ("tags", AvroValue::Array(vec!["new".into()])),
            ("score", 1.5.into()),
        ])
    );
}

#[test]
fn test_added_field_without_default_fails_to_resolve() {
    let writer = record("User", r#"{"name": "name", "type": "string"}"#);
    let reader = record(
        "User",
        r#"{"name": "name", "type": "string"}, {"name": "age", "type": "int"}"#,
    );
    assert!(matches!(
        SchemaPair::resolve(writer, reader),
        Err(SchemaError::IncompatibleSchemas(_))
    ));
}

#[test]
fn test_removed_field_is_skipped() {
    let writer = record(
        "User",
        r#"{"name": "legacy", "type": {"type": "map", "values": {"type": "array", "items": "long"}}},
           {"name": "name", "type": "string"}"#,
    );
    let reader = record("User", r#"{"name": "name", "type": "string"}"#);
    let value = AvroValue::object([
        (
            "legacy",
            AvroValue::object([("k", AvroValue::Array(vec![AvroValue::Long(1), AvroValue::Long(2)]))]),
        ),
        ("name", "grace".into()),
    ]);
    assert_eq!(
        read_as(&writer, &reader, &value),
        AvroValue::object([("name", "grace".into())])
    );
}

#[test]
fn test_removed_field_fails_when_strict() {
    let writer = record(
        "User",
        r#"{"name": "name", "type": "string"}, {"name": "legacy", "type": "int"}"#,
    );
    let reader = record("User", r#"{"name": "name", "type": "string"}"#);
    let bytes = to_datum(&writer, &AvroValue::object([("name", "x".into()), ("legacy", 1.into())]))
        .unwrap();
    let pair = SchemaPair::resolve(writer, reader).unwrap();

    let err = from_datum_with(&bytes, &pair, ParserConfig::new().strict()).unwrap_err();
    match err {
        StreamError::UnknownField { record, field } => {
            assert_eq!(record, "User");
            assert_eq!(field, "legacy");
        }
        other => panic!("expected UnknownField, got {:?}", other),
    }
}

#[test]
fn test_renamed_field_through_alias() {
    let writer = record("User", r#"{"name": "fullName", "type": "string"}"#);
    let reader = record(
        "User",
        r#"{"name": "display", "type": "string", "aliases": ["fullName"]}"#,
    );
    let value = AvroValue::object([("fullName", "hopper".into())]);
    assert_eq!(
        read_as(&writer, &reader, &value),
        AvroValue::object([("display", "hopper".into())])
    );
}

#[test]
fn test_alias_on_hand_built_reader() {
    let writer = record("User", r#"{"name": "fullName", "type": "string"}"#);
    let reader = Arc::new(
        Schema::new(AvroSchema::Record(RecordSchema::new(
            "User",
            vec![
                FieldSchema::new("display", AvroSchema::String).with_alias("fullName"),
                FieldSchema::new("visits", AvroSchema::Int).with_default(serde_json::json!(0)),
            ],
        )))
        .unwrap(),
    );
    let value = AvroValue::object([("fullName", "lovelace".into())]);
    assert_eq!(
        read_as(&writer, &reader, &value),
        AvroValue::object([("display", "lovelace".into()), ("visits", 0.into())])
    );
}

#[test]
fn test_reordered_fields_follow_reader_order() {
    let writer = record(
        "P",
        r#"{"name": "a", "type": "int"}, {"name": "b", "type": "string"}"#,
    );
    let reader = record(
        "P",
        r#"{"name": "b", "type": "string"}, {"name": "a", "type": "int"}"#,
    );
    let bytes = to_datum(&writer, &AvroValue::object([("a", 1.into()), ("b", "x".into())])).unwrap();
    let pair = SchemaPair::resolve(writer, reader).unwrap();
    let mut parser = AvroParser::raw(&bytes[..], pair, ParserConfig::default()).unwrap();

    let mut names = Vec::new();
    while parser.next_token().unwrap() != Token::EndOfStream {
        if parser.current_token() == Some(Token::FieldName) {
            names.push(parser.current_name().unwrap().to_string());
        }
    }
    // Writer order on the wire, tokens named by the reader.
    assert_eq!(names, vec!["a", "b"]);
}

// ============================================================================
// Type promotion
// ============================================================================

#[test]
fn test_numeric_promotions() {
    let cases = [
        (r#""int""#, r#""long""#, AvroValue::Int(-3), AvroValue::Long(-3)),
        (r#""int""#, r#""double""#, AvroValue::Int(7), AvroValue::Double(7.0)),
        (r#""long""#, r#""float""#, AvroValue::Long(2), AvroValue::Float(2.0)),
        (r#""float""#, r#""double""#, AvroValue::Float(0.25), AvroValue::Double(0.25)),
    ];
    for (w, r, written, expected) in cases {
        assert_eq!(read_as(&schema(w), &schema(r), &written), expected, "{} -> {}", w, r);
    }
}

#[test]
fn test_string_bytes_interchange() {
    assert_eq!(
        read_as(&schema(r#""string""#), &schema(r#""bytes""#), &"hi".into()),
        AvroValue::Bytes(b"hi".to_vec())
    );
    assert_eq!(
        read_as(
            &schema(r#""bytes""#),
            &schema(r#""string""#),
            &AvroValue::Bytes(b"ok".to_vec())
        ),
        "ok".into()
    );
}

#[test]
fn test_narrowing_is_incompatible() {
    assert!(SchemaPair::resolve(schema(r#""long""#), schema(r#""int""#)).is_err());
    assert!(SchemaPair::resolve(schema(r#""string""#), schema(r#""int""#)).is_err());
}

// ============================================================================
// Enums and unions
// ============================================================================

#[test]
fn test_enum_missing_symbol_fails_when_read() {
    let writer = schema(r#"{"type": "enum", "name": "Color", "symbols": ["RED", "GREEN", "BLUE"]}"#);
    let reader = schema(r#"{"type": "enum", "name": "Color", "symbols": ["BLUE", "RED"]}"#);
    let pair = SchemaPair::resolve(Arc::clone(&writer), reader).unwrap();

    let red = to_datum(&writer, &"RED".into()).unwrap();
    assert_eq!(from_datum(&red, &pair).unwrap(), vec!["RED".into()]);

    let green = to_datum(&writer, &"GREEN".into()).unwrap();
    let err = from_datum(&green, &pair).unwrap_err();
    assert!(err.is_resolution(), "unexpected error: {:?}", err);
}

#[test]
fn test_writer_union_branch_unreadable_only_when_present() {
    let writer = schema(r#"["null", "string", "int"]"#);
    let reader = schema(r#"["null", "long"]"#);
    let pair = SchemaPair::resolve(Arc::clone(&writer), reader).unwrap();

    let null = to_datum(&writer, &AvroValue::Null).unwrap();
    assert_eq!(from_datum(&null, &pair).unwrap(), vec![AvroValue::Null]);

    let int = to_datum(&writer, &AvroValue::Int(12)).unwrap();
    assert_eq!(from_datum(&int, &pair).unwrap(), vec![AvroValue::Long(12)]);

    let text = to_datum(&writer, &"nope".into()).unwrap();
    assert!(from_datum(&text, &pair).unwrap_err().is_resolution());
}

#[test]
fn test_plain_writer_into_reader_union() {
    let writer = schema(r#""int""#);
    let reader = schema(r#"["null", "long"]"#);
    assert_eq!(
        read_as(&writer, &reader, &AvroValue::Int(5)),
        AvroValue::Long(5)
    );
}

#[test]
fn test_nullable_field_added_defaults_to_null() {
    let writer = record("R", r#"{"name": "a", "type": "int"}"#);
    let reader = record(
        "R",
        r#"{"name": "a", "type": "int"}, {"name": "note", "type": ["null", "string"], "default": null}"#,
    );
    assert_eq!(
        read_as(&writer, &reader, &AvroValue::object([("a", 1.into())])),
        AvroValue::object([("a", 1.into()), ("note", AvroValue::Null)])
    );
}

#[test]
fn test_named_type_mismatch_is_incompatible() {
    let writer = record("A", r#"{"name": "x", "type": "int"}"#);
    let reader = record("B", r#"{"name": "x", "type": "int"}"#);
    assert!(matches!(
        SchemaPair::resolve(writer, reader),
        Err(SchemaError::IncompatibleSchemas(_))
    ));
}
