//! Push-based token encoder.
//!
//! [`AvroGenerator`] validates every token against the write context and the compiled
//! schema before committing bytes. Datums are buffered in a recycled encoder and handed to
//! the sink (or the container block) once complete.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use tracing::{debug, trace};

use super::config::GeneratorConfig;
use super::context::{FieldState, WriteContextStack, WriteFrame};
use super::token::{Event, Number, Token};
use crate::container::ContainerWriter;
use crate::custom::CustomEncodings;
use crate::error::{EncodeError, StreamError};
use crate::io::{acquire_encoder, BinaryEncoder};
use crate::schema::{FieldNode, Node, NodeId, Schema};
use crate::value::{AvroValue, ValueBuilder};

enum Output<W: Write> {
    Raw(W),
    Container(ContainerWriter<W>),
}

/// A custom-encoded value being assembled from tokens.
struct Capture {
    key: String,
    builder: ValueBuilder,
}

/// Writes a token stream as datums of one schema.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use jetcodec::{AvroGenerator, GeneratorConfig, Schema};
///
/// let schema = Arc::new(Schema::parse(r#"{"type": "record", "name": "Point", "fields": [
///     {"name": "x", "type": "int"}, {"name": "y", "type": "int"}
/// ]}"#).unwrap());
/// let mut generator = AvroGenerator::new(Vec::new(), schema, GeneratorConfig::default()).unwrap();
/// generator.write_start_object().unwrap();
/// generator.write_field_name("x").unwrap();
/// generator.write_int(1).unwrap();
/// generator.write_field_name("y").unwrap();
/// generator.write_int(-1).unwrap();
/// generator.write_end_object().unwrap();
///
/// assert_eq!(generator.finish().unwrap(), vec![0x02, 0x01]);
/// ```
pub struct AvroGenerator<W: Write> {
    output: Output<W>,
    schema: Arc<Schema>,
    encoder: BinaryEncoder,
    stack: WriteContextStack,
    config: GeneratorConfig,
    type_hint: Option<String>,
    capture: Option<Capture>,
    /// Encoded defaults by (record node, field index).
    defaults: HashMap<(NodeId, usize), Vec<u8>>,
    datums: u64,
}

impl<W: Write> AvroGenerator<W> {
    /// Create a generator writing datums of `schema` to `sink`.
    ///
    /// In container mode the file header is written immediately.
    ///
    /// # Errors
    /// `StreamError::Configuration` for invalid options or a missing custom encoding.
    pub fn new(sink: W, schema: Arc<Schema>, config: GeneratorConfig) -> Result<Self, StreamError> {
        config.validate()?;
        config.custom.validate_schema(&schema)?;
        let output = match &config.container {
            Some(options) => Output::Container(ContainerWriter::new(sink, &schema, options)?),
            None => Output::Raw(sink),
        };
        debug!(
            container = config.container.is_some(),
            block_size = ?config.block_size,
            "opened token generator"
        );
        Ok(Self {
            output,
            schema,
            encoder: acquire_encoder(),
            stack: WriteContextStack::new(),
            config,
            type_hint: None,
            capture: None,
            defaults: HashMap::new(),
            datums: 0,
        })
    }

    // ========================================================================
    // Token writers
    // ========================================================================

    pub fn write_start_object(&mut self) -> Result<(), StreamError> {
        self.write_event(Event::StartObject)
    }

    pub fn write_end_object(&mut self) -> Result<(), StreamError> {
        self.write_event(Event::EndObject)
    }

    pub fn write_start_array(&mut self) -> Result<(), StreamError> {
        self.write_event(Event::StartArray)
    }

    pub fn write_end_array(&mut self) -> Result<(), StreamError> {
        self.write_event(Event::EndArray)
    }

    /// Write a record field name or map key.
    pub fn write_field_name(&mut self, name: &str) -> Result<(), StreamError> {
        self.write_event(Event::FieldName(name.to_string()))
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), StreamError> {
        self.write_event(Event::String(value.to_string()))
    }

    pub fn write_int(&mut self, value: i32) -> Result<(), StreamError> {
        self.write_event(Event::Number(Number::Int(value)))
    }

    pub fn write_long(&mut self, value: i64) -> Result<(), StreamError> {
        self.write_event(Event::Number(Number::Long(value)))
    }

    pub fn write_float(&mut self, value: f32) -> Result<(), StreamError> {
        self.write_event(Event::Number(Number::Float(value)))
    }

    pub fn write_double(&mut self, value: f64) -> Result<(), StreamError> {
        self.write_event(Event::Number(Number::Double(value)))
    }

    pub fn write_number(&mut self, value: Number) -> Result<(), StreamError> {
        self.write_event(Event::Number(value))
    }

    pub fn write_boolean(&mut self, value: bool) -> Result<(), StreamError> {
        self.write_event(Event::Boolean(value))
    }

    pub fn write_null(&mut self) -> Result<(), StreamError> {
        self.write_event(Event::Null)
    }

    pub fn write_binary(&mut self, value: &[u8]) -> Result<(), StreamError> {
        self.write_event(Event::Binary(value.to_vec()))
    }

    /// Select the union branch of the next value by type name: the full or simple name of
    /// a named type, or a primitive type name.
    ///
    /// The hint applies to the next value only.
    pub fn write_type_name(&mut self, name: &str) {
        self.type_hint = Some(name.to_string());
    }

    /// Write a whole value.
    pub fn write_value(&mut self, value: &AvroValue) -> Result<(), StreamError> {
        let mut events = Vec::new();
        value.push_events(&mut events);
        events.into_iter().try_for_each(|event| self.write_event(event))
    }

    /// Write one token with its payload.
    pub fn write_event(&mut self, event: Event) -> Result<(), StreamError> {
        if let Some(mut capture) = self.capture.take() {
            return match capture.builder.push(event)? {
                Some(value) => self.write_custom(&capture.key, &value),
                None => {
                    self.capture = Some(capture);
                    Ok(())
                }
            };
        }

        match self.stack.top() {
            None => {
                let token = event.token();
                if !token.is_scalar() && !token.is_struct_start() {
                    return Err(StreamError::structural(format!(
                        "{:?} written outside any structure",
                        token
                    )));
                }
                let root = self.schema.root();
                self.begin_value(root, event)
            }
            Some(WriteFrame::Discard) => self.discard(event),
            Some(WriteFrame::Record { .. }) => self.record_event(event),
            Some(WriteFrame::Array { .. }) => self.array_event(event),
            Some(WriteFrame::Map { .. }) => self.map_event(event),
        }
    }

    fn record_event(&mut self, event: Event) -> Result<(), StreamError> {
        let schema = Arc::clone(&self.schema);
        let position = self.encoder.len();
        let Some(WriteFrame::Record {
            node,
            spans,
            state,
            value_start,
            ..
        }) = self.stack.top_mut()
        else {
            return Err(StreamError::structural("Record event outside a record"));
        };
        let Node::Record {
            fullname, fields, ..
        } = schema.node(*node)
        else {
            return Err(StreamError::structural("Record scope over a non-record node"));
        };

        match event {
            Event::FieldName(name) => {
                if *state != FieldState::Name {
                    return Err(StreamError::structural(format!(
                        "Field name '{}' written where a value was expected",
                        name
                    )));
                }
                match fields.iter().position(|f| f.name == name) {
                    Some(i) if spans[i].is_some() => Err(StreamError::structural(format!(
                        "Field '{}' of record '{}' written twice",
                        name, fullname
                    ))),
                    Some(i) => {
                        *state = FieldState::Value(i);
                        Ok(())
                    }
                    None if self.config.ignore_unknown => {
                        trace!(record = %fullname, field = %name, "dropping undeclared field");
                        *state = FieldState::Discard;
                        Ok(())
                    }
                    None => Err(StreamError::UnknownField {
                        record: fullname.clone(),
                        field: name,
                    }),
                }
            }
            Event::EndObject if *state == FieldState::Name => self.close_record(),
            Event::EndObject | Event::EndArray => Err(StreamError::structural(format!(
                "{:?} written while field '{}' of record '{}' awaits a value",
                event.token(),
                pending_name(fields, *state),
                fullname
            ))),
            event => match *state {
                FieldState::Name => Err(StreamError::structural(format!(
                    "Value written where a field name of record '{}' was expected",
                    fullname
                ))),
                FieldState::Discard => {
                    self.type_hint = None;
                    if event.token().is_struct_start() {
                        self.stack.push(WriteFrame::Discard);
                    } else {
                        *state = FieldState::Name;
                    }
                    Ok(())
                }
                FieldState::Value(i) => {
                    *value_start = position;
                    let field = fields[i].node;
                    self.begin_value(field, event)
                }
            },
        }
    }

    fn array_event(&mut self, event: Event) -> Result<(), StreamError> {
        match event {
            Event::EndArray => self.close_blocks(),
            Event::FieldName(_) | Event::EndObject => Err(StreamError::structural(format!(
                "{:?} written inside an array",
                event.token()
            ))),
            event => {
                let item = match self.stack.top() {
                    Some(WriteFrame::Array { item, .. }) => *item,
                    _ => return Err(StreamError::structural("Array event outside an array")),
                };
                self.next_block_item();
                self.begin_value(item, event)
            }
        }
    }

    fn map_event(&mut self, event: Event) -> Result<(), StreamError> {
        let Some(WriteFrame::Map {
            value, awaiting, ..
        }) = self.stack.top_mut()
        else {
            return Err(StreamError::structural("Map event outside a map"));
        };
        let value = *value;

        match event {
            Event::FieldName(key) => {
                if *awaiting {
                    return Err(StreamError::structural(format!(
                        "Map key '{}' written where a value was expected",
                        key
                    )));
                }
                *awaiting = true;
                self.next_block_item();
                self.encoder.write_string(&key);
                Ok(())
            }
            Event::EndObject if !*awaiting => self.close_blocks(),
            Event::EndObject | Event::EndArray => Err(StreamError::structural(format!(
                "{:?} written while a map value is pending",
                event.token()
            ))),
            event => {
                if !*awaiting {
                    return Err(StreamError::structural("Map value written without a key"));
                }
                *awaiting = false;
                self.begin_value(value, event)
            }
        }
    }

    fn discard(&mut self, event: Event) -> Result<(), StreamError> {
        // A type name set for a dropped value must not reach the next kept one.
        self.type_hint = None;
        match event.token() {
            Token::StartObject | Token::StartArray => self.stack.push(WriteFrame::Discard),
            Token::EndObject | Token::EndArray => {
                self.stack.pop();
                if let Some(WriteFrame::Record { state, .. }) = self.stack.top_mut() {
                    if *state == FieldState::Discard {
                        *state = FieldState::Name;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Start a value of `node`: select the union branch, then write a scalar or open a
    /// structure.
    fn begin_value(&mut self, node: NodeId, event: Event) -> Result<(), StreamError> {
        let schema = Arc::clone(&self.schema);
        let hint = self.type_hint.take();
        let mut node = node;
        if let Node::Union(branches) = schema.node(node) {
            let index = select_branch(&schema, branches, &event, hint.as_deref())?;
            self.encoder.write_long(index as i64);
            node = branches[index];
        }

        if let Some(key) = schema.node(node).custom_encoding() {
            let mut builder = ValueBuilder::new();
            return match builder.push(event)? {
                Some(value) => self.write_custom(key, &value),
                None => {
                    self.capture = Some(Capture {
                        key: key.to_string(),
                        builder,
                    });
                    Ok(())
                }
            };
        }

        match (schema.node(node), event) {
            (Node::Null, Event::Null) => {}
            (Node::Boolean, Event::Boolean(b)) => self.encoder.write_boolean(b),
            (Node::Int, Event::Number(n)) => self.encoder.write_int(int_of(n)?),
            (Node::Long, Event::Number(n)) => self.encoder.write_long(long_of(n)?),
            (Node::Float, Event::Number(n)) => self.encoder.write_float(n.as_f64() as f32),
            (Node::Double, Event::Number(n)) => self.encoder.write_double(n.as_f64()),
            (Node::Bytes, Event::Binary(b)) => self.encoder.write_bytes(&b),
            (Node::Bytes, Event::String(s)) => self.encoder.write_bytes(s.as_bytes()),
            (Node::String, Event::String(s)) => self.encoder.write_string(&s),
            (Node::Fixed { size, .. }, Event::Binary(b)) => self.encoder.write_fixed(&b, *size)?,
            (Node::Enum { fullname, symbols, .. }, Event::String(s)) => {
                let index = symbols.iter().position(|sym| *sym == s).ok_or_else(|| {
                    EncodeError::InvalidValue(format!(
                        "'{}' is not a symbol of enum '{}'",
                        s, fullname
                    ))
                })?;
                self.encoder.write_int(index as i32);
            }
            (Node::Array(item), Event::StartArray) => {
                self.stack.push(WriteFrame::array(*item, self.encoder.len()));
                return Ok(());
            }
            (Node::Map(value), Event::StartObject) => {
                self.stack.push(WriteFrame::map(*value, self.encoder.len()));
                return Ok(());
            }
            (Node::Record { fields, .. }, Event::StartObject) => {
                self.stack
                    .push(WriteFrame::record(node, self.encoder.len(), fields.len()));
                return Ok(());
            }
            (other, event) => {
                return Err(EncodeError::TypeMismatch(format!(
                    "{:?} cannot be written as {}",
                    event.token(),
                    describe(other)
                ))
                .into())
            }
        }
        self.value_done()
    }

    fn write_custom(&mut self, key: &str, value: &AvroValue) -> Result<(), StreamError> {
        let plugin = self.config.custom.get(key).cloned().ok_or_else(|| {
            StreamError::Configuration(format!("No custom encoding registered under '{}'", key))
        })?;
        plugin.write(value, &mut self.encoder)?;
        self.value_done()
    }

    /// Record the end of a value in its enclosing scope.
    fn value_done(&mut self) -> Result<(), StreamError> {
        let end = self.encoder.len();
        match self.stack.top_mut() {
            None => self.end_datum(),
            Some(WriteFrame::Record {
                spans,
                state,
                value_start,
                ..
            }) => {
                if let FieldState::Value(i) = *state {
                    spans[i] = Some((*value_start, end));
                }
                *state = FieldState::Name;
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    fn end_datum(&mut self) -> Result<(), StreamError> {
        self.datums += 1;
        match &mut self.output {
            Output::Raw(sink) => self.encoder.drain_to(sink)?,
            Output::Container(writer) => writer.append_from(&mut self.encoder)?,
        }
        Ok(())
    }

    // ========================================================================
    // Structure ends
    // ========================================================================

    /// Count one more array item or map entry, closing the block when it is full.
    fn next_block_item(&mut self) {
        let limit = self.config.block_size;
        let byte_sizes = self.config.block_byte_sizes;
        let Some(
            WriteFrame::Array {
                block_start, count, ..
            }
            | WriteFrame::Map {
                block_start, count, ..
            },
        ) = self.stack.top_mut()
        else {
            return;
        };
        if limit.is_some_and(|limit| *count >= limit as u64) {
            self.encoder
                .insert_block_header(*block_start, *count, byte_sizes);
            *block_start = self.encoder.len();
            *count = 0;
        }
        *count += 1;
    }

    fn close_blocks(&mut self) -> Result<(), StreamError> {
        let (block_start, count) = match self.stack.pop() {
            Some(WriteFrame::Array {
                block_start, count, ..
            })
            | Some(WriteFrame::Map {
                block_start, count, ..
            }) => (block_start, count),
            _ => return Err(StreamError::structural("No open array or map to close")),
        };
        if count > 0 {
            self.encoder
                .insert_block_header(block_start, count, self.config.block_byte_sizes);
        }
        self.encoder.write_long(0);
        self.value_done()
    }

    /// Put the record's fields in schema order and fill the ones never written.
    fn close_record(&mut self) -> Result<(), StreamError> {
        let Some(WriteFrame::Record {
            node, start, spans, ..
        }) = self.stack.pop()
        else {
            return Err(StreamError::structural("No open record to close"));
        };
        let schema = Arc::clone(&self.schema);
        let Node::Record {
            fullname, fields, ..
        } = schema.node(node)
        else {
            return Err(StreamError::structural("Record scope over a non-record node"));
        };

        let mut cursor = start;
        let in_order = spans.iter().all(|span| match span {
            Some((s, e)) if *s == cursor => {
                cursor = *e;
                true
            }
            _ => false,
        });

        if !in_order {
            let written = self.encoder.split_off(start);
            for (i, field) in fields.iter().enumerate() {
                match spans[i] {
                    Some((s, e)) => self.encoder.write_raw(&written[s - start..e - start]),
                    None => {
                        if !self.defaults.contains_key(&(node, i)) {
                            let bytes = encode_default(&schema, &self.config.custom, fullname, field)?;
                            self.defaults.insert((node, i), bytes);
                        }
                        if let Some(bytes) = self.defaults.get(&(node, i)) {
                            self.encoder.write_raw(bytes);
                        }
                    }
                }
            }
        }
        self.value_done()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Push completed datums to the sink. In container mode this also closes the open block.
    pub fn flush(&mut self) -> Result<(), StreamError> {
        match &mut self.output {
            Output::Raw(sink) => sink.flush().map_err(EncodeError::from)?,
            Output::Container(writer) => writer.flush()?,
        }
        Ok(())
    }

    /// Flush and return the sink.
    ///
    /// # Errors
    /// `StreamError::Structural` if a structure is still open.
    pub fn finish(self) -> Result<W, StreamError> {
        if !self.stack.is_root() || self.capture.is_some() {
            return Err(StreamError::structural(format!(
                "Cannot finish with {} open structure(s)",
                self.stack.depth().max(1)
            )));
        }
        debug!(datums = self.datums, "token generator finished");
        match self.output {
            Output::Raw(mut sink) => {
                sink.flush().map_err(EncodeError::from)?;
                Ok(sink)
            }
            Output::Container(writer) => writer.finish(),
        }
    }

    /// Whether the innermost structure may be closed now.
    pub fn can_close(&self) -> bool {
        self.capture.is_none() && self.stack.can_close()
    }

    /// Number of complete top-level values written.
    pub fn datum_count(&self) -> u64 {
        self.datums
    }

    /// Nesting depth of the current position.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn get_ref(&self) -> &W {
        match &self.output {
            Output::Raw(sink) => sink,
            Output::Container(writer) => writer.get_ref(),
        }
    }
}

impl<W: Write> std::fmt::Debug for AvroGenerator<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvroGenerator")
            .field("depth", &self.stack.depth())
            .field("buffered", &self.encoder.len())
            .field("datums", &self.datums)
            .finish()
    }
}

fn pending_name(fields: &[FieldNode], state: FieldState) -> &str {
    match state {
        FieldState::Value(i) => &fields[i].name,
        _ => "<undeclared>",
    }
}

fn describe(node: &Node) -> String {
    match node.fullname() {
        Some(name) => format!("{} '{}'", node.kind().name(), name),
        None => node.kind().name().to_string(),
    }
}

fn int_of(n: Number) -> Result<i32, EncodeError> {
    match n {
        Number::Int(v) => Ok(v),
        Number::Long(v) => i32::try_from(v)
            .map_err(|_| EncodeError::InvalidValue(format!("{} does not fit in an int", v))),
        other => Err(EncodeError::TypeMismatch(format!(
            "{:?} cannot be written as int",
            other
        ))),
    }
}

fn long_of(n: Number) -> Result<i64, EncodeError> {
    n.as_i64().ok_or_else(|| {
        EncodeError::TypeMismatch(format!("{:?} cannot be written as long", n))
    })
}

/// Pick the union branch for a value.
///
/// Exact kind matches rank first, then widening conversions, then narrowing ones that
/// lose nothing for this value. Ties go to the first declared branch.
fn select_branch(
    schema: &Schema,
    branches: &[NodeId],
    event: &Event,
    hint: Option<&str>,
) -> Result<usize, StreamError> {
    if let Some(name) = hint {
        return branches
            .iter()
            .position(|b| {
                let node = schema.node(*b);
                node.answers_to(name) || (!node.kind().is_named() && node.kind().name() == name)
            })
            .ok_or_else(|| {
                EncodeError::InvalidValue(format!("Union has no branch named '{}'", name)).into()
            });
    }
    branches
        .iter()
        .enumerate()
        .filter_map(|(i, b)| branch_rank(schema.node(*b), event).map(|rank| (rank, i)))
        .min()
        .map(|(_, i)| i)
        .ok_or_else(|| {
            EncodeError::TypeMismatch(format!(
                "No union branch accepts {:?}",
                event.token()
            ))
            .into()
        })
}

fn branch_rank(node: &Node, event: &Event) -> Option<u8> {
    match (event, node) {
        (Event::Null, Node::Null) | (Event::Boolean(_), Node::Boolean) => Some(0),
        (Event::Number(Number::Int(_)), Node::Int) => Some(0),
        (Event::Number(Number::Int(_)), Node::Long | Node::Float | Node::Double) => Some(1),
        (Event::Number(Number::Long(_)), Node::Long) => Some(0),
        (Event::Number(Number::Long(_)), Node::Float | Node::Double) => Some(1),
        (Event::Number(Number::Long(v)), Node::Int) if i32::try_from(*v).is_ok() => Some(2),
        (Event::Number(Number::Float(_)), Node::Float) => Some(0),
        (Event::Number(Number::Float(_)), Node::Double) => Some(1),
        (Event::Number(Number::Double(_)), Node::Double) => Some(0),
        (Event::Number(Number::Double(_)), Node::Float) => Some(2),
        (Event::String(_), Node::String) => Some(0),
        (Event::String(s), Node::Enum { symbols, .. }) if symbols.contains(s) => Some(1),
        (Event::Binary(_), Node::Bytes) => Some(0),
        (Event::Binary(b), Node::Fixed { size, .. }) if b.len() == *size => Some(0),
        (Event::StartArray, Node::Array(_)) => Some(0),
        (Event::StartObject, Node::Record { .. } | Node::Map(_)) => Some(0),
        _ => None,
    }
}

/// Bytes for a record field that was never written.
fn encode_default(
    schema: &Schema,
    custom: &CustomEncodings,
    record: &str,
    field: &FieldNode,
) -> Result<Vec<u8>, StreamError> {
    let mut out = acquire_encoder();
    match &field.default {
        Some(json) => {
            let value = AvroValue::from_default(json, schema, field.node)?;
            encode_value(schema, custom, field.node, &value, &mut out)?;
        }
        None => match schema.node(field.node) {
            Node::Null => {}
            Node::Union(branches) => {
                let null = branches
                    .iter()
                    .position(|b| matches!(schema.node(*b), Node::Null))
                    .ok_or_else(|| missing_field(record, field))?;
                out.write_long(null as i64);
            }
            _ => return Err(missing_field(record, field)),
        },
    }
    Ok(out.take_bytes())
}

fn missing_field(record: &str, field: &FieldNode) -> StreamError {
    StreamError::structural(format!(
        "Field '{}' of record '{}' was not written and has no default",
        field.name, record
    ))
}

/// Encode a default value. Union defaults belong to the first branch.
fn encode_value(
    schema: &Schema,
    custom: &CustomEncodings,
    node: NodeId,
    value: &AvroValue,
    out: &mut BinaryEncoder,
) -> Result<(), StreamError> {
    let target = schema.node(node);
    if let Some(key) = target.custom_encoding() {
        let plugin = custom.get(key).ok_or_else(|| {
            StreamError::Configuration(format!("No custom encoding registered under '{}'", key))
        })?;
        plugin.write(value, out)?;
        return Ok(());
    }

    match (target, value) {
        (Node::Union(branches), value) => {
            out.write_long(0);
            encode_value(schema, custom, branches[0], value, out)?;
        }
        (Node::Null, AvroValue::Null) => {}
        (Node::Boolean, AvroValue::Boolean(b)) => out.write_boolean(*b),
        (Node::Int, AvroValue::Int(v)) => out.write_int(*v),
        (Node::Long, AvroValue::Long(v)) => out.write_long(*v),
        (Node::Float, AvroValue::Float(v)) => out.write_float(*v),
        (Node::Double, AvroValue::Double(v)) => out.write_double(*v),
        (Node::Bytes, AvroValue::Bytes(b)) => out.write_bytes(b),
        (Node::String, AvroValue::String(s)) => out.write_string(s),
        (Node::Fixed { size, .. }, AvroValue::Bytes(b)) => out.write_fixed(b, *size)?,
        (Node::Enum { fullname, symbols, .. }, AvroValue::String(s)) => {
            let index = symbols.iter().position(|sym| sym == s).ok_or_else(|| {
                EncodeError::InvalidValue(format!("'{}' is not a symbol of enum '{}'", s, fullname))
            })?;
            out.write_int(index as i32);
        }
        (Node::Array(item), AvroValue::Array(items)) => {
            if !items.is_empty() {
                out.write_long(items.len() as i64);
                for item_value in items {
                    encode_value(schema, custom, *item, item_value, out)?;
                }
            }
            out.write_long(0);
        }
        (Node::Map(values), AvroValue::Object(entries)) => {
            if !entries.is_empty() {
                out.write_long(entries.len() as i64);
                for (key, entry) in entries {
                    out.write_string(key);
                    encode_value(schema, custom, *values, entry, out)?;
                }
            }
            out.write_long(0);
        }
        (Node::Record { fields, .. }, AvroValue::Object(_)) => {
            for field in fields {
                let entry = value.get(&field.name).ok_or_else(|| {
                    EncodeError::InvalidValue(format!("Default lacks field '{}'", field.name))
                })?;
                encode_value(schema, custom, field.node, entry, out)?;
            }
        }
        (other, value) => {
            return Err(EncodeError::TypeMismatch(format!(
                "Default {:?} does not match {}",
                value,
                describe(other)
            ))
            .into())
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ContainerOptions;

    fn generator(schema: &str, config: GeneratorConfig) -> AvroGenerator<Vec<u8>> {
        let schema = Arc::new(Schema::parse(schema).unwrap());
        AvroGenerator::new(Vec::new(), schema, config).unwrap()
    }

    fn write_with(
        schema: &str,
        config: GeneratorConfig,
        f: impl FnOnce(&mut AvroGenerator<Vec<u8>>) -> Result<(), StreamError>,
    ) -> Vec<u8> {
        let mut g = generator(schema, config);
        f(&mut g).unwrap();
        g.finish().unwrap()
    }

    const POINT: &str = r#"{"type": "record", "name": "Point", "fields": [
        {"name": "x", "type": "int"}, {"name": "y", "type": "int"}
    ]}"#;

    #[test]
    fn test_point() {
        let bytes = write_with(POINT, GeneratorConfig::default(), |g| {
            g.write_value(&AvroValue::object([("x", 1.into()), ("y", (-1).into())]))
        });
        assert_eq!(bytes, vec![0x02, 0x01]);
    }

    #[test]
    fn test_fields_reordered_on_close() {
        let bytes = write_with(POINT, GeneratorConfig::default(), |g| {
            g.write_start_object()?;
            g.write_field_name("y")?;
            g.write_int(-1)?;
            g.write_field_name("x")?;
            g.write_int(1)?;
            g.write_end_object()
        });
        assert_eq!(bytes, vec![0x02, 0x01]);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let schema = r#"{"type": "record", "name": "R", "fields": [
            {"name": "a", "type": "int"},
            {"name": "b", "type": "string", "default": "hi"},
            {"name": "c", "type": ["null", "long"]}
        ]}"#;
        let bytes = write_with(schema, GeneratorConfig::default(), |g| {
            g.write_start_object()?;
            g.write_field_name("a")?;
            g.write_int(3)?;
            g.write_end_object()
        });
        assert_eq!(bytes, vec![0x06, 0x04, b'h', b'i', 0x00]);
    }

    #[test]
    fn test_missing_required_field() {
        let mut g = generator(POINT, GeneratorConfig::default());
        g.write_start_object().unwrap();
        g.write_field_name("x").unwrap();
        g.write_int(1).unwrap();
        assert!(matches!(
            g.write_end_object(),
            Err(StreamError::Structural(_))
        ));
    }

    #[test]
    fn test_duplicate_and_out_of_order_writes() {
        let mut g = generator(POINT, GeneratorConfig::default());
        g.write_start_object().unwrap();
        assert!(g.write_int(1).is_err());

        let mut g = generator(POINT, GeneratorConfig::default());
        g.write_start_object().unwrap();
        g.write_field_name("x").unwrap();
        assert!(!g.can_close());
        assert!(g.write_field_name("y").is_err());

        let mut g = generator(POINT, GeneratorConfig::default());
        g.write_start_object().unwrap();
        g.write_field_name("x").unwrap();
        g.write_int(1).unwrap();
        assert!(matches!(
            g.write_field_name("x"),
            Err(StreamError::Structural(_))
        ));
    }

    #[test]
    fn test_unknown_field() {
        let mut g = generator(POINT, GeneratorConfig::default());
        g.write_start_object().unwrap();
        assert!(matches!(
            g.write_field_name("z"),
            Err(StreamError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_ignore_unknown_drops_nested_value() {
        let config = GeneratorConfig::new().with_ignore_unknown(true);
        let bytes = write_with(POINT, config, |g| {
            g.write_start_object()?;
            g.write_field_name("extra")?;
            g.write_start_object()?;
            g.write_field_name("deep")?;
            g.write_start_array()?;
            g.write_long(9)?;
            g.write_end_array()?;
            g.write_end_object()?;
            g.write_field_name("x")?;
            g.write_int(1)?;
            g.write_field_name("ignored")?;
            g.write_string("gone")?;
            g.write_field_name("y")?;
            g.write_int(-1)?;
            g.write_end_object()
        });
        assert_eq!(bytes, vec![0x02, 0x01]);
    }

    #[test]
    fn test_type_name_on_dropped_value_does_not_leak() {
        let schema = r#"{"type": "record", "name": "R", "fields": [{"name": "u", "type": [
            {"type": "record", "name": "A", "fields": [{"name": "id", "type": "long"}]},
            {"type": "record", "name": "B", "fields": [{"name": "id", "type": "long"}]}
        ]}]}"#;
        let write_u = |g: &mut AvroGenerator<Vec<u8>>| -> Result<(), StreamError> {
            g.write_field_name("u")?;
            g.write_start_object()?;
            g.write_field_name("id")?;
            g.write_long(1)?;
            g.write_end_object()?;
            g.write_end_object()
        };

        let config = GeneratorConfig::new().with_ignore_unknown(true);
        let bytes = write_with(schema, config.clone(), |g| {
            g.write_start_object()?;
            g.write_field_name("extra")?;
            g.write_type_name("B");
            g.write_string("gone")?;
            write_u(g)
        });
        assert_eq!(bytes, vec![0x00, 0x02]);

        let bytes = write_with(schema, config, |g| {
            g.write_start_object()?;
            g.write_field_name("extra")?;
            g.write_start_array()?;
            g.write_type_name("B");
            g.write_end_array()?;
            write_u(g)
        });
        assert_eq!(bytes, vec![0x00, 0x02]);
    }

    #[test]
    fn test_empty_array_is_single_zero() {
        let bytes = write_with(r#"{"type": "array", "items": "int"}"#, Default::default(), |g| {
            g.write_start_array()?;
            g.write_end_array()
        });
        assert_eq!(bytes, vec![0x00]);
    }

    #[test]
    fn test_block_size_splits_arrays() {
        let config = GeneratorConfig::new().with_block_size(2);
        let bytes = write_with(r#"{"type": "array", "items": "int"}"#, config, |g| {
            g.write_start_array()?;
            for v in 1..=3 {
                g.write_int(v)?;
            }
            g.write_end_array()
        });
        assert_eq!(bytes, vec![0x04, 0x02, 0x04, 0x02, 0x06, 0x00]);
    }

    #[test]
    fn test_block_byte_sizes() {
        let config = GeneratorConfig::new().with_block_byte_sizes(true);
        let bytes = write_with(r#"{"type": "map", "values": "int"}"#, config, |g| {
            g.write_start_object()?;
            g.write_field_name("k")?;
            g.write_int(5)?;
            g.write_end_object()
        });
        // count -1, byte size 3, key "k", value 5, end
        assert_eq!(bytes, vec![0x01, 0x06, 0x02, b'k', 0x0A, 0x00]);
    }

    #[test]
    fn test_union_tie_break_prefers_first_exact_match() {
        let schema = r#"["string",
            {"type": "enum", "name": "A", "symbols": ["x"]},
            {"type": "record", "name": "B", "fields": []}]"#;
        let bytes = write_with(schema, Default::default(), |g| g.write_string("x"));
        assert_eq!(bytes, vec![0x00, 0x02, b'x']);
    }

    #[test]
    fn test_union_widening_and_hint() {
        let schema = r#"["null", "double", "long"]"#;
        let bytes = write_with(schema, Default::default(), |g| g.write_int(1));
        assert_eq!(bytes[0], 0x02);

        let schema = r#"[{"type": "fixed", "name": "a.Md5", "size": 2}, "bytes"]"#;
        let bytes = write_with(schema, Default::default(), |g| {
            g.write_type_name("bytes");
            g.write_binary(&[1, 2])
        });
        assert_eq!(bytes, vec![0x02, 0x04, 1, 2]);

        let bytes = write_with(schema, Default::default(), |g| {
            g.write_type_name("Md5");
            g.write_binary(&[1, 2])
        });
        assert_eq!(bytes, vec![0x00, 1, 2]);
    }

    #[test]
    fn test_type_mismatch() {
        let mut g = generator(r#""int""#, GeneratorConfig::default());
        assert!(matches!(
            g.write_string("1"),
            Err(StreamError::Encode(EncodeError::TypeMismatch(_)))
        ));
        let mut g = generator(r#""int""#, GeneratorConfig::default());
        assert!(matches!(
            g.write_long(1 << 40),
            Err(StreamError::Encode(EncodeError::InvalidValue(_)))
        ));
    }

    #[test]
    fn test_finish_with_open_structure() {
        let mut g = generator(r#"{"type": "array", "items": "int"}"#, Default::default());
        g.write_start_array().unwrap();
        assert!(matches!(g.finish(), Err(StreamError::Structural(_))));
    }

    #[test]
    fn test_datums_reach_sink_at_datum_end() {
        let mut g = generator(r#""long""#, GeneratorConfig::default());
        g.write_long(1).unwrap();
        assert_eq!(g.get_ref(), &vec![0x02]);
        g.write_long(-1).unwrap();
        assert_eq!(g.datum_count(), 2);
        assert_eq!(g.finish().unwrap(), vec![0x02, 0x01]);
    }

    #[test]
    fn test_container_mode_buffers_blocks() {
        let config = GeneratorConfig::new().with_container(ContainerOptions::default());
        let mut g = generator(r#""long""#, config);
        let header_len = g.get_ref().len();
        g.write_long(1).unwrap();
        assert_eq!(g.get_ref().len(), header_len);
        let file = g.finish().unwrap();
        assert!(file.len() > header_len);
        assert_eq!(&file[..4], b"Obj\x01");
    }
}
