//! Pull-based token decoder.
//!
//! [`AvroParser`] walks a [`ReadPlan`] in lock-step with a byte cursor and yields one
//! [`Token`] per call. Nothing is decoded ahead of the token that needs it: record ends
//! come from field-count exhaustion, array and map ends from the zero block marker.

use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::sync::Arc;

use bytes::Buf;
use tracing::{debug, trace};

use super::config::ParserConfig;
use super::context::{FieldCursor, FrameKind, ReadContextStack, ReadFrame};
use super::token::{Event, Number, Token};
use crate::container::{BlockReader, ContainerHeader};
use crate::error::{DecodeError, SchemaError, StreamError};
use crate::io::recycler::acquire_decoder_with_capacity;
use crate::io::BinaryDecoder;
use crate::schema::{Branch, FieldStep, OpId, ReadOp, ReadPlan, Schema, SchemaPair, TypePromotion};
use crate::value::{AvroValue, ValueBuilder};

/// Reads a sequence of datums as a token stream.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use jetcodec::{AvroParser, ParserConfig, Schema, Token};
///
/// let schema = Arc::new(Schema::parse(r#"{"type": "record", "name": "Point", "fields": [
///     {"name": "x", "type": "int"}, {"name": "y", "type": "int"}
/// ]}"#).unwrap());
/// let bytes = [0x02, 0x01];
/// let mut parser = AvroParser::new(&bytes[..], schema, ParserConfig::default()).unwrap();
///
/// assert_eq!(parser.next_token().unwrap(), Token::StartObject);
/// assert_eq!(parser.next_token().unwrap(), Token::FieldName);
/// assert_eq!(parser.current_name().unwrap(), "x");
/// assert_eq!(parser.next_token().unwrap(), Token::ValueNumber);
/// assert_eq!(parser.int_value().unwrap(), 1);
/// ```
pub struct AvroParser<'a> {
    /// Raw mode: the whole input. Container mode: the current block.
    decoder: Option<BinaryDecoder<'a>>,
    blocks: Option<BlockReader<'a>>,
    /// Datums left in the current container block.
    block_remaining: u64,
    pair: SchemaPair,
    plan: Arc<ReadPlan>,
    stack: ReadContextStack,
    /// Tokens of defaults and custom-encoded values, emitted before reading on.
    replay: VecDeque<Event>,
    replay_depth: usize,
    current: Option<Token>,
    name: Option<String>,
    /// Payload of the current scalar token.
    value: Event,
    config: ParserConfig,
    datums: u64,
    finished: bool,
    reuse: HashMap<String, AvroValue>,
}

impl<'a> AvroParser<'a> {
    /// Read bare datums written with `schema`.
    pub fn new(
        source: impl Read + 'a,
        schema: Arc<Schema>,
        config: ParserConfig,
    ) -> Result<Self, StreamError> {
        Self::raw(source, SchemaPair::single(schema), config)
    }

    /// Read bare datums written with `pair.writer()` in the shape of `pair.reader()`.
    ///
    /// # Errors
    /// `StreamError::Configuration` if a custom encoding the schemas declare is missing.
    pub fn raw(
        source: impl Read + 'a,
        pair: SchemaPair,
        config: ParserConfig,
    ) -> Result<Self, StreamError> {
        config.custom.validate_plan(pair.plan())?;
        let decoder = acquire_decoder_with_capacity(source, config.read_buffer);
        debug!(identity = pair.is_identity(), "opened token parser");
        Ok(Self::build(Some(decoder), None, pair, config))
    }

    /// Read an object container file, optionally resolving it into `reader`.
    ///
    /// The schema embedded in the file is the writer schema.
    pub fn container(
        source: impl Read + 'a,
        reader: Option<Arc<Schema>>,
        config: ParserConfig,
    ) -> Result<Self, StreamError> {
        let blocks = BlockReader::new(source)?;
        let writer = Arc::clone(&blocks.header().schema);
        let pair = match reader {
            Some(reader) => SchemaPair::resolve(writer, reader)?,
            None => SchemaPair::single(writer),
        };
        config.custom.validate_plan(pair.plan())?;
        debug!(
            codec = blocks.header().codec.name(),
            identity = pair.is_identity(),
            "opened container parser"
        );
        Ok(Self::build(None, Some(blocks), pair, config))
    }

    fn build(
        decoder: Option<BinaryDecoder<'a>>,
        blocks: Option<BlockReader<'a>>,
        pair: SchemaPair,
        config: ParserConfig,
    ) -> Self {
        let plan = Arc::clone(pair.plan());
        Self {
            decoder,
            blocks,
            block_remaining: 0,
            pair,
            plan,
            stack: ReadContextStack::new(),
            replay: VecDeque::new(),
            replay_depth: 0,
            current: None,
            name: None,
            value: Event::Null,
            config,
            datums: 0,
            finished: false,
            reuse: HashMap::new(),
        }
    }

    // ========================================================================
    // Token stream
    // ========================================================================

    /// Advance to the next token.
    ///
    /// Returns `Token::EndOfStream` once the input ends at a datum boundary, and on every
    /// call after that.
    pub fn next_token(&mut self) -> Result<Token, StreamError> {
        let token = self.advance()?;
        self.current = Some(token);
        Ok(token)
    }

    /// Advance and return the token with its payload, or `None` at end of stream.
    pub fn next_event(&mut self) -> Result<Option<Event>, StreamError> {
        self.next_token()?;
        Ok(self.current_event())
    }

    /// Read the next complete datum as a value, or `None` at end of stream.
    pub fn next_value(&mut self) -> Result<Option<AvroValue>, StreamError> {
        let mut builder = ValueBuilder::new();
        while let Some(event) = self.next_event()? {
            if let Some(value) = builder.push(event)? {
                return Ok(Some(value));
            }
        }
        if builder.depth() > 0 {
            return Err(StreamError::structural("Stream ended inside a value"));
        }
        Ok(None)
    }

    fn advance(&mut self) -> Result<Token, StreamError> {
        if self.finished {
            return Ok(Token::EndOfStream);
        }
        if let Some(token) = self.replay_next() {
            return Ok(token);
        }
        match self.stack.top().map(|frame| frame.kind) {
            None => self.next_datum(),
            Some(FrameKind::Record) => self.next_field(),
            Some(FrameKind::Array) => self.next_item(),
            Some(FrameKind::Map) => self.next_entry(),
        }
    }

    fn next_datum(&mut self) -> Result<Token, StreamError> {
        if !self.datum_available()? {
            self.finished = true;
            self.decoder = None;
            debug!(datums = self.datums, "token stream finished");
            return Ok(Token::EndOfStream);
        }
        let root = self.plan.root();
        self.begin_value(root)
    }

    /// Whether another datum follows. Moves to the next container block when needed.
    fn datum_available(&mut self) -> Result<bool, StreamError> {
        if self.blocks.is_none() {
            return Ok(!self.read(|d| d.is_at_end())?);
        }
        while self.block_remaining == 0 {
            if self.decoder.is_some() && !self.read(|d| d.is_at_end())? {
                return Err(self.decode_error(DecodeError::InvalidData(
                    "Container block has bytes after its last datum".to_string(),
                )));
            }
            self.decoder = None;
            let next = match self.blocks.as_mut() {
                Some(blocks) => blocks.next_block()?,
                None => None,
            };
            let Some(block) = next else {
                return Ok(false);
            };
            trace!(block = block.index, count = block.count, "entering container block");
            self.block_remaining = block.count;
            self.decoder = Some(acquire_decoder_with_capacity(
                block.data.reader(),
                self.config.read_buffer,
            ));
        }
        Ok(true)
    }

    fn next_field(&mut self) -> Result<Token, StreamError> {
        let plan = Arc::clone(&self.plan);
        loop {
            let frame = self.frame_mut()?;
            if frame.awaiting_value {
                frame.awaiting_value = false;
                let op = frame.value_op;
                return self.begin_value(op);
            }
            let op = frame.op;
            let Some(FieldCursor::Field(index)) = self.stack.current_field() else {
                return Err(StreamError::structural("Record scope expected"));
            };
            let ReadOp::Record {
                name: record,
                steps,
                defaults,
            } = plan.op(op)
            else {
                return Err(StreamError::structural("Record scope over a non-record op"));
            };

            if let Some(step) = steps.get(index) {
                match step {
                    FieldStep::Read { name, op } => {
                        let frame = self.frame_mut()?;
                        frame.awaiting_value = true;
                        frame.value_op = *op;
                        self.name = Some(name.clone());
                        return Ok(Token::FieldName);
                    }
                    FieldStep::Skip { name, op } => {
                        if self.config.fail_on_unknown_fields {
                            return Err(StreamError::UnknownField {
                                record: record.clone(),
                                field: name.clone(),
                            });
                        }
                        trace!(record = %record, field = %name, "skipping writer-only field");
                        self.skip_value(*op)?;
                    }
                }
            } else if let Some((name, value)) = defaults.get(index - steps.len()) {
                self.name = Some(name.clone());
                let mut events = Vec::new();
                value.push_events(&mut events);
                self.replay.extend(events);
                return Ok(Token::FieldName);
            } else {
                self.stack.exit()?;
                self.value_done();
                return Ok(Token::EndObject);
            }
        }
    }

    fn next_item(&mut self) -> Result<Token, StreamError> {
        if !self.open_block()? {
            self.stack.exit()?;
            self.value_done();
            return Ok(Token::EndArray);
        }
        let frame = self.frame_mut()?;
        frame.remaining -= 1;
        frame.index += 1;
        let item = frame.value_op;
        self.begin_value(item)
    }

    fn next_entry(&mut self) -> Result<Token, StreamError> {
        let frame = self.frame_mut()?;
        if frame.awaiting_value {
            frame.awaiting_value = false;
            let op = frame.value_op;
            return self.begin_value(op);
        }
        if !self.open_block()? {
            self.stack.exit()?;
            self.value_done();
            return Ok(Token::EndObject);
        }
        let key = self.read(|d| d.read_string())?;
        let frame = self.frame_mut()?;
        frame.remaining -= 1;
        frame.index += 1;
        frame.awaiting_value = true;
        self.name = Some(key);
        Ok(Token::FieldName)
    }

    /// Make sure the innermost array or map has an item left in its block.
    /// False once the terminating zero count is read.
    fn open_block(&mut self) -> Result<bool, StreamError> {
        if self.frame_mut()?.remaining > 0 {
            return Ok(true);
        }
        let (count, _) = self.read(|d| d.read_block_header())?;
        self.frame_mut()?.remaining = count;
        Ok(count > 0)
    }

    fn begin_value(&mut self, op: OpId) -> Result<Token, StreamError> {
        let plan = Arc::clone(&self.plan);
        let event = match plan.op(op) {
            ReadOp::Null => Event::Null,
            ReadOp::Boolean => Event::Boolean(self.read(|d| d.read_boolean())?),
            ReadOp::Int => Event::Number(Number::Int(self.read(|d| d.read_int())?)),
            ReadOp::Long => Event::Number(Number::Long(self.read(|d| d.read_long())?)),
            ReadOp::Float => Event::Number(Number::Float(self.read(|d| d.read_float())?)),
            ReadOp::Double => Event::Number(Number::Double(self.read(|d| d.read_double())?)),
            ReadOp::Bytes => Event::Binary(self.read(|d| d.read_bytes())?),
            ReadOp::String => Event::String(self.read(|d| d.read_string())?),
            ReadOp::Promote(promotion) => self.read_promoted(*promotion)?,
            ReadOp::Fixed { size } => {
                let size = *size;
                Event::Binary(self.read(|d| d.read_fixed(size))?)
            }
            ReadOp::Enum { name, symbols } => {
                let index = self.read(|d| d.read_long())?;
                let symbol = usize::try_from(index)
                    .ok()
                    .and_then(|i| symbols.get(i))
                    .ok_or_else(|| {
                        self.decode_error(DecodeError::InvalidEnumIndex {
                            index,
                            name: name.clone(),
                            symbols: symbols.len(),
                        })
                    })?;
                match symbol {
                    Ok(symbol) => Event::String(symbol.clone()),
                    Err(missing) => {
                        return Err(SchemaError::IncompatibleSchemas(format!(
                            "Symbol '{}' of enum '{}' is not declared by the reader",
                            missing, name
                        ))
                        .into())
                    }
                }
            }
            ReadOp::Union(branches) => {
                let index = self.read(|d| d.read_long())?;
                let branch = usize::try_from(index)
                    .ok()
                    .and_then(|i| branches.get(i))
                    .ok_or_else(|| {
                        self.decode_error(DecodeError::InvalidUnionIndex {
                            index,
                            branches: branches.len(),
                        })
                    })?;
                return match branch {
                    Branch::Read(id) => self.begin_value(*id),
                    Branch::Unreadable { reason, .. } => {
                        Err(SchemaError::IncompatibleSchemas(reason.clone()).into())
                    }
                };
            }
            ReadOp::Array(item) => {
                self.stack.enter_array(op, *item);
                return Ok(Token::StartArray);
            }
            ReadOp::Map(value) => {
                self.stack.enter_map(op, *value);
                return Ok(Token::StartObject);
            }
            ReadOp::Record {
                steps, defaults, ..
            } => {
                self.stack.enter_record(op, steps.len() + defaults.len());
                return Ok(Token::StartObject);
            }
            ReadOp::Custom { key, .. } => {
                let value = self.read_custom(key)?;
                let mut events = Vec::new();
                value.push_events(&mut events);
                self.replay.extend(events);
                return self
                    .replay_next()
                    .ok_or_else(|| StreamError::structural("Custom encoding produced no value"));
            }
        };

        let token = event.token();
        self.value = event;
        self.value_done();
        Ok(token)
    }

    fn read_promoted(&mut self, promotion: TypePromotion) -> Result<Event, StreamError> {
        Ok(match promotion {
            TypePromotion::IntToLong => {
                Event::Number(Number::Long(self.read(|d| d.read_int())? as i64))
            }
            TypePromotion::IntToFloat => {
                Event::Number(Number::Float(self.read(|d| d.read_int())? as f32))
            }
            TypePromotion::IntToDouble => {
                Event::Number(Number::Double(self.read(|d| d.read_int())? as f64))
            }
            TypePromotion::LongToFloat => {
                Event::Number(Number::Float(self.read(|d| d.read_long())? as f32))
            }
            TypePromotion::LongToDouble => {
                Event::Number(Number::Double(self.read(|d| d.read_long())? as f64))
            }
            TypePromotion::FloatToDouble => {
                Event::Number(Number::Double(self.read(|d| d.read_float())? as f64))
            }
            TypePromotion::StringToBytes => Event::Binary(self.read(|d| d.read_bytes())?),
            TypePromotion::BytesToString => Event::String(self.read(|d| d.read_string())?),
        })
    }

    fn read_custom(&mut self, key: &str) -> Result<AvroValue, StreamError> {
        let plugin = self.config.custom.get(key).cloned().ok_or_else(|| {
            StreamError::Configuration(format!("No custom encoding registered under '{}'", key))
        })?;
        let reuse = self.reuse.remove(key);
        let value = self.read(|d| plugin.read(reuse, d))?;
        self.reuse.insert(key.to_string(), value.clone());
        Ok(value)
    }

    fn replay_next(&mut self) -> Option<Token> {
        let event = self.replay.pop_front()?;
        let token = event.token();
        match token {
            Token::StartObject | Token::StartArray => self.replay_depth += 1,
            Token::EndObject | Token::EndArray => {
                self.replay_depth = self.replay_depth.saturating_sub(1)
            }
            _ => {}
        }
        let complete =
            self.replay_depth == 0 && token != Token::FieldName && !token.is_struct_start();
        match event {
            Event::FieldName(name) => self.name = Some(name),
            scalar if token.is_scalar() => self.value = scalar,
            _ => {}
        }
        if complete {
            self.value_done();
        }
        Some(token)
    }

    fn value_done(&mut self) {
        if self.stack.is_root() {
            self.datums += 1;
            self.block_remaining = self.block_remaining.saturating_sub(1);
        }
    }

    // ========================================================================
    // Skipping
    // ========================================================================

    /// Skip the rest of the structure the current `StartObject`/`StartArray` opened.
    ///
    /// Afterwards the current token is the matching end token. Does nothing on any other
    /// token.
    pub fn skip_children(&mut self) -> Result<(), StreamError> {
        if !self.current.is_some_and(|t| t.is_struct_start()) {
            return Ok(());
        }

        if self.replay_depth > 0 {
            let target = self.replay_depth - 1;
            while self.replay_depth > target {
                match self.replay_next() {
                    Some(token) => self.current = Some(token),
                    None => break,
                }
            }
            return Ok(());
        }

        let ReadFrame {
            kind,
            op,
            index,
            remaining,
            awaiting_value,
            value_op,
            ..
        } = self.frame_mut()?.clone();

        if awaiting_value {
            self.skip_value(value_op)?;
        }
        let end = match kind {
            FrameKind::Record => {
                let plan = Arc::clone(&self.plan);
                if let ReadOp::Record { steps, .. } = plan.op(op) {
                    for step in steps.iter().skip(index) {
                        let (FieldStep::Read { op, .. } | FieldStep::Skip { op, .. }) = step;
                        self.skip_value(*op)?;
                    }
                }
                let frame = self.frame_mut()?;
                frame.index = frame.total;
                Token::EndObject
            }
            FrameKind::Array | FrameKind::Map => {
                let is_map = kind == FrameKind::Map;
                self.skip_items(value_op, is_map, remaining)?;
                self.skip_blocks(value_op, is_map)?;
                if is_map {
                    Token::EndObject
                } else {
                    Token::EndArray
                }
            }
        };
        self.stack.exit()?;
        self.value_done();
        self.current = Some(end);
        Ok(())
    }

    fn skip_value(&mut self, op: OpId) -> Result<(), StreamError> {
        let plan = Arc::clone(&self.plan);
        match plan.op(op) {
            ReadOp::Null => {}
            ReadOp::Boolean => self.read(|d| d.skip(1))?,
            ReadOp::Int | ReadOp::Long | ReadOp::Enum { .. } => {
                self.read(|d| d.read_long())?;
            }
            ReadOp::Float => self.read(|d| d.skip(4))?,
            ReadOp::Double => self.read(|d| d.skip(8))?,
            ReadOp::Bytes | ReadOp::String => self.read(|d| d.skip_bytes())?,
            ReadOp::Promote(promotion) => match promotion {
                TypePromotion::FloatToDouble => self.read(|d| d.skip(4))?,
                TypePromotion::StringToBytes | TypePromotion::BytesToString => {
                    self.read(|d| d.skip_bytes())?
                }
                _ => {
                    self.read(|d| d.read_long())?;
                }
            },
            ReadOp::Fixed { size } => {
                let size = *size as u64;
                self.read(|d| d.skip(size))?
            }
            ReadOp::Array(item) => self.skip_blocks(*item, false)?,
            ReadOp::Map(value) => self.skip_blocks(*value, true)?,
            ReadOp::Union(branches) => {
                let index = self.read(|d| d.read_long())?;
                let branch = usize::try_from(index)
                    .ok()
                    .and_then(|i| branches.get(i))
                    .ok_or_else(|| {
                        self.decode_error(DecodeError::InvalidUnionIndex {
                            index,
                            branches: branches.len(),
                        })
                    })?;
                let (Branch::Read(id) | Branch::Unreadable { skip: id, .. }) = branch;
                self.skip_value(*id)?;
            }
            ReadOp::Record { steps, .. } => {
                for step in steps {
                    let (FieldStep::Read { op, .. } | FieldStep::Skip { op, .. }) = step;
                    self.skip_value(*op)?;
                }
            }
            ReadOp::Custom { key, .. } => {
                self.read_custom(key)?;
            }
        }
        Ok(())
    }

    /// Skip array or map blocks up to and including the terminating zero count.
    fn skip_blocks(&mut self, item: OpId, is_map: bool) -> Result<(), StreamError> {
        loop {
            let (count, size) = self.read(|d| d.read_block_header())?;
            if count == 0 {
                return Ok(());
            }
            match size {
                Some(bytes) => self.read(|d| d.skip(bytes))?,
                None => self.skip_items(item, is_map, count)?,
            }
        }
    }

    fn skip_items(&mut self, item: OpId, is_map: bool, count: u64) -> Result<(), StreamError> {
        for _ in 0..count {
            if is_map {
                self.read(|d| d.skip_bytes())?;
            }
            self.skip_value(item)?;
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn current_token(&self) -> Option<Token> {
        self.current
    }

    /// The current token with its payload.
    pub fn current_event(&self) -> Option<Event> {
        Some(match self.current? {
            Token::StartObject => Event::StartObject,
            Token::EndObject => Event::EndObject,
            Token::StartArray => Event::StartArray,
            Token::EndArray => Event::EndArray,
            Token::FieldName => Event::FieldName(self.name.clone().unwrap_or_default()),
            Token::EndOfStream => return None,
            _ => self.value.clone(),
        })
    }

    /// Field name or map key of the current `FieldName` token.
    pub fn current_name(&self) -> Result<&str, StreamError> {
        match (self.current, &self.name) {
            (Some(Token::FieldName), Some(name)) => Ok(name),
            _ => Err(self.mismatch(Token::FieldName)),
        }
    }

    pub fn text_value(&self) -> Result<&str, StreamError> {
        match self.expect(Token::ValueString)? {
            Event::String(s) => Ok(s),
            _ => Err(self.mismatch(Token::ValueString)),
        }
    }

    pub fn number_value(&self) -> Result<Number, StreamError> {
        match self.expect(Token::ValueNumber)? {
            Event::Number(n) => Ok(*n),
            _ => Err(self.mismatch(Token::ValueNumber)),
        }
    }

    /// The current integral number as i32.
    pub fn int_value(&self) -> Result<i32, StreamError> {
        let number = self.number_value()?;
        number
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| {
                StreamError::structural(format!("Number {:?} is not an int", number))
            })
    }

    /// The current integral number as i64.
    pub fn long_value(&self) -> Result<i64, StreamError> {
        let number = self.number_value()?;
        number
            .as_i64()
            .ok_or_else(|| StreamError::structural(format!("Number {:?} is not integral", number)))
    }

    pub fn float_value(&self) -> Result<f32, StreamError> {
        Ok(self.number_value()?.as_f64() as f32)
    }

    pub fn double_value(&self) -> Result<f64, StreamError> {
        Ok(self.number_value()?.as_f64())
    }

    pub fn boolean_value(&self) -> Result<bool, StreamError> {
        match self.expect(Token::ValueBoolean)? {
            Event::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch(Token::ValueBoolean)),
        }
    }

    pub fn binary_value(&self) -> Result<&[u8], StreamError> {
        match self.expect(Token::ValueBinary)? {
            Event::Binary(b) => Ok(b),
            _ => Err(self.mismatch(Token::ValueBinary)),
        }
    }

    fn expect(&self, token: Token) -> Result<&Event, StreamError> {
        if self.current == Some(token) {
            Ok(&self.value)
        } else {
            Err(self.mismatch(token))
        }
    }

    fn mismatch(&self, wanted: Token) -> StreamError {
        StreamError::structural(format!(
            "{:?} requested, current token is {:?}",
            wanted, self.current
        ))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Abandon the stream and release its cursor. Later reads return `EndOfStream`.
    pub fn close(&mut self) {
        if self.finished {
            return;
        }
        self.decoder = None;
        self.blocks = None;
        self.replay.clear();
        self.replay_depth = 0;
        self.stack.clear();
        self.finished = true;
        debug!(datums = self.datums, "token parser closed");
    }

    pub fn is_closed(&self) -> bool {
        self.finished
    }

    /// Number of complete top-level values read so far.
    pub fn datum_count(&self) -> u64 {
        self.datums
    }

    /// Nesting depth of the current position.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn schemas(&self) -> &SchemaPair {
        &self.pair
    }

    /// The container header, in container mode.
    pub fn header(&self) -> Option<&ContainerHeader> {
        self.blocks.as_ref().map(BlockReader::header)
    }

    // ========================================================================
    // Cursor access
    // ========================================================================

    fn read<T>(
        &mut self,
        f: impl FnOnce(&mut BinaryDecoder<'a>) -> Result<T, DecodeError>,
    ) -> Result<T, StreamError> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| StreamError::structural("Parser has no open input"))?;
        f(&mut *decoder).map_err(|source| StreamError::Decode {
            offset: decoder.offset(),
            source,
        })
    }

    fn decode_error(&self, source: DecodeError) -> StreamError {
        StreamError::Decode {
            offset: self.decoder.as_ref().map_or(0, BinaryDecoder::offset),
            source,
        }
    }

    fn frame_mut(&mut self) -> Result<&mut ReadFrame, StreamError> {
        self.stack
            .top_mut()
            .ok_or_else(|| StreamError::structural("No open structure"))
    }
}

impl Iterator for AvroParser<'_> {
    type Item = Result<Event, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

impl std::fmt::Debug for AvroParser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvroParser")
            .field("current", &self.current)
            .field("depth", &self.stack.depth())
            .field("datums", &self.datums)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser<'a>(schema: &str, bytes: &'a [u8]) -> AvroParser<'a> {
        let schema = Arc::new(Schema::parse(schema).unwrap());
        AvroParser::new(bytes, schema, ParserConfig::default()).unwrap()
    }

    fn tokens(parser: &mut AvroParser<'_>) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            let token = parser.next_token().unwrap();
            out.push(token);
            if token == Token::EndOfStream {
                return out;
            }
        }
    }

    const POINT: &str = r#"{"type": "record", "name": "Point", "fields": [
        {"name": "x", "type": "int"}, {"name": "y", "type": "int"}
    ]}"#;

    #[test]
    fn test_record_tokens() {
        let mut p = parser(POINT, &[0x02, 0x01]);
        assert_eq!(
            tokens(&mut p),
            vec![
                Token::StartObject,
                Token::FieldName,
                Token::ValueNumber,
                Token::FieldName,
                Token::ValueNumber,
                Token::EndObject,
                Token::EndOfStream,
            ]
        );
        assert_eq!(p.datum_count(), 1);
    }

    #[test]
    fn test_accessor_mismatch() {
        let mut p = parser(POINT, &[0x02, 0x01]);
        p.next_token().unwrap();
        assert!(matches!(p.int_value(), Err(StreamError::Structural(_))));
        p.next_token().unwrap();
        assert_eq!(p.current_name().unwrap(), "x");
        assert!(p.text_value().is_err());
        p.next_token().unwrap();
        assert_eq!(p.long_value().unwrap(), 1);
        assert_eq!(p.double_value().unwrap(), 1.0);
    }

    #[test]
    fn test_multiple_array_blocks() {
        // Block of 2, block of -1 with byte size 1, end.
        let bytes = [0x04, 0x02, 0x04, 0x01, 0x02, 0x06, 0x00];
        let mut p = parser(r#"{"type": "array", "items": "long"}"#, &bytes);
        let value = p.next_value().unwrap().unwrap();
        assert_eq!(
            value,
            AvroValue::Array(vec![1i64.into(), 2i64.into(), 3i64.into()])
        );
        assert_eq!(p.next_value().unwrap(), None);
    }

    #[test]
    fn test_map_tokens() {
        let bytes = [0x02, 0x02, b'k', 0x0A, 0x00];
        let mut p = parser(r#"{"type": "map", "values": "int"}"#, &bytes);
        assert_eq!(p.next_token().unwrap(), Token::StartObject);
        assert_eq!(p.next_token().unwrap(), Token::FieldName);
        assert_eq!(p.current_name().unwrap(), "k");
        assert_eq!(p.next_token().unwrap(), Token::ValueNumber);
        assert_eq!(p.int_value().unwrap(), 5);
        assert_eq!(p.next_token().unwrap(), Token::EndObject);
        assert_eq!(p.next_token().unwrap(), Token::EndOfStream);
    }

    #[test]
    fn test_union_and_enum() {
        let schema = r#"["null", {"type": "enum", "name": "Suit", "symbols": ["A", "B"]}]"#;
        let mut p = parser(schema, &[0x02, 0x02, 0x00]);
        assert_eq!(p.next_token().unwrap(), Token::ValueString);
        assert_eq!(p.text_value().unwrap(), "B");
        assert_eq!(p.next_token().unwrap(), Token::ValueNull);
        assert_eq!(p.next_token().unwrap(), Token::EndOfStream);
        assert_eq!(p.datum_count(), 2);
    }

    #[test]
    fn test_invalid_indices() {
        let mut p = parser(r#"["null", "int"]"#, &[0x04]);
        assert!(matches!(
            p.next_token(),
            Err(StreamError::Decode {
                source: DecodeError::InvalidUnionIndex { index: 2, branches: 2 },
                ..
            })
        ));

        let mut p = parser(r#"{"type": "enum", "name": "E", "symbols": ["A"]}"#, &[0x02]);
        assert!(matches!(
            p.next_token(),
            Err(StreamError::Decode {
                source: DecodeError::InvalidEnumIndex { index: 1, .. },
                ..
            })
        ));
    }

    #[test]
    fn test_eof_inside_datum() {
        let mut p = parser(POINT, &[0x02]);
        for _ in 0..4 {
            p.next_token().unwrap();
        }
        assert!(matches!(
            p.next_token(),
            Err(StreamError::Decode {
                source: DecodeError::UnexpectedEof,
                offset: 1
            })
        ));
    }

    #[test]
    fn test_skip_children() {
        let schema = r#"{"type": "record", "name": "R", "fields": [
            {"name": "tags", "type": {"type": "array", "items": "string"}},
            {"name": "n", "type": "int"}
        ]}"#;
        let bytes = [0x04, 0x02, b'a', 0x02, b'b', 0x00, 0x54];
        let mut p = parser(schema, &bytes);
        p.next_token().unwrap();
        p.next_token().unwrap();
        assert_eq!(p.next_token().unwrap(), Token::StartArray);
        p.skip_children().unwrap();
        assert_eq!(p.current_token(), Some(Token::EndArray));
        assert_eq!(p.next_token().unwrap(), Token::FieldName);
        assert_eq!(p.next_token().unwrap(), Token::ValueNumber);
        assert_eq!(p.int_value().unwrap(), 42);
    }

    #[test]
    fn test_skip_whole_datum() {
        let mut p = parser(POINT, &[0x02, 0x01, 0x04, 0x03]);
        assert_eq!(p.next_token().unwrap(), Token::StartObject);
        p.skip_children().unwrap();
        assert_eq!(p.current_token(), Some(Token::EndObject));
        assert_eq!(p.datum_count(), 1);
        let second = p.next_value().unwrap().unwrap();
        assert_eq!(second.get("y"), Some(&AvroValue::Int(-2)));
    }

    #[test]
    fn test_close_ends_stream() {
        let mut p = parser(POINT, &[0x02, 0x01]);
        p.next_token().unwrap();
        p.close();
        assert!(p.is_closed());
        assert_eq!(p.next_token().unwrap(), Token::EndOfStream);
    }

    #[test]
    fn test_invalid_boolean() {
        let mut p = parser(r#""boolean""#, &[0x02]);
        assert!(matches!(
            p.next_token(),
            Err(StreamError::Decode {
                source: DecodeError::InvalidData(_),
                ..
            })
        ));
    }
}
