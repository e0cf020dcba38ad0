//! Context stacks tracking the open structures of a token stream.
//!
//! The read stack is driven by a [`ReadPlan`](crate::schema::ReadPlan): frames name plan ops.
//! The write stack is driven by the compiled [`Schema`](crate::schema::Schema): frames name
//! schema nodes and remember where in the output buffer each structure began.

use crate::error::StreamError;
use crate::schema::{NodeId, OpId};

/// Kind of an open read scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Array,
    Map,
    Record,
}

/// One open structure on the read side.
#[derive(Debug, Clone)]
pub struct ReadFrame {
    pub kind: FrameKind,
    /// The op that opened the structure.
    pub op: OpId,
    /// Record: next field step. Array/map: items emitted so far.
    pub index: usize,
    /// Record: field steps plus reader defaults.
    pub total: usize,
    /// Items left in the current array/map block.
    pub remaining: u64,
    /// A field name or map key was emitted and its value is next.
    pub awaiting_value: bool,
    /// Record: op of the awaited field. Array/map: the shared item op.
    pub value_op: OpId,
}

impl ReadFrame {
    fn reset(&mut self, kind: FrameKind, op: OpId, value_op: OpId, total: usize) {
        self.kind = kind;
        self.op = op;
        self.index = 0;
        self.total = total;
        self.remaining = 0;
        self.awaiting_value = false;
        self.value_op = value_op;
    }

    /// Record: the field step at the cursor, advancing past it.
    pub fn advance(&mut self) -> usize {
        let index = self.index;
        self.index += 1;
        index
    }
}

/// Position reported by [`ReadContextStack::current_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCursor {
    /// Record: index of the field step now being visited.
    Field(usize),
    /// Array/map: the op every item or value is read with.
    Item(OpId),
}

/// Stack of open read structures. Depth zero is the root.
///
/// Frames above the current depth are kept and reset in place when a structure opens at
/// that depth again, so steady-state decoding does not allocate.
#[derive(Debug, Default)]
pub struct ReadContextStack {
    frames: Vec<ReadFrame>,
    depth: usize,
}

impl ReadContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn top(&self) -> Option<&ReadFrame> {
        self.depth.checked_sub(1).map(|i| &self.frames[i])
    }

    pub fn top_mut(&mut self) -> Option<&mut ReadFrame> {
        match self.depth.checked_sub(1) {
            Some(i) => Some(&mut self.frames[i]),
            None => None,
        }
    }

    /// Open an array whose items are read with `item`. No block is open yet.
    pub fn enter_array(&mut self, op: OpId, item: OpId) {
        self.enter(FrameKind::Array, op, item, 0);
    }

    /// Open a map whose values are read with `value`. No block is open yet.
    pub fn enter_map(&mut self, op: OpId, value: OpId) {
        self.enter(FrameKind::Map, op, value, 0);
    }

    /// Open a record with `total` fields to emit or skip.
    pub fn enter_record(&mut self, op: OpId, total: usize) {
        self.enter(FrameKind::Record, op, op, total);
    }

    fn enter(&mut self, kind: FrameKind, op: OpId, value_op: OpId, total: usize) {
        if let Some(frame) = self.frames.get_mut(self.depth) {
            frame.reset(kind, op, value_op, total);
        } else {
            self.frames.push(ReadFrame {
                kind,
                op,
                index: 0,
                total,
                remaining: 0,
                awaiting_value: false,
                value_op,
            });
        }
        self.depth += 1;
    }

    /// Close the innermost structure.
    ///
    /// # Errors
    /// `StreamError::Structural` at the root, or for a record with fields not yet visited.
    pub fn exit(&mut self) -> Result<FrameKind, StreamError> {
        let frame = self
            .top()
            .ok_or_else(|| StreamError::structural("No open structure to close"))?;
        if frame.kind == FrameKind::Record && frame.index < frame.total {
            return Err(StreamError::structural(format!(
                "Record closed after {} of {} fields",
                frame.index, frame.total
            )));
        }
        let kind = frame.kind;
        self.depth -= 1;
        Ok(kind)
    }

    /// The innermost scope's cursor. For a record this advances to the next field step.
    pub fn current_field(&mut self) -> Option<FieldCursor> {
        let frame = self.top_mut()?;
        Some(match frame.kind {
            FrameKind::Record => FieldCursor::Field(frame.advance()),
            FrameKind::Array | FrameKind::Map => FieldCursor::Item(frame.value_op),
        })
    }

    /// Drop every open frame, keeping the allocations.
    pub fn clear(&mut self) {
        self.depth = 0;
    }
}

/// What a record frame expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// A field name or the end of the record.
    Name,
    /// The value of the field at this index.
    Value(usize),
    /// The value of an undeclared field, to be dropped.
    Discard,
}

/// One open structure on the write side.
#[derive(Debug, Clone)]
pub enum WriteFrame {
    Record {
        node: NodeId,
        /// Buffer position where the record's first field begins.
        start: usize,
        /// Byte span of each field written so far, by schema field index.
        spans: Vec<Option<(usize, usize)>>,
        state: FieldState,
        /// Buffer position where the awaited field value begins.
        value_start: usize,
    },
    Array {
        item: NodeId,
        /// Buffer position of the first item in the open block.
        block_start: usize,
        /// Items in the open block.
        count: u64,
    },
    Map {
        value: NodeId,
        block_start: usize,
        count: u64,
        /// A key was written and its value is next.
        awaiting: bool,
    },
    /// A value being dropped, with any nested structures.
    Discard,
}

impl WriteFrame {
    pub fn record(node: NodeId, start: usize, fields: usize) -> Self {
        WriteFrame::Record {
            node,
            start,
            spans: vec![None; fields],
            state: FieldState::Name,
            value_start: start,
        }
    }

    pub fn array(item: NodeId, block_start: usize) -> Self {
        WriteFrame::Array {
            item,
            block_start,
            count: 0,
        }
    }

    pub fn map(value: NodeId, block_start: usize) -> Self {
        WriteFrame::Map {
            value,
            block_start,
            count: 0,
            awaiting: false,
        }
    }

    /// Whether the structure may end here.
    pub fn can_close(&self) -> bool {
        match self {
            WriteFrame::Record { state, .. } => *state == FieldState::Name,
            WriteFrame::Map { awaiting, .. } => !awaiting,
            WriteFrame::Array { .. } | WriteFrame::Discard => true,
        }
    }
}

/// Stack of open write structures. Empty is the root.
#[derive(Debug, Default)]
pub struct WriteContextStack {
    frames: Vec<WriteFrame>,
}

impl WriteContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_root(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, frame: WriteFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<WriteFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&WriteFrame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut WriteFrame> {
        self.frames.last_mut()
    }

    /// Whether the innermost structure may end now. True at the root.
    pub fn can_close(&self) -> bool {
        self.top().map_or(true, WriteFrame::can_close)
    }

    /// Whether any enclosing frame is being dropped.
    pub fn is_discarding(&self) -> bool {
        matches!(self.top(), Some(WriteFrame::Discard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_frames_reused_in_place() {
        let mut stack = ReadContextStack::new();
        stack.enter_record(3, 2);
        stack.enter_array(5, 6);
        stack.top_mut().unwrap().remaining = 4;
        assert_eq!(stack.exit().unwrap(), FrameKind::Array);

        stack.enter_map(7, 8);
        let top = stack.top().unwrap();
        assert_eq!(top.kind, FrameKind::Map);
        assert_eq!(top.remaining, 0);
        assert_eq!(top.value_op, 8);
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn test_current_field() {
        let mut stack = ReadContextStack::new();
        assert_eq!(stack.current_field(), None);
        stack.enter_record(1, 2);
        assert_eq!(stack.current_field(), Some(FieldCursor::Field(0)));
        assert_eq!(stack.current_field(), Some(FieldCursor::Field(1)));
        stack.enter_array(4, 9);
        assert_eq!(stack.current_field(), Some(FieldCursor::Item(9)));
        stack.exit().unwrap();
        assert_eq!(stack.exit().unwrap(), FrameKind::Record);
    }

    #[test]
    fn test_record_exit_requires_all_fields() {
        let mut stack = ReadContextStack::new();
        stack.enter_record(0, 2);
        stack.top_mut().unwrap().advance();
        assert!(matches!(stack.exit(), Err(StreamError::Structural(_))));

        stack.top_mut().unwrap().advance();
        assert_eq!(stack.exit().unwrap(), FrameKind::Record);
        assert!(stack.is_root());
        assert!(stack.exit().is_err());
    }

    #[test]
    fn test_write_can_close() {
        let mut stack = WriteContextStack::new();
        assert!(stack.can_close());
        stack.push(WriteFrame::record(0, 0, 1));
        assert!(stack.can_close());
        if let Some(WriteFrame::Record { state, .. }) = stack.top_mut() {
            *state = FieldState::Value(0);
        }
        assert!(!stack.can_close());

        stack.push(WriteFrame::map(1, 0));
        if let Some(WriteFrame::Map { awaiting, .. }) = stack.top_mut() {
            *awaiting = true;
        }
        assert!(!stack.can_close());
        stack.pop();
        stack.push(WriteFrame::Discard);
        assert!(stack.is_discarding());
        assert_eq!(stack.depth(), 2);
    }
}
