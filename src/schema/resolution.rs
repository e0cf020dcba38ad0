//! Writer-to-reader schema resolution.
//!
//! A [`ReadPlan`] is an arena of [`ReadOp`]s the token parser executes: one op per
//! (writer node, reader node) pair, with recursion closed through memoized op indices.
//! The plan of a schema read with itself is the identity plan: every op reads exactly
//! what the node declares and nothing is translated.
//!
//! Resolution rules follow the Avro specification:
//! - records match fields by name or reader alias; writer-only fields are skipped,
//!   reader-only fields come from their defaults
//! - numeric promotion widens int → long → float → double, strings and bytes interchange
//! - enums translate through symbol names
//! - unions resolve each writer branch against the reader

use std::collections::{HashMap, HashSet};

use super::compiled::{Node, NodeId, Schema};
use super::types::SchemaKind;
use crate::error::SchemaError;
use crate::value::AvroValue;

/// Index of an op in a [`ReadPlan`].
pub type OpId = usize;

/// Type promotions supported by Avro schema resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePromotion {
    /// int → long
    IntToLong,
    /// int → float
    IntToFloat,
    /// int → double
    IntToDouble,
    /// long → float
    LongToFloat,
    /// long → double
    LongToDouble,
    /// float → double
    FloatToDouble,
    /// string → bytes
    StringToBytes,
    /// bytes → string
    BytesToString,
}

impl TypePromotion {
    /// The promotion reading `writer` data as `reader`, if one exists.
    ///
    /// Identical kinds need no promotion and yield `None`, as does any narrowing.
    pub fn between(writer: SchemaKind, reader: SchemaKind) -> Option<Self> {
        use SchemaKind::*;
        Some(match (writer, reader) {
            (Int, Long) => TypePromotion::IntToLong,
            (Int, Float) => TypePromotion::IntToFloat,
            (Int, Double) => TypePromotion::IntToDouble,
            (Long, Float) => TypePromotion::LongToFloat,
            (Long, Double) => TypePromotion::LongToDouble,
            (Float, Double) => TypePromotion::FloatToDouble,
            (String, Bytes) => TypePromotion::StringToBytes,
            (Bytes, String) => TypePromotion::BytesToString,
            _ => return None,
        })
    }
}

/// One instruction of a read plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOp {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    /// Read the writer's primitive and widen it to the reader's.
    Promote(TypePromotion),
    Fixed {
        size: usize,
    },
    /// Writer symbols by wire index; `Err` holds a writer symbol the reader lacks.
    Enum {
        name: String,
        symbols: Vec<Result<String, String>>,
    },
    Array(OpId),
    Map(OpId),
    /// Writer branches by wire index.
    Union(Vec<Branch>),
    Record {
        name: String,
        steps: Vec<FieldStep>,
        /// Reader-only fields, emitted after the writer's fields.
        defaults: Vec<(String, AvroValue)>,
    },
    /// Read through a registered custom encoding.
    Custom {
        key: String,
        name: String,
    },
}

/// One writer union branch.
#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    Read(OpId),
    /// The reader has no counterpart. Fails when it occurs; `skip` still steps over it.
    Unreadable { reason: String, skip: OpId },
}

/// What to do with one writer field, in writer order.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldStep {
    /// Decode and emit under the reader's field name.
    Read { name: String, op: OpId },
    /// Decode and discard a field the reader does not declare.
    Skip { name: String, op: OpId },
}

/// The compiled instructions for reading one writer schema as one reader schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPlan {
    ops: Vec<ReadOp>,
    root: OpId,
    identity: bool,
}

impl ReadPlan {
    /// The plan reading data written with `schema` itself.
    pub fn identity(schema: &Schema) -> Self {
        let mut builder = PlanBuilder::new(schema, schema);
        let root = builder.plain(schema.root());
        Self {
            ops: builder.ops,
            root,
            identity: true,
        }
    }

    /// Build the plan reading `writer` data as `reader`.
    ///
    /// Structurally equal schemas yield the identity plan.
    pub fn resolve(writer: &Schema, reader: &Schema) -> Result<Self, SchemaError> {
        if writer == reader {
            return Ok(Self::identity(reader));
        }
        let mut builder = PlanBuilder::new(writer, reader);
        let root = builder.resolve(writer.root(), reader.root())?;
        Ok(Self {
            ops: builder.ops,
            root,
            identity: false,
        })
    }

    pub fn root(&self) -> OpId {
        self.root
    }

    pub fn op(&self, id: OpId) -> &ReadOp {
        &self.ops[id]
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether this plan reads a schema as itself.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Keys of every custom encoding the plan may call.
    pub fn custom_keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ops.iter().filter_map(|op| match op {
            ReadOp::Custom { key, name } => Some((key.as_str(), name.as_str())),
            _ => None,
        })
    }
}

struct PlanBuilder<'s> {
    writer: &'s Schema,
    reader: &'s Schema,
    ops: Vec<ReadOp>,
    resolved: HashMap<(NodeId, NodeId), OpId>,
    plain: HashMap<NodeId, OpId>,
    /// Insertion order of `resolved`, so a failed attempt can be rolled back.
    journal: Vec<(NodeId, NodeId)>,
}

impl<'s> PlanBuilder<'s> {
    fn new(writer: &'s Schema, reader: &'s Schema) -> Self {
        Self {
            writer,
            reader,
            ops: Vec::new(),
            resolved: HashMap::new(),
            plain: HashMap::new(),
            journal: Vec::new(),
        }
    }

    fn push(&mut self, op: ReadOp) -> OpId {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Op reading a writer node as itself. Used for identity plans and skipped fields.
    fn plain(&mut self, id: NodeId) -> OpId {
        if let Some(&op) = self.plain.get(&id) {
            return op;
        }
        let schema = self.writer;
        let op = match schema.node(id) {
            Node::Null => ReadOp::Null,
            Node::Boolean => ReadOp::Boolean,
            Node::Int => ReadOp::Int,
            Node::Long => ReadOp::Long,
            Node::Float => ReadOp::Float,
            Node::Double => ReadOp::Double,
            Node::Bytes => ReadOp::Bytes,
            Node::String => ReadOp::String,
            node if node.custom_encoding().is_some() => custom_op(node),
            Node::Fixed { size, .. } => ReadOp::Fixed { size: *size },
            Node::Enum {
                fullname, symbols, ..
            } => ReadOp::Enum {
                name: fullname.clone(),
                symbols: symbols.iter().cloned().map(Ok).collect(),
            },
            Node::Array(item) => {
                let slot = self.reserve_plain(id);
                let item = self.plain(*item);
                self.ops[slot] = ReadOp::Array(item);
                return slot;
            }
            Node::Map(values) => {
                let slot = self.reserve_plain(id);
                let values = self.plain(*values);
                self.ops[slot] = ReadOp::Map(values);
                return slot;
            }
            Node::Union(branches) => {
                let slot = self.reserve_plain(id);
                let branches = branches.iter().map(|b| Branch::Read(self.plain(*b))).collect();
                self.ops[slot] = ReadOp::Union(branches);
                return slot;
            }
            Node::Record {
                fullname, fields, ..
            } => {
                let slot = self.reserve_plain(id);
                let steps = fields
                    .iter()
                    .map(|f| FieldStep::Read {
                        name: f.name.clone(),
                        op: self.plain(f.node),
                    })
                    .collect();
                self.ops[slot] = ReadOp::Record {
                    name: fullname.clone(),
                    steps,
                    defaults: Vec::new(),
                };
                return slot;
            }
        };
        let slot = self.push(op);
        self.plain.insert(id, slot);
        slot
    }

    fn reserve_plain(&mut self, id: NodeId) -> OpId {
        let slot = self.push(ReadOp::Null);
        self.plain.insert(id, slot);
        slot
    }

    fn resolve(&mut self, w: NodeId, r: NodeId) -> Result<OpId, SchemaError> {
        if let Some(&op) = self.resolved.get(&(w, r)) {
            return Ok(op);
        }
        let (writer, reader) = (self.writer, self.reader);
        let (wn, rn) = (writer.node(w), reader.node(r));

        if let Node::Union(branches) = wn {
            let slot = self.reserve(w, r);
            let mut ops = Vec::with_capacity(branches.len());
            for &branch in branches {
                ops.push(match self.attempt(branch, r) {
                    Ok(op) => Branch::Read(op),
                    Err(e) => Branch::Unreadable {
                        reason: e.to_string(),
                        skip: self.plain(branch),
                    },
                });
            }
            self.ops[slot] = ReadOp::Union(ops);
            return Ok(slot);
        }

        if let Node::Union(branches) = rn {
            let branch = self.select_branch(w, branches).ok_or_else(|| {
                incompatible(format!(
                    "No branch of reader union matches writer type '{}'",
                    describe(wn)
                ))
            })?;
            let op = self.resolve(w, branch)?;
            self.remember(w, r, op);
            return Ok(op);
        }

        let op = match (wn, rn) {
            (Node::Null, Node::Null) => ReadOp::Null,
            (Node::Boolean, Node::Boolean) => ReadOp::Boolean,
            (Node::Int, Node::Int) => ReadOp::Int,
            (Node::Long, Node::Long) => ReadOp::Long,
            (Node::Float, Node::Float) => ReadOp::Float,
            (Node::Double, Node::Double) => ReadOp::Double,
            (Node::Bytes, Node::Bytes) => ReadOp::Bytes,
            (Node::String, Node::String) => ReadOp::String,
            _ if wn.kind().is_named() && wn.kind() == rn.kind() => {
                if !names_match(wn, rn) {
                    return Err(incompatible(format!(
                        "Writer type '{}' does not match reader type '{}'",
                        describe(wn),
                        describe(rn)
                    )));
                }
                return self.resolve_named(w, r);
            }
            (Node::Array(wi), Node::Array(ri)) => {
                let slot = self.reserve(w, r);
                let item = self.resolve(*wi, *ri)?;
                self.ops[slot] = ReadOp::Array(item);
                return Ok(slot);
            }
            (Node::Map(wv), Node::Map(rv)) => {
                let slot = self.reserve(w, r);
                let values = self.resolve(*wv, *rv)?;
                self.ops[slot] = ReadOp::Map(values);
                return Ok(slot);
            }
            _ => match TypePromotion::between(wn.kind(), rn.kind()) {
                Some(promotion) => ReadOp::Promote(promotion),
                None => {
                    return Err(incompatible(format!(
                        "Cannot read writer type '{}' as reader type '{}'",
                        describe(wn),
                        describe(rn)
                    )))
                }
            },
        };
        let slot = self.push(op);
        self.remember(w, r, slot);
        Ok(slot)
    }

    fn resolve_named(&mut self, w: NodeId, r: NodeId) -> Result<OpId, SchemaError> {
        let (writer, reader) = (self.writer, self.reader);
        let (wn, rn) = (writer.node(w), reader.node(r));

        match (wn.custom_encoding(), rn.custom_encoding()) {
            (None, None) => {}
            (Some(wk), Some(rk)) if wk == rk => {
                let slot = self.push(custom_op(wn));
                self.remember(w, r, slot);
                return Ok(slot);
            }
            (wk, rk) => {
                return Err(incompatible(format!(
                    "'{}' is custom encoded as {} by the writer and as {} by the reader",
                    describe(rn),
                    wk.map_or("nothing".to_string(), |k| format!("'{}'", k)),
                    rk.map_or("nothing".to_string(), |k| format!("'{}'", k)),
                )));
            }
        }

        let op = match (wn, rn) {
            (Node::Fixed { size: ws, .. }, Node::Fixed { size: rs, .. }) => {
                if ws != rs {
                    return Err(incompatible(format!(
                        "Fixed '{}' has size {} in the writer and {} in the reader",
                        describe(rn),
                        ws,
                        rs
                    )));
                }
                ReadOp::Fixed { size: *rs }
            }
            (
                Node::Enum {
                    symbols: writer_symbols,
                    ..
                },
                Node::Enum {
                    fullname,
                    symbols: reader_symbols,
                    ..
                },
            ) => ReadOp::Enum {
                name: fullname.clone(),
                symbols: writer_symbols
                    .iter()
                    .map(|s| {
                        if reader_symbols.contains(s) {
                            Ok(s.clone())
                        } else {
                            Err(s.clone())
                        }
                    })
                    .collect(),
            },
            (
                Node::Record {
                    fields: writer_fields,
                    ..
                },
                Node::Record {
                    fullname,
                    fields: reader_fields,
                    ..
                },
            ) => {
                let slot = self.reserve(w, r);
                let mut matched = HashSet::new();
                let mut steps = Vec::with_capacity(writer_fields.len());

                for wf in writer_fields {
                    let target = reader_fields.iter().enumerate().find(|(i, rf)| {
                        !matched.contains(i)
                            && (rf.name == wf.name || rf.aliases.iter().any(|a| *a == wf.name))
                    });
                    match target {
                        Some((i, rf)) => {
                            matched.insert(i);
                            let op = self.resolve(wf.node, rf.node)?;
                            steps.push(FieldStep::Read {
                                name: rf.name.clone(),
                                op,
                            });
                        }
                        None => steps.push(FieldStep::Skip {
                            name: wf.name.clone(),
                            op: self.plain(wf.node),
                        }),
                    }
                }

                let mut defaults = Vec::new();
                for (i, rf) in reader_fields.iter().enumerate() {
                    if matched.contains(&i) {
                        continue;
                    }
                    let value = match &rf.default {
                        Some(json) => AvroValue::from_default(json, reader, rf.node)?,
                        None if reader.is_nullable(rf.node) => AvroValue::Null,
                        None => {
                            return Err(incompatible(format!(
                                "Reader field '{}.{}' is missing from the writer and has no default",
                                fullname, rf.name
                            )))
                        }
                    };
                    defaults.push((rf.name.clone(), value));
                }

                self.ops[slot] = ReadOp::Record {
                    name: fullname.clone(),
                    steps,
                    defaults,
                };
                return Ok(slot);
            }
            _ => {
                return Err(incompatible(format!(
                    "Cannot read writer type '{}' as reader type '{}'",
                    describe(wn),
                    describe(rn)
                )))
            }
        };
        let slot = self.push(op);
        self.remember(w, r, slot);
        Ok(slot)
    }

    /// First reader branch matching by kind (and name), else the first promotion target.
    fn select_branch(&self, w: NodeId, branches: &[NodeId]) -> Option<NodeId> {
        let wn = self.writer.node(w);
        let reader = self.reader;
        branches
            .iter()
            .copied()
            .find(|&b| {
                let rn = reader.node(b);
                rn.kind() == wn.kind() && (!wn.kind().is_named() || names_match(wn, rn))
            })
            .or_else(|| {
                branches
                    .iter()
                    .copied()
                    .find(|&b| TypePromotion::between(wn.kind(), reader.node(b).kind()).is_some())
            })
    }

    /// Resolve a writer union branch, undoing any partial work if it fails.
    fn attempt(&mut self, w: NodeId, r: NodeId) -> Result<OpId, SchemaError> {
        let ops_mark = self.ops.len();
        let journal_mark = self.journal.len();
        let plain_len = self.plain.len();

        let result = self.resolve(w, r);
        if result.is_err() {
            for key in self.journal.drain(journal_mark..) {
                self.resolved.remove(&key);
            }
            if self.plain.len() != plain_len {
                self.plain.retain(|_, op| *op < ops_mark);
            }
            self.ops.truncate(ops_mark);
        }
        result
    }

    fn reserve(&mut self, w: NodeId, r: NodeId) -> OpId {
        let slot = self.push(ReadOp::Null);
        self.remember(w, r, slot);
        slot
    }

    fn remember(&mut self, w: NodeId, r: NodeId, op: OpId) {
        if self.resolved.insert((w, r), op).is_none() {
            self.journal.push((w, r));
        }
    }
}

fn custom_op(node: &Node) -> ReadOp {
    ReadOp::Custom {
        key: node.custom_encoding().unwrap_or_default().to_string(),
        name: node.fullname().unwrap_or_default().to_string(),
    }
}

fn names_match(writer: &Node, reader: &Node) -> bool {
    match writer.fullname() {
        Some(name) => reader.answers_to(name) || writer.answers_to(reader.fullname().unwrap_or("")),
        None => false,
    }
}

fn describe(node: &Node) -> &str {
    node.fullname().unwrap_or(node.kind().name())
}

fn incompatible(message: String) -> SchemaError {
    SchemaError::IncompatibleSchemas(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(writer: &str, reader: &str) -> Result<ReadPlan, SchemaError> {
        ReadPlan::resolve(
            &Schema::parse(writer).unwrap(),
            &Schema::parse(reader).unwrap(),
        )
    }

    #[test]
    fn test_type_promotion_between() {
        use SchemaKind::*;
        assert_eq!(TypePromotion::between(Int, Long), Some(TypePromotion::IntToLong));
        assert_eq!(TypePromotion::between(Float, Double), Some(TypePromotion::FloatToDouble));
        assert_eq!(TypePromotion::between(Bytes, String), Some(TypePromotion::BytesToString));
        assert_eq!(TypePromotion::between(Long, Int), None);
        assert_eq!(TypePromotion::between(Double, Float), None);
    }

    #[test]
    fn test_equal_schemas_give_identity() {
        let text = r#"{"type": "array", "items": ["null", "long"]}"#;
        let plan = plan(text, text).unwrap();
        assert!(plan.is_identity());
        let ReadOp::Array(item) = plan.op(plan.root()) else {
            panic!("expected array op");
        };
        assert!(
            matches!(plan.op(*item), ReadOp::Union(b) if b.iter().all(|b| matches!(b, Branch::Read(_))))
        );
    }

    #[test]
    fn test_added_field_uses_default() {
        let plan = plan(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": "int"}, {"name": "b", "type": "string"}]}"#,
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": "int"}, {"name": "c", "type": "int", "default": 42}]}"#,
        )
        .unwrap();
        let ReadOp::Record { steps, defaults, .. } = plan.op(plan.root()) else {
            panic!("expected record op");
        };
        assert!(matches!(&steps[0], FieldStep::Read { name, .. } if name == "a"));
        assert!(matches!(&steps[1], FieldStep::Skip { name, .. } if name == "b"));
        assert_eq!(defaults, &vec![("c".to_string(), AvroValue::Int(42))]);
    }

    #[test]
    fn test_missing_default_is_error() {
        let err = plan(
            r#"{"type": "record", "name": "R", "fields": []}"#,
            r#"{"type": "record", "name": "R", "fields": [{"name": "c", "type": "int"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::IncompatibleSchemas(_)));
    }

    #[test]
    fn test_nullable_field_defaults_to_null() {
        let plan = plan(
            r#"{"type": "record", "name": "R", "fields": []}"#,
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "n", "type": ["string", "null"]}]}"#,
        )
        .unwrap();
        let ReadOp::Record { defaults, .. } = plan.op(plan.root()) else {
            panic!("expected record op");
        };
        assert_eq!(defaults, &vec![("n".to_string(), AvroValue::Null)]);
    }

    #[test]
    fn test_field_matched_by_alias() {
        let plan = plan(
            r#"{"type": "record", "name": "R", "fields": [{"name": "old", "type": "int"}]}"#,
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "new", "type": "long", "aliases": ["old"]}]}"#,
        )
        .unwrap();
        let ReadOp::Record { steps, .. } = plan.op(plan.root()) else {
            panic!("expected record op");
        };
        let FieldStep::Read { name, op } = &steps[0] else {
            panic!("expected read step");
        };
        assert_eq!(name, "new");
        assert_eq!(plan.op(*op), &ReadOp::Promote(TypePromotion::IntToLong));
    }

    #[test]
    fn test_narrowing_rejected() {
        assert!(matches!(
            plan(r#""long""#, r#""int""#),
            Err(SchemaError::IncompatibleSchemas(_))
        ));
    }

    #[test]
    fn test_enum_symbol_mapping() {
        let plan = plan(
            r#"{"type": "enum", "name": "E", "symbols": ["A", "B", "C"]}"#,
            r#"{"type": "enum", "name": "E", "symbols": ["C", "A"]}"#,
        )
        .unwrap();
        let ReadOp::Enum { symbols, .. } = plan.op(plan.root()) else {
            panic!("expected enum op");
        };
        assert_eq!(
            symbols,
            &vec![Ok("A".to_string()), Err("B".to_string()), Ok("C".to_string())]
        );
    }

    #[test]
    fn test_fixed_size_mismatch() {
        assert!(plan(
            r#"{"type": "fixed", "name": "F", "size": 4}"#,
            r#"{"type": "fixed", "name": "F", "size": 8}"#,
        )
        .is_err());
    }

    #[test]
    fn test_writer_union_branch_failure_is_deferred() {
        let plan = plan(r#"["int", "boolean"]"#, r#"["null", "long"]"#).unwrap();
        let ReadOp::Union(branches) = plan.op(plan.root()) else {
            panic!("expected union op");
        };
        let Branch::Read(first) = &branches[0] else {
            panic!("int branch should resolve");
        };
        assert_eq!(plan.op(*first), &ReadOp::Promote(TypePromotion::IntToLong));
        let Branch::Unreadable { skip, .. } = &branches[1] else {
            panic!("boolean branch should not resolve");
        };
        assert_eq!(plan.op(*skip), &ReadOp::Boolean);
    }

    #[test]
    fn test_non_union_writer_without_reader_branch() {
        assert!(plan(r#""boolean""#, r#"["null", "string"]"#).is_err());
    }

    #[test]
    fn test_reader_union_prefers_exact_kind() {
        let plan = plan(r#""int""#, r#"["long", "int"]"#).unwrap();
        assert_eq!(plan.op(plan.root()), &ReadOp::Int);
    }

    #[test]
    fn test_custom_encoding_must_agree() {
        let money = |custom: &str| {
            format!(
                r#"{{"type": "record", "name": "Money", {} "fields": [
                    {{"name": "units", "type": "long"}}]}}"#,
                custom
            )
        };
        let declared = money(r#""customEncoding": "money","#);
        let other = money(r#""customEncoding": "cents","#);
        let bare = money("");

        let both = plan(&declared, &declared).unwrap();
        assert_eq!(
            both.custom_keys().collect::<Vec<_>>(),
            vec![("money", "Money")]
        );
        assert!(matches!(
            plan(&declared, &bare),
            Err(SchemaError::IncompatibleSchemas(_))
        ));
        assert!(matches!(
            plan(&bare, &declared),
            Err(SchemaError::IncompatibleSchemas(_))
        ));
        assert!(matches!(
            plan(&declared, &other),
            Err(SchemaError::IncompatibleSchemas(_))
        ));
    }

    #[test]
    fn test_recursive_resolution_terminates() {
        let writer = r#"{"type": "record", "name": "Node", "fields": [
            {"name": "v", "type": "int"},
            {"name": "next", "type": ["null", "Node"]}]}"#;
        let reader = r#"{"type": "record", "name": "Node", "fields": [
            {"name": "v", "type": "long"},
            {"name": "next", "type": ["null", "Node"]}]}"#;
        let plan = plan(writer, reader).unwrap();
        let ReadOp::Record { steps, .. } = plan.op(plan.root()) else {
            panic!("expected record op");
        };
        let FieldStep::Read { op, .. } = &steps[1] else {
            panic!("expected read step");
        };
        let ReadOp::Union(branches) = plan.op(*op) else {
            panic!("expected union op");
        };
        assert_eq!(branches[1], Branch::Read(plan.root()));
    }
}
