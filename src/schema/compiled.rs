//! Compiled schema arena.
//!
//! [`Schema`] flattens an [`AvroSchema`] tree into a vector of [`Node`]s. Named-type
//! references become [`NodeId`] indices, so recursive types are plain back-edges and the
//! name table never changes after compilation.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use super::parser::parse_schema_with_options;
use super::resolution::ReadPlan;
use super::types::{AvroSchema, SchemaKind};
use crate::error::SchemaError;

/// Index of a node in a [`Schema`] arena.
pub type NodeId = usize;

/// One compiled schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Fixed {
        fullname: String,
        aliases: Vec<String>,
        size: usize,
        custom: Option<String>,
    },
    Enum {
        fullname: String,
        aliases: Vec<String>,
        symbols: Vec<String>,
    },
    Array(NodeId),
    Map(NodeId),
    Union(Vec<NodeId>),
    Record {
        fullname: String,
        aliases: Vec<String>,
        fields: Vec<FieldNode>,
        custom: Option<String>,
    },
}

/// A compiled record field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub name: String,
    pub aliases: Vec<String>,
    pub node: NodeId,
    pub default: Option<Value>,
}

impl Node {
    pub fn kind(&self) -> SchemaKind {
        match self {
            Node::Null => SchemaKind::Null,
            Node::Boolean => SchemaKind::Boolean,
            Node::Int => SchemaKind::Int,
            Node::Long => SchemaKind::Long,
            Node::Float => SchemaKind::Float,
            Node::Double => SchemaKind::Double,
            Node::Bytes => SchemaKind::Bytes,
            Node::String => SchemaKind::String,
            Node::Fixed { .. } => SchemaKind::Fixed,
            Node::Enum { .. } => SchemaKind::Enum,
            Node::Array(_) => SchemaKind::Array,
            Node::Map(_) => SchemaKind::Map,
            Node::Union(_) => SchemaKind::Union,
            Node::Record { .. } => SchemaKind::Record,
        }
    }

    /// Full name of a named node.
    pub fn fullname(&self) -> Option<&str> {
        match self {
            Node::Fixed { fullname, .. }
            | Node::Enum { fullname, .. }
            | Node::Record { fullname, .. } => Some(fullname),
            _ => None,
        }
    }

    /// Whether `name` designates this named node, by full name, simple name or alias.
    pub fn answers_to(&self, name: &str) -> bool {
        let (fullname, aliases) = match self {
            Node::Fixed {
                fullname, aliases, ..
            }
            | Node::Enum {
                fullname, aliases, ..
            }
            | Node::Record {
                fullname, aliases, ..
            } => (fullname, aliases),
            _ => return false,
        };
        fullname == name
            || simple_name(fullname) == name
            || aliases.iter().any(|a| a == name || simple_name(a) == name)
    }

    /// Key of the custom encoding declared on this node.
    pub fn custom_encoding(&self) -> Option<&str> {
        match self {
            Node::Fixed { custom, .. } | Node::Record { custom, .. } => custom.as_deref(),
            _ => None,
        }
    }
}

pub(crate) fn simple_name(fullname: &str) -> &str {
    fullname.rsplit('.').next().unwrap_or(fullname)
}

/// An immutable, compiled schema.
///
/// Cheap to share through `Arc`; every stream built from it keeps it alive.
#[derive(Debug)]
pub struct Schema {
    nodes: Vec<Node>,
    root: NodeId,
    names: HashMap<String, NodeId>,
    source: AvroSchema,
    identity: OnceLock<Arc<ReadPlan>>,
}

impl PartialEq for Schema {
    /// Structural equality of the compiled graphs.
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.nodes == other.nodes
    }
}

impl Schema {
    /// Parse and compile schema JSON text.
    ///
    /// # Example
    /// ```
    /// use jetcodec::Schema;
    ///
    /// let schema = Schema::parse(r#"{"type": "record", "name": "Point", "fields": [
    ///     {"name": "x", "type": "int"}, {"name": "y", "type": "int"}
    /// ]}"#).unwrap();
    /// assert_eq!(schema.lookup("Point"), Some(schema.root()));
    /// ```
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        Self::new(parse_schema_with_options(text, false)?)
    }

    /// Parse with strict name validation.
    pub fn parse_strict(text: &str) -> Result<Self, SchemaError> {
        Self::new(parse_schema_with_options(text, true)?)
    }

    /// Compile a schema tree.
    ///
    /// Trees built by hand are checked the same way the parser checks JSON: unknown
    /// references and duplicate named-type definitions are errors.
    pub fn new(source: AvroSchema) -> Result<Self, SchemaError> {
        let mut compiler = Compiler::default();
        let root = compiler.compile(&source)?;
        Ok(Self {
            nodes: compiler.nodes,
            root,
            names: compiler.names,
            source,
            identity: OnceLock::new(),
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Look up a named type by full name.
    pub fn lookup(&self, fullname: &str) -> Option<NodeId> {
        self.names.get(fullname).copied()
    }

    /// The tree this schema was compiled from.
    pub fn source(&self) -> &AvroSchema {
        &self.source
    }

    /// Canonical JSON text of the schema.
    pub fn to_json(&self) -> String {
        self.source.to_json()
    }

    /// The plan that reads data written with this very schema.
    pub fn identity_plan(&self) -> Arc<ReadPlan> {
        self.identity
            .get_or_init(|| Arc::new(ReadPlan::identity(self)))
            .clone()
    }

    /// Nodes of every named type declaring a custom encoding.
    pub fn custom_nodes(&self) -> impl Iterator<Item = (NodeId, &str)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| node.custom_encoding().map(|key| (id, key)))
    }

    /// Whether a field of this node may be omitted on write and filled with null.
    pub fn is_nullable(&self, id: NodeId) -> bool {
        match &self.nodes[id] {
            Node::Null => true,
            Node::Union(branches) => branches
                .iter()
                .any(|b| matches!(self.nodes[*b], Node::Null)),
            _ => false,
        }
    }
}

#[derive(Default)]
struct Compiler {
    nodes: Vec<Node>,
    names: HashMap<String, NodeId>,
}

impl Compiler {
    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn register(&mut self, fullname: &str, id: NodeId) -> Result<(), SchemaError> {
        if self.names.insert(fullname.to_string(), id).is_some() {
            return Err(SchemaError::DuplicateName(fullname.to_string()));
        }
        Ok(())
    }

    fn compile(&mut self, schema: &AvroSchema) -> Result<NodeId, SchemaError> {
        let node = match schema {
            AvroSchema::Null => Node::Null,
            AvroSchema::Boolean => Node::Boolean,
            AvroSchema::Int => Node::Int,
            AvroSchema::Long => Node::Long,
            AvroSchema::Float => Node::Float,
            AvroSchema::Double => Node::Double,
            AvroSchema::Bytes => Node::Bytes,
            AvroSchema::String => Node::String,
            AvroSchema::Logical(logical) => return self.compile(&logical.base),
            AvroSchema::Named(name) => {
                return self
                    .names
                    .get(name)
                    .copied()
                    .ok_or_else(|| SchemaError::UnknownType(name.clone()))
            }
            AvroSchema::Fixed(fixed) => {
                let fullname = fixed.fullname();
                let id = self.push(Node::Fixed {
                    fullname: fullname.clone(),
                    aliases: fixed.aliases.clone(),
                    size: fixed.size,
                    custom: fixed.custom_encoding.clone(),
                });
                self.register(&fullname, id)?;
                return Ok(id);
            }
            AvroSchema::Enum(e) => {
                let fullname = e.fullname();
                let id = self.push(Node::Enum {
                    fullname: fullname.clone(),
                    aliases: e.aliases.clone(),
                    symbols: e.symbols.clone(),
                });
                self.register(&fullname, id)?;
                return Ok(id);
            }
            AvroSchema::Array(items) => {
                let id = self.push(Node::Null);
                let item = self.compile(items)?;
                self.nodes[id] = Node::Array(item);
                return Ok(id);
            }
            AvroSchema::Map(values) => {
                let id = self.push(Node::Null);
                let value = self.compile(values)?;
                self.nodes[id] = Node::Map(value);
                return Ok(id);
            }
            AvroSchema::Union(variants) => {
                let id = self.push(Node::Null);
                let branches = variants
                    .iter()
                    .map(|v| self.compile(v))
                    .collect::<Result<Vec<_>, _>>()?;
                self.check_union(&branches)?;
                self.nodes[id] = Node::Union(branches);
                return Ok(id);
            }
            AvroSchema::Record(record) => {
                let fullname = record.fullname();
                // Placeholder first: fields may point back at the record.
                let id = self.push(Node::Record {
                    fullname: fullname.clone(),
                    aliases: record.aliases.clone(),
                    fields: Vec::new(),
                    custom: record.custom_encoding.clone(),
                });
                self.register(&fullname, id)?;

                let mut fields = Vec::with_capacity(record.fields.len());
                for field in &record.fields {
                    fields.push(FieldNode {
                        name: field.name.clone(),
                        aliases: field.aliases.clone(),
                        node: self.compile(&field.schema)?,
                        default: field.default.clone(),
                    });
                }
                if let Node::Record { fields: slot, .. } = &mut self.nodes[id] {
                    *slot = fields;
                }
                return Ok(id);
            }
        };
        Ok(self.push(node))
    }

    fn check_union(&self, branches: &[NodeId]) -> Result<(), SchemaError> {
        let mut seen: Vec<(SchemaKind, Option<&str>)> = Vec::with_capacity(branches.len());
        for &branch in branches {
            let node = &self.nodes[branch];
            let key = (node.kind(), node.fullname());
            if key.0 == SchemaKind::Union {
                return Err(SchemaError::InvalidUnion(
                    "Union cannot directly contain another union".to_string(),
                ));
            }
            if seen.contains(&key) {
                return Err(SchemaError::InvalidUnion(format!(
                    "Union contains two branches of type '{}'",
                    key.1.unwrap_or(key.0.name())
                )));
            }
            seen.push(key);
        }
        Ok(())
    }
}
