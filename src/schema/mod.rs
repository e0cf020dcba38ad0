//! Avro schemas: the JSON tree, its compiled arena, and writer/reader resolution.
//!
//! - [`AvroSchema`] is the tree the parser produces and serializes back to JSON.
//! - [`Schema`] compiles a tree into an immutable node arena shared through `Arc`.
//! - [`ReadPlan`] holds the instructions for reading one schema's data as another.

mod compiled;
mod pair;
mod parser;
mod resolution;
mod types;

pub use compiled::{FieldNode, Node, NodeId, Schema};
pub use pair::SchemaPair;
pub use parser::{parse_schema, parse_schema_with_options, SchemaParser};
pub use resolution::{Branch, FieldStep, OpId, ReadOp, ReadPlan, TypePromotion};
pub use types::*;
