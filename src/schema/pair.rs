//! Writer/reader schema pairing.

use std::sync::Arc;

use tracing::debug;

use super::compiled::Schema;
use super::resolution::ReadPlan;
use crate::error::SchemaError;

/// The schema data is read as, the schema it was written with, and the plan between them.
///
/// Without resolution both sides are the same `Arc` and the plan is the schema's cached
/// identity plan.
#[derive(Debug, Clone)]
pub struct SchemaPair {
    writer: Arc<Schema>,
    reader: Arc<Schema>,
    plan: Arc<ReadPlan>,
}

impl SchemaPair {
    /// Read data as the schema it was written with.
    pub fn single(schema: Arc<Schema>) -> Self {
        let plan = schema.identity_plan();
        Self {
            writer: schema.clone(),
            reader: schema,
            plan,
        }
    }

    /// Resolve `writer` data into the shape of `reader`.
    ///
    /// # Errors
    /// `SchemaError::IncompatibleSchemas` if the schemas cannot be resolved.
    pub fn resolve(writer: Arc<Schema>, reader: Arc<Schema>) -> Result<Self, SchemaError> {
        if Arc::ptr_eq(&writer, &reader) || *writer == *reader {
            let plan = reader.identity_plan();
            return Ok(Self {
                writer,
                reader,
                plan,
            });
        }
        let plan = Arc::new(ReadPlan::resolve(&writer, &reader)?);
        debug!(ops = plan.len(), "resolved writer schema against reader schema");
        Ok(Self {
            writer,
            reader,
            plan,
        })
    }

    pub fn writer(&self) -> &Arc<Schema> {
        &self.writer
    }

    /// The effective schema, whose shape the token stream follows.
    pub fn reader(&self) -> &Arc<Schema> {
        &self.reader
    }

    pub fn plan(&self) -> &Arc<ReadPlan> {
        &self.plan
    }

    /// Whether reading translates nothing.
    pub fn is_identity(&self) -> bool {
        self.plan.is_identity()
    }
}

impl PartialEq for SchemaPair {
    fn eq(&self, other: &Self) -> bool {
        self.writer == other.writer && self.reader == other.reader
    }
}
