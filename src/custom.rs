//! Custom encodings for individual named types.
//!
//! A record or fixed declaring `"customEncoding": "<key>"` is not walked field by field.
//! The parser hands the cursor to the plugin registered under that key and replays the
//! value it returns as tokens; the generator captures the written subtree into an
//! [`AvroValue`] and lets the plugin serialize it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{DecodeError, EncodeError, StreamError};
use crate::io::{BinaryDecoder, BinaryEncoder};
use crate::schema::{AvroSchema, ReadPlan, Schema};
use crate::value::AvroValue;

/// A hand-written binary form for one named type.
pub trait CustomEncoding: Send + Sync {
    /// The schema the plugin handles. Its full name must match the declaring type.
    fn schema(&self) -> AvroSchema;

    /// Serialize `value`.
    fn write(&self, value: &AvroValue, encoder: &mut BinaryEncoder) -> Result<(), EncodeError>;

    /// Deserialize one value. `reuse` is the last value this plugin produced on the stream.
    fn read(
        &self,
        reuse: Option<AvroValue>,
        decoder: &mut BinaryDecoder<'_>,
    ) -> Result<AvroValue, DecodeError>;
}

/// Registered plugins by key.
#[derive(Clone, Default)]
pub struct CustomEncodings {
    plugins: HashMap<String, Arc<dyn CustomEncoding>>,
}

impl CustomEncodings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, replacing any previous one under the same key.
    pub fn register(&mut self, key: impl Into<String>, plugin: Arc<dyn CustomEncoding>) {
        self.plugins.insert(key.into(), plugin);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, key: impl Into<String>, plugin: impl CustomEncoding + 'static) -> Self {
        self.register(key, Arc::new(plugin));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn CustomEncoding>> {
        self.plugins.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Check that every custom encoding `schema` declares is registered and matches.
    pub(crate) fn validate_schema(&self, schema: &Schema) -> Result<(), StreamError> {
        for (id, key) in schema.custom_nodes() {
            let name = schema.node(id).fullname().unwrap_or_default();
            self.check(key, name)?;
        }
        Ok(())
    }

    /// Check that every custom encoding `plan` may call is registered and matches.
    pub(crate) fn validate_plan(&self, plan: &ReadPlan) -> Result<(), StreamError> {
        for (key, name) in plan.custom_keys() {
            self.check(key, name)?;
        }
        Ok(())
    }

    fn check(&self, key: &str, fullname: &str) -> Result<(), StreamError> {
        let plugin = self.get(key).ok_or_else(|| {
            StreamError::Configuration(format!(
                "No custom encoding registered under '{}' (declared by '{}')",
                key, fullname
            ))
        })?;
        match plugin.schema().fullname() {
            Some(name) if name == fullname => Ok(()),
            other => Err(StreamError::Configuration(format!(
                "Custom encoding '{}' handles '{}', but '{}' declares it",
                key,
                other.as_deref().unwrap_or("an unnamed type"),
                fullname
            ))),
        }
    }
}

impl fmt::Debug for CustomEncodings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("CustomEncodings").field("keys", &keys).finish()
    }
}
