use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema_registry::SchemaRegistry;

/// Out-of-band settings that travel with a schema but are not part of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Template identifier; inputs carrying one are stored, not resolved.
    pub id: Option<String>,
    /// Templates merged into the root, in priority order.
    pub refs: Vec<String>,
    /// Any other sigil-prefixed root keys, kept verbatim.
    pub extra: Map<String, Value>,
}

/// One schema passed to a batch call, split into config and schema body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInput {
    pub config: InputConfig,
    pub schema: Value,
}

impl SchemaInput {
    pub fn new(schema: Value) -> Self {
        Self {
            config: InputConfig::default(),
            schema,
        }
    }

    pub fn template(id: &str, schema: Value) -> Self {
        Self::new(schema).with_id(id)
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.config.id = Some(id.to_string());
        self
    }

    pub fn with_refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.refs = refs.into_iter().map(Into::into).collect();
        self
    }

    /// Split an authored root into config and schema.
    ///
    /// Only root keys are inspected; the reference key may still appear in
    /// nested fragments and is resolved by the template walker.
    pub fn from_value(value: Value, registry: &SchemaRegistry) -> Self {
        let map = match value {
            Value::Object(map) => map,
            other => return Self::new(other),
        };

        let mut config = InputConfig::default();
        let mut schema = Map::new();
        for (key, value) in map {
            if !registry.is_config_key(&key) {
                schema.insert(key, value);
            } else if key == registry.id_key() {
                config.id = value.as_str().map(|s| s.to_string());
            } else if key == registry.ref_key() {
                config.refs = reference_ids(&value);
            } else {
                config.extra.insert(key, value);
            }
        }

        Self {
            config,
            schema: Value::Object(schema),
        }
    }

    pub fn is_template(&self) -> bool {
        self.config.id.is_some()
    }
}

/// Expand a reference value (one id or a list of ids) into identifiers.
pub fn reference_ids(value: &Value) -> Vec<String> {
    match value {
        Value::String(id) => vec![id.clone()],
        Value::Array(ids) => ids
            .iter()
            .filter_map(|id| id.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Flatten nested lists of authored schemas into ordered inputs.
///
/// Entries that can never be a schema (numbers, booleans, null) are skipped.
pub fn flatten_inputs(values: &[Value], registry: &SchemaRegistry) -> Vec<SchemaInput> {
    let mut inputs = Vec::new();
    for value in values {
        collect_input(value, registry, &mut inputs);
    }
    inputs
}

fn collect_input(value: &Value, registry: &SchemaRegistry, inputs: &mut Vec<SchemaInput>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_input(item, registry, inputs);
            }
        }
        Value::Object(_) | Value::String(_) => {
            inputs.push(SchemaInput::from_value(value.clone(), registry));
        }
        _ => {
            tracing::debug!(input = %value, "skipping batch entry that is not a schema");
        }
    }
}
