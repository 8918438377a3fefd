use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema_input::{flatten_inputs, reference_ids, InputConfig, SchemaInput};
use crate::schema_registry::SchemaRegistry;
use crate::schema_walker::{as_schema_node, fragment, merge_left, walk, KeywordTransform, Trace};

/// Template fragments keyed by identifier, built fresh for each batch.
pub type TemplateMap = HashMap<String, Value>;

/// A batch input whose references have been filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSchema {
    pub config: InputConfig,
    pub raw: Value,
}

impl ResolvedSchema {
    /// The `name` attribute of the schema, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }
}

/// Keyword transform that replaces reference keywords with template content.
pub struct ReferenceFill<'a> {
    templates: &'a TemplateMap,
    ref_key: &'a str,
}

impl<'a> ReferenceFill<'a> {
    pub fn new(templates: &'a TemplateMap, ref_key: &'a str) -> Self {
        Self { templates, ref_key }
    }

    /// Left-merge the named fragments in order; unknown ids are skipped.
    pub fn fill(&self, ids: &[String]) -> Map<String, Value> {
        let mut merged = Map::new();
        for id in ids {
            match self.templates.get(id).and_then(as_schema_node) {
                Some(template) => merge_left(&mut merged, template.into_owned()),
                None => tracing::debug!(template = %id, "skipping unknown template reference"),
            }
        }
        merged
    }
}

impl KeywordTransform for ReferenceFill<'_> {
    fn transform(&self, keyword: &str, value: &Value, _trace: &Trace) -> Option<Map<String, Value>> {
        if keyword == self.ref_key {
            Some(self.fill(&reference_ids(value)))
        } else {
            Some(fragment(keyword, value.clone()))
        }
    }
}

/// Collects templates from a batch and resolves references against them.
pub struct TemplateResolver {
    registry: Arc<SchemaRegistry>,
}

impl TemplateResolver {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// First pass: split the batch (prefixed by the built-in templates) into
    /// a template map and the schemas still to resolve.
    pub fn collect(&self, inputs: Vec<SchemaInput>) -> (TemplateMap, Vec<SchemaInput>) {
        let mut templates = TemplateMap::new();
        let mut pending = Vec::new();

        for input in self.registry.template_inputs().into_iter().chain(inputs) {
            match input.config.id {
                Some(id) => {
                    tracing::debug!(template = %id, "registering template");
                    templates.insert(id, input.schema);
                }
                None => pending.push(input),
            }
        }

        (templates, pending)
    }

    /// Resolve every non-template input of the batch, in input order.
    ///
    /// All templates are collected before the first reference is filled, so a
    /// schema may reference a template defined later in the same batch.
    pub fn process(&self, inputs: Vec<SchemaInput>) -> Vec<ResolvedSchema> {
        let (templates, pending) = self.collect(inputs);
        let fill = ReferenceFill::new(&templates, self.registry.ref_key());

        pending
            .into_iter()
            .filter_map(|input| {
                let mut raw = walk(&input.schema, &fill, &Trace::root())?;
                if let Value::Object(root) = &mut raw {
                    merge_left(root, fill.fill(&input.config.refs));
                }
                Some(ResolvedSchema {
                    config: input.config,
                    raw,
                })
            })
            .collect()
    }

    /// [`process`](Self::process) over authored values, flattening nested lists.
    pub fn process_values(&self, values: &[Value]) -> Vec<ResolvedSchema> {
        self.process(flatten_inputs(values, &self.registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> TemplateResolver {
        TemplateResolver::new(Arc::new(SchemaRegistry::new()))
    }

    #[test]
    fn test_builtin_templates_always_available() {
        let (templates, pending) = resolver().collect(Vec::new());

        assert!(pending.is_empty());
        for id in ["user", "fs", "time", "post"] {
            assert!(templates.contains_key(id), "missing template {}", id);
        }
    }

    #[test]
    fn test_process_resolves_batch_references() {
        let raw1 = json!({
            "_id": "something",
            "name": "foo",
            "properties": { "go": "away" }
        });
        let raw2 = json!({
            "name": "bar",
            "properties": {
                "go": "ahead",
                "turn": { "_ref": "something" },
                "skip": { "_ref": "notthing" }
            },
            "_ref": ["time", "fs"]
        });

        let resolved = resolver().process_values(&[raw1, json!([raw2]), json!(0), json!(1)]);
        assert_eq!(resolved.len(), 1);

        let raw = &resolved[0].raw;
        assert_eq!(resolved[0].name(), Some("bar"));
        assert_eq!(raw.pointer("/properties/turn/properties/go"), Some(&json!("away")));
        assert_eq!(raw.pointer("/properties/skip"), Some(&json!({})));
        assert_eq!(
            raw.pointer("/properties/createdAt/default"),
            Some(&json!({ "$now": "create" }))
        );
        assert_eq!(raw.pointer("/properties/size"), Some(&json!("number")));
        assert_eq!(raw.pointer("/properties/go"), Some(&json!({ "type": "ahead" })));
        assert_eq!(raw.get("driver"), Some(&json!("fs")));
    }

    #[test]
    fn test_reference_before_template_definition() {
        let resolved = resolver().process_values(&[
            json!({ "properties": { "owner": { "_ref": "later" } } }),
            json!({ "_id": "later", "properties": { "email": "string" } }),
        ]);

        assert_eq!(
            resolved[0].raw.pointer("/properties/owner/properties/email"),
            Some(&json!("string"))
        );
    }

    #[test]
    fn test_earlier_references_win() {
        let resolved = resolver().process(vec![
            SchemaInput::template("a", json!({ "title": "A", "properties": { "x": "number" } })),
            SchemaInput::template("b", json!({ "title": "B", "description": "from b" })),
            SchemaInput::new(json!({ "properties": { "y": "string" } })).with_refs(["a", "b"]),
        ]);

        let raw = &resolved[0].raw;
        assert_eq!(raw.get("title"), Some(&json!("A")));
        assert_eq!(raw.get("description"), Some(&json!("from b")));
        assert_eq!(raw.pointer("/properties/x"), Some(&json!("number")));
        assert_eq!(raw.pointer("/properties/y"), Some(&json!({ "type": "string" })));
    }

    #[test]
    fn test_empty_reference_set_is_identity() {
        let schema = json!({ "name": "plain", "properties": { "a": { "type": "number" } } });
        let resolved = resolver().process(vec![SchemaInput::new(schema.clone())]);

        assert_eq!(resolved[0].raw, schema);
    }

    #[test]
    fn test_caller_template_overrides_builtin() {
        let resolved = resolver().process(vec![
            SchemaInput::template("fs", json!({ "driver": "s3" })),
            SchemaInput::new(json!({ "name": "files" })).with_refs(["fs"]),
        ]);

        assert_eq!(resolved[0].raw, json!({ "name": "files", "driver": "s3" }));
    }

    #[test]
    fn test_reference_fill_skips_unknown_ids() {
        let templates = TemplateMap::from([("a".to_string(), json!({ "title": "A" }))]);
        let fill = ReferenceFill::new(&templates, "_ref");

        let merged = fill.fill(&["missing".to_string(), "a".to_string()]);
        assert_eq!(Value::Object(merged), json!({ "title": "A" }));
    }
}
