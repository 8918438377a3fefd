use std::collections::BTreeSet;

use serde_json::{json, Value};
use thiserror::Error;

use crate::schema_input::{flatten_inputs, SchemaInput};
use crate::transformation_rule::RewriteRule;

/// Keywords kept in the final schema form.
pub const FINAL_KEYWORDS: &[&str] = &[
    "title",
    "description",
    "type",
    "properties",
    "default",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "format",
    "minLength",
    "maxLength",
    "pattern",
    "enum",
    "items",
    "minItems",
    "maxItems",
    "additionalItems",
    "contains",
    "minContains",
    "maxContains",
    "uniqueItems",
    "prefixItems",
    "additionalProperties",
    "patternProperties",
    "required",
    "allOf",
    "unevaluatedProperties",
    "if",
    "then",
    "propertyNames",
    "minProperties",
    "maxProperties",
];

/// Types kept in the final schema form.
pub const FINAL_TYPES: &[&str] = &["string", "number", "object", "array", "boolean", "null"];

/// Property names reserved by the document model.
pub const INVALID_NAMES: &[&str] = &["_id", "id", "createdAt", "updatedAt", "version", "type"];

/// Attributes carried over into a target type descriptor.
pub const TARGET_ATTRS: &[&str] = &[
    "type",
    "items",
    "default",
    "required",
    "unique",
    "min",
    "max",
    "enum",
    "match",
    "minLength",
    "maxLength",
];

/// Keys inside a `default` mapping that mark it as computed later.
pub const DEFERRED_DEFAULT_MARKERS: &[&str] = &["fn", "$now", "$inc"];

/// A named schema fragment available for reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub id: String,
    pub fragment: Value,
}

/// Read-only vocabulary shared by every pipeline stage.
///
/// Built once, then shared behind an `Arc`. The `with_*` builders consume the
/// registry so nothing can change it after it has been handed out.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    final_keywords: BTreeSet<String>,
    final_types: BTreeSet<String>,
    rewrite_rules: Vec<RewriteRule>,
    templates: Vec<Template>,
    invalid_names: BTreeSet<String>,
    target_attrs: Vec<String>,
    deferred_markers: BTreeSet<String>,
    config_prefix: String,
    id_key: String,
    ref_key: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Template source could not be parsed: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Template source must be a list of schemas carrying \"{0}\"")]
    NotATemplateList(String),
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            final_keywords: to_set(FINAL_KEYWORDS),
            final_types: to_set(FINAL_TYPES),
            rewrite_rules: default_rewrite_rules(),
            templates: default_templates(),
            invalid_names: to_set(INVALID_NAMES),
            target_attrs: TARGET_ATTRS.iter().map(|s| s.to_string()).collect(),
            deferred_markers: to_set(DEFERRED_DEFAULT_MARKERS),
            config_prefix: "_".to_string(),
            id_key: "_id".to_string(),
            ref_key: "_ref".to_string(),
        }
    }

    /// Add a template, replacing a built-in one with the same id.
    pub fn with_template(mut self, id: &str, fragment: Value) -> Self {
        self.templates.retain(|t| t.id != id);
        self.templates.push(Template {
            id: id.to_string(),
            fragment,
        });
        self
    }

    /// Add every schema in a YAML (or JSON) list that carries the id key.
    pub fn with_templates_from_yaml(self, source: &str) -> Result<Self, RegistryError> {
        let parsed: Value = serde_yaml::from_str(source)?;
        if !parsed.is_array() {
            return Err(RegistryError::NotATemplateList(self.id_key.clone()));
        }

        let inputs = flatten_inputs(&[parsed], &self);
        let mut registry = self;
        for input in inputs {
            match input.config.id.clone() {
                Some(id) => registry = registry.with_template(&id, input.schema),
                None => return Err(RegistryError::NotATemplateList(registry.id_key.clone())),
            }
        }

        Ok(registry)
    }

    pub fn with_rewrite_rule(mut self, rule: RewriteRule) -> Self {
        self.rewrite_rules.push(rule);
        self
    }

    pub fn is_final_keyword(&self, keyword: &str) -> bool {
        self.final_keywords.contains(keyword)
    }

    pub fn is_final_type(&self, value: &Value) -> bool {
        value
            .as_str()
            .map(|t| self.final_types.contains(t))
            .unwrap_or(false)
    }

    pub fn rewrite_rules(&self) -> &[RewriteRule] {
        &self.rewrite_rules
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Built-in templates in the same shape callers pass to `process`.
    pub fn template_inputs(&self) -> Vec<SchemaInput> {
        self.templates
            .iter()
            .map(|t| SchemaInput::template(&t.id, t.fragment.clone()))
            .collect()
    }

    pub fn is_invalid_name(&self, name: &str) -> bool {
        self.invalid_names.contains(name)
    }

    pub fn target_attrs(&self) -> &[String] {
        &self.target_attrs
    }

    /// True when a `default` value is computed later rather than literal.
    pub fn is_deferred_default(&self, value: &Value) -> bool {
        match value {
            Value::Object(map) => map.keys().any(|k| self.deferred_markers.contains(k)),
            _ => false,
        }
    }

    /// Keys starting with the config sigil carry configuration, not schema.
    pub fn is_config_key(&self, key: &str) -> bool {
        key.starts_with(&self.config_prefix)
    }

    pub fn id_key(&self) -> &str {
        &self.id_key
    }

    pub fn ref_key(&self) -> &str {
        &self.ref_key
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn to_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_rewrite_rules() -> Vec<RewriteRule> {
    vec![
        RewriteRule::for_type("string", json!({ "type": "string", "maxLength": 60 })),
        RewriteRule::for_type("text", json!({ "type": "string" })),
        RewriteRule::for_type("code", json!({ "type": "string" })),
        RewriteRule::for_type("relation", json!({ "type": "string" })),
        RewriteRule::for_type("file", json!({ "type": "string" })),
        RewriteRule::for_type("json", json!({ "type": "object", "properties": {} })),
    ]
}

fn default_templates() -> Vec<Template> {
    vec![
        Template {
            id: "user".to_string(),
            fragment: json!({
                "name": "users",
                "driver": "mem",
                "uniques": ["email"],
                "properties": {
                    "email": "string",
                    "password": "string",
                    "apikey": "string",
                    "perms": { "items": "json" }
                },
                "required": ["email"]
            }),
        },
        Template {
            id: "fs".to_string(),
            fragment: json!({
                "driver": "fs",
                "properties": {
                    "name": "string",
                    "mime": "string",
                    "parent": "relation",
                    "size": "number"
                }
            }),
        },
        Template {
            id: "time".to_string(),
            fragment: json!({
                "properties": {
                    "createdAt": { "type": "datetime", "default": { "$now": "create" } },
                    "updatedAt": { "type": "datetime", "default": { "$now": "update" } },
                    "version": { "type": "number", "default": 1 }
                }
            }),
        },
        Template {
            id: "post".to_string(),
            fragment: json!({
                "properties": {
                    "title": "string",
                    "slug": {
                        "type": "string",
                        "default": { "fn": "slugify", "from": "title" }
                    },
                    "content": "string"
                }
            }),
        },
    ]
}
