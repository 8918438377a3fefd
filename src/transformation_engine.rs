use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::{
    schema_input::SchemaInput,
    schema_registry::SchemaRegistry,
    schema_walker::{fragment, walk, KeywordDispatch, KeywordTransform, Trace, ITEMS, PROPERTIES},
    template_resolver::{ResolvedSchema, TemplateResolver},
    transformation_rule::first_match,
    validation::{
        map_violations, EngineError, JsonSchemaEngine, ValidationEngine, ValidationReport,
        ValidatorOptions,
    },
};

/// Runs the raw → model → final pipeline and validates data against it.
pub struct SchemaTransformationEngine {
    registry: Arc<SchemaRegistry>,
    options: ValidatorOptions,
    engine: Box<dyn ValidationEngine>,
}

/// Errors that can occur while validating data against a schema
#[derive(Debug, Error)]
pub enum TransformationError {
    #[error("Document failed validation with {} error(s)", .0.len())]
    ValidationFailed(ValidationReport),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("JSON conversion error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl TransformationError {
    /// The mapped validation errors, when this is a validation failure.
    pub fn validation_errors(&self) -> Option<&ValidationReport> {
        match self {
            TransformationError::ValidationFailed(report) => Some(report),
            _ => None,
        }
    }
}

/// The schema produced for a missing or non-object root.
pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Raw → model keyword normalization.
///
/// Config keys are dropped, `properties` and `items` gain an explicit type,
/// and everything else passes through.
pub fn model_transform(registry: Arc<SchemaRegistry>) -> KeywordDispatch {
    KeywordDispatch::new(move |keyword, value, _| {
        if registry.is_config_key(keyword) {
            return None;
        }
        Some(fragment(keyword, value.clone()))
    })
    .on(PROPERTIES, |_, value, _| {
        let mut part = fragment("type", json!("object"));
        part.insert(PROPERTIES.to_string(), value.clone());
        Some(part)
    })
    .on(ITEMS, |_, value, _| {
        let mut part = fragment("type", json!("array"));
        part.insert(ITEMS.to_string(), value.clone());
        Some(part)
    })
}

/// Model → final filtering against the registry's allow-lists.
pub struct FinalTransform<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> FinalTransform<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }
}

impl KeywordTransform for FinalTransform<'_> {
    fn transform(&self, keyword: &str, value: &Value, trace: &Trace) -> Option<Map<String, Value>> {
        if let Some(replacement) = first_match(self.registry.rewrite_rules(), keyword, value) {
            return Some(replacement.clone());
        }

        if !self.registry.is_final_keyword(keyword) {
            tracing::debug!(%trace, keyword, "dropping keyword outside the final vocabulary");
            return None;
        }

        if keyword == "type" && !self.registry.is_final_type(value) {
            tracing::debug!(%trace, value = %value, "dropping unsupported type");
            return None;
        }

        if keyword == "default" && self.registry.is_deferred_default(value) {
            tracing::debug!(%trace, "dropping deferred default");
            return None;
        }

        Some(fragment(keyword, value.clone()))
    }
}

impl SchemaTransformationEngine {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self::with_registry(Arc::new(registry))
    }

    pub fn with_registry(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            options: ValidatorOptions::default(),
            engine: Box::new(JsonSchemaEngine),
        }
    }

    pub fn with_options(mut self, options: ValidatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_engine(mut self, engine: Box<dyn ValidationEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// A copy of the authored schema.
    pub fn to_raw(&self, raw: &Value) -> Value {
        raw.clone()
    }

    /// Normalize a raw schema. Non-object roots become the empty object schema.
    pub fn to_model(&self, raw: &Value) -> Value {
        if !raw.is_object() {
            return empty_object_schema();
        }

        walk(raw, &model_transform(self.registry.clone()), &Trace::root())
            .unwrap_or_else(empty_object_schema)
    }

    /// Reduce a raw schema to the vocabulary the validation engine accepts.
    pub fn to_final(&self, raw: &Value) -> Value {
        let model = self.to_model(raw);
        walk(&model, &FinalTransform::new(&self.registry), &Trace::root())
            .unwrap_or_else(empty_object_schema)
    }

    /// Walk the model form of `raw` with a caller-supplied transform.
    pub fn walk<T>(&self, raw: &Value, transform: &T) -> Option<Value>
    where
        T: KeywordTransform + ?Sized,
    {
        walk(&self.to_model(raw), transform, &Trace::root())
    }

    /// Resolve template references across a batch of inputs.
    pub fn process(&self, inputs: Vec<SchemaInput>) -> Vec<ResolvedSchema> {
        TemplateResolver::new(self.registry.clone()).process(inputs)
    }

    /// [`process`](Self::process) over authored values.
    pub fn process_values(&self, values: &[Value]) -> Vec<ResolvedSchema> {
        TemplateResolver::new(self.registry.clone()).process_values(values)
    }

    /// Validate `data` with the configured options.
    pub fn validate(&self, raw: &Value, data: &Value) -> Result<Value, TransformationError> {
        self.validate_with_defaults(raw, data, self.options.use_defaults)
    }

    /// Validate a copy of `data`, returning the coerced copy on success.
    ///
    /// Every violation is reported, each carrying the value found at its path
    /// in the caller's `data` rather than in the coerced copy.
    pub fn validate_with_defaults(
        &self,
        raw: &Value,
        data: &Value,
        apply_defaults: bool,
    ) -> Result<Value, TransformationError> {
        let final_schema = self.to_final(raw);
        let options = self.options.clone().with_defaults(apply_defaults);

        let mut next = data.clone();
        let violations = self.engine.check(&final_schema, &mut next, &options)?;
        if !violations.is_empty() {
            return Err(TransformationError::ValidationFailed(map_violations(violations, data)));
        }

        Ok(next)
    }
}

impl Default for SchemaTransformationEngine {
    fn default() -> Self {
        Self::new(SchemaRegistry::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::EngineViolation;
    use std::cell::RefCell;

    fn engine() -> SchemaTransformationEngine {
        SchemaTransformationEngine::default()
    }

    fn keys(value: &Value) -> Vec<String> {
        value.as_object().map(|m| m.keys().cloned().collect()).unwrap_or_default()
    }

    #[test]
    fn test_to_model_empty_roots() {
        for raw in [json!(null), json!(0), json!("name"), json!([1, 2, 3]), json!(true)] {
            assert_eq!(engine().to_model(&raw), empty_object_schema());
        }
    }

    #[test]
    fn test_to_model_normalizes_keywords() {
        let model = engine().to_model(&json!({
            "_hidden": "hi",
            "name": "foo",
            "properties": {
                "tags": { "items": "string", "_note": "x" }
            }
        }));

        assert_eq!(
            model,
            json!({
                "name": "foo",
                "type": "object",
                "properties": {
                    "tags": { "type": "array", "items": { "type": "string" } }
                }
            })
        );
    }

    #[test]
    fn test_to_model_never_keeps_config_keys() {
        let model = engine().to_model(&json!({
            "_id": "x",
            "properties": { "a": { "_ref": "time", "properties": { "b": { "_c": 1 } } } }
        }));

        fn has_config_key(value: &Value) -> bool {
            match value {
                Value::Object(map) => map.iter().any(|(k, v)| k.starts_with('_') || has_config_key(v)),
                _ => false,
            }
        }
        assert!(!has_config_key(&model));
    }

    #[test]
    fn test_to_final() {
        let final_schema = engine().to_final(&json!({
            "_hidden": "hi",
            "name": "foo",
            "properties": {
                "name": "string",
                "age": "number",
                "parent": {
                    "type": "array",
                    "items": { "properties": { "name": "string" } }
                },
                "education": {
                    "properties": {
                        "school": { "type": "string", "pattern": "abc.*" },
                        "year": "number",
                        "detail": { "type": "text" },
                        "some": null,
                        "wrong": "superidol"
                    }
                }
            }
        }));

        assert_eq!(final_schema.get("_hidden"), None);
        assert_eq!(final_schema.get("name"), None);
        assert_eq!(final_schema.pointer("/properties/name/type"), Some(&json!("string")));
        assert_eq!(final_schema.pointer("/properties/name/maxLength"), Some(&json!(60)));
        assert_eq!(
            final_schema.pointer("/properties/education/properties/year/type"),
            Some(&json!("number"))
        );
        assert_eq!(
            final_schema.pointer("/properties/education/properties/detail/type"),
            Some(&json!("string"))
        );
        assert_eq!(
            final_schema.pointer("/properties/education/properties/school/pattern"),
            Some(&json!("abc.*"))
        );
        assert_eq!(
            final_schema.pointer("/properties/education/properties/wrong"),
            Some(&json!({}))
        );
        assert_eq!(final_schema.pointer("/properties/education/properties/some"), None);
        assert_eq!(
            final_schema.pointer("/properties/parent/items/properties/name/type"),
            Some(&json!("string"))
        );
    }

    #[test]
    fn test_to_final_only_allowed_vocabulary() {
        let registry = SchemaRegistry::new();
        let final_schema = engine().to_final(&json!({
            "driver": "mem",
            "uniques": ["email"],
            "properties": {
                "created": { "type": "datetime", "default": { "$now": "create" } },
                "slug": { "type": "string", "default": { "fn": "slugify", "from": "title" } },
                "payload": { "type": "json" },
                "count": { "type": "number", "default": 1 }
            }
        }));

        fn check(value: &Value, registry: &SchemaRegistry) {
            let Value::Object(map) = value else { return };
            for (keyword, child) in map {
                assert!(registry.is_final_keyword(keyword), "unexpected keyword {}", keyword);
                if keyword == "type" {
                    assert!(registry.is_final_type(child));
                }
                if keyword == "properties" {
                    for property in child.as_object().unwrap().values() {
                        check(property, registry);
                    }
                }
            }
        }
        check(&final_schema, &registry);

        assert_eq!(final_schema.pointer("/properties/created"), Some(&json!({})));
        assert_eq!(final_schema.pointer("/properties/slug/default"), None);
        assert_eq!(
            final_schema.pointer("/properties/payload"),
            Some(&json!({ "type": "object", "properties": {} }))
        );
        assert_eq!(final_schema.pointer("/properties/count/default"), Some(&json!(1)));
    }

    #[test]
    fn test_walk_visits_model_keywords() {
        let traces = RefCell::new(Vec::new());
        engine().walk(
            &json!({
                "name": "abc",
                "driver": "def",
                "properties": { "link": { "type": "relation", "ref": "ghi" } }
            }),
            &|keyword: &str, value: &Value, trace: &Trace| {
                traces.borrow_mut().push(trace.clone());
                Some(fragment(keyword, value.clone()))
            },
        );

        let traces = traces.into_inner();
        assert_eq!(traces.len(), 6);
        assert_eq!(traces[5].to_string(), "properties.link");
    }

    #[test]
    fn test_validate_accepts_and_returns_data() {
        let data = engine()
            .validate(&json!({ "properties": { "name": "string" } }), &json!({ "name": "foo" }))
            .unwrap();
        assert_eq!(data.get("name"), Some(&json!("foo")));

        let data = engine()
            .validate(&json!({ "properties": { "name": {} } }), &json!({ "name": "foo" }))
            .unwrap();
        assert_eq!(data.get("name"), Some(&json!("foo")));

        let data = engine()
            .validate(&json!({ "properties": {} }), &json!({ "name": "foo" }))
            .unwrap();
        assert_eq!(data.get("name"), Some(&json!("foo")));
    }

    #[test]
    fn test_validate_reports_original_value() {
        let err = engine()
            .validate(&json!({ "properties": { "age": "number" } }), &json!({ "age": "foo" }))
            .unwrap_err();

        let report = err.validation_errors().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.errors[0].value, json!("foo"));
        assert_eq!(
            report.errors[0].message,
            "Document failed validation in operation \"type\""
        );
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let err = engine()
            .validate(
                &json!({ "properties": { "age": "number", "score": "number" } }),
                &json!({ "age": "foo", "score": "bar" }),
            )
            .unwrap_err();

        let values: Vec<_> = err
            .validation_errors()
            .unwrap()
            .errors
            .iter()
            .map(|e| e.value.clone())
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values.contains(&json!("foo")));
        assert!(values.contains(&json!("bar")));
    }

    #[test]
    fn test_validate_coerces_without_touching_input() {
        let data = json!({ "age": "42" });
        let validated = engine()
            .validate(&json!({ "properties": { "age": "number" } }), &data)
            .unwrap();

        assert_eq!(validated, json!({ "age": 42 }));
        assert_eq!(data, json!({ "age": "42" }));
    }

    #[test]
    fn test_validate_defaults_toggle() {
        let schema = json!({ "_ref": "time", "properties": { "version": { "type": "number", "default": 1 } } });

        let filled = engine().validate_with_defaults(&schema, &json!({}), true).unwrap();
        assert_eq!(filled, json!({ "version": 1 }));

        let bare = engine().validate_with_defaults(&schema, &json!({}), false).unwrap();
        assert_eq!(bare, json!({}));
    }

    struct RejectAll;

    impl ValidationEngine for RejectAll {
        fn check(
            &self,
            _schema: &Value,
            data: &mut Value,
            _options: &ValidatorOptions,
        ) -> Result<Vec<EngineViolation>, EngineError> {
            *data = json!("mutated");
            Ok(vec![EngineViolation {
                instance_path: String::new(),
                schema_path: "/type".to_string(),
                message: "rejected".to_string(),
            }])
        }
    }

    #[test]
    fn test_custom_engine_errors_map_to_original() {
        let engine = engine().with_engine(Box::new(RejectAll));
        let err = engine.validate(&json!({}), &json!({ "a": 1 })).unwrap_err();

        let report = err.validation_errors().unwrap();
        assert_eq!(report.errors[0].value, json!({ "a": 1 }));
        assert_eq!(report.errors[0].operation, "type");
        assert_eq!(report.errors[0].detail, "rejected");
    }

    #[test]
    fn test_model_key_order() {
        let model = engine().to_model(&json!({ "title": "t", "items": "number" }));
        assert_eq!(keys(&model), vec!["title", "type", "items"]);
    }
}
