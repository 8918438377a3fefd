use std::sync::OnceLock;

use jsonschema::JSONSchema;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Flags handed to the validation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorOptions {
    pub coerce_types: bool,
    pub remove_additional: bool,
    pub use_defaults: bool,
}

impl ValidatorOptions {
    pub fn new() -> Self {
        Self {
            coerce_types: true,
            remove_additional: true,
            use_defaults: true,
        }
    }

    pub fn with_defaults(mut self, use_defaults: bool) -> Self {
        self.use_defaults = use_defaults;
        self
    }
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// One data-vs-schema mismatch, carrying the value from the caller's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub instance_path: String,
    pub operation: String,
    pub value: Value,
    pub message: String,
    pub detail: String,
}

impl ValidationError {
    pub fn new(instance_path: String, operation: String, value: Value) -> Self {
        let message = format!("Document failed validation in operation \"{}\"", operation);
        Self {
            instance_path,
            operation,
            value,
            message,
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: String) -> Self {
        self.detail = detail;
        self
    }
}

/// Every violation found in one validation call, in engine order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A violation as the engine reports it, before mapping onto the input.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineViolation {
    pub instance_path: String,
    pub schema_path: String,
    pub message: String,
}

impl EngineViolation {
    /// The violated keyword: the last segment of the schema path.
    pub fn keyword(&self) -> &str {
        self.schema_path.rsplit('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Final schema failed to compile: {0}")]
    Compile(String),
}

/// Compiles a final schema and checks data against it.
///
/// Implementations may rewrite `data` in place (coercion, defaults, removal
/// of undeclared properties) according to `options`.
pub trait ValidationEngine: Send + Sync {
    fn check(
        &self,
        schema: &Value,
        data: &mut Value,
        options: &ValidatorOptions,
    ) -> Result<Vec<EngineViolation>, EngineError>;
}

/// Engine backed by the `jsonschema` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaEngine;

impl ValidationEngine for JsonSchemaEngine {
    fn check(
        &self,
        schema: &Value,
        data: &mut Value,
        options: &ValidatorOptions,
    ) -> Result<Vec<EngineViolation>, EngineError> {
        let compiled =
            JSONSchema::compile(schema).map_err(|e| EngineError::Compile(e.to_string()))?;

        prepare_data(schema, data, options);

        let violations = match compiled.validate(data) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|error| EngineViolation {
                    instance_path: error.instance_path.to_string(),
                    schema_path: error.schema_path.to_string(),
                    message: error.to_string(),
                })
                .collect(),
        };

        Ok(violations)
    }
}

/// Map engine violations back onto the original, uncoerced input.
pub fn map_violations(violations: Vec<EngineViolation>, original: &Value) -> ValidationReport {
    let mut report = ValidationReport::new();
    for violation in violations {
        let value = original
            .pointer(&violation.instance_path)
            .cloned()
            .unwrap_or(Value::Null);
        let error = ValidationError::new(
            violation.instance_path.clone(),
            violation.keyword().to_string(),
            value,
        )
        .with_detail(violation.message);
        report.add_error(error);
    }
    report
}

/// Apply defaults, scalar coercion, and additional-property removal.
pub fn prepare_data(schema: &Value, data: &mut Value, options: &ValidatorOptions) {
    let Value::Object(schema) = schema else {
        return;
    };

    if options.coerce_types {
        let target = schema.get("type").and_then(Value::as_str);
        if let Some(coerced) = target.and_then(|target| coerce(data, target)) {
            *data = coerced;
        }
    }

    match data {
        Value::Object(object) => prepare_object(schema, object, options),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items").filter(|s| s.is_object()) {
                for item in items.iter_mut() {
                    prepare_data(item_schema, item, options);
                }
            }
        }
        _ => {}
    }
}

fn prepare_object(schema: &Map<String, Value>, object: &mut Map<String, Value>, options: &ValidatorOptions) {
    let properties = match schema.get("properties") {
        Some(Value::Object(properties)) => Some(properties),
        _ => None,
    };

    if let Some(properties) = properties {
        if options.use_defaults {
            for (name, property) in properties {
                if object.contains_key(name) {
                    continue;
                }
                if let Some(default) = property.get("default") {
                    object.insert(name.clone(), default.clone());
                }
            }
        }

        for (name, property) in properties {
            if let Some(child) = object.get_mut(name) {
                prepare_data(property, child, options);
            }
        }
    }

    if options.remove_additional && schema.get("additionalProperties") == Some(&Value::Bool(false)) {
        let patterns: Vec<Regex> = match schema.get("patternProperties") {
            Some(Value::Object(patterns)) => patterns
                .keys()
                .filter_map(|pattern| Regex::new(pattern).ok())
                .collect(),
            _ => Vec::new(),
        };

        let undeclared: Vec<String> = object
            .keys()
            .filter(|key| !properties.map(|p| p.contains_key(*key)).unwrap_or(false))
            .filter(|key| !patterns.iter().any(|p| p.is_match(key)))
            .cloned()
            .collect();

        for key in undeclared {
            object.remove(&key);
        }
    }
}

fn numeric_pattern() -> &'static Regex {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    NUMERIC.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("numeric pattern is valid")
    })
}

fn matches_type(value: &Value, target: &str) -> bool {
    match target {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_f64().map(|n| n.fract() == 0.0).unwrap_or(false),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn number_value(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Some(Value::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number)
    }
}

/// Coerce a scalar into `target`, or `None` when it already matches or cannot be.
fn coerce(value: &Value, target: &str) -> Option<Value> {
    if matches_type(value, target) {
        return None;
    }

    match (target, value) {
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        ("string", Value::Null) => Some(Value::String(String::new())),

        ("number" | "integer", Value::String(s)) if numeric_pattern().is_match(s) => {
            let n: f64 = s.parse().ok()?;
            if target == "integer" && n.fract() != 0.0 {
                return None;
            }
            number_value(n)
        }
        ("number" | "integer", Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        ("number" | "integer", Value::Null) => Some(Value::from(0)),

        ("boolean", Value::String(s)) if s == "true" => Some(Value::Bool(true)),
        ("boolean", Value::String(s)) if s == "false" => Some(Value::Bool(false)),
        ("boolean", Value::Number(n)) if n.as_f64() == Some(1.0) => Some(Value::Bool(true)),
        ("boolean", Value::Number(n)) if n.as_f64() == Some(0.0) => Some(Value::Bool(false)),
        ("boolean", Value::Null) => Some(Value::Bool(false)),

        ("null", Value::String(s)) if s.is_empty() => Some(Value::Null),
        ("null", Value::Number(n)) if n.as_f64() == Some(0.0) => Some(Value::Null),
        ("null", Value::Bool(false)) => Some(Value::Null),

        _ => None,
    }
}
