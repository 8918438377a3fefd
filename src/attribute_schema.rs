use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema_registry::SchemaRegistry;
use crate::schema_walker::{Trace, ITEMS, PROPERTIES, TYPE};
use crate::target_descriptor::{project, DocumentModelBuilder, ModelDefinition, ModelOptions, TargetField};

/// Structural errors raised while compiling an attribute schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Invalid type ({actual}) of attribute \"{attribute}\" (should be {expected}) in {path}.")]
    UnexpectedType {
        attribute: String,
        expected: String,
        actual: String,
        path: String,
    },

    #[error("Invalid type \"{value}\" in {path}.")]
    InvalidType { value: String, path: String },

    #[error("You must not use property name \"{name}\" in {path}.")]
    ReservedName { name: String, path: String },

    #[error("Root schema must be an object, current type is {0}.")]
    RootNotObject(AttributeType),

    #[error("Root schema must have attribute \"name\".")]
    MissingName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Id,
    Date,
    Null,
}

impl AttributeType {
    /// Parse an authored type name, ignoring case. `null` is not authorable.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "id" => Some(Self::Id),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    /// Parse a type tag as produced by [`AttributeType::tag`], `Null` included.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match Self::parse(tag) {
            Some(parsed) => Some(parsed),
            None if tag.eq_ignore_ascii_case("null") => Some(Self::Null),
            None => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Object => "Object",
            Self::Array => "Array",
            Self::Id => "Id",
            Self::Date => "Date",
            Self::Null => "Null",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One validated node of an attribute schema.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNode {
    pub attribute_type: AttributeType,
    /// Every non-structural attribute, `name` included.
    pub attributes: Map<String, Value>,
    pub properties: Option<IndexMap<String, AttributeNode>>,
    pub items: Option<Box<AttributeNode>>,
}

impl AttributeNode {
    /// A node with nothing declared.
    pub fn bare() -> Self {
        Self {
            attribute_type: AttributeType::Null,
            attributes: Map::new(),
            properties: None,
            items: None,
        }
    }

    /// Rebuild a node from its JSON form without validating it.
    ///
    /// Type tags are read case-insensitively and non-object children are
    /// skipped.
    pub fn from_value(value: &Value) -> Self {
        let map = match value {
            Value::Object(map) => map,
            _ => return Self::bare(),
        };

        let mut node = Self::bare();
        let mut declared = None;
        for (attribute, value) in map {
            match (attribute.as_str(), value) {
                (TYPE, Value::String(tag)) => declared = AttributeType::from_tag(tag),
                (PROPERTIES, Value::Object(properties)) => node.properties = Some(children_from_map(properties)),
                (ITEMS, Value::Object(_)) => node.items = Some(Box::new(Self::from_value(value))),
                (TYPE | PROPERTIES | ITEMS, _) => {}
                _ => {
                    node.attributes.insert(attribute.clone(), value.clone());
                }
            }
        }

        node.settle(declared);
        node
    }

    /// Derive the type from structure, then default structural children.
    ///
    /// `items` forces `Array` and `properties` forces `Object`. An object
    /// always carries a property map; an array without items keeps `None`,
    /// rendered as empty items.
    fn settle(&mut self, declared: Option<AttributeType>) {
        self.attribute_type = if self.items.is_some() {
            AttributeType::Array
        } else if self.properties.is_some() {
            AttributeType::Object
        } else {
            declared.unwrap_or(AttributeType::Null)
        };

        if self.attribute_type == AttributeType::Object && self.properties.is_none() {
            self.properties = Some(IndexMap::new());
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").and_then(Value::as_str)
    }

    pub fn property(&self, name: &str) -> Option<&AttributeNode> {
        self.properties.as_ref().and_then(|p| p.get(name))
    }

    /// The node as JSON, with its type written as a capitalized tag.
    pub fn to_value(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert(TYPE.to_string(), Value::String(self.attribute_type.tag().to_string()));

        if let Some(properties) = &self.properties {
            let properties = properties
                .iter()
                .map(|(name, node)| (name.clone(), node.to_value()))
                .collect();
            map.insert(PROPERTIES.to_string(), Value::Object(properties));
        }

        match &self.items {
            Some(items) => {
                map.insert(ITEMS.to_string(), items.to_value());
            }
            None if self.attribute_type == AttributeType::Array => {
                map.insert(ITEMS.to_string(), Value::Object(Map::new()));
            }
            None => {}
        }

        Value::Object(map)
    }
}

pub type AttributeMethod = Box<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Per-attribute rewrites applied after structural validation.
///
/// A method returning `None` removes the attribute from the node.
#[derive(Default)]
pub struct AttributeMethods {
    methods: HashMap<String, AttributeMethod>,
}

impl AttributeMethods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, attribute: &str, method: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.methods.insert(attribute.to_string(), Box::new(method));
        self
    }

    pub fn get(&self, attribute: &str) -> Option<&AttributeMethod> {
        self.methods.get(attribute)
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// A compiled attribute schema, rooted at a named object.
///
/// Compilation runs in three passes: structural validation with defaulting,
/// caller-supplied attribute methods, then projection into target
/// descriptors (see [`crate::target_descriptor`]).
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    root: AttributeNode,
    registry: Arc<SchemaRegistry>,
}

impl AttributeSchema {
    pub fn compile(raw: &Value) -> Result<Self, SchemaError> {
        Self::compile_with(raw, &AttributeMethods::new())
    }

    pub fn compile_with(raw: &Value, methods: &AttributeMethods) -> Result<Self, SchemaError> {
        Self::compile_in(Arc::new(SchemaRegistry::new()), raw, methods)
    }

    /// Validate `raw`, check the root, then apply `methods` throughout.
    pub fn compile_in(
        registry: Arc<SchemaRegistry>,
        raw: &Value,
        methods: &AttributeMethods,
    ) -> Result<Self, SchemaError> {
        let mut root = match raw {
            Value::Object(map) => validate_node(map, &registry, &Trace::root())?,
            _ => AttributeNode::bare(),
        };

        if root.attribute_type != AttributeType::Object {
            return Err(SchemaError::RootNotObject(root.attribute_type));
        }
        if root.name().map(str::is_empty).unwrap_or(true) {
            return Err(SchemaError::MissingName);
        }

        if !methods.is_empty() {
            apply_methods(&mut root, methods);
        }

        Ok(Self { root, registry })
    }

    /// The normalized schema name.
    pub fn name(&self) -> &str {
        self.root.name().unwrap_or_default()
    }

    pub fn root(&self) -> &AttributeNode {
        &self.root
    }

    pub fn to_value(&self) -> Value {
        self.root.to_value()
    }

    /// The root descriptor; always present because the root is an object.
    pub fn to_target(&self) -> Option<TargetField> {
        project(&self.root, &self.registry)
    }

    /// Field map and options handed to a document-model constructor.
    pub fn model_definition(&self) -> ModelDefinition {
        let fields = self
            .root
            .properties
            .iter()
            .flatten()
            .filter_map(|(name, node)| project(node, &self.registry).map(|f| (name.clone(), f)))
            .collect();

        ModelDefinition {
            fields,
            options: ModelOptions::default(),
        }
    }

    pub fn build_model<B: DocumentModelBuilder>(&self, builder: &B) -> Result<B::Model, B::Error> {
        builder.build(&self.model_definition())
    }
}

fn detect_type(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expect_type(attribute: &str, value: &Value, expected: &str, trace: &Trace) -> Result<(), SchemaError> {
    let actual = detect_type(value);
    if actual != expected {
        return Err(SchemaError::UnexpectedType {
            attribute: attribute.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            path: trace.to_string(),
        });
    }
    Ok(())
}

fn validate_node(
    raw: &Map<String, Value>,
    registry: &SchemaRegistry,
    trace: &Trace,
) -> Result<AttributeNode, SchemaError> {
    let mut attributes = Map::new();
    let mut declared = None;
    let mut raw_properties = None;
    let mut raw_items = None;

    for (attribute, value) in raw {
        match (attribute.as_str(), value) {
            ("name", Value::String(name)) => {
                attributes.insert(attribute.clone(), Value::String(name.to_lowercase().trim().to_string()));
            }
            (TYPE, Value::String(name)) => {
                let parsed = AttributeType::parse(name).ok_or_else(|| SchemaError::InvalidType {
                    value: name.clone(),
                    path: trace.to_string(),
                })?;
                declared = Some(parsed);
            }
            (PROPERTIES, Value::Object(properties)) => raw_properties = Some(properties),
            (ITEMS, Value::Object(items)) => raw_items = Some(items),
            ("name" | TYPE, _) => expect_type(attribute, value, "string", trace)?,
            (PROPERTIES | ITEMS, _) => expect_type(attribute, value, "object", trace)?,
            _ => {
                attributes.insert(attribute.clone(), value.clone());
            }
        }
    }

    let properties = match raw_properties {
        Some(raw_properties) => {
            let trace = trace.child(&[PROPERTIES]);
            let mut properties = IndexMap::new();
            for (name, schema) in raw_properties {
                expect_type(name, schema, "object", &trace)?;
                if registry.is_invalid_name(name) {
                    return Err(SchemaError::ReservedName {
                        name: name.clone(),
                        path: trace.to_string(),
                    });
                }
                if let Value::Object(schema) = schema {
                    let node = validate_node(schema, registry, &trace.child(&[name]))?;
                    properties.insert(name.clone(), node);
                }
            }
            Some(properties)
        }
        None => None,
    };

    let items = match raw_items {
        Some(raw_items) => Some(Box::new(validate_node(raw_items, registry, &trace.child(&[ITEMS]))?)),
        None => None,
    };

    let mut node = AttributeNode {
        attribute_type: AttributeType::Null,
        attributes,
        properties,
        items,
    };
    node.settle(declared);

    Ok(node)
}

fn children_from_map(map: &Map<String, Value>) -> IndexMap<String, AttributeNode> {
    map.iter()
        .filter(|(_, schema)| schema.is_object())
        .map(|(name, schema)| (name.clone(), AttributeNode::from_value(schema)))
        .collect()
}

fn apply_methods(node: &mut AttributeNode, methods: &AttributeMethods) {
    let attributes = std::mem::take(&mut node.attributes);
    for (attribute, value) in attributes {
        let next = match methods.get(&attribute) {
            Some(method) => method(&value),
            None => Some(value),
        };
        if let Some(next) = next {
            node.attributes.insert(attribute, next);
        }
    }

    if let Some(method) = methods.get(TYPE) {
        match method(&Value::String(node.attribute_type.tag().to_string())) {
            Some(Value::String(tag)) => match AttributeType::from_tag(&tag) {
                Some(next) => node.attribute_type = next,
                None => tracing::debug!(value = %tag, "attribute method returned an unknown type, keeping the current one"),
            },
            Some(other) => tracing::debug!(value = %other, "attribute method returned a non-string type, keeping the current one"),
            None => node.attribute_type = AttributeType::Null,
        }
    }

    if let Some(method) = methods.get(PROPERTIES) {
        if let Some(properties) = node.properties.take() {
            let current = properties
                .iter()
                .map(|(name, child)| (name.clone(), child.to_value()))
                .collect();
            let next = method(&Value::Object(current));
            node.properties = next.as_ref().and_then(Value::as_object).map(children_from_map);
        }
    }

    if let Some(method) = methods.get(ITEMS) {
        if let Some(items) = node.items.take() {
            node.items = method(&items.to_value())
                .filter(Value::is_object)
                .map(|next| Box::new(AttributeNode::from_value(&next)));
        }
    }

    if let Some(properties) = node.properties.as_mut() {
        for child in properties.values_mut() {
            apply_methods(child, methods);
        }
    }
    if let Some(items) = node.items.as_mut() {
        apply_methods(items, methods);
    }

    let declared = node.attribute_type;
    node.settle(Some(declared));
}
