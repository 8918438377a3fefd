use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attribute_schema::{AttributeNode, AttributeType};
use crate::schema_registry::SchemaRegistry;
use crate::schema_walker::{ITEMS, TYPE};

/// Type tag used for identifier fields by the document database.
pub const OBJECT_ID_TAG: &str = "ObjectId";

/// Field type of a target descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TargetType {
    /// A scalar type tag such as `String` or `ObjectId`.
    Tag(String),
    /// A nested sub-document.
    Nested(IndexMap<String, TargetField>),
    /// An array holding zero or one element descriptor.
    Array(Vec<TargetField>),
}

/// A per-field descriptor for the document-model constructor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetField {
    #[serde(rename = "type")]
    pub field_type: TargetType,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
    /// Sub-documents never get their own identifier.
    #[serde(rename = "_id")]
    pub sub_document_id: bool,
}

impl TargetField {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Fixed options passed alongside every model definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptions {
    pub timestamps: bool,
    pub version_key: String,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            timestamps: true,
            version_key: "version".to_string(),
        }
    }
}

/// Everything an external ODM needs to build a live model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDefinition {
    pub fields: IndexMap<String, TargetField>,
    pub options: ModelOptions,
}

/// Builds a live document model from a compiled definition.
pub trait DocumentModelBuilder {
    type Model;
    type Error;

    fn build(&self, definition: &ModelDefinition) -> Result<Self::Model, Self::Error>;
}

/// Project a validated node into its target descriptor.
///
/// Returns `None` for null-typed nodes, which are left out of their parent.
pub fn project(node: &AttributeNode, registry: &SchemaRegistry) -> Option<TargetField> {
    let field_type = match node.attribute_type {
        AttributeType::Null => return None,
        AttributeType::Object => TargetType::Nested(
            node.properties
                .iter()
                .flatten()
                .filter_map(|(name, child)| project(child, registry).map(|f| (name.clone(), f)))
                .collect(),
        ),
        AttributeType::Array => TargetType::Array(
            node.items
                .as_deref()
                .and_then(|items| project(items, registry))
                .into_iter()
                .collect(),
        ),
        AttributeType::Id => TargetType::Tag(OBJECT_ID_TAG.to_string()),
        other => TargetType::Tag(other.tag().to_string()),
    };

    let mut attributes = Map::new();
    for attribute in registry.target_attrs() {
        if attribute == TYPE || attribute == ITEMS {
            continue;
        }
        if let Some(value) = node.attributes.get(attribute) {
            attributes.insert(attribute.clone(), value.clone());
        }
    }

    if node.attribute_type == AttributeType::Array
        && attributes.get("default").map(is_empty_default).unwrap_or(false)
    {
        attributes.remove("default");
    }

    Some(TargetField {
        field_type,
        attributes,
        sub_document_id: false,
    })
}

fn is_empty_default(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_schema::AttributeSchema;
    use serde_json::json;

    struct JsonModel;

    impl DocumentModelBuilder for JsonModel {
        type Model = Value;
        type Error = serde_json::Error;

        fn build(&self, definition: &ModelDefinition) -> Result<Value, serde_json::Error> {
            serde_json::to_value(definition)
        }
    }

    fn people() -> AttributeSchema {
        AttributeSchema::compile(&json!({
            "name": "people",
            "driver": "mongo",
            "properties": {
                "email": { "type": "string", "unique": true, "required": true, "label": "Email" },
                "owner": { "type": "id" },
                "nothing": {},
                "tags": { "type": "array", "items": { "type": "string" }, "default": [] },
                "empty": { "items": {}, "default": null },
                "address": {
                    "properties": {
                        "city": { "type": "string", "maxLength": 40 },
                        "since": { "type": "date", "default": 0 }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_project_field_types() {
        let definition = people().model_definition();
        let fields = &definition.fields;

        assert_eq!(fields["email"].field_type, TargetType::Tag("String".to_string()));
        assert_eq!(fields["owner"].field_type, TargetType::Tag("ObjectId".to_string()));
        assert!(!fields.contains_key("nothing"));
        assert!(matches!(&fields["address"].field_type, TargetType::Nested(m) if m.len() == 2));
        assert_eq!(fields["empty"].field_type, TargetType::Array(Vec::new()));
    }

    #[test]
    fn test_project_keeps_only_target_attributes() {
        let definition = people().model_definition();
        let email = &definition.fields["email"];

        assert_eq!(email.attributes.get("unique"), Some(&json!(true)));
        assert_eq!(email.attributes.get("required"), Some(&json!(true)));
        assert_eq!(email.attributes.get("label"), None);
    }

    #[test]
    fn test_array_defaults_cleared_when_empty() {
        let definition = people().model_definition();

        assert_eq!(definition.fields["tags"].attributes.get("default"), None);
        assert_eq!(definition.fields["empty"].attributes.get("default"), None);
        match &definition.fields["address"].field_type {
            TargetType::Nested(fields) => {
                assert_eq!(fields["since"].attributes.get("default"), Some(&json!(0)));
            }
            other => panic!("unexpected type {:?}", other),
        }
    }

    #[test]
    fn test_descriptor_json_shape() {
        let target = people().to_target().unwrap().to_value();

        assert_eq!(
            target.pointer("/type/tags"),
            Some(&json!({ "type": [{ "type": "String", "_id": false }], "_id": false }))
        );
        assert_eq!(
            target.pointer("/type/address/type/city"),
            Some(&json!({ "type": "String", "maxLength": 40, "_id": false }))
        );
        assert_eq!(target.get("_id"), Some(&json!(false)));
    }

    #[test]
    fn test_descriptor_keeps_field_order() {
        let target = people().to_target().unwrap().to_value();

        let order: Vec<_> = target["type"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(order, vec!["email", "owner", "tags", "empty", "address"]);
        let nested: Vec<_> = target["type"]["address"]["type"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(nested, vec!["city", "since"]);
    }

    #[test]
    fn test_build_model_with_fixed_options() {
        let model = people().build_model(&JsonModel).unwrap();

        assert_eq!(
            model.get("options"),
            Some(&json!({ "timestamps": true, "versionKey": "version" }))
        );
        assert!(model.pointer("/fields/email").is_some());
    }
}
