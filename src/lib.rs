// Schema compilation pipeline: raw -> model -> final, templates, validation,
// and the attribute dialect compiled into document-model descriptors.
pub mod attribute_schema;
pub mod reporter;
pub mod schema_input;
pub mod schema_registry;
pub mod schema_walker;
pub mod target_descriptor;
pub mod template_resolver;
pub mod transformation_engine;
pub mod transformation_rule;
pub mod validation;

// Re-export core types for convenience
pub use attribute_schema::{AttributeMethods, AttributeNode, AttributeSchema, AttributeType, SchemaError};
pub use reporter::{ReportFormat, SchemaReport, SchemaReporter, Stage, ValidationSummary};
pub use schema_input::{InputConfig, SchemaInput};
pub use schema_registry::{RegistryError, SchemaRegistry, Template};
pub use schema_walker::{merge_left, walk, KeywordDispatch, KeywordTransform, Trace};
pub use target_descriptor::{DocumentModelBuilder, ModelDefinition, ModelOptions, TargetField, TargetType};
pub use template_resolver::{ResolvedSchema, TemplateMap, TemplateResolver};
pub use transformation_engine::{SchemaTransformationEngine, TransformationError};
pub use transformation_rule::RewriteRule;
pub use validation::{JsonSchemaEngine, ValidationEngine, ValidationError, ValidationReport, ValidatorOptions};
