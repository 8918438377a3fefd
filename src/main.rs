use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use schema_compiler::{
    AttributeSchema, ReportFormat, SchemaRegistry, SchemaReport, SchemaReporter,
    SchemaTransformationEngine, Stage, TransformationError, ValidationSummary, ValidatorOptions,
};

#[derive(Parser, Debug)]
#[command(name = "schema-compiler")]
#[command(about = "Compile schema files through the raw, model, final, and target forms")]
struct Args {
    /// Schema files (YAML or JSON); a file may hold one schema or a list of them
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Form to print each schema in
    #[arg(long, value_enum, default_value_t = Stage::Final)]
    stage: Stage,

    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    format: ReportFormat,

    /// Data file to validate against the first resolved schema
    #[arg(long, value_name = "FILE")]
    data: Option<PathBuf>,

    /// Do not inject default values while validating
    #[arg(long)]
    no_defaults: bool,

    /// Extra templates: a list of schemas carrying `_id`
    #[arg(long, value_name = "FILE")]
    templates: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("\n❌ Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), String> {
    let console = args.format == ReportFormat::Console;
    let reporter = SchemaReporter::new().with_format(args.format);

    let mut registry = SchemaRegistry::new();
    if let Some(path) = &args.templates {
        let source = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read templates {}: {}", path.display(), e))?;
        registry = registry
            .with_templates_from_yaml(&source)
            .map_err(|e| format!("Failed to load templates {}: {}", path.display(), e))?;
        if console {
            println!("  ✓ Loaded templates from {}", path.display());
        }
    }

    let engine = SchemaTransformationEngine::new(registry)
        .with_options(ValidatorOptions::new().with_defaults(!args.no_defaults));

    let documents = args
        .files
        .iter()
        .map(|path| read_document(path))
        .collect::<Result<Vec<_>, _>>()?;

    if console {
        println!("\n=== Schema Compilation ===");
        println!("  ℹ {} file(s), stage {:?}", documents.len(), args.stage);
    }

    let resolved = engine.process_values(&documents);

    let reports = match args.stage {
        Stage::Target => compile_targets(&documents)?,
        stage => resolved
            .iter()
            .map(|schema| SchemaReport {
                name: schema.name().map(|s| s.to_string()),
                stage,
                schema: match stage {
                    Stage::Raw => engine.to_raw(&schema.raw),
                    Stage::Model => engine.to_model(&schema.raw),
                    _ => engine.to_final(&schema.raw),
                },
            })
            .collect(),
    };

    for report in &reports {
        let formatted = reporter.format_schema(report).map_err(|e| e.to_string())?;
        println!("{}", formatted);
    }

    if let Some(path) = &args.data {
        let schema = resolved
            .first()
            .ok_or_else(|| "No schema to validate against (every input was a template)".to_string())?;
        let data = read_document(path)?;

        let summary = match engine.validate(&schema.raw, &data) {
            Ok(validated) => ValidationSummary::passed(validated),
            Err(TransformationError::ValidationFailed(report)) => ValidationSummary::failed(report),
            Err(e) => return Err(e.to_string()),
        };

        let formatted = reporter.format_validation(&summary).map_err(|e| e.to_string())?;
        println!("{}", formatted);

        if !summary.is_valid {
            return Err(format!(
                "{} failed validation with {} error(s)",
                path.display(),
                summary.total_errors
            ));
        }
    }

    Ok(())
}

/// Run every authored schema through the attribute compiler.
fn compile_targets(documents: &[Value]) -> Result<Vec<SchemaReport>, String> {
    let mut reports = Vec::new();
    for document in documents {
        let schemas = match document {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        };

        for raw in schemas {
            let compiled = AttributeSchema::compile(raw).map_err(|e| e.to_string())?;
            let definition = serde_json::to_value(compiled.model_definition())
                .map_err(|e| format!("Failed to serialize model definition: {}", e))?;
            reports.push(SchemaReport {
                name: Some(compiled.name().to_string()),
                stage: Stage::Target,
                schema: definition,
            });
        }
    }
    Ok(reports)
}

/// Read a YAML or JSON file into a JSON value.
fn read_document(path: &Path) -> Result<Value, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_yaml::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}
