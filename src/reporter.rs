use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::ValidationReport;

/// Reporter for rendering compiled schemas and validation outcomes
pub struct SchemaReporter {
    output_format: ReportFormat,
}

/// Available output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Console,
    Json,
    Yaml,
}

/// Pipeline stage a report was taken at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Raw,
    Model,
    Final,
    Target,
}

/// One schema rendered at one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaReport {
    pub name: Option<String>,
    pub stage: Stage,
    pub schema: Value,
}

/// Summary of a data validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub is_valid: bool,
    pub total_errors: usize,
    pub report: ValidationReport,
    pub data: Option<Value>,
}

impl ValidationSummary {
    pub fn passed(data: Value) -> Self {
        Self {
            is_valid: true,
            total_errors: 0,
            report: ValidationReport::new(),
            data: Some(data),
        }
    }

    pub fn failed(report: ValidationReport) -> Self {
        Self {
            is_valid: false,
            total_errors: report.len(),
            report,
            data: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SchemaReporter {
    pub fn new() -> Self {
        Self {
            output_format: ReportFormat::Console,
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn format_schema(&self, report: &SchemaReport) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => self.format_console_schema(report),
            ReportFormat::Json => to_json(report),
            ReportFormat::Yaml => to_yaml(report),
        }
    }

    pub fn format_validation(&self, summary: &ValidationSummary) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => Ok(self.format_console_validation(summary)),
            ReportFormat::Json => to_json(summary),
            ReportFormat::Yaml => to_yaml(summary),
        }
    }

    fn format_console_schema(&self, report: &SchemaReport) -> Result<String, ReportError> {
        let mut output = String::new();

        output.push_str(&format!(
            "=== Schema: {} ({:?}) ===\n",
            report.name.as_deref().unwrap_or("<unnamed>"),
            report.stage
        ));
        output.push_str(&to_json(&report.schema)?);
        output.push('\n');

        Ok(output)
    }

    fn format_console_validation(&self, summary: &ValidationSummary) -> String {
        let mut output = String::new();

        output.push_str("=== Data Validation ===\n");
        if summary.is_valid {
            output.push_str("  ✓ Data is valid\n");
            return output;
        }

        output.push_str(&format!("  ❌ {} error(s):\n", summary.total_errors));
        for error in &summary.report.errors {
            let path: &str = if error.instance_path.is_empty() { "/" } else { &error.instance_path };
            output.push_str(&format!("    - {}: {} (value: {})\n", path, error.message, error.value));
        }

        output
    }
}

impl Default for SchemaReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ReportError> {
    serde_json::to_string_pretty(value).map_err(|e| ReportError::SerializationError(e.to_string()))
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String, ReportError> {
    serde_yaml::to_string(value).map_err(|e| ReportError::SerializationError(e.to_string()))
}
