//! JSON Schema validation for discovery reports.
//!
//! The report contract ships inside the binary (`schemas/discovery_report_v1.json`)
//! so a report can be checked before it is written, without any file lookups.
//! A schema loaded from disk must declare the same `schema_version` const.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs::File;
use std::path::Path;

pub const REPORT_SCHEMA_VERSION: &str = "authsurface_report_v1";

const EMBEDDED_REPORT_SCHEMA: &str = include_str!("../schemas/discovery_report_v1.json");
const SCHEMA_VERSION_POINTER: &str = "/properties/schema_version/const";

/// Compiled report schema.
pub struct ReportSchema {
    compiled: JSONSchema,
    schema_version: String,
}

impl ReportSchema {
    /// The schema compiled into the crate.
    pub fn embedded() -> Result<Self> {
        let value: Value =
            serde_json::from_str(EMBEDDED_REPORT_SCHEMA).context("parsing embedded report schema")?;
        Self::from_value(&value).context("compiling embedded report schema")
    }

    /// Load a schema file, e.g. to check reports against a local edit.
    pub fn load(path: &Path) -> Result<Self> {
        let value: Value = serde_json::from_reader(
            File::open(path).with_context(|| format!("opening schema {}", path.display()))?,
        )
        .with_context(|| format!("parsing schema {}", path.display()))?;
        Self::from_value(&value).with_context(|| format!("compiling schema {}", path.display()))
    }

    pub fn from_value(schema: &Value) -> Result<Self> {
        let schema_version = extract_schema_version(schema, SCHEMA_VERSION_POINTER)
            .ok_or_else(|| anyhow!("schema missing schema_version const"))?;
        if schema_version != REPORT_SCHEMA_VERSION {
            bail!(
                "schema_version '{}' does not match expected '{}'",
                schema_version,
                REPORT_SCHEMA_VERSION
            );
        }
        let compiled = JSONSchema::compile(schema).map_err(|err| anyhow!("invalid schema: {err}"))?;
        Ok(Self {
            compiled,
            schema_version,
        })
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Validate `instance`, listing every violation on failure.
    pub fn validate(&self, instance: &Value) -> Result<()> {
        if let Err(errors) = self.compiled.validate(instance) {
            let details = errors
                .map(|err| format!("{} at {}", err, err.instance_path))
                .collect::<Vec<_>>()
                .join("\n");
            bail!("report failed schema validation:\n{details}");
        }
        Ok(())
    }
}

fn extract_schema_version(schema: &Value, pointer: &str) -> Option<String> {
    let version = schema.pointer(pointer).and_then(Value::as_str)?;
    if version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        Some(version.to_string())
    } else {
        None
    }
}
