//! YAML loading into plain key/value trees.
//!
//! Every configuration file is parsed into a [`serde_json::Value`] so the
//! merge helpers work on one tree type. No schema validation happens here.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::path::Path;

/// Read and parse a YAML file whose top level must be a mapping.
///
/// An empty (or `null`) document yields an empty object.
pub fn load_yaml_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_yaml_mapping(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Parse YAML text whose top level must be a mapping.
pub fn parse_yaml_mapping(content: &str) -> Result<Value> {
    if content.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let value: Value = serde_yaml::from_str(content)?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        other => bail!("expected a mapping at the top level, found {}", kind_name(&other)),
    }
}

/// Short name of a value's kind, for log and error messages.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Borrow a string field, ignoring blank values.
pub fn non_blank_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
