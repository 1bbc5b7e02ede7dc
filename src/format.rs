//! Output formatting for the inspection CLI.

use crate::plugins::PluginDetails;
use anyhow::Result;
use serde::Serialize;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable listing where one exists, YAML otherwise.
    Text,
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Serialize any result in the requested format.
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text | OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => serde_json::to_string_pretty(value)? + "\n",
    })
}

/// Plain-text plugin listing, one block per plugin.
pub fn format_plugin_list(details: &[PluginDetails]) -> String {
    let mut out = String::new();

    out.push_str(&format!("Plugins ({})\n\n", details.len()));
    for plugin in details {
        out.push_str(&format!("{}\n", plugin.name));
        out.push_str(&format!("  status:      {}\n", plugin.status));
        if let Some(ref description) = plugin.description {
            out.push_str(&format!("  description: {}\n", description));
        }
        out.push_str(&format!("  source:      {}\n", plugin.provenance));
        if let Some(ref path) = plugin.config_path {
            out.push_str(&format!("  config:      {}\n", path.display()));
        }
        out.push('\n');
    }

    out
}
