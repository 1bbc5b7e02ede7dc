//! CLI command definitions for docplug
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::config::deep_merge_all;
use crate::format::OutputFormat;
use crate::paths::expand_home;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Inspect plugin and configuration resolution
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Explicit main config file (highest precedence for global settings)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Project manifest file (main config and plugin manifest)
    #[arg(short, long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Project root (default: current directory)
    #[arg(long, global = true)]
    pub project_root: Option<PathBuf>,

    /// Bundled definitions directory (default: $DOCPLUG_APP_ROOT or the executable's directory)
    #[arg(long, global = true)]
    pub app_root: Option<PathBuf>,

    /// XDG config directory (default: $XDG_CONFIG_HOME/docplug)
    #[arg(long, global = true)]
    pub xdg_dir: Option<PathBuf>,

    /// Ignore XDG, project and collection sources
    #[arg(long, global = true)]
    pub factory_defaults: bool,

    /// Output format: text, yaml or json
    #[arg(short, long, default_value = "text", global = true)]
    pub format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn output_format(&self) -> Result<OutputFormat> {
        match OutputFormat::from_str(&self.format) {
            Some(format) => Ok(format),
            None => bail!("unknown output format '{}' (expected text, yaml or json)", self.format),
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective configuration of a plugin
    Resolve {
        /// Registered plugin name, config file, or plugin directory
        plugin: String,

        /// Override a setting, e.g. `pdf_options.format=A4` (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },

    /// List registered, enabled and available plugins
    Plugins,

    /// Show which main config was selected and why
    MainConfig,
}

/// Build an override tree from `key.path=value` assignments.
///
/// Values are parsed as YAML scalars, so `true`, `12` and `[a, b]` keep
/// their types. Later assignments win.
pub fn parse_overrides(assignments: &[String]) -> Result<Option<Value>> {
    let mut trees = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let (key_path, raw_value) = assignment
            .split_once('=')
            .with_context(|| format!("override '{}' is not KEY=VALUE", assignment))?;
        let keys: Vec<&str> = key_path.split('.').map(str::trim).collect();
        if keys.iter().any(|k| k.is_empty()) {
            bail!("override '{}' has an empty key segment", assignment);
        }
        let value: Value = serde_yaml::from_str(raw_value)
            .with_context(|| format!("cannot parse value of '{}'", assignment))?;
        trees.push(keys.iter().rev().fold(value, |inner, key| {
            let mut map = Map::new();
            map.insert((*key).to_string(), inner);
            Value::Object(map)
        }));
    }
    let merged = deep_merge_all(trees);
    Ok((!merged.is_null()).then_some(merged))
}

/// Log directive used when `RUST_LOG` is not set.
pub fn default_log_directive(verbose: bool) -> &'static str {
    if verbose { "docplug=debug,warn" } else { "warn" }
}

/// Expand a leading `~/` in a path argument the shell left quoted.
pub fn expand_path_arg(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => expand_home(raw),
        None => path.to_path_buf(),
    }
}
