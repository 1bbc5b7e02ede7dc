//! Configuration primitives and the main config loader.
//!
//! Every file is parsed into a [`serde_json::Value`] tree and merged
//! field-by-field. Main config precedence, highest first:
//! 1. **Explicit** - a path passed by the caller
//! 2. **Project** - the project manifest
//! 3. **XDG** - `$XDG_CONFIG_HOME/docplug/config.yaml`
//! 4. **Bundled** - `<app_root>/config.yaml`
//! 5. **Factory default** - `<app_root>/config.example.yaml`
//!
//! ## Environment Variables
//! - `XDG_CONFIG_HOME` - Base of the XDG config directory

pub mod assets;
pub mod main_config;
pub mod merge;
pub mod yaml;

pub use assets::{CssMerge, resolve_and_merge_css};
pub use main_config::{MainConfigLoader, MainConfigPaths, MainConfigResult, MainConfigSource};
pub use merge::{FieldStrategy, PLUGIN_LAYER_RULES, deep_merge, deep_merge_all, merge_with_rules};
pub use yaml::load_yaml_file;
