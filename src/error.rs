//! Classified errors surfaced by plugin resolution.
//!
//! Only fatal conditions become a [`ResolveError`]. Recoverable problems
//! (unreadable layers, bad manifest entries, unknown aliases) are logged where
//! they happen and resolution continues.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Identifier is not a registered name, a file, or a directory.
    PluginNotFound,
    /// Identifier names a path that is neither a file nor a directory.
    InvalidPluginPath,
    /// A registry entry points at a config file that vanished.
    RegisteredConfigMissing,
    /// A plugin directory holds no usable `*.config.yaml`.
    PluginConfigNotFound,
    /// The configured `handler_script` does not exist.
    HandlerScriptNotFound,
}

/// Fatal resolution error.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ResolveError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

impl ResolveError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            plugin: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    // Convenience constructors

    pub fn plugin_not_found(identifier: &str) -> Self {
        Self::new(
            ErrorCode::PluginNotFound,
            format!(
                "Plugin '{}' not found: not a registered plugin name, config file, or plugin directory.",
                identifier
            ),
        )
        .with_plugin(identifier)
    }

    pub fn invalid_plugin_path(identifier: &str, path: &Path) -> Self {
        Self::new(
            ErrorCode::InvalidPluginPath,
            format!(
                "Plugin path '{}' for '{}' is neither a file nor a directory.",
                path.display(),
                identifier
            ),
        )
        .with_path(path)
        .with_plugin(identifier)
    }

    pub fn registered_config_missing(name: &str, path: &Path) -> Self {
        Self::new(
            ErrorCode::RegisteredConfigMissing,
            format!(
                "Configuration file '{}' for registered plugin '{}' not found.",
                path.display(),
                name
            ),
        )
        .with_path(path)
        .with_plugin(name)
    }

    pub fn plugin_config_not_found(identifier: &str, dir: &Path) -> Self {
        Self::new(
            ErrorCode::PluginConfigNotFound,
            format!(
                "No plugin configuration file found in directory '{}' for plugin '{}'.",
                dir.display(),
                identifier
            ),
        )
        .with_path(dir)
        .with_plugin(identifier)
    }

    pub fn handler_script_not_found(path: &Path, plugin: &str) -> Self {
        Self::new(
            ErrorCode::HandlerScriptNotFound,
            format!(
                "Handler script '{}' not found for plugin '{}'.",
                path.display(),
                plugin
            ),
        )
        .with_path(path)
        .with_plugin(plugin)
    }
}

/// Result type for resolution operations.
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_script_message_is_exact() {
        let err = ResolveError::handler_script_not_found(Path::new("/p/run.js"), "cv");
        assert_eq!(
            err.to_string(),
            "Handler script '/p/run.js' not found for plugin 'cv'."
        );
        assert_eq!(err.code, ErrorCode::HandlerScriptNotFound);
        assert_eq!(err.plugin.as_deref(), Some("cv"));
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_value(ErrorCode::RegisteredConfigMissing).unwrap();
        assert_eq!(json, serde_json::json!("REGISTERED_CONFIG_MISSING"));
    }
}
