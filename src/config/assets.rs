//! CSS asset lists and their inheritance across layers.
//!
//! A layer's `css_files` entries resolve relative to the directory of the file
//! that declared them. With `inherit_css: true` they are appended to what
//! earlier layers contributed; otherwise they replace it. A layer without a
//! `css_files` key leaves the inherited list as it was.

use crate::paths::resolve_against;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Result of folding one layer's CSS declarations into the inherited list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssMerge {
    pub paths: Vec<PathBuf>,
    pub inherit_css: bool,
}

/// Resolve the `css_files` value of one layer to absolute existing paths.
///
/// Returns `None` when the layer does not declare `css_files` at all.
/// Missing files and non-string entries are logged and skipped.
pub fn resolve_css_paths(
    css_files: Option<&Value>,
    base_dir: &Path,
    home: Option<&Path>,
    context: &str,
) -> Option<Vec<PathBuf>> {
    let declared = css_files?;
    let entries: Vec<&Value> = match declared {
        Value::Null => return None,
        Value::String(_) => vec![declared],
        Value::Array(items) => items.iter().collect(),
        other => {
            warn!(
                context,
                found = %crate::config::yaml::kind_name(other),
                "css_files must be a list of paths; ignoring"
            );
            return Some(Vec::new());
        }
    };

    let mut resolved = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(raw) = entry.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            warn!(context, entry = %entry, "Ignoring non-string css_files entry");
            continue;
        };
        let Some(path) = resolve_against(raw, Some(base_dir), home) else {
            continue;
        };
        if path.is_file() {
            resolved.push(path);
        } else {
            warn!(context, css = %path.display(), "CSS file not found; skipping");
        }
    }
    Some(resolved)
}

/// Fold a layer's resolved CSS into the inherited list.
pub fn merge_css(inherited: &[PathBuf], layer: Option<Vec<PathBuf>>, inherit_css: bool) -> Vec<PathBuf> {
    let combined = match layer {
        None => inherited.to_vec(),
        Some(new_paths) if inherit_css => inherited.iter().cloned().chain(new_paths).collect(),
        Some(new_paths) => new_paths,
    };
    dedup_preserving_order(combined)
}

/// Resolve and fold the CSS declared by `raw_layer` in one step.
pub fn resolve_and_merge_css(
    raw_layer: &Value,
    base_dir: &Path,
    inherited: &[PathBuf],
    home: Option<&Path>,
    context: &str,
) -> CssMerge {
    let inherit_css = raw_layer
        .get("inherit_css")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let layer_paths = resolve_css_paths(raw_layer.get("css_files"), base_dir, home, context);
    CssMerge {
        paths: merge_css(inherited, layer_paths, inherit_css),
        inherit_css,
    }
}

fn dedup_preserving_order(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = std::collections::HashSet::new();
    paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

/// Render resolved CSS paths back into a config value.
pub fn css_paths_value(paths: &[PathBuf]) -> Value {
    Value::Array(
        paths
            .iter()
            .map(|p| Value::String(p.to_string_lossy().to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "body {}").unwrap();
        path
    }

    #[test]
    fn test_inherit_appends() {
        let temp = TempDir::new().unwrap();
        let x = touch(temp.path(), "x.css");
        let y = touch(temp.path(), "y.css");

        let layer = json!({"css_files": ["y.css"], "inherit_css": true});
        let merged = resolve_and_merge_css(&layer, temp.path(), &[x.clone()], None, "test");
        assert_eq!(merged.paths, vec![x, y]);
        assert!(merged.inherit_css);
    }

    #[test]
    fn test_default_replaces() {
        let temp = TempDir::new().unwrap();
        let x = touch(temp.path(), "x.css");
        let y = touch(temp.path(), "y.css");

        let layer = json!({"css_files": ["y.css"]});
        let merged = resolve_and_merge_css(&layer, temp.path(), &[x], None, "test");
        assert_eq!(merged.paths, vec![y]);
        assert!(!merged.inherit_css);
    }

    #[test]
    fn test_absent_css_files_keeps_inherited() {
        let temp = TempDir::new().unwrap();
        let x = touch(temp.path(), "x.css");

        let merged = resolve_and_merge_css(&json!({}), temp.path(), &[x.clone()], None, "test");
        assert_eq!(merged.paths, vec![x]);
    }

    #[test]
    fn test_missing_css_is_skipped() {
        let temp = TempDir::new().unwrap();
        let present = touch(temp.path(), "present.css");

        let layer = json!({"css_files": ["present.css", "absent.css", 7]});
        let merged = resolve_and_merge_css(&layer, temp.path(), &[], None, "test");
        assert_eq!(merged.paths, vec![present]);
    }

    #[test]
    fn test_duplicates_removed_keeping_first() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "a.css");
        let b = touch(temp.path(), "b.css");

        let layer = json!({"css_files": ["b.css", "a.css"], "inherit_css": true});
        let merged = resolve_and_merge_css(&layer, temp.path(), &[a.clone()], None, "test");
        assert_eq!(merged.paths, vec![a, b]);
    }

    #[test]
    fn test_single_string_is_accepted() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "a.css");

        let resolved = resolve_css_paths(Some(&json!("a.css")), temp.path(), None, "test");
        assert_eq!(resolved, Some(vec![a]));
    }
}
