//! Path helpers shared by the loaders.
//!
//! Pure path manipulation: `~/` expansion, resolution against a base
//! directory, lexical normalization, and the `<name>.config.yaml` naming
//! convention. Only [`find_plugin_config_in_dir`] touches the filesystem.

use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Suffix every plugin configuration file carries.
pub const CONFIG_SUFFIX: &str = ".config.yaml";

/// Expand a leading `~` or `~/` against `home`.
///
/// Returns the input unchanged when it has no tilde prefix or no home
/// directory is known.
pub fn expand_home_with(raw: &str, home: Option<&Path>) -> PathBuf {
    match (raw, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (raw, Some(home)) if raw.starts_with("~/") => home.join(&raw[2..]),
        (raw, _) => PathBuf::from(raw),
    }
}

/// Expand `~/` against the OS home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    expand_home_with(raw, dirs::home_dir().as_deref())
}

/// Resolve `raw` against `base` after home expansion.
///
/// Absolute results are normalized and returned as is. Relative paths need a
/// base; without one the result is `None`.
pub fn resolve_against(raw: &str, base: Option<&Path>, home: Option<&Path>) -> Option<PathBuf> {
    let expanded = expand_home_with(raw, home);
    if expanded.is_absolute() {
        return Some(normalize_path_components(&expanded));
    }
    base.map(|base| normalize_path_components(&base.join(expanded)))
}

/// Make `path` absolute against the current directory, then normalize it.
pub fn absolutize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    normalize_path_components(&absolute)
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn normalize_path_components(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => components.push(Component::Prefix(p)),
            Component::RootDir => components.push(Component::RootDir),
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                } else {
                    components.push(Component::ParentDir);
                }
            }
            Component::Normal(name) => components.push(Component::Normal(name)),
        }
    }

    components.iter().collect()
}

/// Conventional config file name for a plugin directory.
pub fn conventional_config_name(dir: &Path) -> Option<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(|n| format!("{}{}", n, CONFIG_SUFFIX))
}

/// Plugin name implied by a config file name (`cv.config.yaml` -> `cv`).
pub fn plugin_name_from_config(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let name = file_name
        .strip_suffix(CONFIG_SUFFIX)
        .or_else(|| file_name.strip_suffix(".yaml"))
        .or_else(|| file_name.strip_suffix(".yml"))
        .unwrap_or(file_name);
    Some(name.to_string())
}

/// Locate the plugin config inside `dir`.
///
/// Prefers `<dirname>.config.yaml`; otherwise accepts exactly one
/// `*.config.yaml`. Several candidates with no conventional match are
/// ambiguous and count as not found.
pub fn find_plugin_config_in_dir(dir: &Path) -> Option<PathBuf> {
    if let Some(name) = conventional_config_name(dir) {
        let conventional = dir.join(name);
        if conventional.is_file() {
            return Some(conventional);
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot read plugin directory");
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(CONFIG_SUFFIX))
        })
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => {
            debug!(dir = %dir.display(), "No *.config.yaml in plugin directory");
            None
        }
        1 => candidates.pop(),
        _ => {
            let names: Vec<String> = candidates
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
                .collect();
            warn!(
                dir = %dir.display(),
                candidates = %names.join(", "),
                "Multiple *.config.yaml files and no conventional name; refusing to guess"
            );
            None
        }
    }
}
