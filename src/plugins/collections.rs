//! Read-only view of the collections manager.
//!
//! Collections are git-sourced plugin bundles stored under a collections
//! root. Fetching and enabling them happens elsewhere; this module only reads
//! what is on disk: the collection directories and the `enabled.yaml`
//! manifest listing enabled plugin instances.

use crate::config::yaml::{load_yaml_file, non_blank_str};
use crate::paths::find_plugin_config_in_dir;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File under the collections root listing enabled plugins.
pub const ENABLED_MANIFEST_FILE: &str = "enabled.yaml";

/// Top-level key of the enabled manifest.
pub const ENABLED_PLUGINS_KEY: &str = "enabled_plugins";

/// A plugin present in a collection, enabled or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailablePlugin {
    pub collection: String,
    pub plugin_id: String,
    pub config_path: PathBuf,
    pub description: Option<String>,
}

/// One enabled plugin instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledCollection {
    pub collection_name: String,
    pub plugin_id: String,
    pub invoke_name: String,
}

/// What the resolver needs from the collections manager.
///
/// Implementations must not write: resolution only ever reads.
pub trait CollectionsManager: Send + Sync {
    /// Directory holding the collections and the enabled manifest.
    fn coll_root(&self) -> &Path;

    /// Plugins found in collections, optionally limited to one collection.
    fn list_available_plugins(&self, collection_filter: Option<&str>) -> Vec<AvailablePlugin>;

    /// Enabled plugin instances, optionally limited to one collection.
    fn list_enabled_collections(&self, collection_filter: Option<&str>) -> Vec<EnabledCollection>;

    /// Location of the enabled manifest.
    fn enabled_manifest_path(&self) -> PathBuf {
        self.coll_root().join(ENABLED_MANIFEST_FILE)
    }
}

/// Raw `enabled_plugins` entries of a manifest file.
///
/// A missing file means nothing is enabled. Unreadable files and a
/// non-sequence `enabled_plugins` are logged and treated the same way.
/// Entries are returned unvalidated, nulls included.
pub fn read_enabled_manifest(path: &Path) -> Vec<Value> {
    if !path.is_file() {
        debug!(path = %path.display(), "No enabled-plugins manifest");
        return Vec::new();
    }
    let manifest = match load_yaml_file(path) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{:#}", e), "Cannot read enabled-plugins manifest");
            return Vec::new();
        }
    };
    match manifest.get(ENABLED_PLUGINS_KEY) {
        Some(Value::Array(entries)) => entries.clone(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            warn!(
                path = %path.display(),
                "'{}' is not a list; ignoring manifest",
                ENABLED_PLUGINS_KEY
            );
            Vec::new()
        }
    }
}

/// Collections manager backed by a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryCollections {
    root: PathBuf,
}

impl DirectoryCollections {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.'))
            })
            .collect();
        dirs.sort();
        dirs
    }
}

impl CollectionsManager for DirectoryCollections {
    fn coll_root(&self) -> &Path {
        &self.root
    }

    fn list_available_plugins(&self, collection_filter: Option<&str>) -> Vec<AvailablePlugin> {
        let mut plugins = Vec::new();
        for collection_dir in Self::sorted_subdirs(&self.root) {
            let Some(collection) = dir_name(&collection_dir) else {
                continue;
            };
            if collection_filter.is_some_and(|f| f != collection) {
                continue;
            }
            for plugin_dir in Self::sorted_subdirs(&collection_dir) {
                let Some(plugin_id) = dir_name(&plugin_dir) else {
                    continue;
                };
                let Some(config_path) = find_plugin_config_in_dir(&plugin_dir) else {
                    continue;
                };
                let description = load_yaml_file(&config_path)
                    .ok()
                    .and_then(|c| non_blank_str(&c, "description").map(str::to_string));
                plugins.push(AvailablePlugin {
                    collection: collection.clone(),
                    plugin_id,
                    config_path,
                    description,
                });
            }
        }
        plugins
    }

    fn list_enabled_collections(&self, collection_filter: Option<&str>) -> Vec<EnabledCollection> {
        read_enabled_manifest(&self.enabled_manifest_path())
            .iter()
            .filter_map(|entry| {
                Some(EnabledCollection {
                    collection_name: non_blank_str(entry, "collection_name")?.to_string(),
                    plugin_id: non_blank_str(entry, "plugin_id")?.to_string(),
                    invoke_name: non_blank_str(entry, "invoke_name")?.to_string(),
                })
            })
            .filter(|e| collection_filter.is_none_or(|f| f == e.collection_name))
            .collect()
    }
}

fn dir_name(dir: &Path) -> Option<String> {
    dir.file_name().and_then(|n| n.to_str()).map(str::to_string)
}
