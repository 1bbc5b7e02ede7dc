//! Plugin registry construction.
//!
//! A registry maps invocable plugin names to their config files. Sources are
//! applied in ascending precedence and later ones overwrite earlier entries:
//!
//! 1. **Bundled** - sub-directories of the bundled `plugins/` directory
//! 2. **CM** - the collections manager's enabled manifest
//! 3. **XDG** - the `plugins` section of the XDG main config
//! 4. **Project** - the `plugins` section of the project manifest
//!
//! Manifest `plugins` values may be a file path, a directory path, or
//! `<alias>:<relative path>` where the alias is declared in the same file's
//! `plugin_directory_aliases` section.

use super::collections::{CollectionsManager, read_enabled_manifest};
use crate::config::yaml::{kind_name, load_yaml_file, non_blank_str};
use crate::paths::{find_plugin_config_in_dir, normalize_path_components, resolve_against};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directory under the app root holding bundled plugins.
pub const BUNDLED_PLUGINS_DIR: &str = "plugins";

/// Manifest section declaring directory aliases.
pub const ALIASES_KEY: &str = "plugin_directory_aliases";

/// Manifest section registering plugins.
pub const PLUGINS_KEY: &str = "plugins";

/// Where a registration came from (lowest to highest precedence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationSource {
    BundledDefinitions = 0,
    CmEnabled = 1,
    XdgGlobal = 2,
    ProjectManifest = 3,
}

impl std::fmt::Display for RegistrationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationSource::BundledDefinitions => write!(f, "Bundled (Definitions)"),
            RegistrationSource::CmEnabled => write!(f, "CollectionsManager (CM)"),
            RegistrationSource::XdgGlobal => write!(f, "XDG Global"),
            RegistrationSource::ProjectManifest => write!(f, "Project Manifest"),
        }
    }
}

/// A plugin name bound to its config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRegistration {
    pub config_path: PathBuf,
    pub source: RegistrationSource,
    /// File or directory that declared this registration.
    pub defined_in: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cm_collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cm_plugin_id: Option<String>,
}

impl PluginRegistration {
    fn new(config_path: PathBuf, source: RegistrationSource, defined_in: Option<PathBuf>) -> Self {
        Self {
            config_path,
            source,
            defined_in,
            cm_collection: None,
            cm_plugin_id: None,
        }
    }
}

/// Registered plugins by name, iterated in name order.
pub type PluginRegistry = BTreeMap<String, PluginRegistration>;

/// Alias name to absolute directory, scoped to one manifest.
pub type AliasMap = HashMap<String, PathBuf>;

/// A YAML manifest file contributing registrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub path: PathBuf,
    pub source: RegistrationSource,
}

/// One row of [`PluginRegistryBuilder::get_all_plugin_details`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDetails {
    pub name: String,
    pub status: String,
    pub provenance: String,
    pub config_path: Option<PathBuf>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cm_collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cm_plugin_id: Option<String>,
}

enum AliasRef<'a> {
    Known(&'a Path, &'a str),
    Unknown(&'a str),
    NotAlias,
}

/// Builds [`PluginRegistry`] values from every configured source.
#[derive(Clone)]
pub struct PluginRegistryBuilder {
    bundled_plugins_root: PathBuf,
    manifests: Vec<ManifestFile>,
    collections: Option<Arc<dyn CollectionsManager>>,
    use_factory_defaults_only: bool,
    home: Option<PathBuf>,
}

impl std::fmt::Debug for PluginRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistryBuilder")
            .field("bundled_plugins_root", &self.bundled_plugins_root)
            .field("manifests", &self.manifests)
            .field("collections", &self.collections.as_ref().map(|c| c.coll_root().to_path_buf()))
            .field("use_factory_defaults_only", &self.use_factory_defaults_only)
            .finish()
    }
}

impl PluginRegistryBuilder {
    /// Create a builder over the bundled plugins directory.
    ///
    /// `home` is used for `~/` expansion; pass `dirs::home_dir()` outside tests.
    pub fn new(
        bundled_plugins_root: impl Into<PathBuf>,
        home: Option<PathBuf>,
        use_factory_defaults_only: bool,
    ) -> Self {
        Self {
            bundled_plugins_root: bundled_plugins_root.into(),
            manifests: Vec::new(),
            collections: None,
            use_factory_defaults_only,
            home,
        }
    }

    pub fn with_collections(mut self, collections: Arc<dyn CollectionsManager>) -> Self {
        self.collections = Some(collections);
        self
    }

    /// Add a manifest file. Manifests apply in the order added.
    pub fn with_manifest(mut self, path: impl Into<PathBuf>, source: RegistrationSource) -> Self {
        self.manifests.push(ManifestFile {
            path: path.into(),
            source,
        });
        self
    }

    /// Build the registry from all sources in precedence order.
    pub fn build_registry(&self) -> PluginRegistry {
        let mut registry = self.discover_bundled();

        if self.use_factory_defaults_only {
            debug!(
                count = registry.len(),
                "Factory defaults only: skipping CM and manifest registrations"
            );
            return registry;
        }

        if let Some(cm) = &self.collections {
            registry.extend(self.cm_registrations(cm.as_ref()));
        }

        for manifest in &self.manifests {
            registry.extend(self.manifest_registrations(manifest));
        }

        info!(count = registry.len(), "Plugin registry built");
        registry
    }

    fn discover_bundled(&self) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        let entries = match std::fs::read_dir(&self.bundled_plugins_root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    dir = %self.bundled_plugins_root.display(),
                    error = %e,
                    "No bundled plugins directory"
                );
                return registry;
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            match find_plugin_config_in_dir(&dir) {
                Some(config_path) => {
                    debug!(plugin = %name, config = %config_path.display(), "Discovered bundled plugin");
                    registry.insert(
                        name,
                        PluginRegistration::new(
                            config_path,
                            RegistrationSource::BundledDefinitions,
                            Some(self.bundled_plugins_root.clone()),
                        ),
                    );
                }
                None => {
                    warn!(dir = %dir.display(), "Bundled plugin directory has no usable config file; skipping");
                }
            }
        }
        registry
    }

    fn cm_registrations(&self, cm: &dyn CollectionsManager) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        let manifest_path = cm.enabled_manifest_path();
        let coll_root = cm.coll_root().to_path_buf();

        for (index, entry) in read_enabled_manifest(&manifest_path).iter().enumerate() {
            if !entry.is_object() {
                warn!(
                    manifest = %manifest_path.display(),
                    index,
                    found = kind_name(entry),
                    "Skipping malformed enabled-plugin entry"
                );
                continue;
            }
            let (Some(invoke_name), Some(raw_config)) = (
                non_blank_str(entry, "invoke_name"),
                non_blank_str(entry, "config_path"),
            ) else {
                warn!(
                    manifest = %manifest_path.display(),
                    index,
                    "Skipping enabled-plugin entry without invoke_name or config_path"
                );
                continue;
            };
            let Some(config_path) = resolve_against(raw_config, Some(&coll_root), self.home.as_deref())
            else {
                continue;
            };
            if !config_path.is_file() {
                warn!(
                    plugin = %invoke_name,
                    config = %config_path.display(),
                    "Enabled plugin config file not found; skipping"
                );
                continue;
            }

            let mut registration = PluginRegistration::new(
                config_path,
                RegistrationSource::CmEnabled,
                Some(manifest_path.clone()),
            );
            registration.cm_collection = non_blank_str(entry, "collection_name").map(str::to_string);
            registration.cm_plugin_id = non_blank_str(entry, "plugin_id").map(str::to_string);
            registry.insert(invoke_name.to_string(), registration);
        }
        registry
    }

    fn manifest_registrations(&self, manifest: &ManifestFile) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        if !manifest.path.is_file() {
            debug!(manifest = %manifest.path.display(), "Manifest not present");
            return registry;
        }
        let config = match load_yaml_file(&manifest.path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    manifest = %manifest.path.display(),
                    error = %format!("{:#}", e),
                    "Cannot read plugin manifest; skipping"
                );
                return registry;
            }
        };
        let base_dir = manifest.path.parent().map(Path::to_path_buf);
        let aliases = self.parse_aliases(&config, base_dir.as_deref(), &manifest.path);

        let plugins = match config.get(PLUGINS_KEY) {
            Some(Value::Object(plugins)) => plugins,
            None | Some(Value::Null) => return registry,
            Some(other) => {
                warn!(
                    manifest = %manifest.path.display(),
                    found = kind_name(other),
                    "'{}' must be a mapping; skipping",
                    PLUGINS_KEY
                );
                return registry;
            }
        };

        for (name, spec) in plugins {
            let Some(raw_spec) = spec.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                warn!(
                    manifest = %manifest.path.display(),
                    plugin = %name,
                    "Plugin path must be a non-empty string; skipping"
                );
                continue;
            };
            match self.resolve_plugin_config_path(raw_spec, base_dir.as_deref(), &aliases) {
                Some(config_path) => {
                    registry.insert(
                        name.clone(),
                        PluginRegistration::new(config_path, manifest.source, Some(manifest.path.clone())),
                    );
                }
                None => {
                    warn!(
                        manifest = %manifest.path.display(),
                        plugin = %name,
                        spec = %raw_spec,
                        "Plugin config path did not resolve to a file; skipping"
                    );
                }
            }
        }
        registry
    }

    fn parse_aliases(&self, config: &Value, base_dir: Option<&Path>, manifest: &Path) -> AliasMap {
        let mut aliases = AliasMap::new();
        let Some(section) = config.get(ALIASES_KEY).and_then(Value::as_object) else {
            return aliases;
        };
        for (name, raw) in section {
            let Some(raw) = raw.as_str() else {
                warn!(manifest = %manifest.display(), alias = %name, "Alias value must be a string");
                continue;
            };
            if let Some(path) = self.resolve_alias(name, raw, base_dir) {
                aliases.insert(name.clone(), path);
            }
        }
        aliases
    }

    /// Resolve an alias target to an absolute directory.
    ///
    /// `~/` expands to the home directory and other relative values resolve
    /// against `base_path`. Blank values, and relative values without a base,
    /// are logged and yield `None`.
    pub fn resolve_alias(&self, name: &str, raw_value: &str, base_path: Option<&Path>) -> Option<PathBuf> {
        let raw_value = raw_value.trim();
        if raw_value.is_empty() {
            warn!(alias = %name, "Alias has an empty target; ignoring");
            return None;
        }
        let resolved = resolve_against(raw_value, base_path, self.home.as_deref());
        if resolved.is_none() {
            warn!(
                alias = %name,
                target = %raw_value,
                "Relative alias target with no base path; ignoring"
            );
        }
        resolved
    }

    /// Resolve a manifest path spec to an existing config file.
    ///
    /// Handles `alias:rest`, `~/`, relative paths, and directories (which are
    /// searched for `<dirname>.config.yaml`, then a unique `*.config.yaml`).
    pub fn resolve_plugin_config_path(
        &self,
        raw_path_spec: &str,
        base_path: Option<&Path>,
        alias_map: &AliasMap,
    ) -> Option<PathBuf> {
        let raw = raw_path_spec.trim();
        if raw.is_empty() {
            return None;
        }

        let resolved = match split_alias(raw, alias_map) {
            AliasRef::Known(alias_base, rest) => {
                let expanded = resolve_against(rest, Some(alias_base), self.home.as_deref())?;
                normalize_path_components(&expanded)
            }
            AliasRef::Unknown(alias) => {
                warn!(alias = %alias, spec = %raw, "Unknown plugin directory alias");
                return None;
            }
            AliasRef::NotAlias => match resolve_against(raw, base_path, self.home.as_deref()) {
                Some(path) => path,
                None => {
                    warn!(spec = %raw, "Relative plugin path with no base path");
                    return None;
                }
            },
        };

        if resolved.is_dir() {
            return find_plugin_config_in_dir(&resolved);
        }
        if resolved.is_file() {
            return Some(resolved);
        }
        debug!(path = %resolved.display(), "Plugin config path does not exist");
        None
    }

    /// Every known plugin: registered, CM-enabled, and CM-available.
    ///
    /// Sorted by name.
    pub fn get_all_plugin_details(&self) -> Vec<PluginDetails> {
        let registry = self.build_registry();
        let (available, enabled) = match (&self.collections, self.use_factory_defaults_only) {
            (Some(cm), false) => (cm.list_available_plugins(None), cm.list_enabled_collections(None)),
            _ => (Vec::new(), Vec::new()),
        };

        let mut details = Vec::with_capacity(registry.len() + available.len());
        let mut shown: HashSet<String> = HashSet::new();

        for (name, registration) in &registry {
            let status = match registration.source {
                RegistrationSource::CmEnabled => "Enabled (CM)".to_string(),
                source => format!("Registered ({})", source),
            };
            let provenance = match (&registration.cm_collection, &registration.cm_plugin_id) {
                (Some(collection), Some(plugin_id)) => format!("CM: {}/{}", collection, plugin_id),
                _ => registration
                    .defined_in
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| registration.source.to_string()),
            };
            details.push(PluginDetails {
                name: name.clone(),
                status,
                provenance,
                config_path: Some(registration.config_path.clone()),
                description: read_description(&registration.config_path),
                cm_collection: registration.cm_collection.clone(),
                cm_plugin_id: registration.cm_plugin_id.clone(),
            });
            shown.insert(name.clone());
        }

        let find_available = |collection: &str, plugin_id: &str| {
            available
                .iter()
                .find(|a| a.collection == collection && a.plugin_id == plugin_id)
        };

        for instance in &enabled {
            if !shown.insert(instance.invoke_name.clone()) {
                continue;
            }
            let candidate = find_available(&instance.collection_name, &instance.plugin_id);
            details.push(PluginDetails {
                name: instance.invoke_name.clone(),
                status: "Enabled (CM)".to_string(),
                provenance: format!("CM: {}/{}", instance.collection_name, instance.plugin_id),
                config_path: candidate.map(|a| a.config_path.clone()),
                description: candidate.and_then(|a| a.description.clone()),
                cm_collection: Some(instance.collection_name.clone()),
                cm_plugin_id: Some(instance.plugin_id.clone()),
            });
        }

        let enabled_ids: HashSet<(&str, &str)> = enabled
            .iter()
            .map(|e| (e.collection_name.as_str(), e.plugin_id.as_str()))
            .collect();
        for plugin in &available {
            if enabled_ids.contains(&(plugin.collection.as_str(), plugin.plugin_id.as_str())) {
                continue;
            }
            details.push(PluginDetails {
                name: format!("{}/{}", plugin.collection, plugin.plugin_id),
                status: "Available (CM)".to_string(),
                provenance: format!("CM: {}/{}", plugin.collection, plugin.plugin_id),
                config_path: Some(plugin.config_path.clone()),
                description: plugin.description.clone(),
                cm_collection: Some(plugin.collection.clone()),
                cm_plugin_id: Some(plugin.plugin_id.clone()),
            });
        }

        details.sort_by(|a, b| a.name.cmp(&b.name));
        details
    }
}

fn split_alias<'a>(raw: &'a str, aliases: &'a AliasMap) -> AliasRef<'a> {
    let Some((prefix, rest)) = raw.split_once(':') else {
        return AliasRef::NotAlias;
    };
    if let Some(base) = aliases.get(prefix) {
        return AliasRef::Known(base.as_path(), rest.trim_start_matches(['/', '\\']));
    }
    // Single letters are drive prefixes; separators mean a plain path.
    let looks_like_alias = prefix.len() > 1
        && !prefix.contains(['/', '\\', '.', '~'])
        && !rest.starts_with("//");
    if looks_like_alias {
        AliasRef::Unknown(prefix)
    } else {
        AliasRef::NotAlias
    }
}

fn read_description(config_path: &Path) -> Option<String> {
    load_yaml_file(config_path)
        .ok()
        .and_then(|c| non_blank_str(&c, "description").map(str::to_string))
}
