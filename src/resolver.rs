//! Effective plugin configuration.
//!
//! [`ConfigResolver`] owns every piece of memoized state: the three main
//! configs, the plugin registry, the layer loader and the result cache. It
//! initializes lazily and rebuilds only when `use_factory_defaults_only`
//! changes.
//!
//! Resolution of a plugin identifier runs ordered classification checks
//! (registered name, config file, plugin directory, other path) and stops at
//! the first that matches.

use crate::config::assets::css_paths_value;
use crate::config::main_config::{
    APP_NAME, MainConfigLoader, MainConfigPaths, MainConfigResult, discover_xdg_dir,
};
use crate::config::merge::deep_merge;
use crate::config::yaml::non_blank_str;
use crate::error::{ResolveError, ResolveResult};
use crate::paths::{
    absolutize, expand_home_with, find_plugin_config_in_dir, plugin_name_from_config,
    resolve_against,
};
use crate::plugins::collections::{CollectionsManager, DirectoryCollections};
use crate::plugins::loader::PluginConfigLoader;
use crate::plugins::registry::{
    BUNDLED_PLUGINS_DIR, PluginDetails, PluginRegistration, PluginRegistry,
    PluginRegistryBuilder, RegistrationSource,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Global PDF options merged under each plugin's `pdf_options`.
pub const GLOBAL_PDF_OPTIONS_KEY: &str = "global_pdf_options";

/// Global math options merged under each plugin's `math`.
pub const GLOBAL_MATH_KEY: &str = "math";

/// Main config key naming the collections root.
pub const COLLECTIONS_ROOT_KEY: &str = "collections_root";

/// Programmatic inputs to the resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Root of the bundled definitions (`config.yaml`, `plugins/`).
    pub app_root: PathBuf,
    /// Project root, used for relative paths in caller overrides.
    pub project_root: Option<PathBuf>,
    /// Project manifest file: main config and plugin manifest.
    pub project_manifest: Option<PathBuf>,
    /// Explicit main config file, highest precedence for global settings.
    pub explicit_config: Option<PathBuf>,
    /// XDG config directory override.
    pub xdg_dir: Option<PathBuf>,
    /// Home directory for `~/` expansion; the OS home when unset.
    pub home_dir: Option<PathBuf>,
    /// Only use bundled definitions and the factory-default config.
    pub use_factory_defaults_only: bool,
}

/// The merged configuration a plugin runs with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub plugin_name: String,
    pub config_path: PathBuf,
    /// Directory of the plugin's own config file.
    pub plugin_base_path: PathBuf,
    /// Merged plugin config with absolute `handler_script` and `css_files`.
    pub plugin_specific_config: Value,
    pub handler_script_path: Option<PathBuf>,
    pub css_files: Vec<PathBuf>,
    /// The primary main config.
    pub main_config: Value,
}

/// How a plugin identifier was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginTarget {
    Registered {
        name: String,
        registration: PluginRegistration,
    },
    ConfigFile(PathBuf),
    PluginDirectory {
        dir: PathBuf,
        config_path: PathBuf,
    },
}

impl PluginTarget {
    /// Plugin name and config file, checking that a registered file still exists.
    pub fn plugin_config(&self) -> ResolveResult<(String, PathBuf)> {
        match self {
            PluginTarget::Registered { name, registration } => {
                if !registration.config_path.is_file() {
                    return Err(ResolveError::registered_config_missing(
                        name,
                        &registration.config_path,
                    ));
                }
                Ok((name.clone(), registration.config_path.clone()))
            }
            PluginTarget::ConfigFile(path) => {
                let name = plugin_name_from_config(path).unwrap_or_default();
                Ok((name, path.clone()))
            }
            PluginTarget::PluginDirectory { dir, config_path } => {
                let name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok((name, config_path.clone()))
            }
        }
    }
}

/// Classifies identifiers against a registry.
pub struct Classifier<'a> {
    registry: &'a PluginRegistry,
    home: Option<&'a Path>,
}

impl<'a> Classifier<'a> {
    pub fn new(registry: &'a PluginRegistry, home: Option<&'a Path>) -> Self {
        Self { registry, home }
    }

    /// Run the checks in order; the first match decides.
    pub fn classify(&self, identifier: &str) -> ResolveResult<PluginTarget> {
        let checks: [fn(&Self, &str) -> Option<ResolveResult<PluginTarget>>; 4] = [
            Self::registered,
            Self::config_file,
            Self::plugin_directory,
            Self::other_path,
        ];
        checks
            .iter()
            .find_map(|check| check(self, identifier))
            .unwrap_or_else(|| Err(ResolveError::plugin_not_found(identifier)))
    }

    fn candidate_path(&self, identifier: &str) -> PathBuf {
        absolutize(&expand_home_with(identifier, self.home))
    }

    fn registered(&self, identifier: &str) -> Option<ResolveResult<PluginTarget>> {
        self.registry.get(identifier).map(|registration| {
            Ok(PluginTarget::Registered {
                name: identifier.to_string(),
                registration: registration.clone(),
            })
        })
    }

    fn config_file(&self, identifier: &str) -> Option<ResolveResult<PluginTarget>> {
        let path = self.candidate_path(identifier);
        path.is_file().then(|| Ok(PluginTarget::ConfigFile(path)))
    }

    fn plugin_directory(&self, identifier: &str) -> Option<ResolveResult<PluginTarget>> {
        let dir = self.candidate_path(identifier);
        if !dir.is_dir() {
            return None;
        }
        Some(match find_plugin_config_in_dir(&dir) {
            Some(config_path) => Ok(PluginTarget::PluginDirectory { dir, config_path }),
            None => Err(ResolveError::plugin_config_not_found(identifier, &dir)),
        })
    }

    fn other_path(&self, identifier: &str) -> Option<ResolveResult<PluginTarget>> {
        let path = self.candidate_path(identifier);
        // Follows links, so a dangling symlink is not found.
        path.exists()
            .then(|| Err(ResolveError::invalid_plugin_path(identifier, &path)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    identifier: String,
    overrides: Option<String>,
}

impl CacheKey {
    fn new(identifier: &str, overrides: Option<&Value>) -> Self {
        // Object keys serialize sorted, so equal trees give equal strings.
        let overrides = overrides
            .filter(|v| !v.is_null() && !v.as_object().is_some_and(Map::is_empty))
            .map(Value::to_string);
        Self {
            identifier: identifier.to_string(),
            overrides,
        }
    }
}

struct ResolverState {
    use_factory_defaults_only: bool,
    primary: MainConfigResult,
    xdg: MainConfigResult,
    project: MainConfigResult,
    coll_root: PathBuf,
    loader: PluginConfigLoader,
    registry_builder: PluginRegistryBuilder,
    registry: PluginRegistry,
}

/// Resolves plugin identifiers to effective configurations.
pub struct ConfigResolver {
    options: ResolverOptions,
    collections: Option<Arc<dyn CollectionsManager>>,
    state: Option<ResolverState>,
    cache: HashMap<CacheKey, Arc<EffectiveConfig>>,
    merge_count: usize,
    initialization_count: usize,
}

impl ConfigResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self {
            options,
            collections: None,
            state: None,
            cache: HashMap::new(),
            merge_count: 0,
            initialization_count: 0,
        }
    }

    /// Use `collections` instead of a directory view over `collections_root`.
    pub fn with_collections(mut self, collections: Arc<dyn CollectionsManager>) -> Self {
        self.collections = Some(collections);
        self
    }

    /// Change the factory-defaults flag; the next call rebuilds.
    pub fn set_use_factory_defaults_only(&mut self, value: bool) {
        self.options.use_factory_defaults_only = value;
    }

    /// Times the layer merge actually ran (cache misses).
    pub fn merge_count(&self) -> usize {
        self.merge_count
    }

    /// Times the resolver state was built.
    pub fn initialization_count(&self) -> usize {
        self.initialization_count
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Load main configs and build the registry unless already done for the
    /// current factory-defaults flag.
    pub fn initialize_if_needed(&mut self) {
        self.ensure_state();
    }

    pub fn registry(&mut self) -> &PluginRegistry {
        &self.ensure_state().registry
    }

    pub fn primary_main_config(&mut self) -> &MainConfigResult {
        &self.ensure_state().primary
    }

    pub fn xdg_main_config(&mut self) -> &MainConfigResult {
        &self.ensure_state().xdg
    }

    pub fn project_manifest_config(&mut self) -> &MainConfigResult {
        &self.ensure_state().project
    }

    pub fn resolved_coll_root(&mut self) -> &Path {
        &self.ensure_state().coll_root
    }

    /// Registered, enabled and available plugins for listing.
    pub fn get_all_plugin_details(&mut self) -> Vec<PluginDetails> {
        self.ensure_state().registry_builder.get_all_plugin_details()
    }

    /// Classify `identifier` without loading any plugin config.
    pub fn classify(&mut self, identifier: &str) -> ResolveResult<PluginTarget> {
        let home = self.home_dir();
        let state = self.ensure_state();
        Classifier::new(&state.registry, home.as_deref()).classify(identifier)
    }

    /// Resolve the effective configuration for a plugin.
    ///
    /// Identical `(identifier, override_config)` calls return the cached
    /// result. Errors are never cached.
    pub fn get_effective_config(
        &mut self,
        plugin_identifier: &str,
        override_config: Option<&Value>,
    ) -> ResolveResult<Arc<EffectiveConfig>> {
        self.ensure_state();
        let key = CacheKey::new(plugin_identifier, override_config);
        if let Some(hit) = self.cache.get(&key) {
            debug!(plugin = %plugin_identifier, "Effective config cache hit");
            return Ok(Arc::clone(hit));
        }

        let home = self.home_dir();
        let project_root = self.options.project_root.clone();
        let state = self.ensure_state();
        let target = Classifier::new(&state.registry, home.as_deref()).classify(plugin_identifier)?;
        let (plugin_name, config_path) = target.plugin_config()?;
        debug!(
            plugin = %plugin_identifier,
            name = %plugin_name,
            config = %config_path.display(),
            "Resolved plugin config file"
        );

        let built = state.build_effective(
            plugin_identifier,
            plugin_name,
            config_path,
            override_config,
            project_root.as_deref(),
            home.as_deref(),
        );
        self.merge_count += 1;
        let effective = Arc::new(built?);
        self.cache.insert(key, Arc::clone(&effective));
        Ok(effective)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.options.home_dir.clone().or_else(dirs::home_dir)
    }

    fn ensure_state(&mut self) -> &ResolverState {
        let flag = self.options.use_factory_defaults_only;
        let state = match self.state.take() {
            Some(state) if state.use_factory_defaults_only == flag => state,
            previous => {
                if previous.is_some() {
                    info!(use_factory_defaults_only = flag, "Factory-defaults flag changed; rebuilding resolver state");
                }
                self.cache.clear();
                self.initialization_count += 1;
                self.build_state(flag)
            }
        };
        self.state.insert(state)
    }

    fn build_state(&self, use_factory_defaults_only: bool) -> ResolverState {
        let home = self.home_dir();
        let app_root = absolutize(&self.options.app_root);
        let xdg_dir = discover_xdg_dir(self.options.xdg_dir.as_deref());
        let paths = MainConfigPaths {
            app_root: app_root.clone(),
            xdg_dir: xdg_dir.clone(),
            project_manifest: self.options.project_manifest.clone(),
            explicit_config: self.options.explicit_config.clone(),
            project_root: self.options.project_root.clone(),
        };

        let mut main_loader = MainConfigLoader::new(paths.clone(), use_factory_defaults_only);
        let primary = main_loader.primary_main_config();
        let xdg = main_loader.xdg_main_config();
        let project = main_loader.project_manifest_config();

        let coll_root = resolve_coll_root(&primary, home.as_deref());
        let collections = self
            .collections
            .clone()
            .unwrap_or_else(|| Arc::new(DirectoryCollections::new(&coll_root)));

        let mut registry_builder = PluginRegistryBuilder::new(
            app_root.join(BUNDLED_PLUGINS_DIR),
            home.clone(),
            use_factory_defaults_only,
        )
        .with_collections(collections);
        if let Some(xdg_main) = paths.xdg_main() {
            registry_builder = registry_builder.with_manifest(xdg_main, RegistrationSource::XdgGlobal);
        }
        if let Some(manifest) = &paths.project_manifest {
            registry_builder =
                registry_builder.with_manifest(absolutize(manifest), RegistrationSource::ProjectManifest);
        }
        let registry = registry_builder.build_registry();

        let loader = PluginConfigLoader::new(xdg_dir, xdg.clone(), project.clone(), home);

        info!(
            primary = ?primary.path,
            reason = %primary.reason,
            coll_root = %coll_root.display(),
            plugins = registry.len(),
            "Resolver initialized"
        );

        ResolverState {
            use_factory_defaults_only,
            primary,
            xdg,
            project,
            coll_root,
            loader,
            registry_builder,
            registry,
        }
    }
}

impl ResolverState {
    fn build_effective(
        &self,
        identifier: &str,
        plugin_name: String,
        config_path: PathBuf,
        override_config: Option<&Value>,
        project_root: Option<&Path>,
        home: Option<&Path>,
    ) -> ResolveResult<EffectiveConfig> {
        let plugin_base_path = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut layer = self.loader.load_plugin_layers(&plugin_name, &config_path);
        if let Some(overrides) = override_config.filter(|v| v.is_object()) {
            let base_dir = project_root.unwrap_or(&plugin_base_path);
            layer = self
                .loader
                .fold_layer(layer, overrides.clone(), base_dir, "caller overrides");
        }

        let mut config = match layer.raw_config {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for (plugin_key, global_key) in [("pdf_options", GLOBAL_PDF_OPTIONS_KEY), ("math", GLOBAL_MATH_KEY)] {
            let global = self.primary.config.get(global_key).cloned().unwrap_or(Value::Null);
            let own = config.remove(plugin_key).unwrap_or(Value::Null);
            let merged = deep_merge(global, own);
            if !merged.is_null() {
                config.insert(plugin_key.to_string(), merged);
            }
        }

        config.insert("css_files".to_string(), css_paths_value(&layer.resolved_css_paths));
        config.insert("inherit_css".to_string(), Value::Bool(layer.inherit_css));

        let handler_raw = config
            .get("handler_script")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let handler_script_path = match handler_raw {
            Some(raw) => {
                let path = resolve_against(&raw, Some(&plugin_base_path), home)
                    .unwrap_or_else(|| plugin_base_path.join(&raw));
                if !path.is_file() {
                    return Err(ResolveError::handler_script_not_found(&path, identifier));
                }
                config.insert(
                    "handler_script".to_string(),
                    Value::String(path.to_string_lossy().to_string()),
                );
                Some(path)
            }
            None => {
                debug!(plugin = %identifier, "Plugin declares no handler_script");
                None
            }
        };

        Ok(EffectiveConfig {
            plugin_name,
            config_path,
            plugin_base_path,
            plugin_specific_config: Value::Object(config),
            handler_script_path,
            css_files: layer.resolved_css_paths,
            main_config: self.primary.config.clone(),
        })
    }
}

fn resolve_coll_root(primary: &MainConfigResult, home: Option<&Path>) -> PathBuf {
    if let Some(raw) = non_blank_str(&primary.config, COLLECTIONS_ROOT_KEY)
        && let Some(root) = resolve_against(raw, primary.base_dir.as_deref(), home)
    {
        return root;
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("collections")
}
