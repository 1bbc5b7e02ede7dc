//! Global (main) configuration loading.
//!
//! The primary main config is the first file found in precedence order:
//! explicit path, project manifest, XDG global, bundled main, factory default.
//! The XDG and project-manifest configs are also exposed on their own because
//! they double as plugin manifests and override sources.

use super::yaml::load_yaml_file;
use crate::paths::absolutize;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Name used for the XDG and data directories.
pub const APP_NAME: &str = "docplug";

/// File name of the main config in the bundled and XDG directories.
pub const MAIN_CONFIG_FILE: &str = "config.yaml";

/// Factory-default config shipped with the bundled definitions.
pub const FACTORY_DEFAULT_FILE: &str = "config.example.yaml";

/// Key injected into every returned config.
pub const PROJECT_ROOT_KEY: &str = "project_root";

/// Source of a main config result, in primary-resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainConfigSource {
    Explicit,
    ProjectManifest,
    XdgGlobal,
    BundledMain,
    FactoryDefault,
    None,
}

impl MainConfigSource {
    /// Human-readable reason tag.
    pub fn reason(self) -> &'static str {
        match self {
            MainConfigSource::Explicit => "explicit --config",
            MainConfigSource::ProjectManifest => "project manifest",
            MainConfigSource::XdgGlobal => "XDG global",
            MainConfigSource::BundledMain => "bundled main",
            MainConfigSource::FactoryDefault => "factory default",
            MainConfigSource::None => "none found",
        }
    }
}

/// One loaded main config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainConfigResult {
    /// Parsed config, or `{}` when the file was missing or unparsable.
    pub config: Value,
    /// The file this result was chosen from, if any.
    pub path: Option<PathBuf>,
    /// Directory relative paths inside `config` resolve against.
    pub base_dir: Option<PathBuf>,
    /// Why this file was chosen.
    pub reason: String,
}

impl MainConfigResult {
    fn empty(reason: impl Into<String>) -> Self {
        Self {
            config: Value::Object(Map::new()),
            path: None,
            base_dir: None,
            reason: reason.into(),
        }
    }
}

/// Locations consulted by [`MainConfigLoader`].
#[derive(Debug, Clone, Default)]
pub struct MainConfigPaths {
    /// Root of the bundled definitions (`config.yaml`, `plugins/`).
    pub app_root: PathBuf,
    /// XDG config directory for this application.
    pub xdg_dir: Option<PathBuf>,
    /// Project manifest file.
    pub project_manifest: Option<PathBuf>,
    /// Explicit config file passed by the caller.
    pub explicit_config: Option<PathBuf>,
    /// Project root injected into every result.
    pub project_root: Option<PathBuf>,
}

impl MainConfigPaths {
    pub fn bundled_main(&self) -> PathBuf {
        self.app_root.join(MAIN_CONFIG_FILE)
    }

    pub fn factory_default(&self) -> PathBuf {
        self.app_root.join(FACTORY_DEFAULT_FILE)
    }

    pub fn xdg_main(&self) -> Option<PathBuf> {
        self.xdg_dir.as_ref().map(|d| d.join(MAIN_CONFIG_FILE))
    }
}

/// Discover the XDG config directory for this application.
///
/// `override_dir` wins, then `$XDG_CONFIG_HOME/docplug`, then the OS config
/// directory. The result is always absolute.
pub fn discover_xdg_dir(override_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = override_dir {
        return Some(absolutize(dir));
    }
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .map(|base| absolutize(&base.join(APP_NAME)))
}

#[derive(Debug, Clone)]
struct LoadedMainConfigs {
    primary: MainConfigResult,
    xdg: MainConfigResult,
    project: MainConfigResult,
}

/// Memoizing loader for the three main config views.
#[derive(Debug, Clone)]
pub struct MainConfigLoader {
    paths: MainConfigPaths,
    use_factory_defaults_only: bool,
    loaded: Option<LoadedMainConfigs>,
    file_reads: usize,
}

impl MainConfigLoader {
    pub fn new(paths: MainConfigPaths, use_factory_defaults_only: bool) -> Self {
        Self {
            paths,
            use_factory_defaults_only,
            loaded: None,
            file_reads: 0,
        }
    }

    /// Number of config files read so far.
    pub fn file_reads(&self) -> usize {
        self.file_reads
    }

    /// The config that supplies global settings.
    pub fn primary_main_config(&mut self) -> MainConfigResult {
        self.ensure_loaded().primary.clone()
    }

    /// The XDG global config (also a plugin manifest).
    pub fn xdg_main_config(&mut self) -> MainConfigResult {
        self.ensure_loaded().xdg.clone()
    }

    /// The project manifest config (also a plugin manifest).
    pub fn project_manifest_config(&mut self) -> MainConfigResult {
        self.ensure_loaded().project.clone()
    }

    fn ensure_loaded(&mut self) -> &LoadedMainConfigs {
        let loaded = match self.loaded.take() {
            Some(loaded) => loaded,
            None => self.load_all(),
        };
        self.loaded.insert(loaded)
    }

    fn load_all(&mut self) -> LoadedMainConfigs {
        if self.use_factory_defaults_only {
            let factory = self.paths.factory_default();
            let primary = if factory.is_file() {
                self.load_result(&factory, MainConfigSource::FactoryDefault.reason())
            } else {
                self.empty_result(MainConfigSource::None.reason())
            };
            info!(reason = %primary.reason, "Using factory defaults only");
            return LoadedMainConfigs {
                primary,
                xdg: self.empty_result("factory defaults only"),
                project: self.empty_result("factory defaults only"),
            };
        }

        let xdg = match self.paths.xdg_main() {
            Some(path) if path.is_file() => {
                self.load_result(&path, MainConfigSource::XdgGlobal.reason())
            }
            _ => self.empty_result("not found"),
        };

        let project = match self.paths.project_manifest.clone() {
            Some(path) if path.is_file() => {
                self.load_result(&path, MainConfigSource::ProjectManifest.reason())
            }
            Some(path) => {
                debug!(path = %path.display(), "Project manifest not found");
                self.empty_result("not found")
            }
            None => self.empty_result("not provided"),
        };

        let primary = self.select_primary(&xdg, &project);
        debug!(
            path = ?primary.path,
            reason = %primary.reason,
            "Selected primary main config"
        );

        LoadedMainConfigs {
            primary,
            xdg,
            project,
        }
    }

    fn select_primary(
        &mut self,
        xdg: &MainConfigResult,
        project: &MainConfigResult,
    ) -> MainConfigResult {
        if let Some(explicit) = self.paths.explicit_config.clone() {
            // Chosen even when missing; the load logs and yields `{}`.
            let explicit = absolutize(&explicit);
            if project.path.as_deref() == Some(explicit.as_path()) {
                return relabel(project, MainConfigSource::Explicit);
            }
            return self.load_result(&explicit, MainConfigSource::Explicit.reason());
        }
        if project.path.is_some() {
            return project.clone();
        }
        if xdg.path.is_some() {
            return xdg.clone();
        }
        let bundled = self.paths.bundled_main();
        if bundled.is_file() {
            return self.load_result(&bundled, MainConfigSource::BundledMain.reason());
        }
        let factory = self.paths.factory_default();
        if factory.is_file() {
            return self.load_result(&factory, MainConfigSource::FactoryDefault.reason());
        }
        self.empty_result(MainConfigSource::None.reason())
    }

    fn load_result(&mut self, path: &Path, reason: &str) -> MainConfigResult {
        self.file_reads += 1;
        let path = absolutize(path);
        let base_dir = path.parent().map(Path::to_path_buf);
        let config = match load_yaml_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path.display(), reason, error = %format!("{:#}", e), "Failed to load main config; using empty config");
                Value::Object(Map::new())
            }
        };
        let mut result = MainConfigResult {
            config,
            path: Some(path),
            base_dir,
            reason: reason.to_string(),
        };
        self.inject_project_root(&mut result);
        result
    }

    fn empty_result(&self, reason: &str) -> MainConfigResult {
        let mut result = MainConfigResult::empty(reason);
        self.inject_project_root(&mut result);
        result
    }

    fn inject_project_root(&self, result: &mut MainConfigResult) {
        let root = self
            .paths
            .project_root
            .as_deref()
            .map(absolutize)
            .or_else(|| result.base_dir.clone())
            .unwrap_or_else(|| absolutize(Path::new(".")));
        if let Value::Object(map) = &mut result.config {
            map.insert(
                PROJECT_ROOT_KEY.to_string(),
                Value::String(root.to_string_lossy().to_string()),
            );
        }
    }
}

fn relabel(result: &MainConfigResult, source: MainConfigSource) -> MainConfigResult {
    MainConfigResult {
        reason: source.reason().to_string(),
        ..result.clone()
    }
}
