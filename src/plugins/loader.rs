//! Plugin configuration layers.
//!
//! A plugin's configuration is its own `*.config.yaml` followed by optional
//! override layers, in order:
//!
//! 1. XDG override file `<xdg_dir>/<plugin>/<plugin>.config.yaml`
//! 2. Inline `<plugin>:` section of the XDG main config
//! 3. Project override file named by `plugin_overrides.<plugin>` in the
//!    project manifest
//! 4. Inline `<plugin>:` section of the project manifest
//!
//! Layers fold with [`merge_with_rules`] and [`PLUGIN_LAYER_RULES`]; CSS
//! paths resolve against the directory of the file that declared them.

use crate::config::assets::resolve_and_merge_css;
use crate::config::main_config::MainConfigResult;
use crate::config::merge::{PLUGIN_LAYER_RULES, merge_with_rules};
use crate::config::yaml::load_yaml_file;
use crate::paths::{CONFIG_SUFFIX, resolve_against};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Project manifest section mapping plugin names to override files.
pub const PLUGIN_OVERRIDES_KEY: &str = "plugin_overrides";

/// One configuration contribution, after CSS resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    pub raw_config: Value,
    pub resolved_css_paths: Vec<PathBuf>,
    pub inherit_css: bool,
    /// The plugin config file this layer chain started from.
    pub actual_path: Option<PathBuf>,
}

impl ConfigLayer {
    /// A layer that contributes nothing.
    pub fn neutral() -> Self {
        Self {
            raw_config: Value::Object(Map::new()),
            resolved_css_paths: Vec::new(),
            inherit_css: false,
            actual_path: None,
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }
}

impl Default for ConfigLayer {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Loads plugin configs and applies XDG/project overrides.
#[derive(Debug, Clone)]
pub struct PluginConfigLoader {
    xdg_dir: Option<PathBuf>,
    xdg_main: MainConfigResult,
    project_main: MainConfigResult,
    home: Option<PathBuf>,
}

impl PluginConfigLoader {
    pub fn new(
        xdg_dir: Option<PathBuf>,
        xdg_main: MainConfigResult,
        project_main: MainConfigResult,
        home: Option<PathBuf>,
    ) -> Self {
        Self {
            xdg_dir,
            xdg_main,
            project_main,
            home,
        }
    }

    /// Load one config file as a layer.
    ///
    /// Read or parse failures are logged and produce [`ConfigLayer::neutral`].
    pub fn load_single_config_layer(
        &self,
        config_path: &Path,
        assets_base_path: &Path,
        plugin_name: &str,
    ) -> ConfigLayer {
        let raw_config = match load_yaml_file(config_path) {
            Ok(raw) => raw,
            Err(e) => {
                error!(
                    plugin = %plugin_name,
                    path = %config_path.display(),
                    error = %format!("{:#}", e),
                    "Failed to load plugin config layer"
                );
                return ConfigLayer::neutral();
            }
        };

        let context = format!("{} ({})", plugin_name, config_path.display());
        let css = resolve_and_merge_css(
            &raw_config,
            assets_base_path,
            &[],
            self.home.as_deref(),
            &context,
        );

        ConfigLayer {
            raw_config,
            resolved_css_paths: css.paths,
            inherit_css: css.inherit_css,
            actual_path: Some(config_path.to_path_buf()),
        }
    }

    /// Fold the XDG then project override files into `base_layer`.
    ///
    /// Absent paths and missing files are skipped.
    pub fn apply_override_layers(
        &self,
        base_layer: ConfigLayer,
        plugin_name: &str,
        xdg_override_path: Option<&Path>,
        project_override_path: Option<&Path>,
    ) -> ConfigLayer {
        let mut layer = base_layer;
        for (tier, path) in [("xdg", xdg_override_path), ("project", project_override_path)] {
            let Some(path) = path else {
                continue;
            };
            if layer.actual_path.as_deref() == Some(path) {
                continue;
            }
            if !path.is_file() {
                debug!(plugin = %plugin_name, tier, path = %path.display(), "No override file");
                continue;
            }
            let overlay = match load_yaml_file(path) {
                Ok(overlay) => overlay,
                Err(e) => {
                    error!(
                        plugin = %plugin_name,
                        tier,
                        path = %path.display(),
                        error = %format!("{:#}", e),
                        "Failed to load override layer; ignoring it"
                    );
                    continue;
                }
            };
            let base_dir = path.parent().unwrap_or(Path::new("."));
            debug!(plugin = %plugin_name, tier, path = %path.display(), "Applying override file");
            layer = self.fold_layer(layer, overlay, base_dir, &path.display().to_string());
        }
        layer
    }

    /// Load a plugin's config and apply every override source.
    pub fn load_plugin_layers(&self, plugin_name: &str, config_path: &Path) -> ConfigLayer {
        let base_dir = config_path.parent().unwrap_or(Path::new("."));
        let layer = self.load_single_config_layer(config_path, base_dir, plugin_name);

        let xdg_file = self.xdg_override_path(plugin_name);
        let layer = self.apply_override_layers(layer, plugin_name, xdg_file.as_deref(), None);
        let layer = self.apply_inline_section(layer, &self.xdg_main, plugin_name);

        let project_file = self.project_override_path(plugin_name);
        let layer = self.apply_override_layers(layer, plugin_name, None, project_file.as_deref());
        self.apply_inline_section(layer, &self.project_main, plugin_name)
    }

    /// Conventional XDG override file for `plugin_name`.
    pub fn xdg_override_path(&self, plugin_name: &str) -> Option<PathBuf> {
        self.xdg_dir
            .as_ref()
            .map(|dir| dir.join(plugin_name).join(format!("{}{}", plugin_name, CONFIG_SUFFIX)))
    }

    /// Project override file declared in the project manifest.
    pub fn project_override_path(&self, plugin_name: &str) -> Option<PathBuf> {
        let raw = self
            .project_main
            .config
            .get(PLUGIN_OVERRIDES_KEY)?
            .get(plugin_name)?
            .as_str()?;
        let resolved = resolve_against(raw, self.project_main.base_dir.as_deref(), self.home.as_deref());
        if resolved.is_none() {
            warn!(plugin = %plugin_name, spec = %raw, "Cannot resolve project override path");
        }
        resolved
    }

    fn apply_inline_section(
        &self,
        layer: ConfigLayer,
        main: &MainConfigResult,
        plugin_name: &str,
    ) -> ConfigLayer {
        let Some(section) = main.config.get(plugin_name) else {
            return layer;
        };
        if !section.is_object() {
            warn!(
                plugin = %plugin_name,
                path = ?main.path,
                "Inline plugin override must be a mapping; ignoring"
            );
            return layer;
        }
        let base_dir = main
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let context = format!("{} inline in {}", plugin_name, main.reason);
        debug!(plugin = %plugin_name, source = %main.reason, "Applying inline override");
        self.fold_layer(layer, section.clone(), &base_dir, &context)
    }

    /// Merge one overlay into the accumulated layer.
    pub fn fold_layer(
        &self,
        acc: ConfigLayer,
        overlay: Value,
        base_dir: &Path,
        context: &str,
    ) -> ConfigLayer {
        let css = resolve_and_merge_css(
            &overlay,
            base_dir,
            &acc.resolved_css_paths,
            self.home.as_deref(),
            context,
        );
        let inherit_css = if overlay.get("css_files").is_some() || overlay.get("inherit_css").is_some() {
            css.inherit_css
        } else {
            acc.inherit_css
        };
        ConfigLayer {
            raw_config: merge_with_rules(acc.raw_config, overlay, PLUGIN_LAYER_RULES),
            resolved_css_paths: css.paths,
            inherit_css,
            actual_path: acc.actual_path,
        }
    }
}
