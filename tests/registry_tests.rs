//! Registry construction across bundled, CM, XDG and project sources.

use docplug::plugins::collections::{
    AvailablePlugin, CollectionsManager, DirectoryCollections, EnabledCollection,
};
use docplug::plugins::registry::{PluginRegistryBuilder, RegistrationSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn write(path: &Path, content: &str) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
    path.to_path_buf()
}

fn write_plugin(dir: &Path, name: &str) -> PathBuf {
    write(
        &dir.join(format!("{}.config.yaml", name)),
        &format!("description: {} from {}\n", name, dir.display()),
    )
}

/// Collections manager with fixed answers that counts every call.
struct CountingCollections {
    root: PathBuf,
    available: Vec<AvailablePlugin>,
    enabled: Vec<EnabledCollection>,
    calls: AtomicUsize,
}

impl CountingCollections {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            available: Vec::new(),
            enabled: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CollectionsManager for CountingCollections {
    fn coll_root(&self) -> &Path {
        self.calls.fetch_add(1, Ordering::SeqCst);
        &self.root
    }

    fn list_available_plugins(&self, _collection_filter: Option<&str>) -> Vec<AvailablePlugin> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.available.clone()
    }

    fn list_enabled_collections(&self, _collection_filter: Option<&str>) -> Vec<EnabledCollection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.enabled.clone()
    }

    fn enabled_manifest_path(&self) -> PathBuf {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.root.join("enabled.yaml")
    }
}

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    bundled: PathBuf,
    coll_root: PathBuf,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    let bundled = root.join("app").join("plugins");
    let coll_root = root.join("collections");
    std::fs::create_dir_all(&bundled).unwrap();
    std::fs::create_dir_all(&coll_root).unwrap();
    Fixture {
        _temp: temp,
        root,
        bundled,
        coll_root,
    }
}

#[test]
fn test_cm_enabled_overrides_bundled() {
    let fx = fixture();
    write_plugin(&fx.bundled.join("bundled-plugin"), "bundled-plugin");
    write_plugin(&fx.bundled.join("override-me"), "override-me");
    let cm_plugin = write_plugin(&fx.coll_root.join("coll1").join("cm-plugin"), "cm-plugin");
    let cm_override = write_plugin(&fx.coll_root.join("coll2").join("override-me"), "override-me");
    write(
        &fx.coll_root.join("enabled.yaml"),
        &format!(
            r#"
enabled_plugins:
  - invoke_name: cm-plugin
    collection_name: coll1
    plugin_id: cm-plugin
    config_path: {}
  - invoke_name: override-me
    collection_name: coll2
    plugin_id: override-me
    config_path: {}
"#,
            cm_plugin.display(),
            cm_override.display()
        ),
    );

    let registry = PluginRegistryBuilder::new(&fx.bundled, None, false)
        .with_collections(Arc::new(DirectoryCollections::new(&fx.coll_root)))
        .build_registry();

    assert_eq!(registry.len(), 3);
    assert_eq!(registry["bundled-plugin"].source, RegistrationSource::BundledDefinitions);
    assert_eq!(registry["cm-plugin"].source, RegistrationSource::CmEnabled);
    assert_eq!(registry["override-me"].source, RegistrationSource::CmEnabled);
    assert_eq!(registry["override-me"].config_path, cm_override);
    assert_eq!(registry["override-me"].cm_collection.as_deref(), Some("coll2"));
    assert_eq!(registry["override-me"].cm_plugin_id.as_deref(), Some("override-me"));
}

#[test]
fn test_full_precedence_chain() {
    let fx = fixture();
    write_plugin(&fx.bundled.join("shared"), "shared");
    let cm_config = write_plugin(&fx.coll_root.join("c").join("shared"), "shared");
    write(
        &fx.coll_root.join("enabled.yaml"),
        &format!(
            "enabled_plugins:\n  - invoke_name: shared\n    collection_name: c\n    plugin_id: shared\n    config_path: {}\n",
            cm_config.display()
        ),
    );
    let xdg_dir = fx.root.join("xdg");
    let xdg_config = write_plugin(&xdg_dir.join("my-plugins").join("shared"), "shared");
    let xdg_main = write(&xdg_dir.join("config.yaml"), "plugins:\n  shared: my-plugins/shared\n");
    let project = fx.root.join("project");
    let project_config = write_plugin(&project.join("local"), "shared");
    let manifest = write(
        &project.join("docplug.yaml"),
        "plugins:\n  shared: ./local/shared.config.yaml\n",
    );

    let builder = PluginRegistryBuilder::new(&fx.bundled, None, false)
        .with_collections(Arc::new(DirectoryCollections::new(&fx.coll_root)));

    let cm_only = builder.build_registry();
    assert_eq!(cm_only["shared"].config_path, cm_config);

    let with_xdg = builder
        .clone()
        .with_manifest(&xdg_main, RegistrationSource::XdgGlobal)
        .build_registry();
    assert_eq!(with_xdg["shared"].source, RegistrationSource::XdgGlobal);
    assert_eq!(with_xdg["shared"].config_path, xdg_config);
    assert_eq!(with_xdg["shared"].defined_in.as_deref(), Some(xdg_main.as_path()));

    let full = builder
        .with_manifest(&xdg_main, RegistrationSource::XdgGlobal)
        .with_manifest(&manifest, RegistrationSource::ProjectManifest)
        .build_registry();
    assert_eq!(full["shared"].source, RegistrationSource::ProjectManifest);
    assert_eq!(full["shared"].config_path, project_config);
}

#[test]
fn test_malformed_cm_entries_are_skipped() {
    let fx = fixture();
    let good = write_plugin(&fx.coll_root.join("c").join("good"), "good");
    write(
        &fx.coll_root.join("enabled.yaml"),
        &format!(
            r#"
enabled_plugins:
  - null
  - just a string
  - collection_name: c
    plugin_id: nameless
    config_path: {good}
  - invoke_name: pathless
    collection_name: c
    plugin_id: pathless
  - invoke_name: "  "
    config_path: {good}
  - invoke_name: vanished
    config_path: c/vanished/vanished.config.yaml
  - invoke_name: good
    collection_name: c
    plugin_id: good
    config_path: {good}
"#,
            good = good.display()
        ),
    );

    let registry = PluginRegistryBuilder::new(&fx.bundled, None, false)
        .with_collections(Arc::new(DirectoryCollections::new(&fx.coll_root)))
        .build_registry();

    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["good"]);
}

#[test]
fn test_cm_relative_config_path_resolves_against_coll_root() {
    let fx = fixture();
    let config = write_plugin(&fx.coll_root.join("c").join("rel"), "rel");
    write(
        &fx.coll_root.join("enabled.yaml"),
        "enabled_plugins:\n  - invoke_name: rel\n    config_path: c/rel/rel.config.yaml\n",
    );

    let registry = PluginRegistryBuilder::new(&fx.bundled, None, false)
        .with_collections(Arc::new(DirectoryCollections::new(&fx.coll_root)))
        .build_registry();
    assert_eq!(registry["rel"].config_path, config);
    assert_eq!(registry["rel"].cm_collection, None);
}

#[test]
fn test_factory_defaults_only_skips_cm_and_manifests() {
    let fx = fixture();
    write_plugin(&fx.bundled.join("default"), "default");
    let manifest_plugin = write_plugin(&fx.root.join("project").join("extra"), "extra");
    let manifest = write(
        &fx.root.join("project").join("docplug.yaml"),
        &format!("plugins:\n  extra: {}\n", manifest_plugin.display()),
    );
    let cm = Arc::new(CountingCollections::new(&fx.coll_root));

    let builder = PluginRegistryBuilder::new(&fx.bundled, None, true)
        .with_collections(cm.clone())
        .with_manifest(&manifest, RegistrationSource::ProjectManifest);

    let registry = builder.build_registry();
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["default"]);

    let details = builder.get_all_plugin_details();
    assert_eq!(details.len(), 1);
    assert_eq!(cm.calls(), 0);
}

#[test]
fn test_manifest_alias_forms() {
    let fx = fixture();
    let home = fx.root.join("home");
    let shared_dir = fx.root.join("shared-plugins");
    let via_alias = write_plugin(&shared_dir.join("letters"), "letters");
    let via_home = write_plugin(&home.join("docs").join("notes"), "notes");
    let via_dir = write_plugin(&fx.root.join("project").join("poster"), "poster");
    let manifest = write(
        &fx.root.join("project").join("docplug.yaml"),
        &format!(
            r#"
plugin_directory_aliases:
  shared: {}
  mine: ~/docs
plugins:
  letters: shared:letters/letters.config.yaml
  notes: mine:notes
  poster: poster/
  ghost: nowhere:ghost/ghost.config.yaml
  missing: ./missing.config.yaml
"#,
            shared_dir.display()
        ),
    );

    let registry = PluginRegistryBuilder::new(&fx.bundled, Some(home), false)
        .with_manifest(&manifest, RegistrationSource::ProjectManifest)
        .build_registry();

    assert_eq!(registry["letters"].config_path, via_alias);
    assert_eq!(registry["notes"].config_path, via_home);
    assert_eq!(registry["poster"].config_path, via_dir);
    assert!(!registry.contains_key("ghost"));
    assert!(!registry.contains_key("missing"));
}

#[test]
fn test_aliases_are_scoped_to_their_manifest() {
    let fx = fixture();
    let shared_dir = fx.root.join("shared");
    write_plugin(&shared_dir.join("letters"), "letters");
    let xdg_main = write(
        &fx.root.join("xdg").join("config.yaml"),
        &format!("plugin_directory_aliases:\n  shared: {}\n", shared_dir.display()),
    );
    let manifest = write(
        &fx.root.join("project").join("docplug.yaml"),
        "plugins:\n  letters: shared:letters\n",
    );

    let registry = PluginRegistryBuilder::new(&fx.bundled, None, false)
        .with_manifest(&xdg_main, RegistrationSource::XdgGlobal)
        .with_manifest(&manifest, RegistrationSource::ProjectManifest)
        .build_registry();
    assert!(registry.is_empty());
}

#[test]
fn test_unreadable_manifest_is_skipped() {
    let fx = fixture();
    write_plugin(&fx.bundled.join("default"), "default");
    let manifest = write(&fx.root.join("docplug.yaml"), "plugins: [unclosed\n");

    let registry = PluginRegistryBuilder::new(&fx.bundled, None, false)
        .with_manifest(&manifest, RegistrationSource::ProjectManifest)
        .build_registry();
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_plugin_details_statuses_and_order() {
    let fx = fixture();
    write_plugin(&fx.bundled.join("default"), "default");
    let recipe = write_plugin(&fx.coll_root.join("cookbook").join("recipe"), "recipe");
    write_plugin(&fx.coll_root.join("cookbook").join("menu"), "menu");
    write(
        &fx.coll_root.join("enabled.yaml"),
        &format!(
            r#"
enabled_plugins:
  - invoke_name: recipe
    collection_name: cookbook
    plugin_id: recipe
    config_path: {recipe}
  - invoke_name: fancy-recipe
    collection_name: cookbook
    plugin_id: recipe
    config_path: {recipe}
"#,
            recipe = recipe.display()
        ),
    );
    let project_plugin = write_plugin(&fx.root.join("project").join("poster"), "poster");
    let manifest = write(
        &fx.root.join("project").join("docplug.yaml"),
        &format!("plugins:\n  poster: {}\n", project_plugin.display()),
    );

    let details = PluginRegistryBuilder::new(&fx.bundled, None, false)
        .with_collections(Arc::new(DirectoryCollections::new(&fx.coll_root)))
        .with_manifest(&manifest, RegistrationSource::ProjectManifest)
        .get_all_plugin_details();

    let rows: Vec<(&str, &str)> = details
        .iter()
        .map(|d| (d.name.as_str(), d.status.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("cookbook/menu", "Available (CM)"),
            ("default", "Registered (Bundled (Definitions))"),
            ("fancy-recipe", "Enabled (CM)"),
            ("poster", "Registered (Project Manifest)"),
            ("recipe", "Enabled (CM)"),
        ]
    );

    let fancy = details.iter().find(|d| d.name == "fancy-recipe").unwrap();
    assert_eq!(fancy.provenance, "CM: cookbook/recipe");
    assert_eq!(fancy.config_path.as_deref(), Some(recipe.as_path()));
    assert!(fancy.description.as_deref().unwrap().starts_with("recipe from"));

    let poster = details.iter().find(|d| d.name == "poster").unwrap();
    assert_eq!(poster.provenance, manifest.display().to_string());
}

#[test]
fn test_plugin_details_uses_injected_manager() {
    let fx = fixture();
    let mut cm = CountingCollections::new(&fx.coll_root);
    cm.available.push(AvailablePlugin {
        collection: "remote".to_string(),
        plugin_id: "slides".to_string(),
        config_path: fx.coll_root.join("remote/slides/slides.config.yaml"),
        description: Some("Slide decks".to_string()),
    });
    cm.enabled.push(EnabledCollection {
        collection_name: "remote".to_string(),
        plugin_id: "slides".to_string(),
        invoke_name: "deck".to_string(),
    });
    let cm = Arc::new(cm);

    let details = PluginRegistryBuilder::new(&fx.bundled, None, false)
        .with_collections(cm.clone())
        .get_all_plugin_details();

    assert_eq!(details.len(), 1);
    assert_eq!(details[0].name, "deck");
    assert_eq!(details[0].status, "Enabled (CM)");
    assert_eq!(details[0].description.as_deref(), Some("Slide decks"));
    assert!(cm.calls() > 0);
}
