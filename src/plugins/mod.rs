//! Plugin discovery, registration and per-plugin configuration layers.

pub mod collections;
pub mod loader;
pub mod registry;

pub use collections::{AvailablePlugin, CollectionsManager, DirectoryCollections, EnabledCollection};
pub use loader::{ConfigLayer, PluginConfigLoader};
pub use registry::{
    AliasMap, PluginDetails, PluginRegistration, PluginRegistry, PluginRegistryBuilder,
    RegistrationSource,
};
