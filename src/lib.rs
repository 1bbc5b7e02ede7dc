//! docplug: plugin and configuration resolution for a document converter.
//!
//! This module exports the core components for the CLI, tests and
//! integration into a host converter.

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod paths;
pub mod plugins;
pub mod resolver;

pub use error::{ErrorCode, ResolveError, ResolveResult};
pub use resolver::{ConfigResolver, EffectiveConfig, PluginTarget, ResolverOptions};
