//! docplug
//!
//! Inspects which plugin and which effective configuration a document
//! conversion would use.

use anyhow::{Context, Result};
use clap::Parser;
use docplug::cli::{Cli, Command, default_log_directive, expand_path_arg, parse_overrides};
use docplug::format::{OutputFormat, format_plugin_list, render};
use docplug::resolver::{ConfigResolver, ResolverOptions};
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Bundled definitions directory when `--app-root` is not given.
fn default_app_root() -> PathBuf {
    if let Ok(root) = std::env::var("DOCPLUG_APP_ROOT") {
        return PathBuf::from(root);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `RUST_LOG` when set, otherwise the level implied by `--verbose`.
fn log_filter(cli: &Cli) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_directive(cli.verbose)))
}

fn init_logging(cli: &Cli) -> Result<()> {
    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(log_filter(cli))
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(log_filter(cli))
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)
                .with_context(|| format!("cannot open log file {}", filename))?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(log_filter(cli))
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    let format = cli.output_format()?;

    let project_root = match &cli.project_root {
        Some(root) => expand_path_arg(root),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let options = ResolverOptions {
        app_root: cli
            .app_root
            .as_deref()
            .map(expand_path_arg)
            .unwrap_or_else(default_app_root),
        project_root: Some(project_root),
        project_manifest: cli.manifest.as_deref().map(expand_path_arg),
        explicit_config: cli.config.as_deref().map(expand_path_arg),
        xdg_dir: cli.xdg_dir.as_deref().map(expand_path_arg),
        home_dir: None,
        use_factory_defaults_only: cli.factory_defaults,
    };
    debug!(?options, "Resolver options");
    let mut resolver = ConfigResolver::new(options);

    let output = match &cli.command {
        Command::Resolve { plugin, overrides } => {
            let overrides = parse_overrides(overrides)?;
            let effective = resolver.get_effective_config(plugin, overrides.as_ref())?;
            render(effective.as_ref(), format)?
        }
        Command::Plugins => {
            let details = resolver.get_all_plugin_details();
            match format {
                OutputFormat::Text => format_plugin_list(&details),
                _ => render(&details, format)?,
            }
        }
        Command::MainConfig => render(resolver.primary_main_config(), format)?,
    };
    print!("{}", output);
    Ok(())
}
