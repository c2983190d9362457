use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use vx_domain::config::{Config, ConfigSeverity};

/// Voxgate — a real-time voice-assistant conductor.
#[derive(Debug, Parser)]
#[command(name = "voxgate", version, about)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "voxgate.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the conductor server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the config file (missing file = defaults), then apply env
/// overrides.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        Config::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Print validation issues; returns `false` when any error is present.
pub fn validate(config: &Config, path: &Path) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{}: ok", path.display());
        return true;
    }
    let mut valid = true;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => println!("warning: {issue}"),
            ConfigSeverity::Error => {
                println!("error: {issue}");
                valid = false;
            }
        }
    }
    valid
}

pub fn show(config: &Config) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config).context("serializing config")?);
    Ok(())
}
