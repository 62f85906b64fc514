//! Config command - inspect and initialize configuration.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use tracing::debug;

use recibo_core::ReciboConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration (file + environment)
    Show,

    /// Write a configuration file with default values
    Init(InitArgs),

    /// Show the default configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ConfigArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(config_path),
        ConfigCommand::Init(init_args) => init_config(init_args),
        ConfigCommand::Path => {
            println!("{}", default_config_path().display());
            Ok(())
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recibo")
        .join("config.json")
}

/// Resolve configuration: explicit file, else the default file if present,
/// else defaults; `MLX_*` environment variables are applied on top.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<ReciboConfig> {
    let mut config = match config_path {
        Some(path) => ReciboConfig::from_file(Path::new(path))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                debug!("Using config file {}", path.display());
                ReciboConfig::from_file(&path)?
            } else {
                ReciboConfig::default()
            }
        }
    };

    config.apply_env()?;
    Ok(config)
}

fn show_config(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn init_config(args: InitArgs) -> anyhow::Result<()> {
    let path = args.output.unwrap_or_else(default_config_path);

    if path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    ReciboConfig::default().save(&path)?;
    println!("Configuration written to {}", path.display());
    Ok(())
}
