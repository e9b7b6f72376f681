use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::*;

use fleet_coordinator::config::Config;

#[derive(Args)]
pub struct ConfigCommands {
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Show the effective configuration
    Show,
    /// Print where the configuration file lives
    Path,
}

pub async fn config_command(args: ConfigCommands, config: &Config) -> Result<()> {
    match args.command {
        ConfigSubcommands::Show => {
            let rendered = toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;
            println!("{}", "Effective configuration:".bright_white().bold());
            println!("{}", rendered);
            println!("{} {}", "database:".dimmed(), config.database_path()?.display());
        }
        ConfigSubcommands::Path => {
            println!("{}", Config::get_config_path()?.display());
        }
    }
    Ok(())
}
