use anyhow::Result;
use clap::Parser;
use log::info;

mod cli;

use cli::{Cli, Commands};
use cli::commands::{browse_command, config_command, seed_command};
use fleet_coordinator::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG and FLEET_* may live in a .env file
    dotenvy::dotenv().ok();

    // Initialize logger to file (truncate on each run)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("fleet-coordinator.log")?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    info!("Starting fleet-coordinator");

    match cli.command {
        Commands::Seed(args) => seed_command(args, &config).await,
        Commands::Browse(args) => browse_command(args, &config).await,
        Commands::Config(args) => config_command(args, &config).await,
    }
}
