use super::commands::{BrowseArgs, ConfigCommands, SeedArgs};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fleet-coordinator")]
#[command(about = "Browse and seed the fleet collections through the view coordinator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Populate the database with sample drivers, vehicles and routes
    Seed(SeedArgs),
    /// Activate a view and print its rows
    Browse(BrowseArgs),
    /// Inspect the configuration
    Config(ConfigCommands),
}
