pub mod browse;
pub mod config;
pub mod seed;

pub use browse::{BrowseArgs, browse_command};
pub use config::{ConfigCommands, config_command};
pub use seed::{SeedArgs, seed_command};
