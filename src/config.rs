use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::resilience::{ResilienceConfig, RetryConfig};
use crate::collection::CreatePlacement;

const APP_DIR: &str = "fleet-coordinator";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// SQLite database file; `FLEET_DATABASE` overrides it
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub paging: PagingSettings,
    #[serde(default)]
    pub navigation: NavigationSettings,
    #[serde(default)]
    pub collections: CollectionSettings,
    #[serde(default)]
    pub resilience: ResilienceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PagingSettings {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Rows from the end of the loaded list at which more are requested
    #[serde(default = "default_prefetch_threshold")]
    pub prefetch_threshold: usize,
}

fn default_page_size() -> usize {
    50
}

fn default_prefetch_threshold() -> usize {
    10
}

impl Default for PagingSettings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            prefetch_threshold: default_prefetch_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigationSettings {
    #[serde(default = "default_true")]
    pub refresh_on_reactivate: bool,
    #[serde(default = "default_initial_view")]
    pub initial_view: String,
}

fn default_true() -> bool {
    true
}

fn default_initial_view() -> String {
    "routes".to_string()
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            refresh_on_reactivate: true,
            initial_view: default_initial_view(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CollectionSettings {
    #[serde(default)]
    pub create_placement: CreatePlacement,
    #[serde(default)]
    pub reconcile_after_mutation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResilienceSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// 0 disables the per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_request_timeout_ms() -> u64 {
    15000
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Config {
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
            info!("Created config directory: {:?}", config_dir);
        }

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from: {:?}", path);

        if !path.exists() {
            info!("Config file doesn't exist, using defaults");
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;

        debug!(
            "Loaded config: page size {}, initial view '{}'",
            config.paging.default_page_size, config.navigation.initial_view
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        debug!("Saving config to: {:?}", path);

        let config_content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(path, config_content).with_context(|| format!("Failed to write config file: {:?}", path))?;

        info!("Config saved successfully");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.paging.default_page_size == 0 {
            anyhow::bail!("paging.default_page_size must be at least 1");
        }
        if self.resilience.max_attempts == 0 {
            anyhow::bail!("resilience.max_attempts must be at least 1");
        }
        if self.resilience.backoff_multiplier < 1.0 {
            anyhow::bail!("resilience.backoff_multiplier must be at least 1.0");
        }
        if self.navigation.initial_view.trim().is_empty() {
            anyhow::bail!("navigation.initial_view cannot be empty");
        }
        Ok(())
    }

    pub fn resilience(&self) -> ResilienceConfig {
        let settings = &self.resilience;
        ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_attempts: settings.max_attempts,
                base_delay: Duration::from_millis(settings.base_delay_ms),
                max_delay: Duration::from_millis(settings.max_delay_ms),
                backoff_multiplier: settings.backoff_multiplier,
                jitter: settings.jitter,
            })
            .request_timeout(match settings.request_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            })
            .build()
    }

    /// Effective database path: `FLEET_DATABASE`, then the config file, then the data dir
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Ok(path) = std::env::var("FLEET_DATABASE") {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().context("Failed to get data directory")?;
        Ok(data_dir.join(APP_DIR).join("fleet.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.paging.default_page_size, 50);
        assert_eq!(config.paging.prefetch_threshold, 10);
        assert!(config.navigation.refresh_on_reactivate);
        assert_eq!(config.collections.create_placement, CreatePlacement::Append);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [paging]
            default_page_size = 20

            [collections]
            create_placement = "reload"

            [resilience]
            request_timeout_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.paging.default_page_size, 20);
        assert_eq!(config.paging.prefetch_threshold, 10);
        assert_eq!(config.collections.create_placement, CreatePlacement::Reload);
        assert_eq!(config.resilience().request_timeout, None);
        assert_eq!(config.resilience().retry.max_attempts, 3);
    }

    #[test]
    fn test_validation_rejects_zero_page_size() {
        let mut config = Config::default();
        config.paging.default_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let path = std::env::temp_dir().join("fleet-coordinator-missing-config.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("fleet-coordinator-{}.toml", uuid::Uuid::new_v4()));
        let mut config = Config::default();
        config.navigation.initial_view = "drivers".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.navigation.initial_view, "drivers");
        let _ = fs::remove_file(&path);
    }
}
