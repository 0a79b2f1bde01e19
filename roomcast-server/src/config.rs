//! Configuration loading
//!
//! Resolution priority: command-line argument > environment variable
//! (handled by clap) > TOML config file > compiled default.

use crate::error::{Error, Result};
use crate::lifecycle::RoutinePeriods;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// sqlx connection URL for the key/value store
    pub database_url: String,
    /// Base URL of the track metadata provider
    pub provider_base_url: String,
    /// Delay before an abandoned room is torn down
    pub destroy_delay_seconds: f64,
    /// Routine cadences
    pub base_info_period_seconds: f64,
    pub online_users_period_seconds: f64,
    pub creator_check_period_seconds: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5750,
            database_url: "sqlite://roomcast.db?mode=rwc".to_string(),
            provider_base_url: "http://127.0.0.1:5751".to_string(),
            destroy_delay_seconds: 300.0,
            base_info_period_seconds: 60.0,
            online_users_period_seconds: 20.0,
            creator_check_period_seconds: 60.0,
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn routine_periods(&self) -> RoutinePeriods {
        RoutinePeriods {
            base_info_seconds: self.base_info_period_seconds,
            online_users_seconds: self.online_users_period_seconds,
            creator_check_seconds: self.creator_check_period_seconds,
        }
    }
}
