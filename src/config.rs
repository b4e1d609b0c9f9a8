//! Engine configuration
//!
//! Settings are read from a TOML file (`~/.ledgerline/config.toml` unless a
//! path is given). Every key is optional; absent keys fall back to the
//! defaults below.
//!
//! ```toml
//! [precision]
//! money_dp = 6
//! quantity_dp = 6
//!
//! [limits]
//! max_series_days = 36600
//!
//! [mwrr]
//! min_annual_rate = -0.99
//! max_annual_rate = 100.0
//! max_iterations = 200
//! tolerance = 1e-12
//!
//! [storage]
//! db_path = "/home/me/.ledgerline/data.db"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub precision: Precision,
    pub limits: Limits,
    pub mwrr: MwrrConfig,
    pub storage: Storage,
}

/// Decimal places kept for money and split-adjusted quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Precision {
    pub money_dp: u32,
    pub quantity_dp: u32,
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            money_dp: 6,
            quantity_dp: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Longest date range (in days, inclusive) a single query may request
    pub max_series_days: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_series_days: 36_600,
        }
    }
}

/// Search domain and stopping rule for the money-weighted return solver
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MwrrConfig {
    pub min_annual_rate: f64,
    pub max_annual_rate: f64,
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl Default for MwrrConfig {
    fn default() -> Self {
        Self {
            min_annual_rate: -0.99,
            max_annual_rate: 100.0,
            max_iterations: 200,
            tolerance: 1e-12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub db_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Parse a configuration document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse configuration")
    }

    /// Load configuration from `path`, or from the default location when
    /// `path` is `None`. A missing default file yields the defaults; a
    /// missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path()?, false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            debug!("No configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration at {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}

/// Directory holding the database and configuration (~/.ledgerline)
pub fn data_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".ledgerline"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("config.toml"))
}
