use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::error::{CleanerError, Result};

const DEFAULT_CONFIG_PATH: &str = "cleaner.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reference: ReferenceConfig,
    pub fuzzy: FuzzyConfig,
    pub feed: FeedConfig,
    pub store: StoreConfig,
}

/// Locations of the two reference tables
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub location_codes: Option<PathBuf>,
    pub area_pairings: Option<PathBuf>,
}

/// Which vocabulary the micro-community matcher searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuzzyMode {
    /// Every record is matched against the full vocabulary
    Global,
    /// Records with a valid precinct are matched against that precinct's areas,
    /// the rest fall back to the full vocabulary
    Precinct,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    pub mode: FuzzyMode,
    pub base_threshold: u8,
    pub narrowed_threshold: u8,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            mode: FuzzyMode::Global,
            base_threshold: constants::DEFAULT_FUZZY_THRESHOLD,
            narrowed_threshold: constants::DEFAULT_NARROWED_FUZZY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub domain: String,
    pub dataset_id: String,
    pub app_token: Option<String>,
    pub max_retries: u32,
    pub timeout_seconds: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            domain: constants::FEED_DOMAIN.to_string(),
            dataset_id: constants::FEED_DATASET_ID.to_string(),
            app_token: None,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            timeout_seconds: 120,
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub retention_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/spd_crime.db"),
            retention_days: constants::DEFAULT_RETENTION_DAYS,
        }
    }
}

impl Config {
    /// Load `cleaner.toml` if present, then apply environment overrides
    /// (including anything in `.env`).
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();
        let path = Path::new(DEFAULT_CONFIG_PATH);
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CleanerError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Environment variables win over file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LOC_CODES") {
            self.reference.location_codes = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("MCPP") {
            self.reference.area_pairings = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SPD_DATASET_ID") {
            self.feed.dataset_id = v;
        }
        if let Some(v) = lookup("SPD_APP_TOKEN") {
            self.feed.app_token = Some(v);
        }
        if let Some(v) = lookup("SPD_DB_PATH") {
            self.store.db_path = PathBuf::from(v);
        }
    }

    /// Both reference table paths, or a configuration error naming the missing one
    pub fn reference_paths(&self) -> Result<(&Path, &Path)> {
        let loc = self.reference.location_codes.as_deref().ok_or_else(|| {
            CleanerError::Config("location code table not configured (set LOC_CODES)".to_string())
        })?;
        let area = self.reference.area_pairings.as_deref().ok_or_else(|| {
            CleanerError::Config("area pairing table not configured (set MCPP)".to_string())
        })?;
        Ok((loc, area))
    }
}
