// ABOUTME: Configuration management for SQL Explorer
// ABOUTME: Handles connection profiles and browsing preferences stored as JSON

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::paging::{RowOrdering, DEFAULT_PAGE_SIZE};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),
    #[error("Invalid preference: {0}")]
    InvalidPreference(String),
}

/// Connection profile for a database server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionProfile {
    #[serde(default = "default_driver")]
    pub driver: String,
    pub server: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(rename = "trustedConnection", default = "default_true")]
    pub trusted_connection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "trustCertificate", default = "default_true")]
    pub trust_certificate: bool,
}

fn default_driver() -> String {
    "ODBC Driver 17 for SQL Server".to_string()
}

fn default_database() -> String {
    "master".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            server: "localhost".to_string(),
            database: default_database(),
            trusted_connection: true,
            username: None,
            password: None,
            trust_certificate: true,
        }
    }
}

/// Browsing preferences
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    #[serde(rename = "pageSize", default = "default_page_size")]
    pub page_size: u32,
    #[serde(rename = "connectTimeoutSecs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(rename = "queryTimeoutSecs", default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(rename = "rowOrdering", default)]
    pub row_ordering: RowOrdering,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_query_timeout() -> u64 {
    30
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            connect_timeout_secs: default_connect_timeout(),
            query_timeout_secs: default_query_timeout(),
            row_ordering: RowOrdering::default(),
        }
    }
}

impl Preferences {
    /// Reject values that would make every session unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::InvalidPreference(
                "pageSize must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidPreference(
                "connectTimeoutSecs must be at least 1".to_string(),
            ));
        }
        if self.query_timeout_secs == 0 {
            return Err(ConfigError::InvalidPreference(
                "queryTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(rename = "activeProfile", default = "default_active_profile")]
    pub active_profile: String,
    #[serde(default)]
    pub profiles: HashMap<String, ConnectionProfile>,
    #[serde(default)]
    pub preferences: Preferences,
}

fn default_version() -> u32 {
    1
}

fn default_active_profile() -> String {
    "default".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), ConnectionProfile::default());

        Self {
            version: 1,
            active_profile: "default".to_string(),
            profiles,
            preferences: Preferences::default(),
        }
    }
}

impl AppConfig {
    /// Get the config file path based on OS
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoDirFound)?;
        Ok(config_dir.join("SQL Explorer").join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Load config from `path`, writing defaults there if it does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        config.preferences.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the active connection profile
    pub fn active_profile(&self) -> Result<&ConnectionProfile, ConfigError> {
        self.profiles
            .get(&self.active_profile)
            .ok_or_else(|| ConfigError::ProfileNotFound(self.active_profile.clone()))
    }

    /// Add or update a profile
    pub fn set_profile(&mut self, key: String, profile: ConnectionProfile) {
        self.profiles.insert(key, profile);
    }

    /// Make `key` the active profile
    pub fn activate(&mut self, key: &str) -> Result<(), ConfigError> {
        if !self.profiles.contains_key(key) {
            return Err(ConfigError::ProfileNotFound(key.to_string()));
        }
        self.active_profile = key.to_string();
        Ok(())
    }

    /// Remove a profile (cannot remove if it's the only one)
    pub fn remove_profile(&mut self, key: &str) -> Result<(), ConfigError> {
        if self.profiles.len() <= 1 {
            return Err(ConfigError::ProfileNotFound(
                "Cannot remove the last profile".to_string(),
            ));
        }
        if self.profiles.remove(key).is_none() {
            return Err(ConfigError::ProfileNotFound(key.to_string()));
        }

        // If we removed the active profile, switch to another one
        if self.active_profile == key {
            if let Some(first_key) = self.profiles.keys().min() {
                self.active_profile = first_key.clone();
            }
        }
        Ok(())
    }
}
