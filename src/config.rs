use crate::http_client::DEFAULT_USER_AGENT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

pub const CONFIG_PATH: &str = "data/config.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_export_path")]
    pub export_path: String,
    /// Sites to scrape; empty means all of them
    #[serde(default)]
    pub sites: Vec<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Overrides every adapter's own delay when set
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    /// Extra adapters YAML, replacing built-in adapters of the same name
    #[serde(default)]
    pub adapters_file: Option<String>,
}

fn default_database_path() -> String {
    "data/cars.db".to_string()
}

fn default_export_path() -> String {
    "data/cars.csv".to_string()
}

fn default_max_pages() -> u32 {
    50
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: default_database_path(),
            export_path: default_export_path(),
            sites: vec![],
            max_pages: default_max_pages(),
            tracing_level: default_tracing_level(),
            user_agent: default_user_agent(),
            request_delay_ms: None,
            adapters_file: None,
        }
    }
}

impl Config {
    /// Load `data/config.yaml` if present, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match fs::read_to_string(CONFIG_PATH) {
            Ok(config_str) => Self::from_yaml(&config_str)
                .with_context(|| format!("Failed to parse {}", CONFIG_PATH))?,
            Err(_) => Config::default(),
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Override fields from `lookup` (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database_path = path;
        }

        if let Some(path) = lookup("EXPORT_PATH") {
            self.export_path = path;
        }

        if let Some(sites) = lookup("SITES") {
            // Parse comma-separated site names
            self.sites = sites.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(max_pages) = lookup("MAX_PAGES") {
            self.max_pages = max_pages.parse()
                .context("Failed to parse MAX_PAGES environment variable")?;
        }

        if let Some(tracing_level) = lookup("TRACING_LEVEL") {
            self.tracing_level = tracing_level;
        }

        if let Some(user_agent) = lookup("USER_AGENT") {
            self.user_agent = user_agent;
        }

        if let Some(request_delay) = lookup("REQUEST_DELAY_MS") {
            self.request_delay_ms = Some(request_delay.parse()
                .context("Failed to parse REQUEST_DELAY_MS environment variable")?);
        }

        if let Some(path) = lookup("ADAPTERS_FILE") {
            self.adapters_file = Some(path);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            anyhow::bail!("max_pages must be at least 1 (set via data/config.yaml or MAX_PAGES env var)");
        }

        if self.database_path.trim().is_empty() {
            anyhow::bail!("database_path is required (set via data/config.yaml or DATABASE_PATH env var)");
        }

        if self.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent must not be empty");
        }

        Ok(())
    }

    pub fn create_default() -> Result<()> {
        // Ensure data directory exists
        fs::create_dir_all("data")?;

        let config_str = serde_yaml::to_string(&Config::default())?;
        fs::write(CONFIG_PATH, config_str)?;
        Ok(())
    }
}
