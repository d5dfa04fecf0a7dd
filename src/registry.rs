use crate::adapter::SiteAdapter;
use anyhow::{Context, Result};
use std::fs;

/// Sites this scraper knows how to handle; every registered adapter must be one of them
pub const KNOWN_SOURCES: [&str; 5] = ["Autochek", "CarSale", "Jiji", "Jumia", "Tonaton"];

const BUILTIN_ADAPTERS: &str = include_str!("sites.yaml");

/// Registry to manage all site adapters
pub struct AdapterRegistry {
    adapters: Vec<SiteAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// The adapters compiled into the binary
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry
            .load_yaml(BUILTIN_ADAPTERS)
            .context("built-in site adapters are invalid")?;
        Ok(registry)
    }

    /// Register every adapter in a YAML list, replacing same-named ones
    pub fn load_yaml(&mut self, yaml: &str) -> Result<usize> {
        let adapters: Vec<SiteAdapter> = serde_yaml::from_str(yaml)?;
        let count = adapters.len();
        for adapter in adapters {
            self.register(adapter)?;
        }
        Ok(count)
    }

    pub fn load_file(&mut self, path: &str) -> Result<usize> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("failed to read adapters file {}", path))?;
        self.load_yaml(&yaml)
            .with_context(|| format!("invalid adapters file {}", path))
    }

    pub fn register(&mut self, adapter: SiteAdapter) -> Result<()> {
        if !KNOWN_SOURCES.contains(&adapter.source_name.as_str()) {
            anyhow::bail!(
                "unknown source '{}' (expected one of {:?})",
                adapter.source_name,
                KNOWN_SOURCES
            );
        }
        adapter.validate()?;

        match self
            .adapters
            .iter_mut()
            .find(|a| a.source_name == adapter.source_name)
        {
            Some(existing) => {
                tracing::debug!("Replacing adapter for {}", adapter.source_name);
                *existing = adapter;
            }
            None => self.adapters.push(adapter),
        }
        Ok(())
    }

    /// Case-insensitive lookup by source name
    pub fn get(&self, name: &str) -> Option<&SiteAdapter> {
        self.adapters
            .iter()
            .find(|a| a.source_name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteAdapter> {
        self.adapters.iter()
    }

    pub fn list_sites(&self) -> Vec<String> {
        self.adapters
            .iter()
            .map(|a| a.source_name.clone())
            .collect()
    }

    /// Resolve names to adapters; an empty list selects every site
    pub fn select(&self, names: &[String]) -> Result<Vec<&SiteAdapter>> {
        if names.is_empty() {
            return Ok(self.adapters.iter().collect());
        }

        names
            .iter()
            .map(|name| {
                self.get(name).with_context(|| {
                    format!("unknown site '{}', available: {:?}", name, self.list_sites())
                })
            })
            .collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
