// Configuration management for the swpush CLI
//
// The client config is stored as the same camelCase JSON the page receives:
// - macOS: ~/Library/Application Support/swpush/config.json
// - Linux: ~/.config/swpush/config.json
// - Windows: %APPDATA%\swpush\config.json

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use swpush_core::ClientConfig;

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// The per-user config file, creating its directory if needed.
    pub fn default_location() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("swpush");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(Self::at(config_dir.join("config.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the config, or the defaults when no file exists yet.
    pub fn load(&self) -> Result<ClientConfig> {
        if !self.exists() {
            return Ok(ClientConfig::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config file {}", self.path.display()))?;
        ClientConfig::from_json(&contents).context("Failed to parse config file")
    }

    pub fn save(&self, config: &ClientConfig) -> Result<()> {
        let contents = config
            .to_json_pretty()
            .context("Failed to serialize config")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write config file {}", self.path.display()))?;
        Ok(())
    }

    /// Write a fresh default config. Refuses to replace an existing file
    /// unless `force` is set.
    pub fn init(&self, vapid_key: Option<String>, force: bool) -> Result<ClientConfig> {
        if self.exists() && !force {
            anyhow::bail!(
                "Config already exists at {} (use --force to overwrite)",
                self.path.display()
            );
        }
        let config = match vapid_key {
            Some(key) => {
                let config = ClientConfig::with_vapid_key(key);
                config
                    .application_server_key()
                    .context("Invalid VAPID public key")?;
                config
            }
            None => ClientConfig::default(),
        };
        self.save(&config)?;
        Ok(config)
    }

    /// Set one key and persist.
    pub fn set(&self, key: &str, value: &str) -> Result<ClientConfig> {
        let mut config = self.load()?;
        config
            .set(key, value)
            .with_context(|| format!("Failed to set {}", key))?;
        self.save(&config)?;
        Ok(config)
    }
}

/// Every key with its current value, in display order.
pub fn list(config: &ClientConfig) -> Vec<(&'static str, String)> {
    ClientConfig::keys()
        .iter()
        .map(|key| {
            let value = config.get(key).unwrap_or_default();
            let shown = if value.is_empty() {
                "(unset)".to_string()
            } else {
                value
            };
            (*key, shown)
        })
        .collect()
}
