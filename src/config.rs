use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Provider endpoint used when the config file does not set one.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

/// CLI configuration, stored as TOML under the platform config dir
/// (e.g. `~/.config/juncture/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the provider API.
    pub api_base_url: Option<String>,

    /// Root of the shared store. Defaults to the platform data dir.
    pub store_dir: Option<PathBuf>,

    /// The registered local account, set by `juncture register`.
    pub user: Option<LocalUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config at {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // Write-then-rename so a crash never leaves a half-written config.
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, raw).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move config into place at {}", path.display()))?;
        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    /// Directory holding the shared store (profiles and mirrored calendars).
    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.store_dir {
            return Ok(dir.clone());
        }
        Ok(Self::data_dir()?.join("store"))
    }

    /// Directory holding the persisted provider grant.
    pub fn grant_dir(&self) -> Result<PathBuf> {
        Self::data_dir()
    }

    pub fn require_user(&self) -> Result<&LocalUser> {
        self.user.as_ref().context(
            "No local account. Register one first with:\n  juncture register <email>",
        )
    }

    fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Could not determine the config directory")?
            .join("juncture"))
    }

    fn data_dir() -> Result<PathBuf> {
        Ok(dirs::data_dir()
            .context("Could not determine the data directory")?
            .join("juncture"))
    }

    fn path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}
