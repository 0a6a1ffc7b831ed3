use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Database setting that selects the in-memory stores.
pub const MEMORY_DATABASE: &str = "memory";
const DEFAULT_CONFIG_FILE: &str = "todo-mine.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// SQLite URL, or `memory`.
    pub database_url: String,
    pub user_id: String,
    pub max_write_attempts: u32,
    /// Used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: persistence::default_sqlite_url().to_string(),
            user_id: mine_core::UserId::DEFAULT.to_string(),
            max_write_attempts: 5,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, or from `./todo-mine.yaml` when present, then apply
    /// environment overrides. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty document deserializes as null.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("TODO_MINE_DATABASE_URL") {
            info!(%url, "database url overridden from environment");
            self.database_url = url;
        }
        if let Some(user) = lookup("TODO_MINE_USER_ID") {
            self.user_id = user;
        }
    }

    pub fn uses_memory(&self) -> bool {
        self.database_url == MEMORY_DATABASE
    }
}
