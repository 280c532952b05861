use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::embedding::DEFAULT_DIMENSIONS;
use crate::index::{HnswConfig, DEFAULT_EF_CONSTRUCTION, DEFAULT_M};
use crate::memory::search::SearchConfig;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MemvaultConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub retrieval: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or `memvault=debug`.
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one `<project>.db` file per project.
    pub data_dir: String,
    pub default_project: String,
    /// Rewrite the index snapshot after this many mutations; 0 only on flush.
    pub snapshot_interval: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub dimensions: usize,
    pub m: usize,
    pub ef_construction: usize,
    /// Fixes level assignment so rebuilt graphs are reproducible.
    pub seed: Option<u64>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_memvault_dir().to_string_lossy().into_owned(),
            default_project: "default".into(),
            snapshot_interval: 32,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            seed: None,
        }
    }
}

impl IndexConfig {
    pub fn hnsw(&self) -> HnswConfig {
        let config = HnswConfig::new(self.dimensions)
            .with_m(self.m)
            .with_ef_construction(self.ef_construction);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}

/// Returns `~/.memvault/`
pub fn default_memvault_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memvault")
}

/// Returns the default config file path: `~/.memvault/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memvault_dir().join("config.toml")
}

impl MemvaultConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemvaultConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (MEMVAULT_DATA_DIR, MEMVAULT_PROJECT, MEMVAULT_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMVAULT_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("MEMVAULT_PROJECT") {
            self.storage.default_project = val;
        }
        if let Ok(val) = std::env::var("MEMVAULT_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Resolve the data directory, expanding `~` if needed.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// Persistence file for `project`, or the default project when `None`.
    pub fn store_path(&self, project: Option<&str>) -> Result<PathBuf> {
        let project = project.unwrap_or(&self.storage.default_project);
        anyhow::ensure!(
            !project.is_empty()
                && !project.starts_with('.')
                && project
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')),
            "invalid project name {project:?}: use letters, digits, '-', '_' or '.'"
        );
        Ok(self.resolved_data_dir().join(format!("{project}.db")))
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
