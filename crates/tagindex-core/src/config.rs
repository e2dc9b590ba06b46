//! Runtime configuration for the snippet index.
//!
//! Defaults can be overridden from a JSON file and then from
//! `TAGINDEX_*` environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{IndexError, IndexResult};

pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1_000_000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub db_path: PathBuf,
    /// Entries per transaction (and per completion callback).
    pub batch_size: usize,
    /// Extraction threads; 0 lets rayon decide.
    pub extract_workers: usize,
    pub max_file_bytes: u64,
    pub busy_timeout_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: expand_tilde("~/.tagindex/index.sqlite"),
            batch_size: DEFAULT_BATCH_SIZE,
            extract_workers: 0,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl IndexConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> IndexResult<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a JSON config file, then apply environment overrides.
    pub fn load(path: &Path) -> IndexResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: IndexConfig = serde_json::from_str(&content)?;
        config.db_path = expand_tilde(&config.db_path.to_string_lossy());
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> IndexResult<()> {
        if let Some(path) = non_empty(lookup("TAGINDEX_DB_PATH")) {
            self.db_path = expand_tilde(&path);
        }
        if let Some(raw) = non_empty(lookup("TAGINDEX_BATCH_SIZE")) {
            self.batch_size = parse_var("TAGINDEX_BATCH_SIZE", &raw)?;
        }
        if let Some(raw) = non_empty(lookup("TAGINDEX_WORKERS")) {
            self.extract_workers = parse_var("TAGINDEX_WORKERS", &raw)?;
        }
        if let Some(raw) = non_empty(lookup("TAGINDEX_MAX_FILE_BYTES")) {
            self.max_file_bytes = parse_var("TAGINDEX_MAX_FILE_BYTES", &raw)?;
        }
        if let Some(raw) = non_empty(lookup("TAGINDEX_BUSY_TIMEOUT_MS")) {
            self.busy_timeout_ms = parse_var("TAGINDEX_BUSY_TIMEOUT_MS", &raw)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> IndexResult<()> {
        if self.batch_size == 0 {
            return Err(IndexError::Config("batch_size must be at least 1".into()));
        }
        if self.max_file_bytes == 0 {
            return Err(IndexError::Config("max_file_bytes must be at least 1".into()));
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> IndexResult<T> {
    raw.parse::<T>()
        .map_err(|_| IndexError::Config(format!("{key}: invalid value {raw:?}")))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}
