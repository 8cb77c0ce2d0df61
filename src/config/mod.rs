//! Configuration management.
//!
//! Configuration is a JSON file, by default `~/.tablesync/config.json`.
//! Secrets and the endpoint can come from the environment instead, which
//! takes precedence over the file:
//!
//! - `TABLESYNC_SOURCE_API_KEY`
//! - `TABLESYNC_DEST_API_KEY`
//! - `TABLESYNC_API_URL`
//!
//! Run state (the last-run boundary) lives under `~/.tablesync/state/`,
//! one file per source/destination pair.

pub mod remote;
mod settings;

pub use remote::{load_from_store, RemoteConfig, CONFIG_TABLE};
pub use settings::{PolicySettings, StoreSettings, SyncConfig, TableConfig};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::sync::state_file_name;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TABLESYNC_CONFIG";
pub const SOURCE_API_KEY_ENV: &str = "TABLESYNC_SOURCE_API_KEY";
pub const DEST_API_KEY_ENV: &str = "TABLESYNC_DEST_API_KEY";
pub const API_URL_ENV: &str = "TABLESYNC_API_URL";

/// The tablesync home directory, `~/.tablesync/`.
#[must_use]
pub fn tablesync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".tablesync"))
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `explicit_path` (`--config`, which clap also fills from `TABLESYNC_CONFIG`)
/// 2. `~/.tablesync/config.json`
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    tablesync_dir().map(|dir| dir.join("config.json"))
}

/// Resolve the run-state file for a source/destination pair.
#[must_use]
pub fn resolve_state_path(
    explicit_path: Option<&Path>,
    source_base: &str,
    destination_base: &str,
) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    tablesync_dir().map(|dir| {
        dir.join("state")
            .join(state_file_name(source_base, destination_base))
    })
}

/// Read a config file and apply environment overrides.
///
/// The result is not validated; call [`validate`] once any remote config
/// record has been merged in.
///
/// # Errors
///
/// Returns [`Error::NotConfigured`] if the file does not exist, or a JSON
/// error if it cannot be parsed.
pub fn load_config(path: &Path) -> Result<SyncConfig> {
    if !path.exists() {
        return Err(Error::NotConfigured {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    let mut config: SyncConfig = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    tracing::debug!(path = %path.display(), tables = config.tables.len(), "Loaded config");
    Ok(config)
}

/// Overlay environment values onto a config. Empty values are ignored.
pub fn apply_env_overrides(config: &mut SyncConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
    if let Some(key) = get(SOURCE_API_KEY_ENV) {
        config.source.api_key = Some(key);
    }
    if let Some(key) = get(DEST_API_KEY_ENV) {
        config.destination.api_key = Some(key);
    }
    if let Some(url) = get(API_URL_ENV) {
        config.api_url = url;
    }
}

/// Check that a config is complete enough to run.
///
/// `need_destination` is false for commands that only touch the source.
///
/// # Errors
///
/// Returns [`Error::Config`] naming the first problem found.
pub fn validate(config: &SyncConfig, need_destination: bool) -> Result<()> {
    require_store("source", &config.source)?;
    if need_destination {
        require_store("destination", &config.destination)?;
    }
    if config.source_id_field.trim().is_empty() {
        return Err(Error::Config("source_id_field must not be empty".into()));
    }
    if config.tables.is_empty() {
        return Err(Error::Config("no tables configured for sync".into()));
    }

    let mut seen = HashSet::new();
    for table in &config.tables {
        if table.name.trim().is_empty() {
            return Err(Error::Config("table with an empty name".into()));
        }
        if !seen.insert(table.name.as_str()) {
            return Err(Error::Config(format!("table `{}` is listed twice", table.name)));
        }
    }
    Ok(())
}

/// Check that one side names a base and has an API key.
///
/// # Errors
///
/// Returns [`Error::Config`] naming the missing setting and, for the key,
/// the environment variable that supplies it.
pub(crate) fn require_store(side: &str, settings: &StoreSettings) -> Result<()> {
    if settings.base_id.trim().is_empty() {
        return Err(Error::Config(format!("{side}.base_id is not set")));
    }
    if settings.api_key.as_deref().is_none_or(str::is_empty) {
        let env = if side == "source" {
            SOURCE_API_KEY_ENV
        } else {
            DEST_API_KEY_ENV
        };
        return Err(Error::Config(format!("{side} API key missing; set {env} or {side}.api_key")));
    }
    Ok(())
}
