//! Command implementations.
//!
//! Commands that talk to the stores share the setup here: resolve and load
//! the config, open both bases, and build the run policy.

pub mod completions;
pub mod populate;
pub mod record;
pub mod run;
pub mod state;
pub mod version;

use std::path::{Path, PathBuf};

use crate::config::{
    load_config, load_from_store, require_store, resolve_config_path, resolve_state_path,
    validate, StoreSettings, SyncConfig,
};
use crate::error::{Error, Result};
use crate::store::AirtableStore;
use crate::sync::{RunStateTracker, SyncPolicy};

/// Global flags every command handler receives.
#[derive(Debug, Clone, Copy)]
pub struct GlobalArgs<'a> {
    pub config: Option<&'a Path>,
    pub state: Option<&'a Path>,
    pub json: bool,
    pub dry_run: bool,
    pub quiet: bool,
}

/// Create the async runtime a command runs on.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

/// Read the config file named by the global flags (or the default one).
pub(crate) fn read_config(globals: &GlobalArgs<'_>) -> Result<SyncConfig> {
    let path = resolve_config_path(globals.config).ok_or_else(|| {
        Error::Config("cannot determine home directory; pass --config".to_string())
    })?;
    load_config(&path)
}

pub(crate) fn open_store(api_url: &str, side: &str, settings: &StoreSettings) -> Result<AirtableStore> {
    require_store(side, settings)?;
    let key = settings.api_key.as_deref().unwrap_or_default();
    Ok(AirtableStore::with_endpoint(api_url, &settings.base_id, key))
}

/// A loaded config with both stores opened.
pub(crate) struct Connection {
    pub config: SyncConfig,
    pub source: AirtableStore,
    pub destination: AirtableStore,
}

/// Load config, fold in a remote config record if asked, validate, and open
/// both stores.
pub(crate) async fn connect(globals: &GlobalArgs<'_>, config_record: Option<&str>) -> Result<Connection> {
    let mut config = read_config(globals)?;
    let source = open_store(&config.api_url, "source", &config.source)?;

    if let Some(name) = config_record {
        let remote = load_from_store(&source, name).await?;
        tracing::info!(record = name, tables = remote.tables.len(), "Loaded remote config record");
        remote.merge_into(&mut config);
    }
    validate(&config, true)?;

    let destination = open_store(&config.api_url, "destination", &config.destination)?;
    Ok(Connection {
        config,
        source,
        destination,
    })
}

/// Engine policy from config defaults and global flags.
pub(crate) fn policy(config: &SyncConfig, globals: &GlobalArgs<'_>) -> SyncPolicy {
    SyncPolicy {
        dry_run: globals.dry_run,
        ..config.policy.to_policy()
    }
}

/// The run-state tracker for a config's base pair.
pub(crate) fn state_tracker(config: &SyncConfig, globals: &GlobalArgs<'_>) -> Result<RunStateTracker> {
    let path: PathBuf = resolve_state_path(globals.state, &config.source.base_id, &config.destination.base_id)
        .ok_or_else(|| Error::Config("cannot determine home directory; pass --state".to_string()))?;
    Ok(RunStateTracker::new(path))
}
