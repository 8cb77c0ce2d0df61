//! Run boundary and its persistence.
//!
//! The boundary is the instant the last successful run *started*, truncated
//! to whole seconds. It is stored as `{"lastRunDate": "2024-05-01T12:00:00Z"}`
//! and rendered into the store-side filter predicate for incremental runs.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Text format of a boundary: RFC 3339, whole seconds, `Z` suffix.
const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A UTC instant truncated to whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Boundary(DateTime<Utc>);

impl Boundary {
    /// The current instant.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Truncate an arbitrary instant to a boundary.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.trunc_subsecs(0))
    }

    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Render as `YYYY-MM-DDTHH:MM:SSZ`.
    #[must_use]
    pub fn encode(&self) -> String {
        self.0.format(FORMAT).to_string()
    }

    /// Parse text produced by [`Boundary::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not a whole-second UTC timestamp.
    pub fn decode(text: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(text.trim(), FORMAT)
            .map(|naive| Self(naive.and_utc()))
            .map_err(|e| Error::Config(format!("invalid lastRunDate `{text}`: {e}")))
    }

    /// Store-side predicate selecting records modified at or after this boundary.
    ///
    /// Edits made during the boundary second itself may postdate the read of
    /// their table, so that second is included in the next run.
    #[must_use]
    pub fn filter_formula(&self) -> String {
        format!(
            "DATETIME_DIFF(LAST_MODIFIED_TIME(), DATETIME_PARSE('{}'), 'seconds') >= 0",
            self.encode()
        )
    }
}

impl std::fmt::Display for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(rename = "lastRunDate")]
    last_run_date: String,
}

/// Persists the boundary of the last successful run.
#[derive(Debug, Clone)]
pub struct RunStateTracker {
    path: PathBuf,
}

impl RunStateTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored boundary. `Ok(None)` when no run has completed yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<Boundary>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let state: StateFile = serde_json::from_str(&content)?;
        Boundary::decode(&state.last_run_date).map(Some)
    }

    /// Persist a boundary atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory or file cannot be written.
    pub fn save(&self, boundary: Boundary) -> Result<()> {
        let state = StateFile {
            last_run_date: boundary.encode(),
        };
        atomic_write(&self.path, &serde_json::to_string_pretty(&state)?)?;
        tracing::debug!(path = %self.path.display(), boundary = %boundary, "Saved run boundary");
        Ok(())
    }

    /// Forget the stored boundary so the next run is a full sync.
    ///
    /// Returns whether a state file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn reset(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write a file atomically: temp file, fsync, rename.
fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// State file name for a source/destination pair.
///
/// Distinct base pairs never share a boundary.
#[must_use]
pub fn state_file_name(source_base: &str, destination_base: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_base.as_bytes());
    hasher.update(b"\0");
    hasher.update(destination_base.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}.json", &digest[..16])
}
