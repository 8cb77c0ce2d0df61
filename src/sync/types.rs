//! Types shared by the sync engine and its reporting.

use serde::Serialize;

use crate::model::{FieldDescriptor, Record};

use super::diff::ExcludedPolicy;
use super::state::Boundary;

/// A configured table resolved against the source descriptor.
#[derive(Debug, Clone)]
pub struct PreparedTable {
    pub name: String,
    /// Fields present on both sides, in source order, with their kinds.
    pub common: Vec<FieldDescriptor>,
    /// Destination field list, bookkeeping field included.
    pub destination_fields: Vec<String>,
    pub visibility_field: Option<String>,
}

impl PreparedTable {
    /// Whether a source record passes this table's visibility check.
    #[must_use]
    pub fn is_visible(&self, record: &Record) -> bool {
        self.visibility_field
            .as_deref()
            .is_none_or(|field| record.is_truthy(field))
    }

    /// Field list to request from the source.
    ///
    /// `None` when no common fields exist, so the whole record is fetched.
    #[must_use]
    pub fn source_fields(&self) -> Option<Vec<String>> {
        if self.common.is_empty() {
            return None;
        }
        let mut fields: Vec<String> = self.common.iter().map(|f| f.name.clone()).collect();
        if let Some(visibility) = &self.visibility_field {
            if !fields.contains(visibility) {
                fields.push(visibility.clone());
            }
        }
        Some(fields)
    }

    /// A cheap field to request when only identities are needed.
    #[must_use]
    pub fn probe_field(&self) -> Option<&str> {
        self.visibility_field
            .as_deref()
            .or_else(|| self.common.first().map(|f| f.name.as_str()))
    }
}

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Incremental boundary; `None` means full sync.
    pub boundary: Option<Boundary>,
    /// Skip updates whose common fields are unchanged.
    pub suppress_unchanged: bool,
    pub excluded: ExcludedPolicy,
    pub delete_untagged: bool,
    /// Link hops followed by single-record sync.
    pub max_link_depth: usize,
    /// Plan and report without writing.
    pub dry_run: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            boundary: None,
            suppress_unchanged: true,
            excluded: ExcludedPolicy::Delete,
            delete_untagged: false,
            max_link_depth: 10,
            dry_run: false,
        }
    }
}

/// One record mentioned in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub id: String,
    pub name: String,
}

impl ReportEntry {
    #[must_use]
    pub fn of(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            name: record.display_name(),
        }
    }
}

/// Outcome of syncing one table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableReport {
    pub table: String,
    pub created: Vec<ReportEntry>,
    pub updated: Vec<ReportEntry>,
    pub deleted: Vec<ReportEntry>,
    pub retained: Vec<ReportEntry>,
    pub untagged: Vec<ReportEntry>,
    /// Updates suppressed because nothing changed.
    pub unchanged: usize,
    /// Candidates skipped by the visibility check.
    pub excluded: usize,
    pub dry_run: bool,
}

impl TableReport {
    #[must_use]
    pub fn new(table: impl Into<String>, dry_run: bool) -> Self {
        Self {
            table: table.into(),
            dry_run,
            ..Self::default()
        }
    }

    /// Number of write operations (planned, under dry run).
    #[must_use]
    pub fn operations(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub tables: Vec<TableReport>,
    /// Boundary the run was incremental from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    pub dry_run: bool,
}

impl RunReport {
    #[must_use]
    pub fn created(&self) -> usize {
        self.tables.iter().map(|t| t.created.len()).sum()
    }

    #[must_use]
    pub fn updated(&self) -> usize {
        self.tables.iter().map(|t| t.updated.len()).sum()
    }

    #[must_use]
    pub fn deleted(&self) -> usize {
        self.tables.iter().map(|t| t.deleted.len()).sum()
    }

    #[must_use]
    pub fn operations(&self) -> usize {
        self.tables.iter().map(TableReport::operations).sum()
    }
}
