//! Source-to-destination identity correlation.
//!
//! Destination records carry the identity of the source record they were
//! copied from in a bookkeeping field (`SourceId` by default). An
//! [`IdentityIndex`] reads that column back and classifies destination
//! records as matched, orphaned, or untagged.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::model::Record;
use crate::store::RecordStore;

use super::paginate::{fetch_all, FetchOptions};

/// Injective mapping from source identity to destination identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    forward: HashMap<String, String>,
}

impl IdentityMap {
    /// Destination identity for a source identity.
    #[must_use]
    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.forward.get(source_id).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, source_id: &str) -> bool {
        self.forward.contains_key(source_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Insert unless the source identity is already mapped.
    fn insert_first(&mut self, source_id: &str, destination_id: &str) -> bool {
        if self.forward.contains_key(source_id) {
            return false;
        }
        self.forward
            .insert(source_id.to_string(), destination_id.to_string());
        true
    }
}

/// Classified destination snapshot for one table.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    /// Live source identity → destination identity.
    pub map: IdentityMap,
    /// Every source identity that currently exists.
    pub live: HashSet<String>,
    /// Destination records holding a mapped source identity.
    pub matched: Vec<Record>,
    /// Destination records whose source is gone, or which duplicate an
    /// already-mapped source identity.
    pub orphans: Vec<Record>,
    /// Destination records with no bookkeeping value.
    pub untagged: Vec<Record>,
}

impl IdentityIndex {
    /// Build an index from the live source identities and a destination snapshot.
    ///
    /// The first destination record holding a given source identity wins;
    /// later holders are orphans.
    #[must_use]
    pub fn build(live: HashSet<String>, destination: Vec<Record>, source_id_field: &str) -> Self {
        let mut index = Self {
            live,
            ..Self::default()
        };

        for record in destination {
            let source_id = match record.get_str(source_id_field) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    index.untagged.push(record);
                    continue;
                }
            };

            if index.live.contains(&source_id) && index.map.insert_first(&source_id, &record.id) {
                index.matched.push(record);
            } else {
                index.orphans.push(record);
            }
        }

        tracing::trace!(
            mapped = index.map.len(),
            orphans = index.orphans.len(),
            untagged = index.untagged.len(),
            "Built identity index"
        );
        index
    }

    /// The matched destination record for a source identity.
    #[must_use]
    pub fn destination(&self, source_id: &str) -> Option<&Record> {
        let destination_id = self.map.get(source_id)?;
        self.matched.iter().find(|r| r.id == destination_id)
    }
}

/// Per-run context: table name → identity index.
///
/// Owned by the engine for the duration of one run.
#[derive(Debug, Default)]
pub struct RunContext {
    tables: HashMap<String, IdentityIndex>,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn index(&self, table: &str) -> Option<&IdentityIndex> {
        self.tables.get(table)
    }

    /// The identity map of a table, if that table is part of this run.
    #[must_use]
    pub fn map(&self, table: &str) -> Option<&IdentityMap> {
        self.tables.get(table).map(|index| &index.map)
    }

    /// Install or replace a table's index.
    pub fn replace(&mut self, table: impl Into<String>, index: IdentityIndex) {
        self.tables.insert(table.into(), index);
    }
}

/// Read the identities of every source record in a table.
///
/// `probe_field` keeps the payload small; any field of the table works.
/// Without one, whole records are fetched.
pub async fn load_source_ids<S: RecordStore>(
    source: &S,
    table: &str,
    probe_field: Option<&str>,
) -> Result<HashSet<String>> {
    let fields: Vec<String> = probe_field.map(str::to_string).into_iter().collect();
    let records = fetch_all(
        source,
        table,
        FetchOptions {
            fields: probe_field.map(|_| fields.as_slice()),
            ..FetchOptions::default()
        },
    )
    .await?;
    Ok(records.into_iter().map(|r| r.id).collect())
}

/// Read the destination table restricted to the bookkeeping field.
pub async fn load_destination_tags<S: RecordStore>(
    destination: &S,
    table: &str,
    source_id_field: &str,
) -> Result<Vec<Record>> {
    let fields = [source_id_field.to_string()];
    fetch_all(
        destination,
        table,
        FetchOptions {
            fields: Some(&fields),
            ..FetchOptions::default()
        },
    )
    .await
}

/// Load a table's identity index from both stores.
pub async fn load_index<S: RecordStore, D: RecordStore>(
    source: &S,
    destination: &D,
    table: &str,
    probe_field: Option<&str>,
    source_id_field: &str,
) -> Result<IdentityIndex> {
    let live = load_source_ids(source, table, probe_field).await?;
    let tags = load_destination_tags(destination, table, source_id_field).await?;
    Ok(IdentityIndex::build(live, tags, source_id_field))
}
