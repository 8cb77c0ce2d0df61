//! In-memory record store.
//!
//! Behaves like the REST backend where the engine can observe it: cursor
//! pagination, field projection, `modified_after` filtering, and identity
//! assignment on create. Every call is logged as a [`StoreCall`] so tests
//! can assert on batch sizes and ordering, and a write failure can be
//! injected to exercise partial-application paths.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::sync::Boundary;
use crate::model::{
    CollectionDescriptor, FieldDescriptor, FieldKind, Fields, NewRecord, Record, RecordUpdate,
};

use super::{Page, PageRequest, RecordStore};

/// Page size cap, matching the REST API.
const MAX_PAGE_SIZE: usize = 100;

/// A call made against a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Describe { table: String },
    FetchPage { table: String, offset: Option<String> },
    FetchRecord { table: String, id: String },
    Create { table: String, count: usize },
    Update { table: String, ids: Vec<String> },
    Delete { table: String, ids: Vec<String> },
}

impl StoreCall {
    /// Whether this call mutates the store.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create { .. } | Self::Update { .. } | Self::Delete { .. })
    }
}

#[derive(Debug, Clone)]
struct StoredRecord {
    record: Record,
    modified_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Table name → records in insertion order.
    tables: HashMap<String, Vec<StoredRecord>>,
    descriptors: HashMap<String, CollectionDescriptor>,
    calls: Vec<StoreCall>,
    /// Fail the write call with this zero-based index.
    fail_write_at: Option<usize>,
    writes: usize,
}

/// In-memory store for engine tests.
pub struct MemoryStore {
    label: String,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Create a store with empty tables.
    pub fn with_tables(label: impl Into<String>, tables: &[&str]) -> Self {
        let store = Self::new(label);
        for table in tables {
            store.create_table(table);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty table (no-op if it exists).
    pub fn create_table(&self, table: &str) {
        self.lock().tables.entry(table.to_string()).or_default();
    }

    /// Register an explicit descriptor for a table.
    pub fn set_descriptor(&self, descriptor: CollectionDescriptor) {
        let mut inner = self.lock();
        inner.tables.entry(descriptor.name.clone()).or_default();
        inner.descriptors.insert(descriptor.name.clone(), descriptor);
    }

    /// Insert a record with a generated identity, modified now.
    ///
    /// `fields` must be a JSON object; anything else inserts an empty record.
    pub fn insert(&self, table: &str, fields: Value) -> String {
        let id = new_record_id();
        self.insert_at(table, &id, fields, Utc::now());
        id
    }

    /// Insert (or replace) a record with a fixed identity and modification time.
    pub fn insert_at(&self, table: &str, id: &str, fields: Value, modified_at: DateTime<Utc>) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        let mut inner = self.lock();
        let rows = inner.tables.entry(table.to_string()).or_default();
        let stored = StoredRecord {
            record: Record::new(id, fields),
            modified_at,
        };
        match rows.iter_mut().find(|r| r.record.id == id) {
            Some(existing) => *existing = stored,
            None => rows.push(stored),
        }
    }

    /// Merge fields into an existing record and bump its modification time.
    pub fn touch(&self, table: &str, id: &str, fields: Value, modified_at: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        let Some(row) = inner
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.record.id == id))
        else {
            return false;
        };
        if let Value::Object(map) = fields {
            for (k, v) in map {
                row.record.fields.insert(k, v);
            }
        }
        row.modified_at = modified_at;
        true
    }

    /// Remove a record directly (no call is logged).
    pub fn remove(&self, table: &str, id: &str) -> bool {
        let mut inner = self.lock();
        let Some(rows) = inner.tables.get_mut(table) else {
            return false;
        };
        let before = rows.len();
        rows.retain(|r| r.record.id != id);
        rows.len() != before
    }

    /// Snapshot of a table's records, in insertion order.
    #[must_use]
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.iter().map(|r| r.record.clone()).collect())
            .unwrap_or_default()
    }

    /// Look up a record directly (no call is logged).
    #[must_use]
    pub fn record(&self, table: &str, id: &str) -> Option<Record> {
        self.lock()
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.record.id == id))
            .map(|r| r.record.clone())
    }

    /// All calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Only the write calls made so far.
    #[must_use]
    pub fn write_calls(&self) -> Vec<StoreCall> {
        self.lock().calls.iter().filter(|c| c.is_write()).cloned().collect()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the write call with zero-based index `n` (counted from now) fail.
    pub fn fail_write_at(&self, n: usize) {
        let mut inner = self.lock();
        inner.fail_write_at = Some(inner.writes + n);
    }
}

fn new_record_id() -> String {
    format!("rec{}", &uuid::Uuid::new_v4().simple().to_string()[..14])
}

impl Inner {
    fn table(&self, table: &str) -> Result<&Vec<StoredRecord>> {
        self.tables
            .get(table)
            .ok_or_else(|| Error::remote(format!("fetch {table}"), "TABLE_NOT_FOUND"))
    }

    fn table_mut(&mut self, context: &str, table: &str) -> Result<&mut Vec<StoredRecord>> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| Error::remote(context, "TABLE_NOT_FOUND"))
    }

    /// Count a write call, failing it if it is the injected one.
    fn begin_write(&mut self, context: &str) -> Result<()> {
        let index = self.writes;
        self.writes += 1;
        if self.fail_write_at == Some(index) {
            self.fail_write_at = None;
            return Err(Error::remote(context, "INJECTED_FAILURE"));
        }
        Ok(())
    }
}

fn project(record: &Record, fields: Option<&[String]>) -> Record {
    match fields {
        None => record.clone(),
        Some(names) => {
            let projected = record
                .fields
                .iter()
                .filter(|(k, _)| names.iter().any(|n| n == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Record {
                id: record.id.clone(),
                fields: projected,
                created_time: record.created_time.clone(),
            }
        }
    }
}

impl RecordStore for MemoryStore {
    fn label(&self) -> &str {
        &self.label
    }

    async fn describe(&self, collection: &str) -> Result<CollectionDescriptor> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Describe {
            table: collection.to_string(),
        });
        if let Some(descriptor) = inner.descriptors.get(collection) {
            return Ok(descriptor.clone());
        }

        // No registered descriptor: every field seen so far is plain.
        let rows = inner.table(collection).map_err(|_| {
            Error::SchemaMismatch(format!("table `{collection}` does not exist in {}", self.label))
        })?;
        let mut fields: Vec<FieldDescriptor> = Vec::new();
        for row in rows {
            for name in row.record.fields.keys() {
                if !fields.iter().any(|f| &f.name == name) {
                    fields.push(FieldDescriptor::new(name.clone(), FieldKind::Plain));
                }
            }
        }
        Ok(CollectionDescriptor::new(collection, fields))
    }

    async fn fetch_page(&self, collection: &str, request: PageRequest<'_>) -> Result<Page> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::FetchPage {
            table: collection.to_string(),
            offset: request.offset.map(str::to_string),
        });

        let rows = inner.table(collection)?;
        let mut matching: Vec<&StoredRecord> = rows
            .iter()
            .filter(|r| {
                request
                    .modified_after
                    .is_none_or(|b| Boundary::from_datetime(r.modified_at) >= b)
            })
            .collect();
        if let Some(max) = request.max_records {
            matching.truncate(max);
        }

        let start = match request.offset {
            Some(offset) => offset
                .parse::<usize>()
                .map_err(|_| Error::remote(format!("fetch {collection}"), "LIST_RECORDS_ITERATOR_NOT_AVAILABLE"))?,
            None => 0,
        };
        let page_size = request.page_size.clamp(1, MAX_PAGE_SIZE);
        let end = (start + page_size).min(matching.len());

        let records = matching
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|r| project(&r.record, request.fields))
            .collect();
        let offset = (end < matching.len()).then(|| end.to_string());

        Ok(Page { records, offset })
    }

    async fn fetch_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::FetchRecord {
            table: collection.to_string(),
            id: id.to_string(),
        });
        let rows = inner.table(collection)?;
        Ok(rows.iter().find(|r| r.record.id == id).map(|r| r.record.clone()))
    }

    async fn create(&self, collection: &str, records: &[NewRecord], _typecast: bool) -> Result<Vec<Record>> {
        let context = format!("create {collection}");
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Create {
            table: collection.to_string(),
            count: records.len(),
        });
        inner.begin_write(&context)?;

        let now = Utc::now();
        let rows = inner.table_mut(&context, collection)?;
        let mut created = Vec::with_capacity(records.len());
        for new in records {
            let record = Record::new(new_record_id(), new.fields.clone());
            rows.push(StoredRecord {
                record: record.clone(),
                modified_at: now,
            });
            created.push(record);
        }
        Ok(created)
    }

    async fn update(&self, collection: &str, records: &[RecordUpdate], _typecast: bool) -> Result<Vec<Record>> {
        let context = format!("update {collection}");
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Update {
            table: collection.to_string(),
            ids: records.iter().map(|r| r.id.clone()).collect(),
        });
        inner.begin_write(&context)?;

        let now = Utc::now();
        let rows = inner.table_mut(&context, collection)?;
        if let Some(missing) = records.iter().find(|u| !rows.iter().any(|r| r.record.id == u.id)) {
            return Err(Error::remote(context, format!("ROW_DOES_NOT_EXIST: {}", missing.id)));
        }

        let mut updated = Vec::with_capacity(records.len());
        for update in records {
            if let Some(row) = rows.iter_mut().find(|r| r.record.id == update.id) {
                for (k, v) in &update.fields {
                    row.record.fields.insert(k.clone(), v.clone());
                }
                row.modified_at = now;
                updated.push(row.record.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<Vec<String>> {
        let context = format!("delete {collection}");
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Delete {
            table: collection.to_string(),
            ids: ids.to_vec(),
        });
        inner.begin_write(&context)?;

        let rows = inner.table_mut(&context, collection)?;
        if let Some(missing) = ids.iter().find(|id| !rows.iter().any(|r| &r.record.id == *id)) {
            return Err(Error::remote(context, format!("ROW_DOES_NOT_EXIST: {missing}")));
        }
        rows.retain(|r| !ids.contains(&r.record.id));
        Ok(ids.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Boundary;
    use chrono::TimeZone;
    use serde_json::json;

    fn request<'a>() -> PageRequest<'a> {
        PageRequest {
            page_size: 100,
            ..PageRequest::default()
        }
    }

    #[tokio::test]
    async fn test_pagination_cursor() {
        let store = MemoryStore::with_tables("src", &["Fruits"]);
        for i in 0..5 {
            store.insert("Fruits", json!({"Name": format!("f{i}")}));
        }

        let first = store
            .fetch_page("Fruits", PageRequest { page_size: 2, ..request() })
            .await
            .unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.offset.as_deref(), Some("2"));

        let last = store
            .fetch_page(
                "Fruits",
                PageRequest {
                    page_size: 2,
                    offset: Some("4"),
                    ..request()
                },
            )
            .await
            .unwrap();
        assert_eq!(last.records.len(), 1);
        assert!(last.offset.is_none());
    }

    #[tokio::test]
    async fn test_field_projection_and_filter() {
        let store = MemoryStore::new("src");
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store.insert_at("Fruits", "rec1", json!({"Name": "Apple", "Color": "red"}), old);
        store.insert_at("Fruits", "rec2", json!({"Name": "Banana"}), new);

        let fields = vec!["Name".to_string()];
        let boundary = Boundary::from_datetime(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        let page = store
            .fetch_page(
                "Fruits",
                PageRequest {
                    fields: Some(&fields),
                    modified_after: Some(boundary),
                    ..request()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "rec2");

        let all = store
            .fetch_page("Fruits", PageRequest { fields: Some(&fields), ..request() })
            .await
            .unwrap();
        assert!(all.records[0].get("Color").is_none());
    }

    #[tokio::test]
    async fn test_filter_includes_boundary_second() {
        let store = MemoryStore::new("src");
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        store.insert_at("Fruits", "rec1", json!({"Name": "Apple"}), start - chrono::Duration::seconds(1));
        store.insert_at("Fruits", "rec2", json!({"Name": "Banana"}), start + chrono::Duration::milliseconds(400));

        let boundary = Boundary::from_datetime(start + chrono::Duration::milliseconds(100));
        let page = store
            .fetch_page(
                "Fruits",
                PageRequest {
                    modified_after: Some(boundary),
                    ..request()
                },
            )
            .await
            .unwrap();

        let ids: Vec<&str> = page.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rec2"]);
    }

    #[tokio::test]
    async fn test_unknown_table_is_remote_error() {
        let store = MemoryStore::new("dst");
        let err = store.fetch_page("Nope", request()).await.unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MemoryStore::with_tables("dst", &["Fruits"]);
        store.fail_write_at(1);
        let rec = NewRecord { fields: Fields::new() };

        assert!(store.create("Fruits", &[rec.clone()], true).await.is_ok());
        assert!(store.create("Fruits", &[rec.clone()], true).await.is_err());
        assert!(store.create("Fruits", &[rec], true).await.is_ok());
        assert_eq!(store.records("Fruits").len(), 2);
        assert_eq!(store.write_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_ids_fail() {
        let store = MemoryStore::with_tables("dst", &["Fruits"]);
        let update = RecordUpdate {
            id: "recMissing".into(),
            fields: Fields::new(),
        };
        assert!(store.update("Fruits", &[update], true).await.is_err());
        assert!(store.delete("Fruits", &["recMissing".into()]).await.is_err());
    }

    #[tokio::test]
    async fn test_describe_infers_plain_fields() {
        let store = MemoryStore::new("src");
        store.insert("Fruits", json!({"Name": "Apple", "Color": "red"}));
        let desc = store.describe("Fruits").await.unwrap();
        assert_eq!(desc.fields.len(), 2);
        assert!(desc.fields.iter().all(|f| f.kind == FieldKind::Plain));
    }
}
