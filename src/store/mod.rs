//! Record stores.
//!
//! A store is one base: a set of named tables reachable through a
//! REST-like API. The sync engine only talks to stores through the
//! [`RecordStore`] trait, so the same engine drives the HTTP backend in
//! production and the in-memory backend in tests.
//!
//! ```text
//! ┌──────────────┐
//! │  SyncEngine  │
//! └──────┬───────┘
//!        │ RecordStore
//!   ┌────┴─────┐
//!   ▼          ▼
//! ┌─────────┐ ┌────────┐
//! │Airtable │ │ Memory │
//! └─────────┘ └────────┘
//!   HTTP       in-process
//! ```

pub mod airtable;
#[cfg(test)]
pub mod memory;

pub use airtable::AirtableStore;
#[cfg(test)]
pub use memory::{MemoryStore, StoreCall};

use crate::error::Result;
use crate::model::{CollectionDescriptor, NewRecord, Record, RecordUpdate};
use crate::sync::Boundary;

/// One page request against a table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRequest<'a> {
    /// Records per page (the store caps this, typically at 100).
    pub page_size: usize,
    /// Continuation cursor returned with the previous page.
    pub offset: Option<&'a str>,
    /// Restrict the payload to these fields.
    pub fields: Option<&'a [String]>,
    /// Only records modified at or after this boundary second.
    pub modified_after: Option<Boundary>,
    /// Stop after this many records in total.
    pub max_records: Option<usize>,
}

/// One page of records plus the cursor for the next page, if any.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    pub offset: Option<String>,
}

/// Trait for table-oriented record stores.
///
/// Implemented by the Airtable REST backend and the in-memory backend.
/// Every failed call surfaces as [`crate::Error::Remote`]; stores never
/// retry on their own.
pub trait RecordStore: Send + Sync {
    /// Short label used in logs (base id or test name).
    fn label(&self) -> &str;

    /// Describe the fields of a table.
    fn describe(
        &self,
        collection: &str,
    ) -> impl std::future::Future<Output = Result<CollectionDescriptor>> + Send;

    /// Fetch a single page of records.
    fn fetch_page(
        &self,
        collection: &str,
        request: PageRequest<'_>,
    ) -> impl std::future::Future<Output = Result<Page>> + Send;

    /// Fetch one record by identity. `Ok(None)` if it does not exist.
    fn fetch_record(
        &self,
        collection: &str,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Record>>> + Send;

    /// Create records in one call. The store may cap the batch size.
    ///
    /// With `typecast`, the store coerces mismatched value types (for
    /// example string → number) instead of rejecting the call.
    fn create(
        &self,
        collection: &str,
        records: &[NewRecord],
        typecast: bool,
    ) -> impl std::future::Future<Output = Result<Vec<Record>>> + Send;

    /// Patch records in one call. Fields not named are left untouched.
    fn update(
        &self,
        collection: &str,
        records: &[RecordUpdate],
        typecast: bool,
    ) -> impl std::future::Future<Output = Result<Vec<Record>>> + Send;

    /// Delete records by identity in one call. Returns the deleted ids.
    fn delete(
        &self,
        collection: &str,
        ids: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}
