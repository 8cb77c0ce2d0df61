//! Cursor-following fetch of a whole collection.

use crate::error::Result;
use crate::model::Record;
use crate::store::{PageRequest, RecordStore};

use super::Boundary;

/// Records requested per page.
pub const PAGE_SIZE: usize = 100;

/// Restrictions applied to a [`fetch_all`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions<'a> {
    /// Only return these fields.
    pub fields: Option<&'a [String]>,
    /// Only records modified after this boundary.
    pub modified_after: Option<Boundary>,
    /// Stop after this many records.
    pub max_records: Option<usize>,
}

/// Fetch every record of `collection`, following continuation cursors.
///
/// # Errors
///
/// Any page failure aborts the whole fetch; records from earlier pages are
/// discarded.
pub async fn fetch_all<S: RecordStore>(
    store: &S,
    collection: &str,
    options: FetchOptions<'_>,
) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut offset: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let request = PageRequest {
            page_size: PAGE_SIZE,
            offset: offset.as_deref(),
            fields: options.fields,
            modified_after: options.modified_after,
            max_records: options.max_records,
        };
        let page = store.fetch_page(collection, request).await?;
        pages += 1;
        records.extend(page.records);

        if let Some(max) = options.max_records {
            if records.len() >= max {
                records.truncate(max);
                break;
            }
        }
        match page.offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }

    tracing::debug!(
        store = store.label(),
        table = collection,
        pages,
        count = records.len(),
        "Fetched collection"
    );
    Ok(records)
}
