//! Chunked writes against a store.
//!
//! The remote API accepts at most ten records per write call. Operation
//! lists are split into chunks of that size and sent one after another,
//! in input order. The first failing chunk halts the rest; earlier chunks
//! stay applied.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{NewRecord, RecordUpdate};
use crate::store::RecordStore;

/// Maximum records per write call.
pub const MAX_RECORDS_PER_REQUEST: usize = 10;

/// The kind of a write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for WriteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A list of operations of one kind.
#[derive(Debug, Clone)]
pub enum Operations {
    Create(Vec<NewRecord>),
    Update(Vec<RecordUpdate>),
    /// Destination identities.
    Delete(Vec<String>),
}

impl Operations {
    #[must_use]
    pub fn kind(&self) -> WriteKind {
        match self {
            Self::Create(_) => WriteKind::Create,
            Self::Update(_) => WriteKind::Update,
            Self::Delete(_) => WriteKind::Delete,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Create(ops) => ops.len(),
            Self::Update(ops) => ops.len(),
            Self::Delete(ids) => ids.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of write calls needed for `len` operations.
#[must_use]
pub const fn batch_count(len: usize) -> usize {
    len.div_ceil(MAX_RECORDS_PER_REQUEST)
}

/// Applies operation lists in chunks.
pub struct BatchWriter<'a, S: RecordStore> {
    store: &'a S,
    typecast: bool,
}

impl<'a, S: RecordStore> BatchWriter<'a, S> {
    /// Writer with typecasting enabled for creates and updates.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            typecast: true,
        }
    }

    /// Apply all operations, returning how many records were written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] for the first failing chunk. The message
    /// names the chunk and how many records had already been applied.
    pub async fn apply(&self, collection: &str, operations: &Operations) -> Result<usize> {
        let total = batch_count(operations.len());
        let kind = operations.kind();
        let mut applied = 0usize;

        for index in 0..total {
            let range = index * MAX_RECORDS_PER_REQUEST
                ..((index + 1) * MAX_RECORDS_PER_REQUEST).min(operations.len());
            let result = match operations {
                Operations::Create(ops) => self
                    .store
                    .create(collection, &ops[range.clone()], self.typecast)
                    .await
                    .map(|_| ()),
                Operations::Update(ops) => self
                    .store
                    .update(collection, &ops[range.clone()], self.typecast)
                    .await
                    .map(|_| ()),
                Operations::Delete(ids) => self
                    .store
                    .delete(collection, &ids[range.clone()])
                    .await
                    .map(|_| ()),
            };

            if let Err(e) = result {
                tracing::warn!(
                    table = collection,
                    %kind,
                    batch = index + 1,
                    batches = total,
                    applied,
                    "Write failed; earlier batches remain applied"
                );
                return Err(partial_failure(e, kind, collection, index + 1, total, applied));
            }

            applied += range.len();
            tracing::trace!(table = collection, %kind, batch = index + 1, batches = total, "Batch applied");
        }

        Ok(applied)
    }
}

fn partial_failure(
    error: Error,
    kind: WriteKind,
    collection: &str,
    batch: usize,
    total: usize,
    applied: usize,
) -> Error {
    let (context, message) = match error {
        Error::Remote { context, message } => (context, message),
        other => (format!("{kind} {collection}"), other.to_string()),
    };
    Error::Remote {
        context: format!("{context}, batch {batch}/{total}, {applied} already applied"),
        message,
    }
}
