//! Data models for tablesync.
//!
//! This module contains the store-neutral domain models:
//! - Record (plus the create/update payload shapes)
//! - CollectionDescriptor, FieldDescriptor, FieldKind

pub mod descriptor;
pub mod record;

pub use descriptor::{CollectionDescriptor, FieldDescriptor, FieldKind};
pub use record::{display_name, Fields, NewRecord, Record, RecordUpdate};
