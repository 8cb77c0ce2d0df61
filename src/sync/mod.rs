//! Record reconciliation.
//!
//! This module turns a source table into a copy in the destination:
//!
//! - **Paginate**: pull whole tables through cursor pagination
//! - **Identity**: correlate source and destination records via the
//!   bookkeeping field, and remap links between them
//! - **Diff**: classify records into creates, updates and deletes
//! - **Transcode**: reshape field values for the destination
//! - **Batch**: apply operations ten records at a time
//! - **State**: persist the boundary for incremental runs
//!
//! # Architecture
//!
//! ```text
//! RunStateTracker ──boundary──▶ SyncEngine
//!                                  │
//!        fetch_all ◀───────────────┤  source + destination snapshots
//!        IdentityIndex ◀───────────┤  per table, refreshed after writes
//!        plan / transcode ◀────────┤
//!        BatchWriter ◀─────────────┘  updates → creates → deletes
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tablesync::store::AirtableStore;
//! use tablesync::sync::{SyncEngine, SyncPolicy};
//!
//! let source = AirtableStore::new("appSRC", source_key);
//! let destination = AirtableStore::new("appDST", dest_key);
//! let engine = SyncEngine::new(&source, &destination, &config, SyncPolicy::default());
//! let report = engine.run(&[], &mut ()).await?;
//! println!("{} created", report.created());
//! ```

pub mod batch;
pub mod diff;
mod engine;
pub mod identity;
mod paginate;
pub mod report;
pub mod state;
pub mod trail;
pub mod transcode;
mod types;

pub use batch::{batch_count, BatchWriter, Operations, WriteKind, MAX_RECORDS_PER_REQUEST};
pub use diff::{fields_changed, plan, values_equal, ExcludedPolicy, PlanOptions, SyncPlan};
pub use engine::SyncEngine;
pub use identity::{IdentityIndex, IdentityMap, RunContext};
pub use paginate::{fetch_all, FetchOptions, PAGE_SIZE};
pub use report::{ConsoleSink, MarkdownSink, ProgressSink};
pub use state::{state_file_name, Boundary, RunStateTracker};
pub use trail::{walk, TrailOrigin, TrailStep};
pub use transcode::transcode;
pub use types::{PreparedTable, ReportEntry, RunReport, SyncPolicy, TableReport};
