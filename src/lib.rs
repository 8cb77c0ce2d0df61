//! tablesync - one-way record sync between two table bases
//!
//! This crate provides the core of the `tablesync` CLI: it makes a
//! destination base match a source base, table by table, creating, updating
//! and deleting records and remapping links between tables.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Records, field kinds and collection descriptors
//! - [`store`] - The `RecordStore` trait plus REST and in-memory backends
//! - [`sync`] - Pagination, identity mapping, diffing, transcoding, batching
//! - [`config`] - Configuration file, env overrides and remote config records
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
