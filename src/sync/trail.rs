//! Breadth-first walk of link fields from one record.
//!
//! Used by single-record sync to gather the records a record links to,
//! so they can be copied alongside it.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;

use crate::error::Result;
use crate::model::Record;
use crate::store::RecordStore;

use super::types::PreparedTable;

/// Where a trail step was reached from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailOrigin {
    pub table: String,
    pub record_name: String,
    pub field: String,
}

/// A record found by the walk.
#[derive(Debug, Clone)]
pub struct TrailStep {
    pub table: String,
    pub record: Record,
    /// Link hops from the root.
    pub depth: usize,
    /// `None` for the root.
    pub via: Option<TrailOrigin>,
}

/// Walk link fields breadth-first from `root`, at most `max_depth` hops.
///
/// Only common link fields whose target table is in `tables` are followed.
/// Linked records failing their table's visibility check are left out, and
/// so is everything reachable only through them. Steps come back in
/// discovery order, root first.
///
/// # Errors
///
/// Fails if a linked record cannot be fetched.
pub async fn walk<S: RecordStore>(
    source: &S,
    tables: &[PreparedTable],
    root_table: &str,
    root: Record,
    max_depth: usize,
) -> Result<Vec<TrailStep>> {
    let mut visited: HashSet<(String, String)> = HashSet::new();
    visited.insert((root_table.to_string(), root.id.clone()));

    let mut queue: VecDeque<TrailStep> = VecDeque::new();
    queue.push_back(TrailStep {
        table: root_table.to_string(),
        record: root,
        depth: 0,
        via: None,
    });

    let mut steps = Vec::new();
    while let Some(step) = queue.pop_front() {
        if step.depth < max_depth {
            if let Some(table) = tables.iter().find(|t| t.name == step.table) {
                for field in &table.common {
                    let Some(target) = field.kind.link_target() else {
                        continue;
                    };
                    let Some(target_table) = tables.iter().find(|t| t.name == target) else {
                        continue;
                    };
                    for linked_id in linked_ids(step.record.get(&field.name)) {
                        if !visited.insert((target.to_string(), linked_id.clone())) {
                            continue;
                        }
                        let Some(linked) = source.fetch_record(target, &linked_id).await? else {
                            tracing::warn!(table = target, record = %linked_id, "Linked record not found; skipping");
                            continue;
                        };
                        if !target_table.is_visible(&linked) {
                            tracing::debug!(table = target, record = %linked_id, "Linked record excluded by visibility");
                            continue;
                        }
                        queue.push_back(TrailStep {
                            table: target.to_string(),
                            record: linked,
                            depth: step.depth + 1,
                            via: Some(TrailOrigin {
                                table: step.table.clone(),
                                record_name: step.record.display_name(),
                                field: field.name.clone(),
                            }),
                        });
                    }
                }
            }
        }
        steps.push(step);
    }

    Ok(steps)
}

fn linked_ids(value: Option<&Value>) -> Vec<String> {
    let items = match value {
        Some(Value::Array(items)) => items.as_slice(),
        Some(other) => std::slice::from_ref(other),
        None => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| {
            item.as_str()
                .or_else(|| item.get("id").and_then(Value::as_str))
                .map(str::to_string)
        })
        .collect()
}
