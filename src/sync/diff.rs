//! Classification of records into creates, updates and deletes.
//!
//! Also owns the field-level equality used to suppress no-op updates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{FieldDescriptor, FieldKind, Fields, Record};

use super::identity::IdentityIndex;

/// What happens to destination copies of records that fail the visibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExcludedPolicy {
    /// Delete them.
    #[default]
    Delete,
    /// Keep them and report them as retained.
    Retain,
}

/// Inputs to [`plan`] beyond the records themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions<'a> {
    /// Candidates must have a truthy value here to be synced.
    pub visibility_field: Option<&'a str>,
    pub excluded: ExcludedPolicy,
    /// Delete destination records that carry no source identity.
    pub delete_untagged: bool,
}

/// Operations for one table during one run.
#[derive(Debug, Default)]
pub struct SyncPlan<'a> {
    pub creates: Vec<&'a Record>,
    /// Source record paired with the destination identity to patch.
    pub updates: Vec<(&'a Record, String)>,
    pub deletes: Vec<&'a Record>,
    /// Destination records kept although their source is excluded.
    pub retained: Vec<&'a Record>,
    /// Destination records without a source identity that are left alone.
    pub untagged: Vec<&'a Record>,
    /// Candidates skipped by the visibility check.
    pub excluded: usize,
}

impl SyncPlan<'_> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Classify candidates against the destination index.
///
/// `candidates` is every source record in a full run, or only the recently
/// modified ones in an incremental run. Orphans are judged against the
/// index's full live set either way.
#[must_use]
pub fn plan<'a>(
    candidates: &'a [Record],
    index: &'a IdentityIndex,
    options: PlanOptions<'_>,
) -> SyncPlan<'a> {
    let mut plan = SyncPlan::default();

    for candidate in candidates {
        let visible = options
            .visibility_field
            .is_none_or(|field| candidate.is_truthy(field));

        if !visible {
            plan.excluded += 1;
            if let Some(existing) = index.destination(&candidate.id) {
                match options.excluded {
                    ExcludedPolicy::Delete => plan.deletes.push(existing),
                    ExcludedPolicy::Retain => plan.retained.push(existing),
                }
            }
            continue;
        }

        match index.map.get(&candidate.id) {
            Some(destination_id) => plan.updates.push((candidate, destination_id.to_string())),
            None => plan.creates.push(candidate),
        }
    }

    plan.deletes.extend(index.orphans.iter());
    if options.delete_untagged {
        plan.deletes.extend(index.untagged.iter());
    } else {
        plan.untagged.extend(index.untagged.iter());
    }

    plan
}

/// Whether any common field differs between two field maps.
#[must_use]
pub fn fields_changed(before: &Fields, after: &Fields, common: &[FieldDescriptor]) -> bool {
    common
        .iter()
        .any(|field| !values_equal(before.get(&field.name), after.get(&field.name), &field.kind))
}

/// Field-level equality.
///
/// Empty values (absent, `null`, `""`, `[]`, `false`) are all equal. Lists
/// compare as multisets of a per-kind representation: attachments by
/// filename, choices by name, links by id.
#[must_use]
pub fn values_equal(a: Option<&Value>, b: Option<&Value>, kind: &FieldKind) -> bool {
    match (non_empty(a), non_empty(b)) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Array(x), Value::Array(y)) => {
                if x.len() != y.len() {
                    return false;
                }
                let mut x: Vec<String> = x.iter().map(|v| representation(v, kind)).collect();
                let mut y: Vec<String> = y.iter().map(|v| representation(v, kind)).collect();
                x.sort();
                y.sort();
                x == y
            }
            (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
            _ if *kind == FieldKind::SingleChoice => representation(a, kind) == representation(b, kind),
            _ => a == b,
        },
    }
}

fn non_empty(value: Option<&Value>) -> Option<&Value> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(a) if a.is_empty() => None,
        v => Some(v),
    }
}

/// Comparable text for one list element or choice.
fn representation(value: &Value, kind: &FieldKind) -> String {
    let key = match kind {
        FieldKind::AttachmentList => attachment_filename(value),
        FieldKind::SingleChoice | FieldKind::MultiChoice => value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        FieldKind::LinkList(_) => value.get("id").and_then(Value::as_str).map(str::to_string),
        FieldKind::Plain => None,
    };
    key.or_else(|| value.as_str().map(str::to_string))
        .unwrap_or_else(|| value.to_string())
}

/// Filename of an attachment descriptor, falling back to the URL's last segment.
pub(crate) fn attachment_filename(value: &Value) -> Option<String> {
    value
        .get("filename")
        .or_else(|| value.get("fileName"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            value
                .get("url")
                .and_then(Value::as_str)
                .and_then(|url| url.split('?').next())
                .and_then(|path| path.rsplit('/').next())
                .map(str::to_string)
        })
}
