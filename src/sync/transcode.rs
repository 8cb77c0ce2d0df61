//! Source field values → destination field shape.

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::model::{FieldDescriptor, FieldKind, Fields, Record};

use super::diff::attachment_filename;
use super::identity::RunContext;

/// Convert a source record's common fields for the destination.
///
/// Common fields the source record lacks are sent as `null`, which clears
/// them on update. The bookkeeping field is always appended with the
/// source identity.
///
/// # Errors
///
/// Returns [`Error::SchemaMismatch`] when a link field points at a table
/// with no identity map in this run.
pub fn transcode(
    record: &Record,
    common: &[FieldDescriptor],
    context: &RunContext,
    source_id_field: &str,
) -> Result<Fields> {
    let mut fields = Fields::new();

    for field in common {
        if field.name == source_id_field {
            continue;
        }
        let Some(value) = record.get(&field.name) else {
            fields.insert(field.name.clone(), Value::Null);
            continue;
        };
        let converted = match &field.kind {
            FieldKind::Plain => value.clone(),
            FieldKind::AttachmentList => first_attachment(value),
            FieldKind::SingleChoice => choice_name(value),
            FieldKind::MultiChoice => match value {
                Value::Array(items) => Value::Array(items.iter().map(choice_name).collect()),
                other => Value::Array(vec![choice_name(other)]),
            },
            FieldKind::LinkList(target) => remap_links(record, &field.name, value, target, context)?,
        };
        fields.insert(field.name.clone(), converted);
    }

    fields.insert(source_id_field.to_string(), Value::String(record.id.clone()));
    Ok(fields)
}

/// Keep only the first attachment, as `{url, filename}`.
fn first_attachment(value: &Value) -> Value {
    let first = match value {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(value),
        _ => None,
    };
    match first {
        Some(attachment) => {
            let url = attachment.get("url").cloned().unwrap_or(Value::Null);
            let filename = attachment_filename(attachment).map_or(Value::Null, Value::String);
            json!([{ "url": url, "filename": filename }])
        }
        None => Value::Array(Vec::new()),
    }
}

fn choice_name(value: &Value) -> Value {
    match value.get("name") {
        Some(name) => name.clone(),
        None => value.clone(),
    }
}

fn remap_links(
    record: &Record,
    field: &str,
    value: &Value,
    target: &str,
    context: &RunContext,
) -> Result<Value> {
    let map = context.map(target).ok_or_else(|| {
        Error::SchemaMismatch(format!(
            "field `{field}` links to table `{target}`, which is not configured for sync"
        ))
    })?;

    let items = match value {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };

    let mut mapped = Vec::with_capacity(items.len());
    for item in items {
        let source_id = item
            .as_str()
            .or_else(|| item.get("id").and_then(Value::as_str));
        match source_id.and_then(|id| map.get(id)) {
            Some(destination_id) => mapped.push(Value::String(destination_id.to_string())),
            None => tracing::debug!(
                record = %record.id,
                field,
                target,
                link = %item,
                "Dropping link to unsynced record"
            ),
        }
    }
    Ok(Value::Array(mapped))
}
