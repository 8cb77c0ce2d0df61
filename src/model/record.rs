//! Record model shared by both sides of a sync.
//!
//! Records mirror the REST wire shape: an opaque store-assigned `id`, a
//! field map, and an optional `createdTime`. Field values stay as
//! `serde_json::Value` because their interpretation depends on the field
//! kind, which is resolved separately from the collection descriptor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name → value map, in the order the store returned it.
pub type Fields = Map<String, Value>;

/// A record as read from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identity, unique within its table and never reused.
    pub id: String,

    /// Field values. Empty fields are usually omitted by the store.
    #[serde(default)]
    pub fields: Fields,

    /// Creation timestamp as reported by the store.
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl Record {
    /// Create a record with the given identity and fields.
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
            created_time: None,
        }
    }

    /// Get a field value, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a field as a string, if present and a string.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Whether a field holds a truthy value.
    ///
    /// Absent, `null`, `false`, `0`, `""` and `[]` are falsy; this matches how
    /// checkbox and flag fields come back from the store.
    #[must_use]
    pub fn is_truthy(&self, field: &str) -> bool {
        match self.fields.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(_)) => true,
        }
    }

    /// Human-friendly label for progress output.
    ///
    /// Prefers `First Name` + `Last Name` (contact-style tables), then
    /// `Name`, then falls back to the record identity.
    #[must_use]
    pub fn display_name(&self) -> String {
        display_name(&self.id, &self.fields)
    }
}

/// Label for a record given its id and fields. See [`Record::display_name`].
#[must_use]
pub fn display_name(id: &str, fields: &Fields) -> String {
    if let Some(first) = fields.get("First Name").and_then(Value::as_str) {
        let last = fields
            .get("Last Name")
            .and_then(Value::as_str)
            .map_or("", str::trim);
        return format!("{} {last}", first.trim()).trim_end().to_string();
    }
    match fields.get("Name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => id.to_string(),
    }
}

/// A record to be created (the store assigns the identity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub fields: Fields,
}

/// A field update for an existing destination record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub id: String,
    pub fields: Fields,
}
