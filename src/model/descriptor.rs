//! Collection descriptors and field kinds.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a field's value is shaped, and therefore how it is transcoded.
///
/// Resolved once when a collection descriptor loads; the transcoder and
/// the equality check pattern-match on it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Copied verbatim.
    #[default]
    Plain,
    /// A single choice object (or its name).
    SingleChoice,
    /// A list of choice objects (or names).
    MultiChoice,
    /// A list of attachment descriptors.
    AttachmentList,
    /// A list of record identities in the named target collection.
    LinkList(String),
}

impl FieldKind {
    /// Map a store field type name to a kind.
    ///
    /// Returns `None` for field types that can never be written
    /// (buttons), so callers can leave them out of the descriptor.
    #[must_use]
    pub fn from_store_type(type_name: &str, link_target: Option<&str>) -> Option<Self> {
        match type_name {
            "button" => None,
            "singleSelect" => Some(Self::SingleChoice),
            "multipleSelects" => Some(Self::MultiChoice),
            "multipleAttachments" => Some(Self::AttachmentList),
            "multipleRecordLinks" => Some(
                link_target.map_or(Self::Plain, |target| Self::LinkList(target.to_string())),
            ),
            _ => Some(Self::Plain),
        }
    }

    /// Target collection of a link field.
    #[must_use]
    pub fn link_target(&self) -> Option<&str> {
        match self {
            Self::LinkList(target) => Some(target),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::SingleChoice => write!(f, "single_choice"),
            Self::MultiChoice => write!(f, "multi_choice"),
            Self::AttachmentList => write!(f, "attachment_list"),
            Self::LinkList(target) => write!(f, "link_list({target})"),
        }
    }
}

/// A named field with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A collection name plus its ordered field descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Replace field kinds with explicit overrides (from configuration).
    ///
    /// Overrides for fields the descriptor doesn't know are appended, so a
    /// descriptor built purely from configuration still carries them.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, FieldKind>) {
        for (name, kind) in overrides {
            match self.fields.iter_mut().find(|f| &f.name == name) {
                Some(field) => field.kind = kind.clone(),
                None => self.fields.push(FieldDescriptor::new(name.clone(), kind.clone())),
            }
        }
    }

    /// Fields present in both this (source) descriptor and the destination
    /// field list, in source order.
    #[must_use]
    pub fn common_fields(&self, destination_fields: &[String]) -> Vec<FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| destination_fields.iter().any(|d| d == &f.name))
            .cloned()
            .collect()
    }
}
