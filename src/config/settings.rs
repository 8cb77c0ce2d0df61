//! Configuration file schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::FieldKind;
use crate::store::airtable::DEFAULT_API_URL;
use crate::sync::{ExcludedPolicy, SyncPolicy};

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_source_id_field() -> String {
    "SourceId".to_string()
}

const fn default_true() -> bool {
    true
}

/// Top-level configuration, as read from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub source: StoreSettings,

    /// May be left empty when a remote config record supplies it.
    #[serde(default)]
    pub destination: StoreSettings,

    /// Destination field holding the source record identity.
    #[serde(default = "default_source_id_field")]
    pub source_id_field: String,

    /// Ask the source store for field kinds. When off, kinds come only
    /// from `tables[].kinds` and everything else is plain.
    #[serde(default = "default_true")]
    pub describe_source: bool,

    /// Tables to sync, in processing order.
    #[serde(default)]
    pub tables: Vec<TableConfig>,

    #[serde(default)]
    pub policy: PolicySettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            source: StoreSettings::default(),
            destination: StoreSettings::default(),
            source_id_field: default_source_id_field(),
            describe_source: true,
            tables: Vec::new(),
            policy: PolicySettings::default(),
        }
    }
}

impl SyncConfig {
    /// Look up a configured table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Configured table names, in order.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }
}

/// Connection settings for one base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub base_id: String,
    /// Usually supplied through the environment instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// One table to sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    /// Destination field names.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Field kind overrides, by field name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub kinds: HashMap<String, FieldKind>,
    /// Only source records with a truthy value here are synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_field: Option<String>,
}

impl TableConfig {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
            ..Self::default()
        }
    }
}

/// Reconciliation policy defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub suppress_unchanged: bool,
    pub excluded: ExcludedPolicy,
    pub delete_untagged: bool,
    pub max_link_depth: usize,
}

impl Default for PolicySettings {
    fn default() -> Self {
        let policy = SyncPolicy::default();
        Self {
            suppress_unchanged: policy.suppress_unchanged,
            excluded: policy.excluded,
            delete_untagged: policy.delete_untagged,
            max_link_depth: policy.max_link_depth,
        }
    }
}

impl PolicySettings {
    /// Engine policy for a run.
    #[must_use]
    pub fn to_policy(&self) -> SyncPolicy {
        SyncPolicy {
            suppress_unchanged: self.suppress_unchanged,
            excluded: self.excluded,
            delete_untagged: self.delete_untagged,
            max_link_depth: self.max_link_depth,
            ..SyncPolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: SyncConfig = serde_json::from_str(
            r#"{"source": {"base_id": "appS"}, "tables": [{"name": "Fruits", "fields": ["Name"]}]}"#,
        )
        .unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.source_id_field, "SourceId");
        assert!(config.describe_source);
        assert!(config.policy.suppress_unchanged);
        assert_eq!(config.policy.excluded, ExcludedPolicy::Delete);
        assert_eq!(config.policy.max_link_depth, 10);
        assert_eq!(config.table_names(), vec!["Fruits"]);
    }

    #[test]
    fn test_full_table_entry() {
        let config: SyncConfig = serde_json::from_str(
            r#"{
                "tables": [{
                    "name": "Contacts",
                    "fields": ["First Name", "Company"],
                    "kinds": {"Company": {"link_list": "Companies"}},
                    "visibility_field": "Allow Sync"
                }],
                "policy": {"excluded": "retain", "delete_untagged": true}
            }"#,
        )
        .unwrap();
        let contacts = config.table("Contacts").unwrap();
        assert_eq!(contacts.kinds["Company"].link_target(), Some("Companies"));
        assert_eq!(contacts.visibility_field.as_deref(), Some("Allow Sync"));
        let policy = config.policy.to_policy();
        assert_eq!(policy.excluded, ExcludedPolicy::Retain);
        assert!(policy.delete_untagged);
        assert!(policy.boundary.is_none());
    }
}
