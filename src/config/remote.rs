//! Configuration stored as a record in the source base.
//!
//! The `Config` table holds rows of `Name` / `Value`; the requested row's
//! `Value` is JSON naming the destination base and its schema:
//!
//! ```json
//! {
//!   "DestinationApiKey": "key...",
//!   "DestinationBaseId": "app...",
//!   "DestinationSchema": { "Companies": ["Name", "Logo"], "Contacts": ["Name"] }
//! }
//! ```
//!
//! Table order follows the key order of `DestinationSchema`.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::store::RecordStore;
use crate::sync::{fetch_all, FetchOptions};

use super::settings::{StoreSettings, SyncConfig, TableConfig};

/// Table holding configuration rows.
pub const CONFIG_TABLE: &str = "Config";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConfigValue {
    destination_api_key: Option<String>,
    destination_base_id: String,
    destination_schema: Map<String, Value>,
}

/// Destination settings read from a config record.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub destination: StoreSettings,
    /// Table name and destination fields, in declared order.
    pub tables: Vec<(String, Vec<String>)>,
}

/// Read the config row called `name` from the source store.
///
/// # Errors
///
/// Returns [`Error::Config`] unless exactly one row matches, or if its
/// `Value` is not the expected JSON.
pub async fn load_from_store<S: RecordStore>(store: &S, name: &str) -> Result<RemoteConfig> {
    let rows = fetch_all(store, CONFIG_TABLE, FetchOptions::default()).await?;
    let matches: Vec<_> = rows.iter().filter(|r| r.get_str("Name") == Some(name)).collect();

    let [row] = matches.as_slice() else {
        return Err(Error::Config(format!(
            "expected 1 row in the {CONFIG_TABLE} table named \"{name}\", found {}",
            matches.len()
        )));
    };

    let raw = row
        .get_str("Value")
        .ok_or_else(|| Error::Config(format!("config row \"{name}\" has no Value text")))?;
    parse(raw).map_err(|e| Error::Config(format!("config row \"{name}\": {e}")))
}

fn parse(raw: &str) -> std::result::Result<RemoteConfig, String> {
    let value: ConfigValue = serde_json::from_str(raw).map_err(|e| e.to_string())?;

    let mut tables = Vec::with_capacity(value.destination_schema.len());
    for (table, fields) in value.destination_schema {
        let fields: Vec<String> = serde_json::from_value(fields)
            .map_err(|_| format!("DestinationSchema.{table} must be a list of field names"))?;
        tables.push((table, fields));
    }

    Ok(RemoteConfig {
        destination: StoreSettings {
            base_id: value.destination_base_id,
            api_key: value.destination_api_key,
        },
        tables,
    })
}

impl RemoteConfig {
    /// Fold into a local configuration.
    ///
    /// The destination and table list are replaced. Kind overrides and
    /// visibility fields from local entries of the same name are kept, and
    /// a locally set destination key wins over the stored one.
    pub fn merge_into(self, config: &mut SyncConfig) {
        let api_key = config.destination.api_key.take().or(self.destination.api_key);
        config.destination = StoreSettings {
            base_id: self.destination.base_id,
            api_key,
        };

        let mut local = std::mem::take(&mut config.tables);
        config.tables = self
            .tables
            .into_iter()
            .map(|(name, fields)| {
                let mut table = match local.iter().position(|t| t.name == name) {
                    Some(i) => local.swap_remove(i),
                    None => TableConfig::new(name, Vec::new()),
                };
                table.fields = fields;
                table
            })
            .collect();
    }
}
