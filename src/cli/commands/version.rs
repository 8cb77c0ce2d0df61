//! Version command implementation.

use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    api: &'a str,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) { "dev" } else { "release" };
    let api = crate::store::airtable::DEFAULT_API_URL;

    if json {
        let output = VersionOutput { version, build, api };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("tablesync {version} ({build})");
    Ok(())
}
