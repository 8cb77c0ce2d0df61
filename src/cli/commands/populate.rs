//! Source-id backfill command.
//!
//! Useful once, when a destination base was filled by hand before syncing
//! started: without the bookkeeping field every destination record is
//! untagged and the first run would duplicate it.

use super::{connect, policy, runtime, GlobalArgs};
use crate::error::Result;
use crate::sync::{ConsoleSink, SyncEngine};

/// Execute the populate-source-ids command.
pub fn execute(match_field: &str, globals: &GlobalArgs<'_>) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(execute_async(match_field, globals))
}

async fn execute_async(match_field: &str, globals: &GlobalArgs<'_>) -> Result<()> {
    let conn = connect(globals, None).await?;
    let policy = policy(&conn.config, globals);
    let dry_run = policy.dry_run;

    let mut console = (!globals.json && !globals.quiet).then(|| ConsoleSink::new(dry_run));
    let engine = SyncEngine::new(&conn.source, &conn.destination, &conn.config, policy);
    let tagged = engine.populate_source_ids(match_field, &mut console).await?;

    if globals.json {
        let output = serde_json::json!({
            "success": true,
            "match_field": match_field,
            "tagged": tagged,
            "dry_run": dry_run,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if !globals.quiet {
        println!();
        println!("Tagged {tagged} record(s) with {}", conn.config.source_id_field);
    }
    Ok(())
}
