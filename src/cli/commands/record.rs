//! Single-record sync command.

use colored::Colorize;

use super::{connect, policy, runtime, GlobalArgs};
use crate::error::Result;
use crate::sync::{ConsoleSink, SyncEngine};

/// Execute the record command.
pub fn execute(table: &str, record_id: &str, depth: Option<usize>, globals: &GlobalArgs<'_>) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(execute_async(table, record_id, depth, globals))
}

async fn execute_async(
    table: &str,
    record_id: &str,
    depth: Option<usize>,
    globals: &GlobalArgs<'_>,
) -> Result<()> {
    let conn = connect(globals, None).await?;
    let mut policy = policy(&conn.config, globals);
    if let Some(depth) = depth {
        policy.max_link_depth = depth;
    }
    let dry_run = policy.dry_run;

    let mut console = (!globals.json && !globals.quiet).then(|| ConsoleSink::new(dry_run));
    let engine = SyncEngine::new(&conn.source, &conn.destination, &conn.config, policy);
    let report = engine.sync_record(table, record_id, &mut console).await?;

    if globals.json {
        let output = serde_json::json!({
            "success": true,
            "table": table,
            "record_id": record_id,
            "report": report,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if !globals.quiet {
        println!();
        println!(
            "{} {} created, {} updated",
            "Synced:".green().bold(),
            report.created(),
            report.updated()
        );
    }
    Ok(())
}
