//! Run-state commands.

use super::{read_config, state_tracker, GlobalArgs};
use crate::cli::StateCommands;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::sync::RunStateTracker;

/// Execute state commands.
pub fn execute(command: StateCommands, globals: &GlobalArgs<'_>) -> Result<()> {
    let tracker = tracker(globals)?;
    match command {
        StateCommands::Show => show(&tracker, globals),
        StateCommands::Reset => reset(&tracker, globals),
    }
}

/// An explicit `--state` needs no config file.
fn tracker(globals: &GlobalArgs<'_>) -> Result<RunStateTracker> {
    match globals.state {
        Some(path) => Ok(RunStateTracker::new(path)),
        None => {
            let config: SyncConfig = read_config(globals)?;
            state_tracker(&config, globals)
        }
    }
}

fn show(tracker: &RunStateTracker, globals: &GlobalArgs<'_>) -> Result<()> {
    let boundary = tracker.load()?;
    if globals.json {
        let output = serde_json::json!({
            "path": tracker.path().display().to_string(),
            "lastRunDate": boundary.map(|b| b.encode()),
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        match boundary {
            Some(boundary) => println!("Last successful run: {boundary}"),
            None => println!("No successful run recorded; the next run is a full sync."),
        }
        println!("  State file: {}", tracker.path().display());
    }
    Ok(())
}

fn reset(tracker: &RunStateTracker, globals: &GlobalArgs<'_>) -> Result<()> {
    let removed = if globals.dry_run { tracker.load()?.is_some() } else { tracker.reset()? };
    if globals.json {
        let output = serde_json::json!({
            "path": tracker.path().display().to_string(),
            "removed": removed,
            "dry_run": globals.dry_run,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if removed {
        let verb = if globals.dry_run { "Would reset" } else { "Reset" };
        println!("{verb} run state at {}", tracker.path().display());
    } else {
        println!("No run state to reset.");
    }
    Ok(())
}
