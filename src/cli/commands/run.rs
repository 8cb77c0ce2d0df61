//! Run command implementation.

use std::fs::File;
use std::io::BufWriter;

use colored::Colorize;
use serde::Serialize;

use super::{connect, policy, runtime, state_tracker, GlobalArgs};
use crate::cli::RunArgs;
use crate::error::Result;
use crate::store::RecordStore;
use crate::sync::{
    Boundary, ConsoleSink, MarkdownSink, ProgressSink, RunReport, RunStateTracker, SyncEngine,
};

#[derive(Serialize)]
struct RunOutput<'a> {
    success: bool,
    #[serde(flatten)]
    report: &'a RunReport,
    /// Boundary stored for the next incremental run, if it advanced.
    #[serde(skip_serializing_if = "Option::is_none")]
    boundary: Option<String>,
}

/// Execute the run command.
pub fn execute(args: &RunArgs, globals: &GlobalArgs<'_>) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(execute_async(args, globals))
}

async fn execute_async(args: &RunArgs, globals: &GlobalArgs<'_>) -> Result<()> {
    let conn = connect(globals, args.config_record.as_deref()).await?;
    let tracker = state_tracker(&conn.config, globals)?;

    let mut policy = policy(&conn.config, globals);
    if args.incremental {
        policy.boundary = tracker.load()?;
        match policy.boundary {
            Some(boundary) => tracing::info!(since = %boundary, "Incremental run"),
            None => tracing::info!("No previous run recorded; running a full sync"),
        }
    }
    let dry_run = policy.dry_run;

    let console = (!globals.json && !globals.quiet).then(|| ConsoleSink::new(dry_run));
    let markdown = match &args.markdown {
        Some(path) => Some(MarkdownSink::new(BufWriter::new(File::create(path)?), dry_run)),
        None => None,
    };
    let mut sinks = (console, markdown);

    let engine = SyncEngine::new(&conn.source, &conn.destination, &conn.config, policy);
    let outcome = run_and_record(&engine, &args.tables, &tracker, &mut sinks).await?;
    let report = &outcome.report;

    let (_, markdown) = sinks;
    if let Some(markdown) = markdown {
        markdown.finish()?;
    }

    if globals.json {
        let output = RunOutput {
            success: true,
            report,
            boundary: outcome.advanced.map(|b| b.encode()),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !globals.quiet {
        println!();
        let summary = format!(
            "{} created, {} updated, {} deleted",
            report.created(),
            report.updated(),
            report.deleted()
        );
        if dry_run {
            println!("{} {summary}", "Dry run:".yellow().bold());
        } else {
            println!("{} {summary}", "Done:".green().bold());
        }
        if let Some(boundary) = outcome.advanced {
            println!("  Next incremental run starts from {}", boundary.encode().dimmed());
        }
    }

    Ok(())
}

/// A finished run and the boundary it stored, if any.
pub(crate) struct RunOutcome {
    pub report: RunReport,
    pub advanced: Option<Boundary>,
}

/// Run the engine, then advance the stored boundary.
///
/// The boundary is captured before anything is read. It is written only
/// when the run succeeded, covered every table, and was not a dry run.
pub(crate) async fn run_and_record<S: RecordStore, D: RecordStore>(
    engine: &SyncEngine<'_, S, D>,
    tables: &[String],
    tracker: &RunStateTracker,
    sink: &mut dyn ProgressSink,
) -> Result<RunOutcome> {
    let started = Boundary::now();
    let report = engine.run(tables, sink).await?;

    let advanced = (!engine.policy().dry_run && tables.is_empty()).then_some(started);
    if let Some(boundary) = advanced {
        tracker.save(boundary)?;
    }
    Ok(RunOutcome { report, advanced })
}
