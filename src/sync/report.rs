//! Progress reporting sinks.
//!
//! The engine announces each batch of actions before it is applied, so the
//! record names survive in the output even when a later write fails.

use std::io::Write;

use colored::Colorize;

use super::batch::WriteKind;
use super::types::{ReportEntry, TableReport};

/// Receives progress from the sync engine.
///
/// Every method has a no-op default; `()` is the silent sink.
pub trait ProgressSink {
    fn table_started(&mut self, _table: &str) {}

    /// Called before `entries` are written (or instead of writing, on dry run).
    fn actions(&mut self, _table: &str, _kind: WriteKind, _entries: &[ReportEntry]) {}

    fn table_finished(&mut self, _report: &TableReport) {}
}

impl ProgressSink for () {}

impl<T: ProgressSink> ProgressSink for Option<T> {
    fn table_started(&mut self, table: &str) {
        if let Some(sink) = self {
            sink.table_started(table);
        }
    }

    fn actions(&mut self, table: &str, kind: WriteKind, entries: &[ReportEntry]) {
        if let Some(sink) = self {
            sink.actions(table, kind, entries);
        }
    }

    fn table_finished(&mut self, report: &TableReport) {
        if let Some(sink) = self {
            sink.table_finished(report);
        }
    }
}

/// Both sinks receive every event, first one first.
impl<A: ProgressSink, B: ProgressSink> ProgressSink for (A, B) {
    fn table_started(&mut self, table: &str) {
        self.0.table_started(table);
        self.1.table_started(table);
    }

    fn actions(&mut self, table: &str, kind: WriteKind, entries: &[ReportEntry]) {
        self.0.actions(table, kind, entries);
        self.1.actions(table, kind, entries);
    }

    fn table_finished(&mut self, report: &TableReport) {
        self.0.table_finished(report);
        self.1.table_finished(report);
    }
}

fn verb(kind: WriteKind, dry_run: bool) -> &'static str {
    match (kind, dry_run) {
        (WriteKind::Create, false) => "Creating",
        (WriteKind::Update, false) => "Updating",
        (WriteKind::Delete, false) => "Deleting",
        (WriteKind::Create, true) => "Would create",
        (WriteKind::Update, true) => "Would update",
        (WriteKind::Delete, true) => "Would delete",
    }
}

/// Colored, human-oriented output on stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    dry_run: bool,
}

impl ConsoleSink {
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl ProgressSink for ConsoleSink {
    fn table_started(&mut self, table: &str) {
        println!("{}", table.bold());
    }

    fn actions(&mut self, _table: &str, kind: WriteKind, entries: &[ReportEntry]) {
        if entries.is_empty() {
            return;
        }
        let header = format!("  {} {} record(s)", verb(kind, self.dry_run), entries.len());
        let header = match kind {
            WriteKind::Create => header.green(),
            WriteKind::Update => header.yellow(),
            WriteKind::Delete => header.red(),
        };
        println!("{header}");
        for entry in entries {
            println!("    {} {}", entry.name, entry.id.dimmed());
        }
    }

    fn table_finished(&mut self, report: &TableReport) {
        let mut notes = Vec::new();
        if report.unchanged > 0 {
            notes.push(format!("{} unchanged", report.unchanged));
        }
        if report.excluded > 0 {
            notes.push(format!("{} excluded", report.excluded));
        }
        if !report.retained.is_empty() {
            notes.push(format!("{} retained", report.retained.len()));
        }
        if !report.untagged.is_empty() {
            notes.push(format!("{} untagged", report.untagged.len()));
        }
        if report.operations() == 0 {
            notes.insert(0, "up to date".to_string());
        }
        if !notes.is_empty() {
            println!("  {}", notes.join(", ").dimmed());
        }
    }
}

/// Markdown log written to any [`Write`].
///
/// The first I/O error is kept and returned by [`MarkdownSink::finish`];
/// later writes are skipped.
pub struct MarkdownSink<W: Write> {
    out: W,
    dry_run: bool,
    error: Option<std::io::Error>,
}

impl<W: Write> MarkdownSink<W> {
    pub fn new(out: W, dry_run: bool) -> Self {
        Self {
            out,
            dry_run,
            error: None,
        }
    }

    fn emit(&mut self, line: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.out, "{line}") {
            self.error = Some(e);
        }
    }

    /// Flush and hand back the writer.
    ///
    /// # Errors
    ///
    /// Returns the first write error encountered.
    pub fn finish(mut self) -> std::io::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> ProgressSink for MarkdownSink<W> {
    fn table_started(&mut self, table: &str) {
        self.emit(&format!("## {table}"));
    }

    fn actions(&mut self, _table: &str, kind: WriteKind, entries: &[ReportEntry]) {
        if entries.is_empty() {
            return;
        }
        self.emit(&format!("### {} {} record(s)", verb(kind, self.dry_run), entries.len()));
        for entry in entries {
            self.emit(&format!("* {} `{}`", entry.name, entry.id));
        }
    }

    fn table_finished(&mut self, report: &TableReport) {
        if report.operations() == 0 {
            self.emit("_No changes._");
        }
        if !report.untagged.is_empty() {
            self.emit(&format!(
                "_{} destination record(s) without a source id were left alone._",
                report.untagged.len()
            ));
        }
        self.emit("");
    }
}
