//! The sync orchestrator.
//!
//! One [`SyncEngine`] drives a run: it resolves the configured tables
//! against the source schema, loads every table's identity index up
//! front so links can be remapped across tables, then reconciles tables
//! one at a time in declared order.
//!
//! Per table:
//! 1. fetch source candidates (all, or only those modified since the boundary)
//! 2. fetch the destination snapshot and build the identity index
//! 3. plan creates, updates and deletes
//! 4. transcode, suppressing updates that change nothing
//! 5. apply updates, then creates, then deletes, in chunks
//! 6. refresh the table's identity index from the destination

use std::collections::HashSet;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::{CollectionDescriptor, FieldDescriptor, FieldKind, NewRecord, Record, RecordUpdate};
use crate::store::RecordStore;

use super::batch::{BatchWriter, Operations, WriteKind};
use super::diff::{fields_changed, plan, PlanOptions};
use super::identity::{load_destination_tags, load_index, load_source_ids, IdentityIndex, RunContext};
use super::paginate::{fetch_all, FetchOptions};
use super::report::ProgressSink;
use super::trail::{walk, TrailStep};
use super::transcode::transcode;
use super::types::{PreparedTable, ReportEntry, RunReport, SyncPolicy, TableReport};

/// Reconciles a source store into a destination store.
pub struct SyncEngine<'a, S: RecordStore, D: RecordStore> {
    source: &'a S,
    destination: &'a D,
    config: &'a SyncConfig,
    policy: SyncPolicy,
}

/// Operations for one table, ready to apply.
struct TableWork {
    updates: Vec<RecordUpdate>,
    creates: Vec<NewRecord>,
    deletes: Vec<String>,
    report: TableReport,
    live: HashSet<String>,
}

impl<'a, S: RecordStore, D: RecordStore> SyncEngine<'a, S, D> {
    pub fn new(source: &'a S, destination: &'a D, config: &'a SyncConfig, policy: SyncPolicy) -> Self {
        Self {
            source,
            destination,
            config,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    fn source_id_field(&self) -> &str {
        &self.config.source_id_field
    }

    fn table_not_found(&self, name: &str) -> Error {
        Error::TableNotFound {
            name: name.to_string(),
            available: self.config.table_names(),
        }
    }

    /// Resolve every configured table against the source schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if a table lists no destination
    /// fields, or if a common link field targets a table that is not
    /// configured for sync.
    pub async fn prepare(&self) -> Result<Vec<PreparedTable>> {
        let configured: HashSet<&str> = self.config.tables.iter().map(|t| t.name.as_str()).collect();
        let mut prepared = Vec::with_capacity(self.config.tables.len());

        for table in &self.config.tables {
            if table.fields.iter().all(|f| f == self.source_id_field()) {
                return Err(Error::SchemaMismatch(format!(
                    "table `{}` has no destination fields configured",
                    table.name
                )));
            }
            let mut descriptor = if self.config.describe_source {
                self.source.describe(&table.name).await?
            } else {
                CollectionDescriptor::new(
                    table.name.clone(),
                    table
                        .fields
                        .iter()
                        .map(|f| FieldDescriptor::new(f.clone(), FieldKind::Plain))
                        .collect(),
                )
            };
            descriptor.apply_overrides(&table.kinds);

            let common = descriptor.common_fields(&table.fields);
            for missing in table.fields.iter().filter(|f| descriptor.field(f).is_none()) {
                if missing != self.source_id_field() {
                    tracing::warn!(table = %table.name, field = %missing, "Destination field has no source counterpart");
                }
            }
            for field in &common {
                if let Some(target) = field.kind.link_target() {
                    if !configured.contains(target) {
                        return Err(Error::SchemaMismatch(format!(
                            "{}.{} links to table `{target}`, which is not configured for sync",
                            table.name, field.name
                        )));
                    }
                }
            }

            let mut destination_fields = table.fields.clone();
            if !destination_fields.iter().any(|f| f == self.source_id_field()) {
                destination_fields.push(self.source_id_field().to_string());
            }

            tracing::debug!(table = %table.name, common = common.len(), "Prepared table");
            prepared.push(PreparedTable {
                name: table.name.clone(),
                common,
                destination_fields,
                visibility_field: table.visibility_field.clone(),
            });
        }

        Ok(prepared)
    }

    /// Load identity indexes for every table.
    pub async fn load_context(&self, tables: &[PreparedTable]) -> Result<RunContext> {
        let mut context = RunContext::new();
        for table in tables {
            let index = load_index(
                self.source,
                self.destination,
                &table.name,
                table.probe_field(),
                self.source_id_field(),
            )
            .await?;
            tracing::debug!(table = %table.name, mapped = index.map.len(), "Loaded identity map");
            context.replace(table.name.clone(), index);
        }
        Ok(context)
    }

    /// Reconcile every configured table, or only `only_tables` if non-empty.
    ///
    /// Tables are processed in declared order regardless of the order of
    /// `only_tables`. The first fatal error aborts the run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableNotFound`] for an unknown table name, and any
    /// store or schema error raised while syncing.
    pub async fn run(&self, only_tables: &[String], sink: &mut dyn ProgressSink) -> Result<RunReport> {
        if let Some(unknown) = only_tables.iter().find(|t| self.config.table(t).is_none()) {
            return Err(self.table_not_found(unknown));
        }

        let tables = self.prepare().await?;
        let mut context = self.load_context(&tables).await?;

        tracing::info!(
            tables = tables.len(),
            incremental = self.policy.boundary.is_some(),
            dry_run = self.policy.dry_run,
            "Starting sync"
        );

        let mut report = RunReport {
            since: self.policy.boundary.map(|b| b.encode()),
            dry_run: self.policy.dry_run,
            ..RunReport::default()
        };
        for table in &tables {
            if !only_tables.is_empty() && !only_tables.contains(&table.name) {
                continue;
            }
            sink.table_started(&table.name);
            let table_report = self.sync_table(table, &mut context, sink).await?;
            sink.table_finished(&table_report);
            report.tables.push(table_report);
        }

        tracing::info!(
            created = report.created(),
            updated = report.updated(),
            deleted = report.deleted(),
            "Sync finished"
        );
        Ok(report)
    }

    async fn sync_table(
        &self,
        table: &PreparedTable,
        context: &mut RunContext,
        sink: &mut dyn ProgressSink,
    ) -> Result<TableReport> {
        let source_fields = table.source_fields();
        let candidates = fetch_all(
            self.source,
            &table.name,
            FetchOptions {
                fields: source_fields.as_deref(),
                modified_after: self.policy.boundary,
                ..FetchOptions::default()
            },
        )
        .await?;

        // Deletion is always judged against the full live set.
        let live: HashSet<String> = match self.policy.boundary {
            Some(_) => load_source_ids(self.source, &table.name, table.probe_field()).await?,
            None => candidates.iter().map(|r| r.id.clone()).collect(),
        };

        let destination = fetch_all(
            self.destination,
            &table.name,
            FetchOptions {
                fields: Some(&table.destination_fields),
                ..FetchOptions::default()
            },
        )
        .await?;
        tracing::debug!(
            table = %table.name,
            candidates = candidates.len(),
            live = live.len(),
            destination = destination.len(),
            "Fetched snapshots"
        );

        context.replace(
            table.name.clone(),
            IdentityIndex::build(live, destination, self.source_id_field()),
        );
        let work = self.plan_table(table, &candidates, context)?;

        self.apply_work(table, work, context, sink).await
    }

    /// Turn a table's plan into transcoded operations.
    fn plan_table(&self, table: &PreparedTable, candidates: &[Record], context: &RunContext) -> Result<TableWork> {
        let index = context
            .index(&table.name)
            .ok_or_else(|| self.table_not_found(&table.name))?;
        let plan = plan(
            candidates,
            index,
            PlanOptions {
                visibility_field: table.visibility_field.as_deref(),
                excluded: self.policy.excluded,
                delete_untagged: self.policy.delete_untagged,
            },
        );

        let mut report = TableReport::new(table.name.clone(), self.policy.dry_run);
        report.excluded = plan.excluded;
        report.retained = plan.retained.iter().map(|r| ReportEntry::of(r)).collect();
        report.untagged = plan.untagged.iter().map(|r| ReportEntry::of(r)).collect();

        let mut updates = Vec::with_capacity(plan.updates.len());
        for (source, destination_id) in &plan.updates {
            let fields = transcode(source, &table.common, context, self.source_id_field())?;
            if self.policy.suppress_unchanged {
                if let Some(existing) = index.destination(&source.id) {
                    if !fields_changed(&existing.fields, &fields, &table.common) {
                        report.unchanged += 1;
                        continue;
                    }
                }
            }
            report.updated.push(ReportEntry::of(source));
            updates.push(RecordUpdate {
                id: destination_id.clone(),
                fields,
            });
        }

        let mut creates = Vec::with_capacity(plan.creates.len());
        for source in &plan.creates {
            let fields = transcode(source, &table.common, context, self.source_id_field())?;
            report.created.push(ReportEntry::of(source));
            creates.push(NewRecord { fields });
        }

        let deletes = plan.deletes.iter().map(|r| r.id.clone()).collect();
        report.deleted = plan.deletes.iter().map(|r| ReportEntry::of(r)).collect();

        Ok(TableWork {
            updates,
            creates,
            deletes,
            report,
            live: index.live.clone(),
        })
    }

    async fn apply_work(
        &self,
        table: &PreparedTable,
        work: TableWork,
        context: &mut RunContext,
        sink: &mut dyn ProgressSink,
    ) -> Result<TableReport> {
        let TableWork {
            updates,
            creates,
            deletes,
            report,
            live,
        } = work;
        let writer = BatchWriter::new(self.destination);

        let batches = [
            (Operations::Update(updates), report.updated.as_slice()),
            (Operations::Create(creates), report.created.as_slice()),
            (Operations::Delete(deletes), report.deleted.as_slice()),
        ];
        for (operations, entries) in batches {
            if operations.is_empty() {
                continue;
            }
            sink.actions(&table.name, operations.kind(), entries);
            if self.policy.dry_run {
                continue;
            }
            let applied = writer.apply(&table.name, &operations).await?;
            tracing::info!(table = %table.name, kind = %operations.kind(), count = applied, "Applied");
        }

        if !self.policy.dry_run && report.operations() > 0 {
            let tags = load_destination_tags(self.destination, &table.name, self.source_id_field()).await?;
            context.replace(
                table.name.clone(),
                IdentityIndex::build(live, tags, self.source_id_field()),
            );
        }

        Ok(report)
    }

    /// Sync one source record and the records its links lead to.
    ///
    /// The record's table goes first; linked records follow in breadth-first
    /// order, each created or updated individually. The table's identity
    /// index is refreshed after every write so later steps link to it.
    ///
    /// # Errors
    ///
    /// - [`Error::TableNotFound`] if the table is not configured
    /// - [`Error::RecordNotFound`] if the record does not exist in the source
    /// - [`Error::InvalidArgument`] if the record fails its visibility check
    pub async fn sync_record(&self, table: &str, record_id: &str, sink: &mut dyn ProgressSink) -> Result<RunReport> {
        if self.config.table(table).is_none() {
            return Err(self.table_not_found(table));
        }
        let root = self
            .source
            .fetch_record(table, record_id)
            .await?
            .ok_or_else(|| Error::RecordNotFound {
                table: table.to_string(),
                id: record_id.to_string(),
            })?;

        let tables = self.prepare().await?;
        let root_table = tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| self.table_not_found(table))?;
        if !root_table.is_visible(&root) {
            return Err(Error::InvalidArgument(format!(
                "record {record_id} in {table} does not have `{}` set",
                root_table.visibility_field.as_deref().unwrap_or_default()
            )));
        }

        let mut context = self.load_context(&tables).await?;
        let steps = walk(self.source, &tables, table, root, self.policy.max_link_depth).await?;
        tracing::info!(table, record = record_id, steps = steps.len(), "Walked link trail");

        let mut report = RunReport {
            dry_run: self.policy.dry_run,
            ..RunReport::default()
        };
        for step in &steps {
            let prepared = tables
                .iter()
                .find(|t| t.name == step.table)
                .ok_or_else(|| self.table_not_found(&step.table))?;
            let entry = self.sync_step(prepared, step, &mut context, sink).await?;

            let position = report.tables.iter().position(|t| t.table == step.table);
            let table_report = match position {
                Some(i) => &mut report.tables[i],
                None => {
                    report
                        .tables
                        .push(TableReport::new(step.table.clone(), self.policy.dry_run));
                    let last = report.tables.len() - 1;
                    &mut report.tables[last]
                }
            };
            match entry {
                (WriteKind::Create, entry) => table_report.created.push(entry),
                (_, entry) => table_report.updated.push(entry),
            }
        }

        for table_report in &report.tables {
            sink.table_finished(table_report);
        }
        Ok(report)
    }

    async fn sync_step(
        &self,
        table: &PreparedTable,
        step: &TrailStep,
        context: &mut RunContext,
        sink: &mut dyn ProgressSink,
    ) -> Result<(WriteKind, ReportEntry)> {
        match &step.via {
            Some(origin) => tracing::debug!(
                from = %origin.table,
                origin = %origin.record_name,
                field = %origin.field,
                table = %step.table,
                record = %step.record.id,
                "Following link"
            ),
            None => sink.table_started(&step.table),
        }

        let fields = transcode(&step.record, &table.common, context, self.source_id_field())?;
        let existing = context
            .map(&table.name)
            .and_then(|map| map.get(&step.record.id))
            .map(str::to_string);
        let entry = ReportEntry::of(&step.record);

        let operations = match existing {
            Some(id) => Operations::Update(vec![RecordUpdate { id, fields }]),
            None => Operations::Create(vec![NewRecord { fields }]),
        };
        let kind = operations.kind();
        sink.actions(&table.name, kind, std::slice::from_ref(&entry));

        if !self.policy.dry_run {
            BatchWriter::new(self.destination).apply(&table.name, &operations).await?;
            let live = context
                .index(&table.name)
                .map(|index| index.live.clone())
                .unwrap_or_default();
            let tags = load_destination_tags(self.destination, &table.name, self.source_id_field()).await?;
            context.replace(
                table.name.clone(),
                IdentityIndex::build(live, tags, self.source_id_field()),
            );
        }

        Ok((kind, entry))
    }

    /// Tag existing destination records with their source identity.
    ///
    /// For every configured table, each destination record is matched to
    /// source records by `match_field`. Exactly one match queues an update
    /// of the bookkeeping field; anything else is logged and skipped.
    /// Returns the number of records tagged.
    pub async fn populate_source_ids(&self, match_field: &str, sink: &mut dyn ProgressSink) -> Result<usize> {
        let fields = [match_field.to_string(), self.source_id_field().to_string()];
        let match_only = &fields[..1];
        let mut tagged = 0usize;

        for table in &self.config.tables {
            sink.table_started(&table.name);
            let source = fetch_all(
                self.source,
                &table.name,
                FetchOptions {
                    fields: Some(match_only),
                    ..FetchOptions::default()
                },
            )
            .await?;
            let destination = fetch_all(
                self.destination,
                &table.name,
                FetchOptions {
                    fields: Some(&fields),
                    ..FetchOptions::default()
                },
            )
            .await?;

            let source: Vec<&Record> = source
                .iter()
                .filter(|r| match r.get(match_field) {
                    Some(serde_json::Value::String(_)) => true,
                    other => {
                        tracing::warn!(
                            table = %table.name,
                            record = %r.id,
                            value = ?other,
                            "Source match value is not text; skipping"
                        );
                        false
                    }
                })
                .collect();

            let mut updates = Vec::new();
            let mut entries = Vec::new();
            for record in &destination {
                let Some(value) = record.get_str(match_field) else {
                    continue;
                };
                let matches: Vec<&&Record> = source
                    .iter()
                    .filter(|s| s.get_str(match_field) == Some(value))
                    .collect();
                match matches.as_slice() {
                    [only] => {
                        if record.get_str(self.source_id_field()) == Some(only.id.as_str()) {
                            continue;
                        }
                        let mut update_fields = crate::model::Fields::new();
                        update_fields.insert(
                            self.source_id_field().to_string(),
                            serde_json::Value::String(only.id.clone()),
                        );
                        entries.push(ReportEntry::of(record));
                        updates.push(RecordUpdate {
                            id: record.id.clone(),
                            fields: update_fields,
                        });
                    }
                    [] => tracing::warn!(table = %table.name, value, "No source record matches"),
                    many => tracing::warn!(
                        table = %table.name,
                        value,
                        count = many.len(),
                        "Several source records match; skipping"
                    ),
                }
            }

            let operations = Operations::Update(updates);
            sink.actions(&table.name, WriteKind::Update, &entries);
            if !self.policy.dry_run && !operations.is_empty() {
                BatchWriter::new(self.destination).apply(&table.name, &operations).await?;
            }
            tagged += operations.len();

            let mut report = TableReport::new(table.name.clone(), self.policy.dry_run);
            report.updated = entries;
            sink.table_finished(&report);
        }

        Ok(tagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::store::{MemoryStore, StoreCall};
    use crate::sync::{Boundary, ExcludedPolicy};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn fruit_config() -> SyncConfig {
        SyncConfig {
            tables: vec![TableConfig::new("Fruits", vec!["Name".into(), "Color".into()])],
            ..SyncConfig::default()
        }
    }

    fn names(store: &MemoryStore, table: &str) -> Vec<String> {
        let mut names: Vec<String> = store
            .records(table)
            .iter()
            .filter_map(|r| r.get_str("Name").map(str::to_string))
            .collect();
        names.sort();
        names
    }

    async fn run(source: &MemoryStore, destination: &MemoryStore, config: &SyncConfig, policy: SyncPolicy) -> RunReport {
        SyncEngine::new(source, destination, config, policy)
            .run(&[], &mut ())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_apple_banana_scenario() {
        let config = fruit_config();
        let source = MemoryStore::new("src");
        let apple = source.insert("Fruits", json!({"Name": "Apple", "Color": "red"}));
        let banana = source.insert("Fruits", json!({"Name": "Banana", "Color": "yellow"}));
        let destination = MemoryStore::with_tables("dst", &["Fruits"]);

        let first = run(&source, &destination, &config, SyncPolicy::default()).await;
        assert_eq!(first.created(), 2);
        assert_eq!(names(&destination, "Fruits"), vec!["Apple", "Banana"]);
        let tags: HashSet<String> = destination
            .records("Fruits")
            .iter()
            .filter_map(|r| r.get_str("SourceId").map(str::to_string))
            .collect();
        assert_eq!(tags, HashSet::from([apple.clone(), banana.clone()]));

        source.remove("Fruits", &banana);
        let second = run(&source, &destination, &config, SyncPolicy::default()).await;
        assert_eq!(second.deleted(), 1);
        assert_eq!(second.updated(), 0);
        assert_eq!(second.created(), 0);
        assert_eq!(names(&destination, "Fruits"), vec!["Apple"]);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let config = fruit_config();
        let source = MemoryStore::new("src");
        for i in 0..23 {
            source.insert("Fruits", json!({"Name": format!("f{i}"), "Color": "green"}));
        }
        let destination = MemoryStore::with_tables("dst", &["Fruits"]);

        let first = run(&source, &destination, &config, SyncPolicy::default()).await;
        assert_eq!(first.created(), 23);
        assert_eq!(destination.write_calls().len(), 3);

        destination.clear_calls();
        let second = run(&source, &destination, &config, SyncPolicy::default()).await;
        assert_eq!(second.operations(), 0);
        assert_eq!(second.tables[0].unchanged, 23);
        assert!(destination.write_calls().is_empty());
    }

    #[tokio::test]
    async fn test_changed_field_is_updated() {
        let config = fruit_config();
        let source = MemoryStore::new("src");
        let apple = source.insert("Fruits", json!({"Name": "Apple", "Color": "red"}));
        let destination = MemoryStore::with_tables("dst", &["Fruits"]);
        run(&source, &destination, &config, SyncPolicy::default()).await;

        source.touch("Fruits", &apple, json!({"Color": "green"}), Utc::now());
        let report = run(&source, &destination, &config, SyncPolicy::default()).await;
        assert_eq!(report.updated(), 1);
        assert_eq!(destination.records("Fruits")[0].get_str("Color"), Some("green"));
    }

    #[tokio::test]
    async fn test_untagged_destination_records_survive() {
        let config = fruit_config();
        let source = MemoryStore::new("src");
        source.insert("Fruits", json!({"Name": "Apple"}));
        let destination = MemoryStore::new("dst");
        destination.insert("Fruits", json!({"Name": "Hand-made"}));

        let report = run(&source, &destination, &config, SyncPolicy::default()).await;
        assert_eq!(report.deleted(), 0);
        assert_eq!(report.tables[0].untagged.len(), 1);
        assert_eq!(names(&destination, "Fruits"), vec!["Apple", "Hand-made"]);
    }

    #[tokio::test]
    async fn test_links_use_destination_identities() {
        let mut contacts = TableConfig::new("Contacts", vec!["Name".into(), "Company".into()]);
        contacts
            .kinds
            .insert("Company".into(), FieldKind::LinkList("Companies".into()));
        let config = SyncConfig {
            tables: vec![TableConfig::new("Companies", vec!["Name".into()]), contacts],
            ..SyncConfig::default()
        };

        let source = MemoryStore::new("src");
        let acme = source.insert("Companies", json!({"Name": "Acme"}));
        source.insert("Contacts", json!({"Name": "Ada", "Company": [acme]}));
        let destination = MemoryStore::with_tables("dst", &["Companies", "Contacts"]);

        run(&source, &destination, &config, SyncPolicy::default()).await;

        let dest_acme = destination.records("Companies")[0].id.clone();
        assert_ne!(dest_acme, acme);
        let ada = &destination.records("Contacts")[0];
        assert_eq!(ada.get("Company"), Some(&json!([dest_acme])));
    }

    #[tokio::test]
    async fn test_unconfigured_link_target_is_schema_mismatch() {
        let mut contacts = TableConfig::new("Contacts", vec!["Company".into()]);
        contacts
            .kinds
            .insert("Company".into(), FieldKind::LinkList("Companies".into()));
        let config = SyncConfig {
            tables: vec![contacts],
            ..SyncConfig::default()
        };
        let source = MemoryStore::with_tables("src", &["Contacts"]);
        let destination = MemoryStore::with_tables("dst", &["Contacts"]);

        let err = SyncEngine::new(&source, &destination, &config, SyncPolicy::default())
            .run(&[], &mut ())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn test_incremental_only_touches_modified_but_deletes_removed() {
        let config = fruit_config();
        let source = MemoryStore::new("src");
        let long_ago = Utc::now() - Duration::days(30);
        source.insert_at("Fruits", "s1", json!({"Name": "Apple"}), long_ago);
        source.insert_at("Fruits", "s2", json!({"Name": "Banana"}), long_ago);
        source.insert_at("Fruits", "s3", json!({"Name": "Cherry"}), long_ago);
        let destination = MemoryStore::with_tables("dst", &["Fruits"]);
        run(&source, &destination, &config, SyncPolicy::default()).await;

        let boundary = Boundary::from_datetime(Utc::now() - Duration::days(1));
        source.touch("Fruits", "s1", json!({"Name": "Apricot"}), Utc::now());
        source.remove("Fruits", "s3");
        destination.clear_calls();

        let policy = SyncPolicy {
            boundary: Some(boundary),
            ..SyncPolicy::default()
        };
        let report = run(&source, &destination, &config, policy).await;
        assert_eq!(report.updated(), 1);
        assert_eq!(report.deleted(), 1);
        assert_eq!(report.created(), 0);
        assert_eq!(report.since, Some(boundary.encode()));
        assert_eq!(names(&destination, "Fruits"), vec!["Apricot", "Banana"]);
    }

    #[tokio::test]
    async fn test_visibility_retain_policy() {
        let mut table = TableConfig::new("Contacts", vec!["Name".into()]);
        table.visibility_field = Some("Allow Sync".into());
        let config = SyncConfig {
            tables: vec![table],
            ..SyncConfig::default()
        };
        let source = MemoryStore::new("src");
        let ada = source.insert("Contacts", json!({"Name": "Ada", "Allow Sync": true}));
        source.insert("Contacts", json!({"Name": "Hidden"}));
        let destination = MemoryStore::with_tables("dst", &["Contacts"]);

        let report = run(&source, &destination, &config, SyncPolicy::default()).await;
        assert_eq!(report.created(), 1);
        assert_eq!(report.tables[0].excluded, 1);

        source.touch("Contacts", &ada, json!({"Allow Sync": false}), Utc::now());
        let retain = SyncPolicy {
            excluded: ExcludedPolicy::Retain,
            ..SyncPolicy::default()
        };
        let report = run(&source, &destination, &config, retain).await;
        assert_eq!(report.deleted(), 0);
        assert_eq!(report.tables[0].retained.len(), 1);

        let report = run(&source, &destination, &config, SyncPolicy::default()).await;
        assert_eq!(report.deleted(), 1);
        assert!(destination.records("Contacts").is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let config = fruit_config();
        let source = MemoryStore::new("src");
        source.insert("Fruits", json!({"Name": "Apple"}));
        let destination = MemoryStore::with_tables("dst", &["Fruits"]);
        let policy = SyncPolicy {
            dry_run: true,
            ..SyncPolicy::default()
        };

        let report = run(&source, &destination, &config, policy).await;
        assert_eq!(report.created(), 1);
        assert!(report.dry_run);
        assert!(destination.write_calls().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_aborts_run() {
        let config = SyncConfig {
            tables: vec![
                TableConfig::new("Fruits", vec!["Name".into()]),
                TableConfig::new("Vegetables", vec!["Name".into()]),
            ],
            ..SyncConfig::default()
        };
        let source = MemoryStore::new("src");
        source.insert("Fruits", json!({"Name": "Apple"}));
        source.insert("Vegetables", json!({"Name": "Leek"}));
        let destination = MemoryStore::with_tables("dst", &["Fruits", "Vegetables"]);
        destination.fail_write_at(0);

        let err = SyncEngine::new(&source, &destination, &config, SyncPolicy::default())
            .run(&[], &mut ())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 6);
        assert!(destination.records("Vegetables").is_empty());
    }

    #[derive(Default)]
    struct RecordingSink {
        actions: Vec<(String, WriteKind, Vec<String>)>,
        finished: Vec<String>,
    }

    impl ProgressSink for RecordingSink {
        fn actions(&mut self, table: &str, kind: WriteKind, entries: &[ReportEntry]) {
            let names = entries.iter().map(|e| e.name.clone()).collect();
            self.actions.push((table.to_string(), kind, names));
        }

        fn table_finished(&mut self, report: &TableReport) {
            self.finished.push(report.table.clone());
        }
    }

    #[tokio::test]
    async fn test_actions_reported_before_failing_write() {
        let config = fruit_config();
        let source = MemoryStore::new("src");
        source.insert_at("Fruits", "s1", json!({"Name": "Apple"}), Utc::now());
        let destination = MemoryStore::with_tables("dst", &["Fruits"]);
        run(&source, &destination, &config, SyncPolicy::default()).await;

        source.touch("Fruits", "s1", json!({"Name": "Apricot"}), Utc::now());
        source.insert_at("Fruits", "s2", json!({"Name": "Banana"}), Utc::now());
        // The update goes through, the create fails.
        destination.fail_write_at(1);

        let mut sink = RecordingSink::default();
        let err = SyncEngine::new(&source, &destination, &config, SyncPolicy::default())
            .run(&[], &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Remote { .. }));
        assert_eq!(
            sink.actions,
            vec![
                ("Fruits".to_string(), WriteKind::Update, vec!["Apricot".to_string()]),
                ("Fruits".to_string(), WriteKind::Create, vec!["Banana".to_string()]),
            ]
        );
        assert!(sink.finished.is_empty());
        assert_eq!(names(&destination, "Fruits"), vec!["Apricot"]);
    }

    #[tokio::test]
    async fn test_table_without_destination_fields_is_rejected() {
        let config = SyncConfig {
            tables: vec![TableConfig::new("Fruits", Vec::new())],
            ..SyncConfig::default()
        };
        let source = MemoryStore::new("src");
        source.insert("Fruits", json!({"Name": "Apple"}));
        let destination = MemoryStore::with_tables("dst", &["Fruits"]);

        let err = SyncEngine::new(&source, &destination, &config, SyncPolicy::default())
            .run(&[], &mut ())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SchemaMismatch(_)));
        assert_eq!(err.exit_code(), 5);
        assert!(destination.records("Fruits").is_empty());
        assert!(destination.write_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_filter() {
        let config = fruit_config();
        let source = MemoryStore::with_tables("src", &["Fruits"]);
        let destination = MemoryStore::with_tables("dst", &["Fruits"]);
        let err = SyncEngine::new(&source, &destination, &config, SyncPolicy::default())
            .run(&["Fruit".into()], &mut ())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TableNotFound { .. }));
    }

    fn linked_config() -> SyncConfig {
        let mut contacts = TableConfig::new("Contacts", vec!["Name".into(), "Company".into()]);
        contacts
            .kinds
            .insert("Company".into(), FieldKind::LinkList("Companies".into()));
        contacts.visibility_field = Some("Allow Sync".into());
        SyncConfig {
            tables: vec![TableConfig::new("Companies", vec!["Name".into()]), contacts],
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sync_record_follows_links() {
        let config = linked_config();
        let source = MemoryStore::new("src");
        let acme = source.insert("Companies", json!({"Name": "Acme"}));
        let ada = source.insert("Contacts", json!({"Name": "Ada", "Allow Sync": true, "Company": [acme]}));
        source.insert("Contacts", json!({"Name": "Other", "Allow Sync": true}));
        let destination = MemoryStore::with_tables("dst", &["Companies", "Contacts"]);

        let report = SyncEngine::new(&source, &destination, &config, SyncPolicy::default())
            .sync_record("Contacts", &ada, &mut ())
            .await
            .unwrap();

        assert_eq!(report.created(), 2);
        assert_eq!(report.tables[0].table, "Contacts");
        assert_eq!(names(&destination, "Contacts"), vec!["Ada"]);
        assert_eq!(names(&destination, "Companies"), vec!["Acme"]);

        // A second pass links Ada to the now-existing company and updates in place.
        let report = SyncEngine::new(&source, &destination, &config, SyncPolicy::default())
            .sync_record("Contacts", &ada, &mut ())
            .await
            .unwrap();
        assert_eq!(report.updated(), 2);
        let dest_acme = destination.records("Companies")[0].id.clone();
        assert_eq!(destination.records("Contacts")[0].get("Company"), Some(&json!([dest_acme])));
        let creates = destination
            .write_calls()
            .into_iter()
            .filter(|c| matches!(c, StoreCall::Create { .. }))
            .count();
        assert_eq!(creates, 2);
    }

    #[tokio::test]
    async fn test_sync_record_rejections() {
        let config = linked_config();
        let source = MemoryStore::new("src");
        let hidden = source.insert("Contacts", json!({"Name": "Hidden"}));
        source.create_table("Companies");
        let destination = MemoryStore::with_tables("dst", &["Companies", "Contacts"]);
        let engine = SyncEngine::new(&source, &destination, &config, SyncPolicy::default());

        let err = engine.sync_record("Contacts", &hidden, &mut ()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = engine.sync_record("Contacts", "recMissing", &mut ()).await.unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }));

        let err = engine.sync_record("Nope", &hidden, &mut ()).await.unwrap_err();
        assert!(matches!(err, Error::TableNotFound { .. }));
    }

    #[tokio::test]
    async fn test_populate_source_ids() {
        let config = fruit_config();
        let source = MemoryStore::new("src");
        let apple = source.insert("Fruits", json!({"Name": "Apple"}));
        source.insert("Fruits", json!({"Name": "Pear"}));
        source.insert("Fruits", json!({"Name": "Pear"}));
        source.insert("Fruits", json!({"Name": {"error": "#ERROR!"}}));
        let destination = MemoryStore::new("dst");
        let dest_apple = destination.insert("Fruits", json!({"Name": "Apple"}));
        destination.insert("Fruits", json!({"Name": "Pear"}));
        destination.insert("Fruits", json!({"Name": "Kiwi"}));

        let engine = SyncEngine::new(&source, &destination, &config, SyncPolicy::default());
        let tagged = engine.populate_source_ids("Name", &mut ()).await.unwrap();
        assert_eq!(tagged, 1);
        assert_eq!(
            destination.record("Fruits", &dest_apple).unwrap().get_str("SourceId"),
            Some(apple.as_str())
        );

        // Already tagged: nothing to do.
        assert_eq!(engine.populate_source_ids("Name", &mut ()).await.unwrap(), 0);
    }
}
