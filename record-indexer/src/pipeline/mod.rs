//! Pass orchestration.
//!
//! The pipeline drives three record populations: individual records per
//! data source, dedup-group members with their synthesized merged
//! document, and post-merge residuals. Each pass enumerates the record
//! store in keyset batches, projects and buffers documents, and persists
//! its watermark only after the pass (including the final commit) has
//! succeeded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use tracing::{debug, error, info, warn};

use record_indexer_repository::{RecordStore, StateStore};
use record_indexer_shared::{
    DataSourceSettings, DedupConstraint, IndexDocument, ParserFactory, Record, RecordFilter,
};
use record_indexer_solr::{payloads, UpdateTransport};

use crate::buffer::{UpdateBuffer, UpdateBufferConfig};
use crate::config::IndexerConfig;
use crate::errors::PipelineError;
use crate::merger::MergeEngine;
use crate::meter::PerformanceMeter;
use crate::projector::{Projection, RecordProjector};

/// Watermark key of the merged-records pass; the individual pass appends
/// the source id.
const GLOBAL_WATERMARK_KEY: &str = "Last Index Update";

/// Records fetched per store round trip.
const FETCH_BATCH: u32 = 1000;

/// Records between progress log lines.
const PROGRESS_INTERVAL: u64 = 1000;

/// Timeout for optimize and whole-source deletion requests.
const LONG_TIMEOUT: Duration = Duration::from_secs(3600);

/// Per-pass counters reported when a pass completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassStats {
    /// Documents sent to the backend.
    pub processed: u64,
    /// Deletions sent to the backend.
    pub deleted: u64,
    /// Component parts merged into host documents.
    pub merged_components: u64,
}

/// Mutable cursor state of one running pass.
#[derive(Default)]
struct PassState {
    stats: PassStats,
    sequence: u64,
    meter: PerformanceMeter,
}

impl PassState {
    fn tick(&mut self, context: &str) {
        self.meter.add(1);
        if self.meter.total() % PROGRESS_INTERVAL == 0 {
            info!(
                context = %context,
                processed = self.stats.processed,
                deleted = self.stats.deleted,
                records_per_sec = format!("{:.0}", self.meter.speed()),
                "Indexing progress"
            );
        }
    }
}

/// The indexing pipeline driver.
pub struct Pipeline {
    config: Arc<IndexerConfig>,
    store: Arc<dyn RecordStore>,
    state: Arc<dyn StateStore>,
    transport: Arc<dyn UpdateTransport>,
    projector: RecordProjector,
    merger: MergeEngine,
}

impl Pipeline {
    pub fn new(
        config: Arc<IndexerConfig>,
        store: Arc<dyn RecordStore>,
        state: Arc<dyn StateStore>,
        transport: Arc<dyn UpdateTransport>,
        parsers: Arc<dyn ParserFactory>,
    ) -> Self {
        let projector = RecordProjector::new(Arc::clone(&config), Arc::clone(&store), parsers);
        let merger = MergeEngine::new(config.merged_fields.iter().cloned());
        Self {
            config,
            store,
            state,
            transport,
            projector,
            merger,
        }
    }

    fn make_buffer(&self) -> UpdateBuffer {
        UpdateBuffer::new(
            Arc::clone(&self.transport),
            UpdateBufferConfig {
                max_update_records: self.config.solr.max_update_records,
                max_update_size: self.config.solr.max_update_size * 1024,
                commit_interval: self.config.solr.max_commit_interval,
            },
        )
    }

    /// Update the index documents of individual records, source by source.
    ///
    /// A failure in one data source is logged and does not stop the
    /// remaining sources; the failed source's watermark is left untouched.
    pub async fn update_individual_records(
        &self,
        from: Option<DateTime<Utc>>,
        source_id: Option<&str>,
        single_id: Option<&str>,
        no_commit: bool,
    ) -> Result<(), PipelineError> {
        let start = Utc::now();
        let mut buffer = self.make_buffer();
        let source_filter = normalize_source(source_id);

        let mut succeeded = 0u64;
        let mut failed = 0u64;
        let sources: Vec<&DataSourceSettings> = self
            .config
            .data_sources()
            .filter(|settings| source_filter.map_or(true, |f| settings.id == f))
            .collect();

        for settings in sources {
            match self
                .index_source(&mut buffer, settings, from, single_id, no_commit, start)
                .await
            {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    failed += 1;
                    error!(source = %settings.id, error = %e, "Indexing data source failed");
                }
            }
        }

        if buffer.total_written() > 0 && !no_commit {
            buffer.commit(None).await?;
        }
        info!(succeeded, failed, "Individual records update finished");
        Ok(())
    }

    async fn index_source(
        &self,
        buffer: &mut UpdateBuffer,
        settings: &DataSourceSettings,
        from: Option<DateTime<Utc>>,
        single_id: Option<&str>,
        no_commit: bool,
        start: DateTime<Utc>,
    ) -> Result<PassStats, PipelineError> {
        let watermark_key = format!("{GLOBAL_WATERMARK_KEY} {}", settings.id);
        let from_instant = match from {
            Some(instant) => Some(instant),
            None => self.state.last_index_update(&watermark_key).await?,
        };

        let mut filter = RecordFilter::all().with_source(&settings.id);
        if let Some(instant) = from_instant {
            filter = filter.with_updated_since(instant);
        }
        if let Some(id) = single_id {
            filter = filter.with_single_id(id);
        }

        if self.config.store.counts {
            let total = self.store.count_records(&filter).await?;
            info!(source = %settings.id, total, "Indexing records from data source");
        } else {
            info!(source = %settings.id, "Indexing records from data source");
        }

        let mut pass = PassState::default();
        let mut after: Option<String> = None;
        loop {
            let batch = self
                .store
                .fetch_records(&filter, after.as_deref(), FETCH_BATCH)
                .await?;
            let Some(last) = batch.last() else { break };
            after = Some(last.id.clone());

            for record in batch {
                if record.deleted {
                    buffer.delete(record.delete_key()).await?;
                    pass.stats.deleted += 1;
                } else {
                    match self.projector.project(&record).await? {
                        Projection::Document(projected) => {
                            pass.stats.merged_components += projected.merged_components;
                            pass.sequence += 1;
                            buffer
                                .add(projected.document, pass.sequence, no_commit)
                                .await?;
                            pass.stats.processed += 1;
                        }
                        Projection::Skipped => {}
                    }
                }
                pass.tick(&settings.id);
            }
        }

        buffer.flush().await?;
        if single_id.is_none() {
            self.state
                .save_last_index_update(&watermark_key, start)
                .await?;
        }
        info!(
            source = %settings.id,
            processed = pass.stats.processed,
            deleted = pass.stats.deleted,
            merged_components = pass.stats.merged_components,
            "Completed data source"
        );
        Ok(pass.stats)
    }

    /// Update merged documents and their group members, then the residual
    /// individual records without a dedup key.
    ///
    /// With `delete` set, the pass removes the records of `source_id` from
    /// their groups instead of re-indexing them, and the residual phase is
    /// skipped.
    pub async fn update_merged_records(
        &self,
        from: Option<DateTime<Utc>>,
        source_id: Option<&str>,
        single_id: Option<&str>,
        no_commit: bool,
        delete: bool,
    ) -> Result<(), PipelineError> {
        let start = Utc::now();
        let mut buffer = self.make_buffer();
        let source_filter = normalize_source(source_id);

        let from_instant = match from {
            Some(instant) => Some(instant),
            None => self.state.last_index_update(GLOBAL_WATERMARK_KEY).await?,
        };

        let mut pass = PassState::default();

        // Phase A: dedup groups.
        let mut group_filter = RecordFilter::all().with_dedup(DedupConstraint::Present);
        group_filter.source_id = source_filter.map(str::to_string);
        group_filter.updated_since = from_instant;
        group_filter.single_id = single_id.map(str::to_string);
        group_filter.exclude_update_pending = !delete;

        let table = self.prepare_dedup_group_table(&group_filter, from).await?;
        let mut after: Option<String> = None;
        loop {
            let keys = self
                .store
                .fetch_dedup_keys(&table, after.as_deref(), FETCH_BATCH)
                .await?;
            let Some(last) = keys.last() else { break };
            after = Some(last.clone());

            for dedup_key in &keys {
                self.process_dedup_group(
                    &mut buffer,
                    &mut pass,
                    dedup_key,
                    source_filter,
                    delete,
                    no_commit,
                )
                .await?;
            }
        }
        buffer.flush().await?;

        // Phase B: residual individuals.
        if !delete {
            let mut residual_filter = RecordFilter::all().with_dedup(DedupConstraint::Absent);
            residual_filter.source_id = source_filter.map(str::to_string);
            residual_filter.updated_since = from_instant;
            residual_filter.single_id = single_id.map(str::to_string);

            let mut after: Option<String> = None;
            loop {
                let batch = self
                    .store
                    .fetch_records(&residual_filter, after.as_deref(), FETCH_BATCH)
                    .await?;
                let Some(last) = batch.last() else { break };
                after = Some(last.id.clone());

                for record in batch {
                    self.process_residual(&mut buffer, &mut pass, &record, no_commit)
                        .await?;
                }
            }
            buffer.flush().await?;
        }

        // Phase C: final commit, then the watermark. The watermark only
        // advances once the whole pass, commit included, has succeeded.
        if buffer.total_written() > 0 && !no_commit {
            buffer.commit(None).await?;
        }
        if single_id.is_none() {
            self.state
                .save_last_index_update(GLOBAL_WATERMARK_KEY, start)
                .await?;
        }
        info!(
            processed = pass.stats.processed,
            deleted = pass.stats.deleted,
            merged_components = pass.stats.merged_components,
            "Merged records update finished"
        );
        Ok(())
    }

    async fn prepare_dedup_group_table(
        &self,
        filter: &RecordFilter,
        explicit_from: Option<DateTime<Utc>>,
    ) -> Result<String, PipelineError> {
        let newest = self.store.newest_record_updated().await?;
        let epoch = newest.map(|instant| instant.timestamp()).unwrap_or(0);
        let table = aux_table_name(filter, explicit_from, epoch);

        // The suffix binds the table to the store's freshness; anything
        // else in the namespace is stale.
        for existing in self.store.list_dedup_group_tables().await? {
            if existing != table {
                debug!(table = %existing, "Dropping stale dedup group table");
                self.store.drop_dedup_group_table(&existing).await?;
            }
        }

        if self.store.dedup_group_table_exists(&table).await? {
            info!(table = %table, "Reusing existing dedup group table");
        } else if let Err(e) = self.store.build_dedup_group_table(&table, filter).await {
            error!(table = %table, error = %e, "Failed to build dedup group table");
            return Err(e.into());
        }
        Ok(table)
    }

    async fn process_dedup_group(
        &self,
        buffer: &mut UpdateBuffer,
        pass: &mut PassState,
        dedup_key: &str,
        source_filter: Option<&str>,
        delete: bool,
        no_commit: bool,
    ) -> Result<(), PipelineError> {
        let members = self.store.records_in_group(dedup_key).await?;

        let mut merged = IndexDocument::new();
        let mut live: Vec<(Record, IndexDocument)> = Vec::new();
        for record in members {
            let purged = delete && source_filter.is_some_and(|s| record.source_id == s);
            if record.deleted || purged {
                buffer.delete(&record.id).await?;
                pass.stats.deleted += 1;
            } else {
                match self.projector.project(&record).await? {
                    Projection::Document(projected) => {
                        pass.stats.merged_components += projected.merged_components;
                        self.merger.merge(&mut merged, &projected.document);
                        live.push((record, projected.document));
                    }
                    Projection::Skipped => {}
                }
            }
            pass.tick(dedup_key);
        }

        if live.is_empty() {
            warn!(dedup_key = %dedup_key, "Dedup group has no live members");
            return Ok(());
        }

        if live.len() == 1 {
            // A stale merged document may carry the group's key.
            buffer.delete(dedup_key).await?;
            if let Some((record, document)) = live.into_iter().next() {
                if !delete {
                    warn!(
                        record_id = %record.id,
                        dedup_key = %dedup_key,
                        "Single record with a dedup key"
                    );
                }
                pass.sequence += 1;
                buffer.add(document, pass.sequence, no_commit).await?;
                pass.stats.processed += 1;
            }
            return Ok(());
        }

        for (record, mut document) in live {
            document.insert("merged_child_boolean", true);
            pass.sequence += 1;
            buffer.add(document, pass.sequence, no_commit).await?;
            pass.stats.processed += 1;

            // The record's former merged-representative id is obsolete.
            if let Some(key) = &record.key {
                if record.dedup_key.as_deref() != Some(key.as_str()) {
                    buffer.delete(key).await?;
                }
            }
        }

        self.merger.finalize(&mut merged);
        if merged.is_empty() {
            buffer.delete(dedup_key).await?;
        } else {
            if !merged.contains("allfields") {
                warn!(dedup_key = %dedup_key, "Merged document has no allfields");
            }
            merged.insert("id", dedup_key);
            merged.insert("recordtype", "merged");
            merged.insert("merged_boolean", true);
            pass.sequence += 1;
            buffer.add(merged, pass.sequence, no_commit).await?;
            pass.stats.processed += 1;
        }
        Ok(())
    }

    async fn process_residual(
        &self,
        buffer: &mut UpdateBuffer,
        pass: &mut PassState,
        record: &Record,
        no_commit: bool,
    ) -> Result<(), PipelineError> {
        if record.deleted {
            buffer.delete(&record.id).await?;
            pass.stats.deleted += 1;
            if let Some(key) = &record.key {
                if !self.store.has_live_group_member(key, &record.id).await? {
                    buffer.delete(key).await?;
                }
            }
        } else {
            // Clean up an orphaned merged document for this record's key.
            // Never enqueue a delete of the id being added in this pass.
            if let Some(key) = &record.key {
                if key != &record.id
                    && !self.store.has_live_group_member(key, &record.id).await?
                {
                    buffer.delete(key).await?;
                }
            }
            match self.projector.project(record).await? {
                Projection::Document(projected) => {
                    pass.stats.merged_components += projected.merged_components;
                    pass.sequence += 1;
                    buffer
                        .add(projected.document, pass.sequence, no_commit)
                        .await?;
                    pass.stats.processed += 1;
                }
                Projection::Skipped => {}
            }
        }
        pass.tick("residual");
        Ok(())
    }

    /// Remove every document of a data source from the index.
    pub async fn delete_data_source(&self, source_id: &str) -> Result<(), PipelineError> {
        info!(source = %source_id, "Deleting data source from index");
        self.transport
            .submit(payloads::delete_by_id_prefix(source_id), Some(LONG_TIMEOUT))
            .await?;
        self.transport
            .submit(payloads::COMMIT.to_string(), Some(LONG_TIMEOUT))
            .await?;
        self.transport.wait_idle().await?;
        Ok(())
    }

    /// Ask the backend to optimize the index.
    pub async fn optimize_index(&self) -> Result<(), PipelineError> {
        info!("Optimizing index");
        self.transport
            .submit(payloads::OPTIMIZE.to_string(), Some(LONG_TIMEOUT))
            .await?;
        self.transport.wait_idle().await?;
        Ok(())
    }

    /// Tally the projected values of a field across a source's live
    /// records, sorted by descending count. Makes no backend calls.
    pub async fn count_values(
        &self,
        source_id: &str,
        field: &str,
    ) -> Result<Vec<(String, u64)>, PipelineError> {
        let filter = RecordFilter::all().with_source(source_id);
        let mut tallies: HashMap<String, u64> = HashMap::new();

        let mut after: Option<String> = None;
        loop {
            let batch = self
                .store
                .fetch_records(&filter, after.as_deref(), FETCH_BATCH)
                .await?;
            let Some(last) = batch.last() else { break };
            after = Some(last.id.clone());

            for record in batch {
                if record.deleted {
                    continue;
                }
                if let Projection::Document(projected) = self.projector.project(&record).await? {
                    for value in projected.document.string_values(field) {
                        *tallies.entry(value).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut counts: Vec<(String, u64)> = tallies.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }
}

/// A source argument of `""` or `"*"` means every source.
fn normalize_source(source_id: Option<&str>) -> Option<&str> {
    source_id.filter(|s| !s.is_empty() && *s != "*")
}

/// Content-addressed auxiliary table name:
/// `mr_record_<digest>[_<from>]_<newest-record-epoch>`.
fn aux_table_name(
    filter: &RecordFilter,
    explicit_from: Option<DateTime<Utc>>,
    newest_epoch: i64,
) -> String {
    let mut hasher = Md5::new();
    hasher.update(filter.canonical_json().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    match explicit_from {
        Some(from) => format!("mr_record_{hex}_{}_{newest_epoch}", from.timestamp()),
        None => format!("mr_record_{hex}_{newest_epoch}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_source() {
        assert_eq!(normalize_source(None), None);
        assert_eq!(normalize_source(Some("")), None);
        assert_eq!(normalize_source(Some("*")), None);
        assert_eq!(normalize_source(Some("s1")), Some("s1"));
    }

    #[test]
    fn test_aux_table_name_is_content_addressed() {
        let epoch = 1_700_000_000;
        let a = RecordFilter::all().with_dedup(DedupConstraint::Present);
        let b = a.clone().with_source("s1");

        let name_a = aux_table_name(&a, None, epoch);
        let name_b = aux_table_name(&b, None, epoch);
        assert_ne!(name_a, name_b);
        assert_eq!(name_a, aux_table_name(&a, None, epoch));
        assert!(name_a.starts_with("mr_record_"));
        assert!(name_a.ends_with("_1700000000"));
    }

    #[test]
    fn test_aux_table_name_carries_explicit_from() {
        let filter = RecordFilter::all().with_dedup(DedupConstraint::Present);
        let from = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let name = aux_table_name(&filter, Some(from), 1_700_000_000);

        assert!(name.contains(&format!("_{}_", from.timestamp())));
        assert!(name.len() <= 63, "table name must fit the identifier limit");
    }
}
