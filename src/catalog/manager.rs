//! Ingestion, replacement and deletion of sources in the cumulative catalog.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::store::CatalogStore;
use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::extract::MessageExtractor;
use crate::group::Clusterer;
use crate::model::attachment::AttachmentPayload;
use crate::model::catalog::{Catalog, Group, Source, SourceInfo};
use crate::model::message::{ExtractedMessage, MessageSummary};
use crate::parser::mbox::MboxParser;
use crate::search;

/// Format of `Source::ingested_at`.
const INGESTED_AT_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Outcome of one ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub source_id: String,
    pub archive_name: String,
    /// Envelopes found in the archive.
    pub envelopes: u64,
    /// Messages extracted from them.
    pub message_count: usize,
    pub group_count: usize,
    /// Whether an existing source with the same archive name was replaced.
    pub replaced: bool,
}

/// Everything extracted from one archive, not yet committed.
struct ArchiveBatch {
    archive_name: String,
    envelopes: u64,
    messages: Vec<ExtractedMessage>,
    payloads: Vec<(String, Vec<AttachmentPayload>)>,
    groups: Vec<Group>,
}

/// Owns the store and runs every catalog mutation as one
/// load → mutate → recompute totals → save transaction.
///
/// Mutators take `&mut self`; share a manager across threads behind a `Mutex`.
pub struct CatalogManager<S: CatalogStore> {
    store: S,
    config: Config,
    extractor: MessageExtractor,
    clusterer: Clusterer,
}

impl<S: CatalogStore> CatalogManager<S> {
    pub fn new(store: S, config: Config) -> Self {
        Self {
            extractor: MessageExtractor::new(&config),
            clusterer: Clusterer::from_config(&config),
            store,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The current catalog (empty when nothing has been ingested).
    pub fn catalog(&self) -> Result<Catalog> {
        Ok(self.store.load_catalog()?.unwrap_or_default())
    }

    pub fn sources(&self) -> Result<Vec<SourceInfo>> {
        Ok(self.catalog()?.sources.iter().map(Source::info).collect())
    }

    pub fn message(&self, id: &str) -> Result<Option<ExtractedMessage>> {
        self.store.load_message(id)
    }

    /// Case-insensitive search over the catalog. See [`search::search`].
    pub fn search(&self, query: &str) -> Result<Vec<MessageSummary>> {
        search::search(&self.store, &self.catalog()?, query)
    }

    /// Ingest `archive`, replacing in place a source with the same archive
    /// name (its id and ingestion time are kept), or appending a new one.
    pub fn ingest_full(
        &mut self,
        archive: &Path,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<IngestReport> {
        let batch = self.extract_archive(archive, progress)?;
        self.commit(batch, true)
    }

    /// Ingest `archive` as a new source, even if its name is already listed.
    pub fn ingest_incremental(
        &mut self,
        archive: &Path,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<IngestReport> {
        let batch = self.extract_archive(archive, progress)?;
        self.commit(batch, false)
    }

    /// Validate an uploaded archive, stage a copy, and ingest it incrementally.
    pub fn upload(
        &mut self,
        archive: &Path,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<IngestReport> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = &self.config.ingest.upload_extension;
        let has_extension = Path::new(&name)
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
        if !has_extension {
            return Err(CatalogError::InvalidUpload {
                name,
                reason: format!("only .{extension} files are accepted"),
            });
        }
        if !archive.is_file() {
            return Err(CatalogError::FileNotFound(archive.to_path_buf()));
        }

        let staged = self.store.stage_upload(archive)?;
        self.ingest_incremental(&staged, progress)
    }

    /// Wipe the store, then ingest `archive` from scratch.
    ///
    /// The archive is read before anything is removed, so it may live in the
    /// store's own upload area.
    pub fn reparse(
        &mut self,
        archive: &Path,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<IngestReport> {
        let batch = self.extract_archive(archive, progress)?;
        self.store.clear()?;
        info!(archive = %batch.archive_name, "Cleared catalog for re-parse");
        self.commit(batch, true)
    }

    /// Remove a source. Messages no other source lists are purged from the
    /// store together with their attachments. Returns `false` when no source
    /// has that id.
    pub fn delete_source(&mut self, source_id: &str) -> Result<bool> {
        let Some(mut catalog) = self.store.load_catalog()? else {
            return Ok(false);
        };
        let Some(pos) = catalog.sources.iter().position(|s| s.id == source_id) else {
            return Ok(false);
        };

        let removed = catalog.sources.remove(pos);
        catalog.recompute_totals();
        self.store.save_catalog(&catalog, &[])?;

        let kept: HashSet<&str> = catalog.summaries().map(|s| s.id.as_str()).collect();
        let exclusive: Vec<&str> = removed
            .message_ids()
            .into_iter()
            .filter(|id| !kept.contains(id))
            .collect();
        for id in &exclusive {
            self.store.delete_message_and_attachments(id)?;
        }

        // Another source may have been uploaded under the same name.
        if !catalog
            .sources
            .iter()
            .any(|s| s.archive_name == removed.archive_name)
        {
            self.store.remove_upload(&removed.archive_name)?;
        }

        info!(
            source_id,
            archive = %removed.archive_name,
            purged = exclusive.len(),
            shared = removed.message_count.saturating_sub(exclusive.len()),
            "Deleted source"
        );
        Ok(true)
    }

    fn extract_archive(
        &self,
        archive: &Path,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<ArchiveBatch> {
        let parser =
            MboxParser::new(archive)?.with_max_message_size(self.config.ingest.max_message_size);
        let archive_name = parser.archive_name();
        let total = parser.file_size();

        let mut messages = Vec::new();
        let mut payloads = Vec::new();
        let mut processed: u64 = 0;

        let envelopes = parser.parse(&mut |raw| {
            processed += raw.len() as u64;
            if let Some(report) = progress {
                report(processed.min(total), total);
            }
            if let Some((message, attachment_bytes)) =
                self.extractor.extract_with_payloads(raw, &archive_name)
            {
                payloads.push((message.id.clone(), attachment_bytes));
                messages.push(message);
            }
            true
        })?;

        let groups = self.clusterer.cluster(&mut messages);
        debug!(
            archive = %archive_name,
            envelopes,
            messages = messages.len(),
            groups = groups.len(),
            "Extracted archive"
        );

        Ok(ArchiveBatch {
            archive_name,
            envelopes,
            messages,
            payloads,
            groups,
        })
    }

    fn commit(&mut self, batch: ArchiveBatch, replace: bool) -> Result<IngestReport> {
        let mut catalog = self.store.load_catalog()?.unwrap_or_default();

        let existing = if replace {
            catalog
                .sources
                .iter()
                .position(|s| s.archive_name == batch.archive_name)
        } else {
            None
        };

        let (source_id, ingested_at) = match existing {
            Some(i) => (
                catalog.sources[i].id.clone(),
                catalog.sources[i].ingested_at.clone(),
            ),
            None => (
                self.store.generate_source_id(&batch.archive_name),
                chrono::Local::now().format(INGESTED_AT_FORMAT).to_string(),
            ),
        };

        for (id, attachment_bytes) in &batch.payloads {
            self.store.store_attachments(id, attachment_bytes)?;
        }

        let source = Source {
            id: source_id.clone(),
            archive_name: batch.archive_name.clone(),
            ingested_at,
            message_count: batch.messages.len(),
            groups: batch.groups,
            summaries: batch.messages.iter().map(ExtractedMessage::summary).collect(),
        };
        let group_count = source.groups.len();

        let previous = match existing {
            Some(i) => Some(std::mem::replace(&mut catalog.sources[i], source)),
            None => {
                catalog.sources.push(source);
                None
            }
        };
        catalog.recompute_totals();
        self.store.save_catalog(&catalog, &batch.messages)?;

        // Messages the replaced version listed that nothing lists any more.
        if let Some(previous) = previous {
            let kept: HashSet<&str> = catalog.summaries().map(|s| s.id.as_str()).collect();
            for id in previous.message_ids() {
                if !kept.contains(id) {
                    self.store.delete_message_and_attachments(id)?;
                }
            }
        }

        let report = IngestReport {
            source_id,
            archive_name: batch.archive_name,
            envelopes: batch.envelopes,
            message_count: batch.messages.len(),
            group_count,
            replaced: existing.is_some(),
        };
        info!(
            source_id = %report.source_id,
            archive = %report.archive_name,
            messages = report.message_count,
            groups = report.group_count,
            replaced = report.replaced,
            "Ingested archive"
        );
        Ok(report)
    }
}
