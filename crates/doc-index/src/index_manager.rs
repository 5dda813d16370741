use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use doc_store::{cache_key, CachedArtifact, IntentRecord, OpId, PrimitiveStep, StorageContext};
use doc_types::{
    ChangeKind, Chunk, ChunkWrite, ContentExtractor, DocumentId, DocumentRecord, DocumentState, Error,
    ExtractionMode, Fingerprint, KeywordGenerator, ProcessingOptions, SourceHandle, Vectorizer,
};

use crate::adapter::IndexAdapter;
use crate::change_detector::{detect_change, is_metadata_only_drift};
use crate::chunker::{attach_pairs, augment_chunk_text, chunk_text};

/// Tuning for the extraction deadline formula (spec §5): `base + per_page *
/// estimated_page_count`. Page count is not known before extraction runs, so
/// it is estimated from the input size using `bytes_per_page` as a rough
/// proxy; real page counts (once known) are used for nothing but logging.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub base: Duration,
    pub per_page: Duration,
    pub bytes_per_page: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig { base: Duration::from_secs(20), per_page: Duration::from_secs(2), bytes_per_page: 50_000 }
    }
}

impl TimeoutConfig {
    fn deadline_for(&self, content_len: usize) -> Duration {
        let pages = (content_len as u64 / self.bytes_per_page.max(1)).max(1);
        self.base + self.per_page * pages as u32
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig { chunk_size: 1000, chunk_overlap: 200 }
    }
}

/// Outcome of a single `ingest` call, reported back to callers (the Worker,
/// or a synchronous CLI invocation).
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub doc_id: DocumentId,
    pub change: ChangeKind,
    pub chunk_count: usize,
}

/// The transactional façade that carries out a `ChangeKind` across both
/// adapters and the Registry per the intent-log protocol (spec §4.6). This
/// is the only place in the workspace that writes to more than one store at
/// once; every other component sees a single store.
pub struct IndexManager {
    storage: Arc<StorageContext>,
    vector: Arc<dyn IndexAdapter>,
    keyword: Arc<dyn IndexAdapter>,
    extractor: Arc<dyn ContentExtractor>,
    vectorizer: Arc<dyn Vectorizer>,
    keyword_generator: Option<Arc<dyn KeywordGenerator>>,
    chunking: ChunkConfig,
    timeouts: TimeoutConfig,
    extractor_version: String,
    next_op_id: AtomicU64,
}

impl IndexManager {
    pub fn new(
        storage: Arc<StorageContext>,
        vector: Arc<dyn IndexAdapter>,
        keyword: Arc<dyn IndexAdapter>,
        extractor: Arc<dyn ContentExtractor>,
        vectorizer: Arc<dyn Vectorizer>,
        keyword_generator: Option<Arc<dyn KeywordGenerator>>,
        chunking: ChunkConfig,
        timeouts: TimeoutConfig,
        extractor_version: String,
    ) -> Result<Self, Error> {
        let rtxn = storage.env.read_txn()?;
        let seed = storage.intent_log.max_op_id(&rtxn)?.unwrap_or(0);
        drop(rtxn);
        Ok(IndexManager {
            storage,
            vector,
            keyword,
            extractor,
            vectorizer,
            keyword_generator,
            chunking,
            timeouts,
            extractor_version,
            next_op_id: AtomicU64::new(seed + 1),
        })
    }

    fn alloc_op_id(&self) -> OpId {
        self.next_op_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Gives the Worker Pool access to the shared environment so it can open
    /// its own transactions around job pull/finish without the scheduler
    /// needing its own `StorageContext`.
    pub fn storage(&self) -> &Arc<StorageContext> {
        &self.storage
    }

    /// Main ingest entry point (spec §4.5/§4.6): add, update, or no-op a
    /// source depending on what the Change Detector finds. Always runs to a
    /// terminal Registry state (`Ready` or `Failed`) before returning.
    #[instrument(skip(self, bytes, cancelled), fields(source = %source))]
    pub fn ingest(
        &self,
        source: SourceHandle,
        bytes: &[u8],
        declared_size: Option<u64>,
        declared_mtime: Option<i64>,
        options: ProcessingOptions,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<IngestOutcome, Error> {
        let source_key = source.normalized();
        // Content identity is the bytes alone: `declared_size`/`declared_mtime`
        // are compared separately below so a metadata-only drift (the file
        // was touched but its bytes are unchanged) doesn't masquerade as a
        // content change (spec §4.5).
        let content_fp = Fingerprint::of(bytes, None, None);
        let options_fp = options.fingerprint();

        let rtxn = self.storage.env.read_txn()?;
        let existing = self.storage.registry.find_by_source(&rtxn, &source_key)?;
        let consistency_ok = match &existing {
            Some(record) if record.state == DocumentState::Ready => {
                self.adapters_agree_with(record)?
            }
            _ => true,
        };
        drop(rtxn);

        let change = detect_change(existing.as_ref(), content_fp, options_fp, consistency_ok);
        info!(?change, "change detected");

        match change {
            ChangeKind::Unchanged => {
                let record = existing.expect("Unchanged implies a Ready record exists");
                if is_metadata_only_drift(&record, declared_size, declared_mtime) {
                    let doc_id = record.doc_id.clone();
                    let chunk_count = record.chunk_ids.len();
                    self.patch_metadata(&source_key, record, declared_size, declared_mtime)?;
                    return Ok(IngestOutcome { doc_id, change: ChangeKind::MetadataOnly, chunk_count });
                }
                self.touch(&record.doc_id)?;
                Ok(IngestOutcome { doc_id: record.doc_id, change, chunk_count: record.chunk_ids.len() })
            }
            ChangeKind::Corrupt => {
                let record = existing.expect("Corrupt implies a record exists");
                self.repair_one(&record.doc_id, cancelled)?;
                let rtxn = self.storage.env.read_txn()?;
                let refreshed = self.storage.registry.get(&rtxn, &record.doc_id)?.unwrap_or(record);
                Ok(IngestOutcome { doc_id: refreshed.doc_id, change, chunk_count: refreshed.chunk_ids.len() })
            }
            ChangeKind::NewDocument | ChangeKind::ContentChanged | ChangeKind::OptionsChanged => {
                self.reindex(
                    &source,
                    &source_key,
                    content_fp,
                    options_fp,
                    declared_size,
                    declared_mtime,
                    bytes,
                    &options,
                    existing.as_ref(),
                    change,
                    cancelled,
                )
            }
        }
    }

    /// Checks whether a `Ready` record's adapter-presence flags match what
    /// the adapters themselves report, without materializing a full
    /// workspace-wide `verify_consistency()` report on every ingest.
    fn adapters_agree_with(&self, record: &DocumentRecord) -> Result<bool, Error> {
        let expected = record.chunk_ids.len();
        let vector_ok = record.vector_indexed == self.vector.exists(&record.doc_id)?
            && (!record.vector_indexed || self.vector.count(Some(&record.doc_id))? == expected);
        let keyword_ok = record.keyword_indexed == self.keyword.exists(&record.doc_id)?
            && (!record.keyword_indexed || self.keyword.count(Some(&record.doc_id))? == expected);
        Ok(vector_ok && keyword_ok && record.is_consistent_when_ready())
    }

    fn touch(&self, doc_id: &DocumentId) -> Result<(), Error> {
        let mut wtxn = self.storage.env.write_txn()?;
        if let Some(mut record) = self.storage.registry.get(&wtxn, doc_id)? {
            record.updated_at = OffsetDateTime::now_utc();
            self.storage.registry.upsert(&mut wtxn, &record.source.normalized(), &record)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    /// `ChangeKind::MetadataOnly` (spec §4.5): patches the Registry's
    /// declared size/mtime in place and bumps `updated_at`, without touching
    /// either adapter or the Intent Log — there is no content to reindex.
    fn patch_metadata(
        &self,
        source_key: &str,
        mut record: DocumentRecord,
        declared_size: Option<u64>,
        declared_mtime: Option<i64>,
    ) -> Result<(), Error> {
        record.declared_size = declared_size;
        record.declared_mtime = declared_mtime;
        record.updated_at = OffsetDateTime::now_utc();
        let mut wtxn = self.storage.env.write_txn()?;
        self.storage.registry.upsert(&mut wtxn, source_key, &record)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Runs the full extract -> chunk -> augment -> embed -> index pipeline
    /// and commits the result via the intent-log protocol (spec §4.6 steps
    /// 1-4). Handles `NewDocument`, `ContentChanged`, and `OptionsChanged`
    /// identically past the point where the new `DocumentId` is computed,
    /// since all three are "produce a new document version and replace
    /// whatever the source previously pointed at".
    fn reindex(
        &self,
        source: &SourceHandle,
        source_key: &str,
        content_fp: Fingerprint,
        options_fp: Fingerprint,
        declared_size: Option<u64>,
        declared_mtime: Option<i64>,
        bytes: &[u8],
        options: &ProcessingOptions,
        existing: Option<&DocumentRecord>,
        change: ChangeKind,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<IngestOutcome, Error> {
        let doc_id = DocumentId::derive(source, content_fp, options_fp);
        let now = OffsetDateTime::now_utc();

        // Lifecycle: the record is created Pending the moment we decide to
        // do work, independent of the intent-log steps below (spec §3).
        {
            let mut wtxn = self.storage.env.write_txn()?;
            let mut pending =
                DocumentRecord::new_pending(doc_id.clone(), source.clone(), content_fp, options_fp, now);
            pending.declared_size = declared_size;
            pending.declared_mtime = declared_mtime;
            self.storage.registry.upsert(&mut wtxn, source_key, &pending)?;
            wtxn.commit()?;
        }

        let key = cache_key(&content_fp.0, &options.prompt, &self.extractor_version);
        let rtxn = self.storage.env.read_txn()?;
        let cached = self.storage.artifact_cache.get(&rtxn, &key)?;
        drop(rtxn);

        let (artifact, fresh_cache_put) = match cached {
            Some(artifact) => (artifact, None),
            None => {
                let extracted = match self.extract_with_deadline(bytes, options.mode, &options.prompt) {
                    Ok(out) => out,
                    Err(err) => {
                        let mut wtxn = self.storage.env.write_txn()?;
                        self.storage.registry.set_state(
                            &mut wtxn,
                            &doc_id,
                            DocumentState::Failed,
                            Some(err.to_string()),
                        )?;
                        wtxn.commit()?;
                        return Err(err);
                    }
                };
                let artifact = CachedArtifact {
                    text: extracted.text,
                    pairs: extracted.pairs,
                    parse_method: extracted.parse_method,
                    extractor_version: self.extractor_version.clone(),
                    cached_at: now,
                };
                (artifact.clone(), Some(artifact))
            }
        };

        let mut wtxn = self.storage.env.write_txn()?;
        self.storage.registry.set_state(&mut wtxn, &doc_id, DocumentState::Parsing, None)?;
        wtxn.commit()?;

        let mut chunks = chunk_text(
            &doc_id,
            source,
            &artifact.text,
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
            artifact.parse_method,
            None,
        );
        for chunk in &mut chunks {
            attach_pairs(chunk, &artifact.pairs);
            self.augment_with_keywords(chunk, &artifact.text);
        }

        let mut wtxn = self.storage.env.write_txn()?;
        self.storage.registry.set_state(&mut wtxn, &doc_id, DocumentState::Indexing, None)?;
        wtxn.commit()?;

        let writes = self.embed_chunks(chunks)?;
        let chunk_ids = writes.iter().map(|w| w.chunk.id.clone()).collect::<Vec<_>>();
        let chunk_count = chunk_ids.len();

        let mut ready = DocumentRecord::new_pending(doc_id.clone(), source.clone(), content_fp, options_fp, now);
        ready.declared_size = declared_size;
        ready.declared_mtime = declared_mtime;
        ready.chunk_ids = chunk_ids;
        ready.pairs = artifact.pairs.clone();
        ready.extraction_prompt = options.prompt.clone();
        ready.vector_indexed = true;
        ready.keyword_indexed = true;
        ready.state = DocumentState::Ready;
        ready.created_at = existing.map(|r| r.created_at).unwrap_or(now);
        ready.updated_at = now;

        let mut steps = Vec::new();
        if let Some(artifact) = fresh_cache_put {
            steps.push(PrimitiveStep::CachePut { key, artifact });
        }
        let replacing_old = existing.map(|r| r.doc_id != doc_id).unwrap_or(false);
        if replacing_old {
            let old_id = existing.unwrap().doc_id.clone();
            steps.push(PrimitiveStep::VectorDelete { doc_id: old_id.clone() });
            steps.push(PrimitiveStep::KeywordDelete { doc_id: old_id.clone() });
        }
        steps.push(PrimitiveStep::VectorAdd { doc_id: doc_id.clone(), writes: writes.clone() });
        steps.push(PrimitiveStep::KeywordAdd { doc_id: doc_id.clone(), writes });
        steps.push(PrimitiveStep::RegistryWrite { record: ready });
        if replacing_old {
            steps.push(PrimitiveStep::RegistryDelete { doc_id: existing.unwrap().doc_id.clone() });
        }

        let op_id = self.alloc_op_id();
        let record = IntentRecord::new(op_id, doc_id.clone(), steps, now);
        {
            let mut wtxn = self.storage.env.write_txn()?;
            self.storage.intent_log.announce(&mut wtxn, &record)?;
            wtxn.commit()?;
        }

        self.apply_intent(&record, cancelled)?;

        Ok(IngestOutcome { doc_id, change, chunk_count })
    }

    fn augment_with_keywords(&self, chunk: &mut Chunk, doc_context: &str) {
        let Some(generator) = &self.keyword_generator else { return };
        match generator.augment(&chunk.text, doc_context) {
            Ok(keywords) if !keywords.is_empty() => {
                chunk.text = augment_chunk_text(&chunk.text, &keywords);
            }
            Ok(_) => {}
            Err(err) => {
                // Non-fatal by contract (spec §6): the chunk is indexed
                // unaugmented rather than failing the whole ingest.
                warn!(%err, chunk = %chunk.id, "keyword augmentation failed, indexing without it");
            }
        }
    }

    fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<ChunkWrite>, Error> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.vectorizer.embed(&texts)?;
        if embeddings.len() != chunks.len() {
            return Err(Error::VectorizerError(format!(
                "vectorizer returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        Ok(chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| ChunkWrite { chunk, embedding: Some(embedding) })
            .collect())
    }

    /// Runs the extractor on a dedicated thread so a hung upstream call
    /// cannot block the worker indefinitely (spec §5 suspension point (b)).
    /// Mid-call cancellation of the extractor itself is best-effort only:
    /// the spawned thread is detached and left to finish on its own if the
    /// deadline elapses first.
    fn extract_with_deadline(
        &self,
        bytes: &[u8],
        mode: ExtractionMode,
        prompt: &str,
    ) -> Result<doc_types::ExtractionOutput, Error> {
        let deadline = self.timeouts.deadline_for(bytes.len());
        let (tx, rx) = mpsc::channel();
        let extractor = Arc::clone(&self.extractor);
        let owned_bytes = bytes.to_vec();
        let owned_prompt = prompt.to_string();
        std::thread::spawn(move || {
            let result = extractor.extract(&owned_bytes, None, mode, &owned_prompt);
            let _ = tx.send(result);
        });
        match rx.recv_timeout(deadline) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::ExtractionTimeout(deadline)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(Error::ExtractionUpstream("extractor thread panicked".into()))
            }
        }
    }

    /// Applies an intent's remaining steps in order, starting from
    /// `record.next_step`, durably advancing progress after each one. This
    /// is the single code path used both by live execution and by
    /// `recover()` after a restart (spec §4.6 step 5).
    #[instrument(skip(self, record, cancelled), fields(op_id = record.op_id))]
    pub fn apply_intent(&self, record: &IntentRecord, cancelled: &dyn Fn() -> bool) -> Result<(), Error> {
        for idx in record.next_step..record.steps.len() {
            if cancelled() {
                let mut wtxn = self.storage.env.write_txn()?;
                self.storage.intent_log.mark_cancelled_as_in_progress(&mut wtxn, record.op_id)?;
                wtxn.commit()?;
                return Err(Error::Cancelled);
            }
            self.execute_step(&record.steps[idx])?;
            let mut wtxn = self.storage.env.write_txn()?;
            self.storage.intent_log.advance(&mut wtxn, record.op_id, idx + 1)?;
            wtxn.commit()?;
        }
        let mut wtxn = self.storage.env.write_txn()?;
        self.storage.intent_log.mark_committed(&mut wtxn, record.op_id)?;
        wtxn.commit()?;
        Ok(())
    }

    fn execute_step(&self, step: &PrimitiveStep) -> Result<(), Error> {
        match step {
            PrimitiveStep::CachePut { key, artifact } => {
                let mut wtxn = self.storage.env.write_txn()?;
                self.storage.artifact_cache.put(&mut wtxn, key, artifact)?;
                wtxn.commit()?;
            }
            PrimitiveStep::RegistryWrite { record } => {
                let mut wtxn = self.storage.env.write_txn()?;
                self.storage.registry.upsert(&mut wtxn, &record.source.normalized(), record)?;
                wtxn.commit()?;
            }
            PrimitiveStep::RegistryDelete { doc_id } => {
                let mut wtxn = self.storage.env.write_txn()?;
                self.storage.registry.delete(&mut wtxn, doc_id)?;
                wtxn.commit()?;
            }
            PrimitiveStep::VectorAdd { doc_id, writes } => self.vector.add(doc_id, writes)?,
            PrimitiveStep::VectorDelete { doc_id } => self.vector.delete(doc_id)?,
            PrimitiveStep::KeywordAdd { doc_id, writes } => self.keyword.add(doc_id, writes)?,
            PrimitiveStep::KeywordDelete { doc_id } => self.keyword.delete(doc_id)?,
        }
        Ok(())
    }

    /// Removes a document from both adapters and the Registry entirely
    /// (spec §4.4 `remove`, P4). Idempotent: removing an absent source is a
    /// no-op, not an error.
    #[instrument(skip(self, cancelled))]
    pub fn remove(&self, source: &SourceHandle, cancelled: &dyn Fn() -> bool) -> Result<(), Error> {
        let source_key = source.normalized();
        let rtxn = self.storage.env.read_txn()?;
        let Some(record) = self.storage.registry.find_by_source(&rtxn, &source_key)? else {
            return Ok(());
        };
        drop(rtxn);
        self.remove_doc(&record.doc_id, cancelled)
    }

    pub fn remove_doc(&self, doc_id: &DocumentId, cancelled: &dyn Fn() -> bool) -> Result<(), Error> {
        let mut wtxn = self.storage.env.write_txn()?;
        self.storage.registry.set_state(&mut wtxn, doc_id, DocumentState::Removing, None)?;
        wtxn.commit()?;

        let now = OffsetDateTime::now_utc();
        let steps = vec![
            PrimitiveStep::VectorDelete { doc_id: doc_id.clone() },
            PrimitiveStep::KeywordDelete { doc_id: doc_id.clone() },
            PrimitiveStep::RegistryDelete { doc_id: doc_id.clone() },
        ];
        let op_id = self.alloc_op_id();
        let record = IntentRecord::new(op_id, doc_id.clone(), steps, now);
        {
            let mut wtxn = self.storage.env.write_txn()?;
            self.storage.intent_log.announce(&mut wtxn, &record)?;
            wtxn.commit()?;
        }
        self.apply_intent(&record, cancelled)
    }

    /// Compares Registry state against what both adapters actually hold
    /// (spec §4.3).
    pub fn verify_consistency(&self) -> Result<doc_store::ConsistencyReport, Error> {
        let vector_ids = self.vector.doc_ids()?;
        let keyword_ids = self.keyword.doc_ids()?;
        let rtxn = self.storage.env.read_txn()?;
        self.storage.registry.verify_consistency(&rtxn, &vector_ids, &keyword_ids)
    }

    /// Drives targeted repair of one document found `Corrupt` (spec §4.6
    /// Repair): deletes orphaned adapter entries and re-adds whatever is
    /// missing, preferring the Artifact Cache over re-extraction.
    pub fn repair_one(&self, doc_id: &DocumentId, cancelled: &dyn Fn() -> bool) -> Result<(), Error> {
        let rtxn = self.storage.env.read_txn()?;
        let Some(record) = self.storage.registry.get(&rtxn, doc_id)? else {
            return Err(Error::Consistency { doc_id: doc_id.to_string(), detail: "repair on unknown doc".into() });
        };
        drop(rtxn);

        let vector_has = self.vector.exists(doc_id)?;
        let keyword_has = self.keyword.exists(doc_id)?;
        let now = OffsetDateTime::now_utc();
        let mut steps = Vec::new();

        let key = cache_key(&record.fingerprint.0, &record.extraction_prompt, &self.extractor_version);
        let rtxn = self.storage.env.read_txn()?;
        let cached = self.storage.artifact_cache.get(&rtxn, &key)?;
        drop(rtxn);

        let mut vector_fixed = vector_has;
        let mut keyword_fixed = keyword_has;

        if !vector_has || !keyword_has {
            let writes = if let Some(artifact) = cached {
                let chunks = chunk_text(
                    doc_id,
                    &record.source,
                    &artifact.text,
                    self.chunking.chunk_size,
                    self.chunking.chunk_overlap,
                    artifact.parse_method,
                    None,
                );
                self.embed_chunks(chunks)?
            } else {
                warn!(%doc_id, "repair: no cached artifact, cannot regenerate missing chunks");
                Vec::new()
            };
            if !vector_has && !writes.is_empty() {
                steps.push(PrimitiveStep::VectorAdd { doc_id: doc_id.clone(), writes: writes.clone() });
                vector_fixed = true;
            }
            if !keyword_has && !writes.is_empty() {
                steps.push(PrimitiveStep::KeywordAdd { doc_id: doc_id.clone(), writes });
                keyword_fixed = true;
            }
        }

        let mut fixed = record.clone();
        fixed.vector_indexed = vector_fixed;
        fixed.keyword_indexed = keyword_fixed;
        fixed.state = if vector_fixed && keyword_fixed { DocumentState::Ready } else { DocumentState::Failed };
        fixed.last_error = if vector_fixed && keyword_fixed {
            None
        } else {
            Some("repair could not fully restore adapter state: no cached artifact to regenerate from".into())
        };
        fixed.updated_at = now;
        steps.push(PrimitiveStep::RegistryWrite { record: fixed });

        let op_id = self.alloc_op_id();
        let intent = IntentRecord::new(op_id, doc_id.clone(), steps, now);
        {
            let mut wtxn = self.storage.env.write_txn()?;
            self.storage.intent_log.announce(&mut wtxn, &intent)?;
            wtxn.commit()?;
        }
        self.apply_intent(&intent, cancelled)
    }

    /// `maintenance cleanup` (spec §6): drops `Committed`/`Cancelled` intent
    /// records and stale Fingerprint Store entries older than `horizon`.
    /// Returns `(intents_dropped, fingerprints_dropped)`.
    pub fn compact(&self, horizon: OffsetDateTime) -> Result<(usize, usize), Error> {
        let mut wtxn = self.storage.env.write_txn()?;
        let intents_dropped = self.storage.intent_log.compact(&mut wtxn, horizon)?;
        let fingerprints_dropped = self.storage.fingerprint_store.sweep(&mut wtxn, horizon)?;
        wtxn.commit()?;
        Ok((intents_dropped, fingerprints_dropped))
    }

    /// Startup recovery (spec §4.6 step 5, P5): re-plans and idempotently
    /// retries every `InProgress` intent left behind by a crash. Returns the
    /// number of intents resumed.
    #[instrument(skip(self))]
    pub fn recover(&self) -> Result<usize, Error> {
        let rtxn = self.storage.env.read_txn()?;
        let pending = self.storage.intent_log.in_progress(&rtxn)?;
        drop(rtxn);
        let count = pending.len();
        for record in &pending {
            info!(op_id = record.op_id, doc_id = %record.doc_id, "resuming in-progress intent after restart");
            self.apply_intent(record, &|| false)?;
        }
        Ok(count)
    }
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager").finish_non_exhaustive()
    }
}
