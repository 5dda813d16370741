//! The facade callers actually hold: wraps the durable `JobQueue` and the
//! `WorkerPool` behind the handful of operations the CLI and the search
//! layer need (enqueue, cancel, status, recover), the way `IndexScheduler`
//! wraps `Queue` and `Scheduler` in the teacher crate. Unlike the teacher,
//! there is no autobatcher here: each job runs to completion on its own,
//! since there is no shared index write lock to amortize a batch over.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, instrument};

use doc_index::IndexManager;
use doc_types::{DocumentId, Error, ProcessingOptions, SourceHandle};

use crate::job::{Job, JobId, JobPayload, JobState, MaintenanceKind, Priority};
use crate::queue::JobQueue;
use crate::worker::{JobOutcome, SearchRunner, WorkerPool};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub worker_count: usize,
    pub max_attempts: u32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions { worker_count: 4, max_attempts: 5 }
    }
}

/// Startup/shutdown/enqueue surface over the Job Queue and Worker Pool. A
/// `Scheduler` is cheap to clone-by-reference (everything it owns is
/// already behind an `Arc`) but is itself handed out as `Arc<Scheduler>` so
/// the CLI and any embedding binary share one instance.
pub struct Scheduler {
    queue: Arc<JobQueue>,
    index_manager: Arc<IndexManager>,
    pool: Arc<WorkerPool>,
}

impl Scheduler {
    pub fn new(
        queue: Arc<JobQueue>,
        index_manager: Arc<IndexManager>,
        search_runner: Option<Arc<dyn SearchRunner>>,
        options: SchedulerOptions,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&queue),
            Arc::clone(&index_manager),
            search_runner,
            options.max_attempts,
        ));
        Scheduler { queue, index_manager, pool }
    }

    /// Startup reconciliation: any job still `Running` across a restart is
    /// requeued as `Pending`, then the Index Manager replays whatever
    /// Intent Log entries were left `InProgress` through the same step-
    /// application code path live execution uses. Must run to completion
    /// before `start` so the first batch of pulled jobs sees consistent
    /// state.
    #[instrument(skip(self))]
    pub fn recover(&self) -> Result<(usize, usize), Error> {
        let mut wtxn = self.queue.env().write_txn()?;
        let requeued = self.queue.requeue_running(&mut wtxn)?;
        wtxn.commit()?;
        let replayed = self.index_manager.recover()?;
        info!(requeued, replayed, "scheduler recovery complete");
        Ok((requeued, replayed))
    }

    pub fn start(&self, worker_count: usize) {
        self.pool.start(worker_count);
    }

    pub fn stop(&self) {
        self.pool.stop();
    }

    fn enqueue(&self, payload: JobPayload, priority: Priority) -> Result<JobId, Error> {
        let mut wtxn = self.queue.env().write_txn()?;
        let job = Job::new(0, payload, priority, OffsetDateTime::now_utc());
        let job_id = self.queue.enqueue(&mut wtxn, job)?;
        wtxn.commit()?;
        self.pool.wake();
        Ok(job_id)
    }

    pub fn enqueue_add(&self, source: SourceHandle, options: ProcessingOptions) -> Result<JobId, Error> {
        self.enqueue(JobPayload::Add { source, options }, Priority::NORMAL)
    }

    pub fn enqueue_update(
        &self,
        source: SourceHandle,
        options: ProcessingOptions,
        force: bool,
    ) -> Result<JobId, Error> {
        self.enqueue(JobPayload::Update { source, options, force }, Priority::NORMAL)
    }

    pub fn enqueue_remove_doc(&self, doc_id: DocumentId) -> Result<JobId, Error> {
        self.enqueue(JobPayload::Remove { doc_id: Some(doc_id), source: None }, Priority::NORMAL)
    }

    pub fn enqueue_remove_source(&self, source: SourceHandle) -> Result<JobId, Error> {
        self.enqueue(JobPayload::Remove { doc_id: None, source: Some(source) }, Priority::NORMAL)
    }

    /// Searches jump the ingestion backlog: an interactive query should
    /// never wait behind a large backfill.
    pub fn enqueue_search(&self, query: String, top_k: usize) -> Result<JobId, Error> {
        self.enqueue(JobPayload::Search { query, top_k }, Priority::HIGH)
    }

    pub fn enqueue_maintenance(&self, kind: MaintenanceKind) -> Result<JobId, Error> {
        self.enqueue(JobPayload::Maintenance(kind), Priority::LOW)
    }

    /// A `Pending` job is cancelled immediately; a `Running` one is only
    /// flagged, and finishes as `Cancelled` the next time its Index Manager
    /// step checks in. Callers that need to know it actually stopped should
    /// poll `status` rather than assume cancellation is synchronous.
    #[instrument(skip(self))]
    pub fn cancel(&self, job_id: JobId) -> Result<(), Error> {
        let rtxn = self.queue.env().read_txn()?;
        let job = self
            .queue
            .get(&rtxn, job_id)?
            .ok_or_else(|| Error::Consistency { doc_id: job_id.to_string(), detail: "cancel on unknown job".into() })?;
        drop(rtxn);
        match job.state {
            JobState::Pending => {
                let mut wtxn = self.queue.env().write_txn()?;
                self.queue.mark_cancelled(&mut wtxn, job_id)?;
                wtxn.commit()?;
            }
            JobState::Running => self.pool.request_cancel(job_id),
            JobState::Succeeded | JobState::Failed | JobState::Cancelled => {}
        }
        Ok(())
    }

    pub fn status(&self, job_id: JobId) -> Result<Option<Job>, Error> {
        let rtxn = self.queue.env().read_txn()?;
        self.queue.get(&rtxn, job_id)
    }

    pub fn list(&self) -> Result<Vec<Job>, Error> {
        let rtxn = self.queue.env().read_txn()?;
        self.queue.list(&rtxn)
    }

    /// The in-memory result (payload or error) of a finished job, consumed
    /// once: a second call for the same `job_id` returns `None`.
    pub fn take_result(&self, job_id: JobId) -> Option<JobOutcome> {
        self.pool.take_result(job_id)
    }

    pub fn clear_pending(&self) -> Result<usize, Error> {
        let mut wtxn = self.queue.env().write_txn()?;
        let n = self.queue.clear_pending(&mut wtxn)?;
        wtxn.commit()?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use doc_index::{ChunkConfig, IndexManager, KeywordAdapter, TimeoutConfig, VectorAdapter};
    use doc_store::StorageContext;
    use doc_types::{ContentExtractor, ExtractionMode, ExtractionOutput, KeywordGenerator, ParseMethod, Vectorizer};
    use tempfile::TempDir;

    use super::*;
    use crate::job::MaintenanceKind;

    struct FakeExtractor;
    impl ContentExtractor for FakeExtractor {
        fn extract(
            &self,
            bytes: &[u8],
            _mime_hint: Option<&str>,
            _mode: ExtractionMode,
            _prompt: &str,
        ) -> Result<ExtractionOutput, Error> {
            Ok(ExtractionOutput {
                text: String::from_utf8_lossy(bytes).into_owned(),
                pairs: vec![],
                parse_method: ParseMethod::GenericText,
                page_count: 1,
            })
        }
    }

    struct FakeVectorizer;
    impl Vectorizer for FakeVectorizer {
        fn dimensions(&self) -> usize {
            3
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    struct FakeKeywordGenerator;
    impl KeywordGenerator for FakeKeywordGenerator {
        fn augment(&self, _chunk_text: &str, _doc_context: &str) -> Result<Vec<String>, Error> {
            Ok(vec![])
        }
    }

    fn build_scheduler(dir: &TempDir) -> Scheduler {
        let storage = Arc::new(StorageContext::open_for_test(dir.path().join("storage")));
        let vector = Arc::new(VectorAdapter::open(dir.path().join("vector"), 3, 1 << 20).expect("vector adapter"));
        let keyword = Arc::new(KeywordAdapter::open(dir.path().join("keyword"), 1.2, 0.75, 1 << 20).expect("keyword adapter"));
        let index_manager = Arc::new(
            IndexManager::new(
                Arc::clone(&storage),
                vector,
                keyword,
                Arc::new(FakeExtractor),
                Arc::new(FakeVectorizer),
                Some(Arc::new(FakeKeywordGenerator)),
                ChunkConfig::default(),
                TimeoutConfig::default(),
                "v1".into(),
            )
            .expect("index manager"),
        );
        let queue = Arc::new(JobQueue::open(dir.path().join("queue"), 1 << 20).expect("queue"));
        Scheduler::new(queue, index_manager, None, SchedulerOptions { worker_count: 1, max_attempts: 3 })
    }

    #[test]
    fn enqueue_and_cancel_pending() {
        let dir = TempDir::new().expect("tempdir");
        let scheduler = build_scheduler(&dir);
        let job_id = scheduler.enqueue_maintenance(MaintenanceKind::Cleanup).expect("enqueue");
        scheduler.cancel(job_id).expect("cancel");
        let job = scheduler.status(job_id).expect("status").expect("job exists");
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[test]
    fn recover_on_empty_queue_is_a_no_op() {
        let dir = TempDir::new().expect("tempdir");
        let scheduler = build_scheduler(&dir);
        let (requeued, replayed) = scheduler.recover().expect("recover");
        assert_eq!(requeued, 0);
        assert_eq!(replayed, 0);
    }
}
