use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use synchronoise::SignalEvent;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use doc_index::IndexManager;
use doc_store::Consistency;
use doc_types::{Error, SourceHandle};

use crate::job::{JobId, JobPayload, MaintenanceKind};
use crate::queue::JobQueue;
use crate::DocMutex;

/// Wraps an `Arc<AtomicBool>` the way `index-scheduler`'s
/// `MustStopProcessing` does: a handle cheap enough to clone into every
/// worker thread and a dedicated CPU-relaxing spin window rather than a
/// condvar, since the flag is only ever read, never awaited.
#[derive(Clone, Default)]
pub struct MustStop(Arc<AtomicBool>);

impl MustStop {
    pub fn new() -> Self {
        MustStop::default()
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn must_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Searches never go through the Index Manager, so the `WorkerPool` is
/// given a handler for them instead of depending on `doc-search` directly
/// (the scheduler should not need to know what a fused hit list looks
/// like). The outcome is serialized to JSON since it is communicated back
/// to the CLI through the in-memory result map, never persisted.
pub trait SearchRunner: Send + Sync {
    fn run(&self, query: &str, top_k: usize) -> Result<serde_json::Value, Error>;
}

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded(Option<serde_json::Value>),
    Failed(String),
    Cancelled,
}

/// Bounded worker pool draining the `JobQueue`, modeled on
/// `index-scheduler`'s `Scheduler`: a `wake_up` signal so `enqueue` can
/// nudge idle workers instead of them polling tightly, and a
/// `MustStopProcessing`-style flag for cooperative shutdown.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    index_manager: Arc<IndexManager>,
    search_runner: Option<Arc<dyn SearchRunner>>,
    doc_mutex: Arc<DocMutex>,
    wake_up: Arc<SignalEvent>,
    must_stop: MustStop,
    max_attempts: u32,
    results: Arc<Mutex<HashMap<JobId, JobOutcome>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// `Running` jobs whose `cancel` was requested (spec §4.7 cancellation):
    /// checked at each intent step boundary by the closure passed into the
    /// Index Manager, so the worker thread itself never needs to be
    /// interrupted — it just observes the flag at the next opportunity.
    cancel_requested: Arc<Mutex<HashSet<JobId>>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        index_manager: Arc<IndexManager>,
        search_runner: Option<Arc<dyn SearchRunner>>,
        max_attempts: u32,
    ) -> Self {
        WorkerPool {
            queue,
            index_manager,
            search_runner,
            doc_mutex: Arc::new(DocMutex::new()),
            wake_up: Arc::new(SignalEvent::auto(true)),
            must_stop: MustStop::new(),
            max_attempts,
            results: Arc::new(Mutex::new(HashMap::new())),
            handles: Mutex::new(Vec::new()),
            cancel_requested: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Cooperative cancellation of a `Running` job (spec §4.7): the worker
    /// observes this at the next intent step boundary. Pending jobs are
    /// cancelled directly in the queue by `Scheduler::cancel` instead, since
    /// there is no running execution to signal.
    pub fn request_cancel(&self, job_id: JobId) {
        self.cancel_requested.lock().expect("cancel set poisoned").insert(job_id);
    }

    pub fn wake(&self) {
        self.wake_up.signal();
    }

    pub fn must_stop_handle(&self) -> MustStop {
        self.must_stop.clone()
    }

    /// Spawns `worker_count` OS threads, each pulling jobs in a loop until
    /// told to stop. Mirrors the `std::thread`-per-worker design the rest of
    /// this codebase uses for the extraction deadline thread, rather than
    /// pulling in an async runtime for a handful of long-lived threads.
    #[instrument(skip(self))]
    pub fn start(self: &Arc<Self>, worker_count: usize) {
        self.must_stop.reset();
        let mut handles = self.handles.lock().expect("worker pool handles poisoned");
        for idx in 0..worker_count {
            let pool = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(format!("doc-worker-{idx}"))
                .spawn(move || pool.run_worker(idx))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        info!(worker_count, "worker pool started");
    }

    /// Signals every worker to stop after its current job and blocks until
    /// all have exited.
    pub fn stop(&self) {
        self.must_stop.must_stop();
        self.wake_up.signal();
        let mut handles = self.handles.lock().expect("worker pool handles poisoned");
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn take_result(&self, job_id: JobId) -> Option<JobOutcome> {
        self.results.lock().expect("worker pool results poisoned").remove(&job_id)
    }

    fn run_worker(&self, idx: usize) {
        debug!(idx, "worker thread starting");
        while !self.must_stop.get() {
            let pulled = {
                let mut wtxn = match self.queue.env().write_txn() {
                    Ok(wtxn) => wtxn,
                    Err(e) => {
                        error!(error = %e, "worker failed to open write txn");
                        thread::sleep(Duration::from_millis(200));
                        continue;
                    }
                };
                let now = OffsetDateTime::now_utc();
                let doc_mutex = &self.doc_mutex;
                let job = self.queue.pull(&mut wtxn, now, |key| doc_mutex.is_locked(key));
                match job {
                    Ok(Some(job)) => {
                        if wtxn.commit().is_err() {
                            None
                        } else {
                            Some(job)
                        }
                    }
                    Ok(None) => {
                        let _ = wtxn.commit();
                        None
                    }
                    Err(e) => {
                        error!(error = %e, "worker failed to pull job");
                        let _ = wtxn.commit();
                        None
                    }
                }
            };

            let Some(job) = pulled else {
                // No work available: wait to be woken by `enqueue`/`stop`,
                // with a bounded timeout so a crash-recovered job whose
                // `visible_at` has since elapsed is still picked up even if
                // nothing ever signals again.
                self.wake_up.wait_timeout(Duration::from_millis(500));
                continue;
            };

            let key = job.payload.exclusion_key();
            let job_id = job.job_id;
            let cancel_set = Arc::clone(&self.cancel_requested);
            let cancelled = move || cancel_set.lock().expect("cancel set poisoned").contains(&job_id);
            let outcome = if let Some(key) = &key {
                self.doc_mutex.with_lock(key, || self.execute(&job.payload, &cancelled))
            } else {
                self.execute(&job.payload, &cancelled)
            };

            self.finish(job_id, job.attempts, outcome);
        }
        debug!(idx, "worker thread exiting");
    }

    #[instrument(skip(self, payload, cancelled))]
    fn execute(
        &self,
        payload: &JobPayload,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<Option<serde_json::Value>, Error> {
        match payload {
            JobPayload::Add { source, options } | JobPayload::Update { source, options, .. } => {
                let bytes = read_source(source)?;
                let (declared_size, declared_mtime) = source_metadata(source);
                let outcome = self.index_manager.ingest(
                    source.clone(),
                    &bytes,
                    declared_size,
                    declared_mtime,
                    options.clone(),
                    cancelled,
                )?;
                Ok(Some(serde_json::json!({
                    "doc_id": outcome.doc_id.as_str(),
                    "change": format!("{:?}", outcome.change),
                    "chunk_count": outcome.chunk_count,
                })))
            }
            JobPayload::Remove { doc_id: Some(doc_id), .. } => {
                self.index_manager.remove_doc(doc_id, cancelled)?;
                Ok(None)
            }
            JobPayload::Remove { source: Some(source), .. } => {
                self.index_manager.remove(source, cancelled)?;
                Ok(None)
            }
            JobPayload::Remove { .. } => {
                Err(Error::InvalidSource("remove job carries neither doc_id nor source".into()))
            }
            JobPayload::Search { query, top_k } => match &self.search_runner {
                Some(runner) => Ok(Some(runner.run(query, *top_k)?)),
                None => Err(Error::InvalidSource("no search runner configured".into())),
            },
            JobPayload::Maintenance(MaintenanceKind::ConsistencyCheck) => {
                let report = self.index_manager.verify_consistency()?;
                Ok(Some(serde_json::json!({ "consistent": report.is_consistent() })))
            }
            JobPayload::Maintenance(MaintenanceKind::Repair) => {
                let report = self.index_manager.verify_consistency()?;
                for (doc_id, _) in report.verdicts.iter().filter(|(_, c)| !matches!(c, Consistency::Consistent)) {
                    if cancelled() {
                        break;
                    }
                    self.index_manager.repair_one(doc_id, cancelled)?;
                }
                Ok(None)
            }
            JobPayload::Maintenance(MaintenanceKind::Cleanup) => {
                let horizon = OffsetDateTime::now_utc() - time::Duration::days(7);
                let (intents, fingerprints) = self.index_manager.compact(horizon)?;
                Ok(Some(serde_json::json!({ "intents_dropped": intents, "fingerprints_dropped": fingerprints })))
            }
        }
    }

    fn finish(&self, job_id: JobId, attempts: u32, outcome: Result<Option<serde_json::Value>, Error>) {
        let mut wtxn = match self.queue.env().write_txn() {
            Ok(wtxn) => wtxn,
            Err(e) => {
                error!(error = %e, job_id, "failed to open write txn to finalize job");
                return;
            }
        };
        match outcome {
            Ok(payload) => {
                if let Err(e) = self.queue.mark_succeeded(&mut wtxn, job_id) {
                    error!(error = %e, job_id, "failed to mark job succeeded");
                }
                self.results.lock().expect("worker pool results poisoned").insert(job_id, JobOutcome::Succeeded(payload));
            }
            Err(Error::Cancelled) => {
                debug!(job_id, "job cancelled mid-execution");
                if let Err(e) = self.queue.mark_cancelled(&mut wtxn, job_id) {
                    error!(error = %e, job_id, "failed to mark job cancelled");
                }
                self.results.lock().expect("worker pool results poisoned").insert(job_id, JobOutcome::Cancelled);
            }
            Err(e) => {
                let retryable = e.kind().is_retryable();
                warn!(error = %e, job_id, retryable, "job failed");
                let retry_at = retryable.then(|| OffsetDateTime::now_utc() + backoff_delay(attempts));
                if let Err(e2) = self.queue.mark_failed(&mut wtxn, job_id, e.to_string(), retry_at, self.max_attempts) {
                    error!(error = %e2, job_id, "failed to mark job failed");
                }
                self.results.lock().expect("worker pool results poisoned").insert(job_id, JobOutcome::Failed(e.to_string()));
            }
        }
        let _ = wtxn.commit();
        self.cancel_requested.lock().expect("cancel set poisoned").remove(&job_id);
        self.wake_up.signal();
    }
}

/// Exponential backoff with jitter for job retry scheduling (spec §4.7).
/// Full-jitter: the delay is uniformly sampled between zero and the
/// exponential ceiling, so a burst of jobs failing at once doesn't retry in
/// lockstep.
fn backoff_delay(attempts: u32) -> time::Duration {
    let mut eb = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(1))
        .with_max_interval(Duration::from_secs(120))
        .with_multiplier(2.0)
        .with_max_elapsed_time(None)
        .build();
    for _ in 0..attempts {
        eb.next_backoff();
    }
    let ceiling = eb.next_backoff().unwrap_or(Duration::from_secs(120));
    let jittered = Duration::from_secs_f64(rand::random::<f64>() * ceiling.as_secs_f64());
    time::Duration::try_from(jittered).unwrap_or(time::Duration::seconds(1))
}

fn read_source(source: &SourceHandle) -> Result<Vec<u8>, Error> {
    match source {
        SourceHandle::Path(path) => std::fs::read(path).map_err(Error::from),
        SourceHandle::Url(_) => {
            Err(Error::InvalidSource("URL sources must be fetched by the caller before enqueueing".into()))
        }
    }
}

/// Best-effort declared size/mtime for the Change Detector's metadata input
/// (spec §4.5). Absent for `Url` sources and on any `stat` failure; `ingest`
/// treats a missing value as nothing to compare, never as a drift.
fn source_metadata(source: &SourceHandle) -> (Option<u64>, Option<i64>) {
    let SourceHandle::Path(path) = source else { return (None, None) };
    let Ok(meta) = std::fs::metadata(path) else { return (None, None) };
    let size = Some(meta.len());
    let mtime = meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64);
    (size, mtime)
}
