//! Free functions implementing the admin surface (spec §6): `add`,
//! `update`, `remove`, `search`, `queue {start,stop,status,clear}`,
//! `status`, `maintenance {repair,cleanup,consistency_check}`, and
//! `config {list,get,set,reset}`. Each takes an already-open `&Engine` so
//! the same functions back both the `clap` binary and any embedding caller
//! (spec §6: "expressible as CLI or library API"), mirroring how
//! `meilitool`'s subcommands are themselves just functions over a `db_path`.

use std::thread;
use std::time::Duration;

use doc_index::QueryFilter;
use doc_scheduler::{JobId, JobState, MaintenanceKind};
use doc_search::FusionMethod;
use doc_store::{ConsistencyReport, ListFilter, Paging};
use doc_types::{DocumentId, DocumentState, Error, ProcessingOptions, SourceHandle};

use crate::engine::Engine;

/// Runs one enqueued job to completion in-process: starts a worker pool
/// sized for a single job, polls for its result, then tears the pool back
/// down. `doc-cli` has no resident daemon, so every mutating command pays
/// this short-lived pool's startup cost in exchange for running the exact
/// same durable, crash-safe path a long-running `queue start` would.
fn run_one_shot(engine: &Engine, job_id: JobId) -> Result<Option<serde_json::Value>, Error> {
    engine.scheduler.start(engine.config.workers.count.max(1));
    let outcome = loop {
        if let Some(outcome) = engine.scheduler.take_result(job_id) {
            break outcome;
        }
        thread::sleep(Duration::from_millis(20));
    };
    engine.scheduler.stop();
    match outcome {
        doc_scheduler::JobOutcome::Succeeded(payload) => Ok(payload),
        doc_scheduler::JobOutcome::Cancelled => Err(Error::Cancelled),
        doc_scheduler::JobOutcome::Failed(msg) => Err(Error::Consistency { doc_id: job_id.to_string(), detail: msg }),
    }
}

pub fn add(engine: &Engine, source: SourceHandle, options: ProcessingOptions) -> Result<serde_json::Value, Error> {
    let job_id = engine.scheduler.enqueue_add(source, options)?;
    Ok(run_one_shot(engine, job_id)?.unwrap_or(serde_json::Value::Null))
}

/// `force` is realized at this layer, not inside the Index Manager: a
/// forced update is a synchronous `remove` followed by the normal enqueued
/// `add`, rather than a new state-machine branch in `reindex` (spec §4.6
/// already handles `ContentChanged`/`OptionsChanged` uniformly; forcing a
/// full re-ingest of otherwise-`Unchanged` content doesn't need a new code
/// path there, just an extra step here).
pub fn update(
    engine: &Engine,
    source: SourceHandle,
    options: ProcessingOptions,
    force: bool,
) -> Result<serde_json::Value, Error> {
    if force {
        engine.index_manager.remove(&source, &|| false)?;
    }
    let job_id = engine.scheduler.enqueue_update(source, options, force)?;
    Ok(run_one_shot(engine, job_id)?.unwrap_or(serde_json::Value::Null))
}

/// Accepts either a `DocumentId` or a source string: tries the former
/// first (a lookup against the Registry), falling back to parsing `target`
/// as a source on a miss, since the two id spaces don't otherwise overlap.
pub fn remove(engine: &Engine, target: &str) -> Result<serde_json::Value, Error> {
    let doc_id = DocumentId(target.to_string());
    let rtxn = engine.storage.env.read_txn()?;
    let known = engine.storage.registry.get(&rtxn, &doc_id)?.is_some();
    drop(rtxn);

    let job_id = if known {
        engine.scheduler.enqueue_remove_doc(doc_id)?
    } else {
        engine.scheduler.enqueue_remove_source(SourceHandle::parse(target))?
    };
    Ok(run_one_shot(engine, job_id)?.unwrap_or(serde_json::Value::Null))
}

/// Reads bypass the Job Queue entirely (spec §5: "a Search job never waits
/// on ingestion jobs"): this calls `HybridSearch` directly rather than
/// enqueueing a `Search` job, since there is no resident worker pool to
/// hand it to outside of a `queue start` session.
pub fn search(
    engine: &Engine,
    query: &str,
    top_k: usize,
    method: Option<FusionMethod>,
    filter: QueryFilter,
) -> Result<serde_json::Value, Error> {
    let method = method.unwrap_or_else(|| engine.default_fusion_method());
    let hits = engine.search.search(query, top_k, method, &filter)?;
    Ok(serde_json::json!({
        "hits": hits.iter().map(|h| serde_json::json!({
            "chunk_id": h.chunk_id.to_string(),
            "score": h.score,
        })).collect::<Vec<_>>(),
    }))
}

/// `queue start`: runs the Worker Pool in the foreground until standard
/// input reaches EOF (Ctrl-D), then stops it cleanly. There is no daemon
/// mode or cross-process IPC in this build — the queue and every adapter
/// live behind one process-local `heed::Env` — so `queue stop` is only
/// meaningful as the thing that ends this same loop.
pub fn queue_start(engine: &Engine) -> Result<(), Error> {
    let (requeued, replayed) = engine.scheduler.recover()?;
    tracing::info!(requeued, replayed, "recovered prior queue state");
    engine.scheduler.start(engine.config.workers.count.max(1));
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
    engine.scheduler.stop();
    Ok(())
}

pub fn queue_status(engine: &Engine, job_id: Option<JobId>) -> Result<serde_json::Value, Error> {
    match job_id {
        Some(job_id) => {
            let job = engine.scheduler.status(job_id)?;
            Ok(match job {
                Some(job) => job_to_json(&job),
                None => serde_json::Value::Null,
            })
        }
        None => {
            let jobs = engine.scheduler.list()?;
            let pending = jobs.iter().filter(|j| j.state == JobState::Pending).count();
            let running = jobs.iter().filter(|j| j.state == JobState::Running).count();
            Ok(serde_json::json!({
                "total": jobs.len(),
                "pending": pending,
                "running": running,
                "jobs": jobs.iter().map(job_to_json).collect::<Vec<_>>(),
            }))
        }
    }
}

fn job_to_json(job: &doc_scheduler::Job) -> serde_json::Value {
    serde_json::json!({
        "job_id": job.job_id,
        "kind": format!("{:?}", job.kind),
        "state": format!("{:?}", job.state),
        "attempts": job.attempts,
        "last_error": job.last_error,
    })
}

pub fn queue_clear(engine: &Engine) -> Result<usize, Error> {
    engine.scheduler.clear_pending()
}

/// Top-level `status(detailed?)` (spec §6): a document-count overview by
/// `DocumentState`, plus a full `ConsistencyReport` when `detailed` is set.
pub fn status(engine: &Engine, detailed: bool) -> Result<serde_json::Value, Error> {
    let rtxn = engine.storage.env.read_txn()?;
    let all = engine.storage.registry.list(&rtxn, &ListFilter::default(), Paging { offset: 0, limit: usize::MAX })?;
    drop(rtxn);

    let mut counts = serde_json::Map::new();
    for state in [
        DocumentState::Pending,
        DocumentState::Parsing,
        DocumentState::Indexing,
        DocumentState::Ready,
        DocumentState::Failed,
        DocumentState::Removing,
    ] {
        let count = all.iter().filter(|r| r.state == state).count();
        counts.insert(format!("{state:?}"), serde_json::json!(count));
    }

    let mut body = serde_json::json!({ "document_count": all.len(), "by_state": counts });
    if detailed {
        let report = engine.index_manager.verify_consistency()?;
        body["consistency"] = consistency_report_json(&report);
    }
    Ok(body)
}

fn consistency_report_json(report: &ConsistencyReport) -> serde_json::Value {
    serde_json::json!({
        "consistent": report.is_consistent(),
        "verdicts": report.verdicts.iter().map(|(doc_id, verdict)| serde_json::json!({
            "doc_id": doc_id.as_str(),
            "verdict": format!("{verdict:?}"),
        })).collect::<Vec<_>>(),
    })
}

pub fn maintenance_repair(engine: &Engine) -> Result<serde_json::Value, Error> {
    let job_id = engine.scheduler.enqueue_maintenance(MaintenanceKind::Repair)?;
    Ok(run_one_shot(engine, job_id)?.unwrap_or(serde_json::Value::Null))
}

pub fn maintenance_cleanup(engine: &Engine) -> Result<serde_json::Value, Error> {
    let job_id = engine.scheduler.enqueue_maintenance(MaintenanceKind::Cleanup)?;
    Ok(run_one_shot(engine, job_id)?.unwrap_or(serde_json::Value::Null))
}

pub fn maintenance_consistency_check(engine: &Engine) -> Result<serde_json::Value, Error> {
    let job_id = engine.scheduler.enqueue_maintenance(MaintenanceKind::ConsistencyCheck)?;
    Ok(run_one_shot(engine, job_id)?.unwrap_or(serde_json::Value::Null))
}
