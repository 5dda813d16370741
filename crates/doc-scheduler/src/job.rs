use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use doc_types::{DocumentId, ProcessingOptions, SourceHandle};

pub type JobId = u64;

/// What kind of work a `Job` represents (spec §4.7). The payload carries
/// whatever the Index Manager needs to carry it out; `Search` jobs never
/// touch the Index Manager at all and are handled entirely by
/// `doc_search::HybridSearch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobPayload {
    Add { source: SourceHandle, options: ProcessingOptions },
    Update { source: SourceHandle, options: ProcessingOptions, force: bool },
    Remove { doc_id: Option<DocumentId>, source: Option<SourceHandle> },
    Search { query: String, top_k: usize },
    Maintenance(MaintenanceKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaintenanceKind {
    Repair,
    Cleanup,
    ConsistencyCheck,
}

impl JobPayload {
    /// The `doc_id` this job must be serialized against, if any (spec §4.7:
    /// "per-document exclusion ... for a job whose payload targets a given
    /// doc_id"). `Add`/`Update` target a `doc_id` only indirectly (via
    /// source); the doc-keyed mutex keys on the normalized source string in
    /// that case so two jobs for the same source still serialize even
    /// before a `DocumentId` is known.
    pub fn exclusion_key(&self) -> Option<String> {
        match self {
            JobPayload::Add { source, .. } | JobPayload::Update { source, .. } => Some(source.normalized()),
            JobPayload::Remove { doc_id: Some(doc_id), .. } => Some(doc_id.as_str().to_string()),
            JobPayload::Remove { source: Some(source), .. } => Some(source.normalized()),
            JobPayload::Remove { .. } => None,
            JobPayload::Search { .. } | JobPayload::Maintenance(_) => None,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Add { .. } => JobKind::Add,
            JobPayload::Update { .. } => JobKind::Update,
            JobPayload::Remove { .. } => JobKind::Remove,
            JobPayload::Search { .. } => JobKind::Search,
            JobPayload::Maintenance(_) => JobKind::Maintenance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Add,
    Update,
    Remove,
    Search,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Priority is a plain integer: higher runs first. `Search` jobs default to
/// a higher priority than ingestion so interactive queries are not starved
/// behind a large ingest backlog (spec §4.7/§5: "a Search job never waits on
/// ingestion jobs").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Priority {
    pub const LOW: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(10);
    pub const HIGH: Priority = Priority(20);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub priority: Priority,
    pub attempts: u32,
    pub state: JobState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// A pulled job is not eligible for another pull until this instant
    /// (spec §4.7: lease expiry, and retry backoff scheduling).
    #[serde(with = "time::serde::rfc3339")]
    pub visible_at: OffsetDateTime,
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(job_id: JobId, payload: JobPayload, priority: Priority, now: OffsetDateTime) -> Self {
        Job {
            job_id,
            kind: payload.kind(),
            payload,
            priority,
            attempts: 0,
            state: JobState::Pending,
            created_at: now,
            visible_at: now,
            last_error: None,
        }
    }
}
