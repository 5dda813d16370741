//! Durable priority job queue and worker pool (spec §4.7): queues `Add`,
//! `Update`, `Remove`, `Search`, and `Maintenance` operations, serializes
//! work per document, retries transient failures with backoff, and resumes
//! cleanly after a crash. Analogous to `index-scheduler`'s `TaskQueue` +
//! `Scheduler` pair, generalized from Meilisearch's single-index task model
//! to the two-adapter, content-addressed-cache world this workspace builds.

pub mod doc_mutex;
pub mod job;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use doc_mutex::DocMutex;
pub use job::{Job, JobId, JobKind, JobPayload, JobState, MaintenanceKind, Priority};
pub use queue::JobQueue;
pub use scheduler::{Scheduler, SchedulerOptions};
pub use worker::{JobOutcome, MustStop, SearchRunner, WorkerPool};
