use std::path::Path;

use heed::byteorder::BE;
use heed::types::{SerdeJson, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn, WithoutTls};
use time::OffsetDateTime;

use doc_types::Error;

use crate::job::{Job, JobId, JobState};

mod db_name {
    pub const JOBS: &str = "scheduler-jobs";
    pub const META: &str = "scheduler-meta";
}

pub type BEU64 = U64<BE>;

const NEXT_JOB_ID_KEY: u64 = 0;

/// Durable priority queue, one `heed` database keyed by `job_id` plus a
/// one-row counter database for the next id to hand out — the same shape
/// `index-scheduler` uses for its task id allocator (`next_task_id`), scaled
/// down from eight databases to two since this queue has no status/kind
/// secondary indexes to maintain: `pull` scans the (small, in-memory-sized)
/// live set directly rather than through a bitmap index.
///
/// Keeps its own `heed::Env` under `paths.queue` rather than sharing the
/// Registry's environment: each of the six stores spec §9 calls out lives
/// under its own directory, and an `Env` is opened once with a fixed
/// `max_dbs` ceiling, so folding the queue's two databases into the
/// Registry's five-database environment would mean either guessing a larger
/// ceiling up front or growing it by hand every time a sibling store gains a
/// database. A dedicated environment, sized for exactly what the queue
/// needs, avoids that coupling the same way `VectorAdapter`/`KeywordAdapter`
/// each open their own.
pub struct JobQueue {
    env: Env<WithoutTls>,
    jobs: Database<BEU64, SerdeJson<Job>>,
    meta: Database<BEU64, BEU64>,
}

impl JobQueue {
    const fn nb_dbs() -> u32 {
        2
    }

    pub fn open(path: impl AsRef<Path>, map_size: usize) -> Result<Self, Error> {
        std::fs::create_dir_all(path.as_ref())?;
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(Self::nb_dbs()).open(path.as_ref())? };
        let mut wtxn = env.write_txn()?;
        let jobs = env.create_database(&mut wtxn, Some(db_name::JOBS))?;
        let meta = env.create_database(&mut wtxn, Some(db_name::META))?;
        wtxn.commit()?;
        Ok(JobQueue { env, jobs, meta })
    }

    /// The queue's own environment, handed to callers that need to open a
    /// read or write transaction around one or more queue operations (the
    /// Scheduler and Worker Pool never touch `jobs`/`meta` directly).
    pub fn env(&self) -> &Env<WithoutTls> {
        &self.env
    }

    fn next_job_id(&self, wtxn: &mut RwTxn) -> Result<JobId, Error> {
        let next = self.meta.get(wtxn, &NEXT_JOB_ID_KEY)?.unwrap_or(0);
        self.meta.put(wtxn, &NEXT_JOB_ID_KEY, &(next + 1))?;
        Ok(next)
    }

    pub fn enqueue(&self, wtxn: &mut RwTxn, job: Job) -> Result<JobId, Error> {
        let mut job = job;
        job.job_id = self.next_job_id(wtxn)?;
        self.jobs.put(wtxn, &job.job_id, &job)?;
        Ok(job.job_id)
    }

    pub fn get(&self, rtxn: &RoTxn, job_id: JobId) -> Result<Option<Job>, Error> {
        Ok(self.jobs.get(rtxn, &job_id)?)
    }

    pub fn put(&self, wtxn: &mut RwTxn, job: &Job) -> Result<(), Error> {
        self.jobs.put(wtxn, &job.job_id, job)?;
        Ok(())
    }

    /// Picks the highest-priority `Pending` job whose `visible_at` has
    /// elapsed and whose exclusion key is not already held, skipping
    /// anything the caller reports as locked. Ties break by lowest
    /// `job_id` (FIFO within a priority band), matching the intuitive
    /// "oldest first" ordering a human operator expects from `queue status`.
    pub fn pull(
        &self,
        wtxn: &mut RwTxn,
        now: OffsetDateTime,
        is_locked: impl Fn(&str) -> bool,
    ) -> Result<Option<Job>, Error> {
        let mut candidate: Option<Job> = None;
        for result in self.jobs.iter(wtxn)? {
            let (_, job) = result?;
            if job.state != JobState::Pending || job.visible_at > now {
                continue;
            }
            if let Some(key) = job.payload.exclusion_key() {
                if is_locked(&key) {
                    continue;
                }
            }
            candidate = Some(match candidate {
                None => job,
                Some(best) if (job.priority, std::cmp::Reverse(job.job_id)) > (best.priority, std::cmp::Reverse(best.job_id)) => job,
                Some(best) => best,
            });
        }
        let Some(mut job) = candidate else { return Ok(None) };
        job.state = JobState::Running;
        self.jobs.put(wtxn, &job.job_id, &job)?;
        Ok(Some(job))
    }

    pub fn mark_succeeded(&self, wtxn: &mut RwTxn, job_id: JobId) -> Result<(), Error> {
        self.set_state(wtxn, job_id, JobState::Succeeded, None)
    }

    pub fn mark_cancelled(&self, wtxn: &mut RwTxn, job_id: JobId) -> Result<(), Error> {
        self.set_state(wtxn, job_id, JobState::Cancelled, None)
    }

    /// Returns a failed job to `Pending` (with backoff applied to
    /// `visible_at`) until `max_attempts` is exceeded, at which point it is
    /// dead-lettered as `Failed`.
    pub fn mark_failed(
        &self,
        wtxn: &mut RwTxn,
        job_id: JobId,
        error: String,
        retry_at: Option<OffsetDateTime>,
        max_attempts: u32,
    ) -> Result<(), Error> {
        let Some(mut job) = self.jobs.get(wtxn, &job_id)? else {
            return Err(Error::Consistency { doc_id: job_id.to_string(), detail: "mark_failed on unknown job".into() });
        };
        job.attempts += 1;
        job.last_error = Some(error);
        job.state = if job.attempts >= max_attempts || retry_at.is_none() {
            JobState::Failed
        } else {
            JobState::Pending
        };
        if let Some(retry_at) = retry_at {
            job.visible_at = retry_at;
        }
        self.jobs.put(wtxn, &job_id, &job)?;
        Ok(())
    }

    fn set_state(&self, wtxn: &mut RwTxn, job_id: JobId, state: JobState, error: Option<String>) -> Result<(), Error> {
        let Some(mut job) = self.jobs.get(wtxn, &job_id)? else {
            return Err(Error::Consistency { doc_id: job_id.to_string(), detail: "set_state on unknown job".into() });
        };
        job.state = state;
        job.last_error = error;
        self.jobs.put(wtxn, &job_id, &job)?;
        Ok(())
    }

    /// Startup reconciliation (spec §4.7): any job left `Running` across a
    /// restart was mid-lease when the process died, so it goes back to
    /// `Pending` unconditionally. The Index Manager's own `recover()` is
    /// what actually resumes the underlying Intent Log steps; this only
    /// makes the job visible to the Worker Pool again.
    pub fn requeue_running(&self, wtxn: &mut RwTxn) -> Result<usize, Error> {
        let stuck: Vec<JobId> = self
            .jobs
            .iter(wtxn)?
            .filter_map(|r| r.ok())
            .filter(|(_, job)| job.state == JobState::Running)
            .map(|(id, _)| id)
            .collect();
        let count = stuck.len();
        for job_id in &stuck {
            self.set_state(wtxn, *job_id, JobState::Pending, None)?;
        }
        Ok(count)
    }

    pub fn list(&self, rtxn: &RoTxn) -> Result<Vec<Job>, Error> {
        let mut out = Vec::new();
        for result in self.jobs.iter(rtxn)? {
            let (_, job) = result?;
            out.push(job);
        }
        out.sort_by_key(|j| j.job_id);
        Ok(out)
    }

    /// Drops every job not currently `Running` (spec: `queue clear`
    /// leaves in-flight leases alone so it cannot orphan a job the Worker
    /// Pool is mid-executing).
    pub fn clear_pending(&self, wtxn: &mut RwTxn) -> Result<usize, Error> {
        let doomed: Vec<JobId> = self
            .jobs
            .iter(wtxn)?
            .filter_map(|r| r.ok())
            .filter(|(_, job)| job.state != JobState::Running)
            .map(|(id, _)| id)
            .collect();
        let count = doomed.len();
        for job_id in doomed {
            self.jobs.delete(wtxn, &job_id)?;
        }
        Ok(count)
    }
}
