use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{Job, JobProgress, JobStatus, ProcessingStage};
use crate::util::error::ErrorCode;

/// Per-status counts for the stats endpoint and the janitor log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// In-memory owner of all [`Job`] records.
///
/// Every mutation goes through this synchronized API; callers only ever hold
/// snapshot copies, so pollers never observe a half-written job. All
/// operations are total over (id, current state): an unknown id or an invalid
/// transition degrades to a logged no-op rather than an error, because
/// progress and cancel calls legitimately race completion.
///
/// Constructed once at startup and shared as `Arc<JobStore>`; tests build
/// isolated stores of their own.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl JobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Job>> {
        // A poisoned map is still structurally sound; recover instead of
        // taking the whole worker down with a panic cascade.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a new job in `Pending` and return its id.
    #[must_use]
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().insert(id, Job::new(id));
        info!(job_id = %id, "job created");
        id
    }

    /// Snapshot copy of a job. Mutating the returned value has no effect on
    /// the store.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.lock().get(&id).cloned()
    }

    /// Status-only read, cheap enough for the orchestrator's between-stage
    /// cancellation polling.
    #[must_use]
    pub fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.lock().get(&id).map(|job| job.status)
    }

    /// Overwrite progress and move the job to `Processing`.
    ///
    /// No-op when the id is unknown or the job is already terminal (a stale
    /// update racing a cancellation must not resurrect the job). Updates that
    /// would move percent backwards are dropped to keep observed progress
    /// monotonic.
    pub fn update_progress(
        &self,
        id: Uuid,
        stage: ProcessingStage,
        percent: u8,
        message: impl Into<String>,
    ) {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(&id) else {
            warn!(job_id = %id, "progress update for unknown job ignored");
            return;
        };
        if job.status.is_terminal() {
            debug!(job_id = %id, status = job.status.as_str(), "progress update after terminal state ignored");
            return;
        }
        if percent < job.progress.percent {
            debug!(
                job_id = %id,
                current = job.progress.percent,
                stale = percent,
                "stale progress update ignored"
            );
            return;
        }

        job.status = JobStatus::Processing;
        job.progress = JobProgress::new(stage, percent, message);
        debug!(
            job_id = %id,
            stage = stage.as_str(),
            percent = job.progress.percent,
            "job progress updated"
        );
    }

    /// Mark the job `Completed` with its result payload.
    pub fn complete(&self, id: Uuid, result: Value) {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(&id) else {
            warn!(job_id = %id, "completion for unknown job ignored");
            return;
        };
        if job.status.is_terminal() {
            debug!(job_id = %id, status = job.status.as_str(), "completion after terminal state ignored");
            return;
        }

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = Some(result);
        job.progress = JobProgress::new(
            ProcessingStage::Completed,
            100,
            "Processing completed successfully",
        );
        info!(job_id = %id, "job completed");
    }

    /// Mark the job `Failed`. Progress freezes at the last observed value.
    pub fn fail(&self, id: Uuid, error: impl Into<String>, error_code: ErrorCode) {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(&id) else {
            warn!(job_id = %id, "failure for unknown job ignored");
            return;
        };
        if job.status.is_terminal() {
            debug!(job_id = %id, status = job.status.as_str(), "failure after terminal state ignored");
            return;
        }

        let error = error.into();
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error_code = Some(error_code);
        warn!(job_id = %id, error_code = %error_code, error = %error, "job failed");
        job.error = Some(error);
    }

    /// Cancel a pending or processing job.
    ///
    /// Returns `true` only when the job was actually flipped to `Cancelled`.
    /// This is the sole interruption path; the orchestrator observes the flip
    /// cooperatively at its next between-stage check.
    pub fn cancel(&self, id: Uuid) -> bool {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        info!(job_id = %id, "job cancelled");
        true
    }

    /// Apply the retention policy and return how many jobs were dropped.
    ///
    /// Jobs older than `max_age` go; failed/cancelled jobs go at the shorter
    /// `max_failed_age` since they carry no further value to a poller; if the
    /// store is still over `max_count`, the oldest completed jobs go until it
    /// is not. Pending and processing jobs are never evicted.
    pub fn evict(&self, max_age: Duration, max_failed_age: Duration, max_count: usize) -> usize {
        self.evict_at(Utc::now(), max_age, max_failed_age, max_count)
    }

    pub(crate) fn evict_at(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
        max_failed_age: Duration,
        max_count: usize,
    ) -> usize {
        let age_cutoff = cutoff(now, max_age);
        let failed_cutoff = cutoff(now, max_failed_age);

        let mut jobs = self.lock();
        let before = jobs.len();

        jobs.retain(|_, job| {
            if !job.status.is_terminal() {
                return true;
            }
            if job.created_at < age_cutoff {
                return false;
            }
            if matches!(job.status, JobStatus::Failed | JobStatus::Cancelled)
                && job.created_at < failed_cutoff
            {
                return false;
            }
            true
        });

        if jobs.len() > max_count {
            let mut completed: Vec<(Uuid, DateTime<Utc>)> = jobs
                .values()
                .filter(|job| job.status == JobStatus::Completed)
                .map(|job| (job.id, job.created_at))
                .collect();
            completed.sort_by_key(|(_, created_at)| *created_at);

            let excess = jobs.len() - max_count;
            for (id, _) in completed.into_iter().take(excess) {
                jobs.remove(&id);
            }
        }

        before - jobs.len()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let jobs = self.lock();
        let mut stats = StoreStats {
            total: jobs.len(),
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, id: Uuid, created_at: DateTime<Utc>) {
        if let Some(job) = self.lock().get_mut(&id) {
            job.created_at = created_at;
        }
    }
}

/// An age too large to represent keeps everything, matching "no cutoff".
fn cutoff(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
