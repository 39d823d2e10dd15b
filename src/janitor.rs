//! Background retention sweeps over the job store and rate limiter.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::jobs::JobStore;
use crate::observability::metrics::Metrics;
use crate::ratelimit::RateLimiter;

/// Retention policy the janitor applies on every tick.
#[derive(Debug, Clone, Copy)]
pub struct JanitorConfig {
    pub interval: Duration,
    pub job_max_age: Duration,
    pub failed_job_max_age: Duration,
    pub max_jobs: usize,
}

pub fn spawn_janitor(
    store: Arc<JobStore>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
    config: JanitorConfig,
) -> JoinHandle<()> {
    Janitor {
        store,
        limiter,
        metrics,
        config,
    }
    .spawn()
}

struct Janitor {
    store: Arc<JobStore>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
    config: JanitorConfig,
}

impl Janitor {
    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        info!(
            interval_seconds = self.config.interval.as_secs(),
            job_max_age_seconds = self.config.job_max_age.as_secs(),
            max_jobs = self.config.max_jobs,
            "janitor started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; a sweep at
        // startup has nothing to do, so spend it here.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_guarded(|| self.sweep());
        }
    }

    fn sweep(&self) {
        let evicted_jobs = self.store.evict(
            self.config.job_max_age,
            self.config.failed_job_max_age,
            self.config.max_jobs,
        );
        let evicted_clients = self.limiter.evict();

        self.metrics.jobs_evicted.inc_by(evicted_jobs as f64);

        let stats = self.store.stats();
        info!(
            evicted_jobs,
            evicted_clients,
            jobs_total = stats.total,
            jobs_processing = stats.processing,
            "janitor sweep completed"
        );
    }
}

/// A single bad sweep must never kill the scheduler loop.
fn run_guarded(sweep: impl FnOnce()) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(sweep)) {
        let reason = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown panic payload");
        error!(reason, "janitor sweep panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_panicking_sweep_does_not_propagate() {
        run_guarded(|| panic!("boom"));
    }

    #[test]
    fn a_clean_sweep_runs_to_completion() {
        let mut ran = false;
        run_guarded(|| ran = true);
        assert!(ran);
    }
}
