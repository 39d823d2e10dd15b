/// Prometheus metric definitions.
use prometheus::{
    Counter, Gauge, Registry, register_counter_with_registry, register_gauge_with_registry,
};

/// Metrics collector.
#[derive(Debug, Clone)]
pub struct Metrics {
    pub jobs_created: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_cancelled: Counter,
    pub jobs_evicted: Counter,
    pub rate_limit_denials: Counter,
    pub phi_rejections: Counter,

    pub active_jobs: Gauge,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            jobs_created: register_counter_with_registry!(
                "scribe_jobs_created_total",
                "Total number of jobs created",
                registry
            )?,
            jobs_completed: register_counter_with_registry!(
                "scribe_jobs_completed_total",
                "Total number of jobs completed",
                registry
            )?,
            jobs_failed: register_counter_with_registry!(
                "scribe_jobs_failed_total",
                "Total number of jobs failed",
                registry
            )?,
            jobs_cancelled: register_counter_with_registry!(
                "scribe_jobs_cancelled_total",
                "Total number of jobs cancelled",
                registry
            )?,
            jobs_evicted: register_counter_with_registry!(
                "scribe_jobs_evicted_total",
                "Total number of jobs removed by retention sweeps",
                registry
            )?,
            rate_limit_denials: register_counter_with_registry!(
                "scribe_rate_limit_denials_total",
                "Total number of requests denied by the rate limiter",
                registry
            )?,
            phi_rejections: register_counter_with_registry!(
                "scribe_phi_rejections_total",
                "Total number of transcripts rejected by PHI screening",
                registry
            )?,
            active_jobs: register_gauge_with_registry!(
                "scribe_active_jobs",
                "Number of currently running pipeline jobs",
                registry
            )?,
        })
    }
}
