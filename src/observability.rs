pub mod metrics;
pub mod tracing;

use std::sync::Arc;

use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};

use self::metrics::Metrics;

/// Owns the metric registry and the tracing subscriber lifecycle.
#[derive(Debug, Clone)]
pub struct Telemetry {
    metrics: Arc<Metrics>,
    registry: Arc<Registry>,
}

impl Telemetry {
    /// Initialize tracing and build a fresh metric registry.
    pub fn new() -> Result<Self> {
        tracing::init()?;
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(&registry)?);
        Ok(Self { metrics, registry })
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn record_ready_probe(&self) {
        ::tracing::info!("service ready probe recorded");
    }

    pub fn record_live_probe(&self) {
        ::tracing::debug!("service live probe");
    }

    /// Render the registry in the Prometheus text exposition format.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_metrics_contain_registered_series() {
        let telemetry = Telemetry::new().expect("telemetry");
        telemetry.metrics().jobs_created.inc();

        let rendered = telemetry.render_prometheus();
        assert!(rendered.contains("scribe_jobs_created_total"));
    }

    #[test]
    fn registries_are_isolated_between_instances() {
        let a = Telemetry::new().expect("telemetry");
        let b = Telemetry::new().expect("telemetry");
        a.metrics().jobs_failed.inc();

        assert!((b.metrics().jobs_failed.get() - 0.0).abs() < f64::EPSILON);
    }
}
