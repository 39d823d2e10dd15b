use std::sync::Arc;

use anyhow::Result;
use axum::Router;

use crate::{
    api,
    clients::{ClientConfig, EnhancerClient, ReasonerClient, SummarizerClient, TranscriberClient},
    config::Config,
    jobs::JobStore,
    observability::Telemetry,
    pipeline::{PipelineOrchestrator, PipelineStages},
    ratelimit::RateLimiter,
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    store: Arc<JobStore>,
    rate_limiter: Arc<RateLimiter>,
    orchestrator: Arc<PipelineOrchestrator>,
    transcriber_client: Arc<TranscriberClient>,
    summarizer_client: Arc<SummarizerClient>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn store(&self) -> &Arc<JobStore> {
        &self.registry.store
    }

    pub(crate) fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.registry.rate_limiter
    }

    pub(crate) fn orchestrator(&self) -> Arc<PipelineOrchestrator> {
        Arc::clone(&self.registry.orchestrator)
    }

    pub(crate) fn transcriber_client(&self) -> &Arc<TranscriberClient> {
        &self.registry.transcriber_client
    }

    pub(crate) fn summarizer_client(&self) -> &Arc<SummarizerClient> {
        &self.registry.summarizer_client
    }
}

impl ComponentRegistry {
    /// Initialize every shared component from configuration.
    ///
    /// # Errors
    /// Returns an error when telemetry or HTTP client construction fails.
    pub fn build(config: Config) -> Result<Self> {
        let transcriber = Arc::new(TranscriberClient::new(&ClientConfig {
            base_url: config.transcriber_base_url().to_string(),
            connect_timeout: config.stage_connect_timeout(),
            request_timeout: config.transcribe_timeout(),
        })?);
        let summarizer = Arc::new(SummarizerClient::new(&ClientConfig {
            base_url: config.summarizer_base_url().to_string(),
            connect_timeout: config.stage_connect_timeout(),
            request_timeout: config.summarize_timeout(),
        })?);
        let enhancer = Arc::new(EnhancerClient::new(&ClientConfig {
            base_url: config.enhancer_base_url().to_string(),
            connect_timeout: config.stage_connect_timeout(),
            request_timeout: config.preprocess_timeout(),
        })?);
        let reasoner = Arc::new(ReasonerClient::new(&ClientConfig {
            base_url: config.reasoner_base_url().to_string(),
            connect_timeout: config.stage_connect_timeout(),
            request_timeout: config.reasoning_timeout(),
        })?);

        let stages = PipelineStages {
            preprocess: enhancer,
            transcribe: Arc::clone(&transcriber) as _,
            summarize: Arc::clone(&summarizer) as _,
            reason: reasoner,
        };

        Self::with_stages(config, stages, transcriber, summarizer)
    }

    /// Assembly seam for tests: same wiring as [`Self::build`], with the
    /// pipeline stages supplied by the caller.
    pub fn with_stages(
        config: Config,
        stages: PipelineStages,
        transcriber_client: Arc<TranscriberClient>,
        summarizer_client: Arc<SummarizerClient>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;
        let store = Arc::new(JobStore::new());
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_enabled(),
            config.rate_limit_requests(),
            config.rate_limit_window(),
        ));
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            Arc::clone(&store),
            stages,
            Arc::clone(telemetry.metrics()),
        ));

        Ok(Self {
            config,
            telemetry,
            store,
            rate_limiter,
            orchestrator,
            transcriber_client,
            summarizer_client,
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn store(&self) -> Arc<JobStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_MUTEX;

    #[tokio::test]
    async fn component_registry_builds() {
        let config = {
            let _lock = ENV_MUTEX.lock().expect("env mutex");
            // SAFETY: test code adjusts deterministic environment state sequentially.
            unsafe {
                std::env::set_var("TRANSCRIBER_BASE_URL", "http://localhost:9200/");
                std::env::set_var("SUMMARIZER_BASE_URL", "http://localhost:9201/");
            }

            Config::from_env().expect("config loads")
        };
        let registry = ComponentRegistry::build(config).expect("registry builds");
        let state = AppState::new(registry);

        state.telemetry().record_ready_probe();
        assert_eq!(state.store().stats().total, 0);
        assert!(state.rate_limiter().allow("test-client").allowed);
    }
}
