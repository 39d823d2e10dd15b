use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use scribe_worker::{
    app::{ComponentRegistry, build_router},
    config::Config,
    janitor::{JanitorConfig, spawn_janitor},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(|s| s.as_str())
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    // Tracing initialization is handled by Telemetry::new()
    let config = Config::from_env().context("failed to load configuration")?;
    let bind_addr = config.http_bind();
    let janitor_config = JanitorConfig {
        interval: config.janitor_interval(),
        job_max_age: config.job_retention(),
        failed_job_max_age: config.failed_job_retention(),
        max_jobs: config.max_jobs(),
    };
    let registry =
        ComponentRegistry::build(config).context("failed to build component registry")?;

    let _janitor = spawn_janitor(
        registry.store(),
        registry.rate_limiter(),
        std::sync::Arc::clone(registry.telemetry().metrics()),
        janitor_config,
    );
    let router = build_router(registry);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {bind_addr}"))?;

    info!(%bind_addr, "listening");

    if let Err(error) = axum::serve(listener, router).await {
        warn!(error = %error, "server exited with error");
    }

    Ok(())
}
