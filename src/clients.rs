//! HTTP clients for the stage backends.

pub mod enhancer;
pub mod reasoner;
pub mod summarizer;
pub mod transcriber;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

pub use enhancer::EnhancerClient;
pub use reasoner::ReasonerClient;
pub use summarizer::SummarizerClient;
pub use transcriber::TranscriberClient;

use crate::pipeline::StageError;

/// Connection settings shared by every stage client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

pub(crate) fn build_http_client(config: &ClientConfig, what: &str) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
        .with_context(|| format!("failed to build {what} client"))
}

/// Transport-level failures (timeouts, refused connections) are retryable
/// outages; everything else means the request itself was bad.
pub(crate) fn transport_error(err: &reqwest::Error, what: &str) -> StageError {
    if err.is_timeout() || err.is_connect() {
        StageError::Unavailable(format!("{what} request failed: {err}"))
    } else {
        StageError::Failed(format!("{what} request failed: {err}"))
    }
}

pub(crate) async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, StageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = truncate_error_body(&body);
    if status.is_server_error() {
        Err(StageError::Unavailable(format!(
            "{what} returned {status}: {detail}"
        )))
    } else {
        Err(StageError::Failed(format!(
            "{what} returned {status}: {detail}"
        )))
    }
}

fn truncate_error_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        return body.to_string();
    }
    let cut = body
        .char_indices()
        .take_while(|(idx, _)| *idx < MAX)
        .last()
        .map_or(0, |(idx, ch)| idx + ch.len_utf8());
    format!("{}... [truncated]", &body[..cut])
}
