//! Client for the note-generation (summarization) service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::{StageError, SummarizeStage};

use super::{ClientConfig, build_http_client, check_status, transport_error};

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    text: &'a str,
    ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    summary: String,
}

#[derive(Debug, Clone)]
pub struct SummarizerClient {
    client: Client,
    base_url: Url,
    request_timeout: std::time::Duration,
}

impl SummarizerClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = build_http_client(config, "summarizer")?;
        let base_url = Url::parse(&config.base_url).context("invalid summarizer base URL")?;
        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout,
        })
    }

    /// Readiness probe used by `/health/ready`.
    pub async fn ping(&self) -> Result<()> {
        let url = self
            .base_url
            .join("health")
            .context("failed to build summarizer health URL")?;

        self.client
            .get(url)
            .send()
            .await
            .context("summarizer health request failed")?
            .error_for_status()
            .context("summarizer health endpoint returned error status")?;

        Ok(())
    }
}

#[async_trait]
impl SummarizeStage for SummarizerClient {
    async fn summarize(
        &self,
        text: &str,
        ratio: f64,
        subject: Option<&str>,
    ) -> Result<String, StageError> {
        let url = self
            .base_url
            .join("v1/summarize")
            .map_err(|err| StageError::Failed(format!("invalid summarize URL: {err}")))?;

        debug!(text_length = text.len(), ratio, "sending summarization request");

        let response = self
            .client
            .post(url)
            .json(&SummarizeRequest {
                text,
                ratio,
                subject,
            })
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| transport_error(&err, "summarizer"))?;

        let parsed = check_status(response, "summarizer")
            .await?
            .json::<SummarizeResponse>()
            .await
            .map_err(|err| {
                StageError::Failed(format!("failed to deserialize summarizer response: {err}"))
            })?;

        Ok(parsed.summary)
    }
}
