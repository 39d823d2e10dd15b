//! Client for the concept-extraction (reasoning) service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::pipeline::{ReasonStage, StageError};

use super::{ClientConfig, build_http_client, check_status, transport_error};

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    domain: &'a str,
}

#[derive(Debug, Clone)]
pub struct ReasonerClient {
    client: Client,
    base_url: Url,
    request_timeout: std::time::Duration,
}

impl ReasonerClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = build_http_client(config, "reasoner")?;
        let base_url = Url::parse(&config.base_url).context("invalid reasoner base URL")?;
        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout,
        })
    }
}

#[async_trait]
impl ReasonStage for ReasonerClient {
    async fn analyze(&self, text: &str, domain: &str) -> Result<Value, StageError> {
        let url = self
            .base_url
            .join("v1/analyze")
            .map_err(|err| StageError::Failed(format!("invalid analyze URL: {err}")))?;

        debug!(text_length = text.len(), domain, "sending reasoning request");

        let response = self
            .client
            .post(url)
            .json(&AnalyzeRequest { text, domain })
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| transport_error(&err, "reasoner"))?;

        check_status(response, "reasoner")
            .await?
            .json::<Value>()
            .await
            .map_err(|err| {
                StageError::Failed(format!("failed to deserialize reasoner response: {err}"))
            })
    }
}
