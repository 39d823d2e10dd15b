//! Client for the Whisper transcription service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::debug;

use crate::pipeline::{StageError, TranscribeStage, Transcript};

use super::{ClientConfig, build_http_client, check_status, transport_error};

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    audio_path: &'a str,
}

#[derive(Debug, Clone)]
pub struct TranscriberClient {
    client: Client,
    base_url: Url,
    request_timeout: std::time::Duration,
}

impl TranscriberClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = build_http_client(config, "transcriber")?;
        let base_url = Url::parse(&config.base_url).context("invalid transcriber base URL")?;
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
            .context("failed to build transcriber health URL")?;

        self.client
            .get(url)
            .send()
            .await
            .context("transcriber health request failed")?
            .error_for_status()
            .context("transcriber health endpoint returned error status")?;

        Ok(())
    }
}

#[async_trait]
impl TranscribeStage for TranscriberClient {
    async fn transcribe(&self, clean_audio_path: &str) -> Result<Transcript, StageError> {
        let url = self
            .base_url
            .join("v1/transcribe")
            .map_err(|err| StageError::Failed(format!("invalid transcribe URL: {err}")))?;

        debug!(audio_path = clean_audio_path, "sending transcription request");

        let response = self
            .client
            .post(url)
            .json(&TranscribeRequest {
                audio_path: clean_audio_path,
            })
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| transport_error(&err, "transcriber"))?;

        check_status(response, "transcriber")
            .await?
            .json::<Transcript>()
            .await
            .map_err(|err| {
                StageError::Failed(format!("failed to deserialize transcriber response: {err}"))
            })
    }
}
