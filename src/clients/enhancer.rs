//! Client for the audio cleanup and enhancement service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{debug, warn};

use crate::pipeline::{PreprocessStage, PreprocessedAudio, StageError};

use super::{ClientConfig, build_http_client, check_status, transport_error};

#[derive(Debug, Serialize)]
struct EnhanceRequest<'a> {
    audio_path: &'a str,
    enhance: bool,
}

#[derive(Debug, Clone)]
pub struct EnhancerClient {
    client: Client,
    base_url: Url,
    request_timeout: std::time::Duration,
}

impl EnhancerClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = build_http_client(config, "enhancer")?;
        let base_url = Url::parse(&config.base_url).context("invalid enhancer base URL")?;
        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout,
        })
    }

    async fn enhance(
        &self,
        raw_audio_path: &str,
        enhance: bool,
    ) -> Result<PreprocessedAudio, StageError> {
        let url = self
            .base_url
            .join("v1/enhance")
            .map_err(|err| StageError::Failed(format!("invalid enhance URL: {err}")))?;

        debug!(audio_path = raw_audio_path, enhance, "sending preprocess request");

        let response = self
            .client
            .post(url)
            .json(&EnhanceRequest {
                audio_path: raw_audio_path,
                enhance,
            })
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| transport_error(&err, "enhancer"))?;

        check_status(response, "enhancer")
            .await?
            .json::<PreprocessedAudio>()
            .await
            .map_err(|err| {
                StageError::Failed(format!("failed to deserialize enhancer response: {err}"))
            })
    }
}

#[async_trait]
impl PreprocessStage for EnhancerClient {
    /// Preprocessing is mandatory; enhancement is best-effort. When the
    /// enhancement pass fails the stage retries with plain cleanup so a
    /// degraded enhancer never blocks transcription.
    async fn preprocess(
        &self,
        raw_audio_path: &str,
        enhance: bool,
    ) -> Result<PreprocessedAudio, StageError> {
        if enhance {
            match self.enhance(raw_audio_path, true).await {
                Ok(preprocessed) => return Ok(preprocessed),
                Err(err) => {
                    warn!(error = %err, "enhancement failed, falling back to plain cleanup");
                }
            }
        }
        self.enhance(raw_audio_path, false).await
    }
}
