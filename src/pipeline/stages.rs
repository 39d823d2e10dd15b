//! Stage contracts the orchestrator drives.
//!
//! Each processing phase is a trait so the orchestrator can be exercised with
//! in-process fakes while production wires in the HTTP clients.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Failure of a single pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The backing service could not be reached or did not answer in time.
    /// The pipeline reports these as retryable.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The service answered but processing failed.
    #[error("{0}")]
    Failed(String),
}

/// Output of audio preprocessing.
#[derive(Debug, Clone, Deserialize)]
pub struct PreprocessedAudio {
    /// Path to the cleaned audio file. A temporary that the pipeline removes
    /// once the run finishes, success or not.
    pub clean_path: String,
    /// Whether enhancement actually ran (it is skipped when disabled or when
    /// the enhancer is down).
    pub enhanced: bool,
    #[serde(default)]
    pub enhancer: Option<String>,
}

/// One timed span of recognized speech.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Full speech-to-text output.
#[derive(Debug, Clone, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

#[async_trait]
pub trait PreprocessStage: Send + Sync {
    /// Cleans and normalizes the raw upload, optionally running enhancement.
    async fn preprocess(
        &self,
        raw_audio_path: &str,
        enhance: bool,
    ) -> Result<PreprocessedAudio, StageError>;
}

#[async_trait]
pub trait TranscribeStage: Send + Sync {
    async fn transcribe(&self, clean_audio_path: &str) -> Result<Transcript, StageError>;
}

#[async_trait]
pub trait SummarizeStage: Send + Sync {
    /// Produces structured notes from the transcript. `ratio` is the target
    /// summary length as a fraction of the input.
    async fn summarize(
        &self,
        text: &str,
        ratio: f64,
        subject: Option<&str>,
    ) -> Result<String, StageError>;
}

#[async_trait]
pub trait ReasonStage: Send + Sync {
    /// Extracts concepts and relationships from the transcript.
    async fn analyze(&self, text: &str, domain: &str) -> Result<serde_json::Value, StageError>;
}
