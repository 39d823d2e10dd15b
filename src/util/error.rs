//! Stable error codes and best-effort failure classification.

use std::fmt;

use serde::Serialize;

/// Machine-readable error token surfaced on failed jobs and API errors.
///
/// Clients branch on these tokens, so variants are append-only and the
/// serialized form never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParameters,
    RateLimitExceeded,
    PreprocessingFailed,
    TranscriptionFailed,
    SummarizationFailed,
    ReasoningFailed,
    ServiceUnavailable,
    PhiDetected,
    InternalError,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidParameters => "invalid_parameters",
            ErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            ErrorCode::PreprocessingFailed => "preprocessing_failed",
            ErrorCode::TranscriptionFailed => "transcription_failed",
            ErrorCode::SummarizationFailed => "summarization_failed",
            ErrorCode::ReasoningFailed => "reasoning_failed",
            ErrorCode::ServiceUnavailable => "service_unavailable",
            ErrorCode::PhiDetected => "phi_detected",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword classification for failures that arrive without a typed code.
///
/// Connectivity and timeout wording maps to `ServiceUnavailable` so a client
/// can retry later; stage-specific wording maps to the matching stage code.
/// Returns `None` when nothing in the message is recognizable.
#[must_use]
pub fn classify_failure_message(message: &str) -> Option<ErrorCode> {
    let lower = message.to_lowercase();

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("unreachable")
        || lower.contains("connection refused")
        || lower.contains("failed to connect")
    {
        return Some(ErrorCode::ServiceUnavailable);
    }
    if lower.contains("transcrib") || lower.contains("whisper") {
        return Some(ErrorCode::TranscriptionFailed);
    }
    if lower.contains("summar") || lower.contains("ollama") {
        return Some(ErrorCode::SummarizationFailed);
    }
    if lower.contains("preprocess") || lower.contains("enhanc") {
        return Some(ErrorCode::PreprocessingFailed);
    }

    None
}
