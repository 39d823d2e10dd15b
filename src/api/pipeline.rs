use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::pipeline::PipelineRequest;
use crate::ratelimit::RateDecision;
use crate::util::error::ErrorCode;

const MIN_RATIO: f64 = 0.05;
const MAX_RATIO: f64 = 1.0;
const MAX_SUBJECT_LEN: usize = 100;

fn default_ratio() -> f64 {
    0.15
}

fn default_enhance() -> bool {
    true
}

fn default_async_mode() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(crate) struct PipelineSubmission {
    audio_path: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default = "default_ratio")]
    ratio: f64,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default = "default_enhance")]
    enhance: bool,
    #[serde(default)]
    include_reasoning: Option<bool>,
    #[serde(default)]
    reasoning_domain: Option<String>,
    #[serde(default = "default_async_mode")]
    async_mode: bool,
}

#[derive(Debug, Serialize)]
struct SubmissionAccepted {
    job_id: Uuid,
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::BAD_REQUEST,
            Json(Self {
                error: ErrorCode::InvalidParameters.as_str(),
                message: message.into(),
                retry_after_seconds: None,
            }),
        )
    }
}

/// POST /v1/pipeline
///
/// Validates the submission, runs admission control, then either spawns the
/// pipeline in the background (default) or runs it inline and returns the
/// finished job.
pub(crate) async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(submission): Json<PipelineSubmission>,
) -> Response {
    let client_id = client_identifier(&headers);
    let decision = state.rate_limiter().allow(&client_id);
    if !decision.allowed {
        state.telemetry().metrics().rate_limit_denials.inc();
        info!(client_id, retry_after = decision.retry_after_seconds, "submission rate limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            rate_limit_headers(&decision),
            [("retry-after", decision.retry_after_seconds.to_string())],
            Json(ApiError {
                error: ErrorCode::RateLimitExceeded.as_str(),
                message: "Too many requests. Please slow down.".to_string(),
                retry_after_seconds: Some(decision.retry_after_seconds),
            }),
        )
            .into_response();
    }

    let (request, async_mode) = match build_request(&state, submission) {
        Ok(parts) => parts,
        Err(response) => return response.into_response(),
    };

    let job_id = state.store().create();
    state.telemetry().metrics().jobs_created.inc();

    if async_mode {
        let orchestrator = state.orchestrator();
        tokio::spawn(async move {
            orchestrator.run(job_id, request).await;
        });
        return (
            StatusCode::ACCEPTED,
            rate_limit_headers(&decision),
            Json(SubmissionAccepted {
                job_id,
                status: "processing",
                message: "Audio accepted for processing. Poll the job for progress.",
            }),
        )
            .into_response();
    }

    state.orchestrator().run(job_id, request).await;
    match state.store().get(job_id) {
        Some(job) => (StatusCode::OK, rate_limit_headers(&decision), Json(job)).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                error: ErrorCode::InternalError.as_str(),
                message: "job record disappeared during processing".to_string(),
                retry_after_seconds: None,
            }),
        )
            .into_response(),
    }
}

/// GET /v1/pipeline/{job_id}
pub(crate) async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Response {
    match state.store().get(job_id) {
        Some(job) => Json(job).into_response(),
        None => job_not_found().into_response(),
    }
}

/// DELETE /v1/pipeline/{job_id}
///
/// Flips the job to cancelled; a running pipeline notices at its next
/// between-stage check.
pub(crate) async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Response {
    if state.store().get(job_id).is_none() {
        return job_not_found().into_response();
    }

    if state.store().cancel(job_id) {
        state.telemetry().metrics().jobs_cancelled.inc();
        return Json(serde_json::json!({
            "job_id": job_id,
            "status": "cancelled",
        }))
        .into_response();
    }

    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: "cannot_cancel",
            message: "job already finished".to_string(),
            retry_after_seconds: None,
        }),
    )
        .into_response()
}

fn job_not_found() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError {
            error: "job_not_found",
            message: "no job with that id (it may have been evicted)".to_string(),
            retry_after_seconds: None,
        }),
    )
}

fn build_request(
    state: &AppState,
    submission: PipelineSubmission,
) -> Result<(PipelineRequest, bool), (StatusCode, Json<ApiError>)> {
    if submission.audio_path.trim().is_empty() {
        return Err(ApiError::invalid("audio_path must not be empty"));
    }
    if !submission.ratio.is_finite()
        || submission.ratio < MIN_RATIO
        || submission.ratio > MAX_RATIO
    {
        return Err(ApiError::invalid(format!(
            "ratio must be between {MIN_RATIO} and {MAX_RATIO}"
        )));
    }

    let filename = submission.filename.unwrap_or_else(|| {
        submission
            .audio_path
            .rsplit('/')
            .next()
            .unwrap_or("upload")
            .to_string()
    });

    let request = PipelineRequest {
        raw_audio_path: submission.audio_path,
        filename,
        ratio: submission.ratio,
        subject: submission.subject.as_deref().and_then(sanitize_subject),
        enhance: submission.enhance,
        include_reasoning: submission
            .include_reasoning
            .unwrap_or_else(|| state.config().reasoning_enabled()),
        reasoning_domain: submission
            .reasoning_domain
            .unwrap_or_else(|| state.config().reasoning_domain().to_string()),
    };
    Ok((request, submission.async_mode))
}

/// Free-text field that later lands in a prompt; strip control characters
/// and clamp the length.
fn sanitize_subject(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|ch| !ch.is_control())
        .take(MAX_SUBJECT_LEN)
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Best identity available: API key prefix, then forwarded client address.
/// Only the first 8 key characters are used so logs never carry a full
/// credential.
fn client_identifier(headers: &HeaderMap) -> String {
    if let Some(key) = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
    {
        let prefix: String = key.chars().take(8).collect();
        return format!("key:{prefix}");
    }

    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
    {
        return format!("ip:{forwarded}");
    }

    "ip:unknown".to_string()
}

fn rate_limit_headers(decision: &RateDecision) -> [(&'static str, String); 2] {
    [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
    ]
}
