use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::util::error::ErrorCode;

/// Lifecycle state of a pipeline job.
///
/// Transitions are monotonic: `Pending -> Processing -> {Completed | Failed |
/// Cancelled}`, with `Cancelled` reachable from `Pending` or `Processing`
/// only. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Named phase of the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Uploading,
    Preprocessing,
    Transcribing,
    Summarizing,
    Reasoning,
    Completed,
}

impl ProcessingStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStage::Uploading => "uploading",
            ProcessingStage::Preprocessing => "preprocessing",
            ProcessingStage::Transcribing => "transcribing",
            ProcessingStage::Summarizing => "summarizing",
            ProcessingStage::Reasoning => "reasoning",
            ProcessingStage::Completed => "completed",
        }
    }
}

/// Point-in-time progress telemetry for a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub stage: ProcessingStage,
    pub percent: u8,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl JobProgress {
    #[must_use]
    pub fn new(stage: ProcessingStage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.min(100),
            message: message.into(),
            updated_at: Utc::now(),
        }
    }
}

/// One audio-processing request and its tracked state.
///
/// When `status` is terminal exactly one of `result` / `error` is set; both
/// are empty while the job is pending or processing.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl Job {
    #[must_use]
    pub(crate) fn new(id: Uuid) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: JobProgress::new(ProcessingStage::Uploading, 0, "Job created"),
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
            error_code: None,
        }
    }
}
