//! Drives one job through preprocess, transcribe, screen, summarize and the
//! optional reasoning pass.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::jobs::{JobStatus, JobStore, ProcessingStage};
use crate::observability::metrics::Metrics;
use crate::screening::PhiScreener;
use crate::util::cleanup::delete_temp;
use crate::util::error::{ErrorCode, classify_failure_message};

use super::stages::{
    PreprocessStage, ReasonStage, StageError, SummarizeStage, TranscribeStage, Transcript,
};

/// Container for the stage implementations the orchestrator drives.
pub struct PipelineStages {
    pub preprocess: Arc<dyn PreprocessStage>,
    pub transcribe: Arc<dyn TranscribeStage>,
    pub summarize: Arc<dyn SummarizeStage>,
    pub reason: Arc<dyn ReasonStage>,
}

/// Everything a single run needs to know about the upload.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub raw_audio_path: String,
    pub filename: String,
    pub ratio: f64,
    pub subject: Option<String>,
    pub enhance: bool,
    pub include_reasoning: bool,
    pub reasoning_domain: String,
}

struct StageFailure {
    code: ErrorCode,
    message: String,
}

impl StageFailure {
    fn from_stage_error(err: &StageError, fallback: ErrorCode) -> Self {
        let message = err.to_string();
        let code = match err {
            StageError::Unavailable(_) => ErrorCode::ServiceUnavailable,
            StageError::Failed(_) => classify_failure_message(&message).unwrap_or(fallback),
        };
        Self { code, message }
    }
}

enum RunOutcome {
    Completed(Value),
    Cancelled,
}

/// Coordinates stage execution and owns the job's state transitions.
///
/// Cancellation is cooperative: the status flip done by [`JobStore::cancel`]
/// is observed here before each stage, so an in-flight stage call always runs
/// to completion before the run winds down.
pub struct PipelineOrchestrator {
    store: Arc<JobStore>,
    screener: PhiScreener,
    stages: PipelineStages,
    metrics: Arc<Metrics>,
}

impl PipelineOrchestrator {
    #[must_use]
    pub fn new(store: Arc<JobStore>, stages: PipelineStages, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            screener: PhiScreener::new(),
            stages,
            metrics,
        }
    }

    /// Run the whole pipeline for `job_id` and settle the job's final state.
    ///
    /// Whatever happens inside, temporary stage outputs are removed before
    /// this returns. The raw upload is the caller's file and is left alone.
    pub async fn run(&self, job_id: Uuid, request: PipelineRequest) {
        self.metrics.active_jobs.inc();
        let mut temp_paths: Vec<String> = Vec::new();

        let outcome = self.execute(job_id, &request, &mut temp_paths).await;

        for path in &temp_paths {
            delete_temp(path).await;
        }

        match outcome {
            Ok(RunOutcome::Completed(result)) => {
                self.store.complete(job_id, result);
                self.metrics.jobs_completed.inc();
            }
            Ok(RunOutcome::Cancelled) => {
                info!(job_id = %job_id, "pipeline stopped after cancellation");
            }
            Err(failure) => {
                self.store.fail(job_id, failure.message, failure.code);
                self.metrics.jobs_failed.inc();
            }
        }
        self.metrics.active_jobs.dec();
    }

    async fn execute(
        &self,
        job_id: Uuid,
        request: &PipelineRequest,
        temp_paths: &mut Vec<String>,
    ) -> Result<RunOutcome, StageFailure> {
        if self.is_cancelled(job_id) {
            return Ok(RunOutcome::Cancelled);
        }

        self.store.update_progress(
            job_id,
            ProcessingStage::Preprocessing,
            25,
            "Cleaning and normalizing audio",
        );
        let preprocessed = self
            .stages
            .preprocess
            .preprocess(&request.raw_audio_path, request.enhance)
            .await
            .map_err(|err| StageFailure::from_stage_error(&err, ErrorCode::PreprocessingFailed))?;
        temp_paths.push(preprocessed.clean_path.clone());

        if self.is_cancelled(job_id) {
            return Ok(RunOutcome::Cancelled);
        }

        self.store.update_progress(
            job_id,
            ProcessingStage::Transcribing,
            50,
            "Transcribing audio with Whisper",
        );
        let transcript = self
            .stages
            .transcribe
            .transcribe(&preprocessed.clean_path)
            .await
            .map_err(|err| StageFailure::from_stage_error(&err, ErrorCode::TranscriptionFailed))?;

        let screening = self.screener.scan(&transcript.text);
        if screening.flagged {
            self.metrics.phi_rejections.inc();
            return Err(StageFailure {
                code: ErrorCode::PhiDetected,
                message: screening.recommendation,
            });
        }

        if self.is_cancelled(job_id) {
            return Ok(RunOutcome::Cancelled);
        }

        self.store.update_progress(
            job_id,
            ProcessingStage::Summarizing,
            75,
            "Generating structured study notes",
        );
        let summary = self
            .stages
            .summarize
            .summarize(&transcript.text, request.ratio, request.subject.as_deref())
            .await
            .map_err(|err| StageFailure::from_stage_error(&err, ErrorCode::SummarizationFailed))?;

        let reasoning = if request.include_reasoning {
            if self.is_cancelled(job_id) {
                return Ok(RunOutcome::Cancelled);
            }

            self.store.update_progress(
                job_id,
                ProcessingStage::Reasoning,
                90,
                "Extracting concepts and relationships",
            );
            let analysis = self
                .stages
                .reason
                .analyze(&transcript.text, &request.reasoning_domain)
                .await
                .map_err(|err| StageFailure::from_stage_error(&err, ErrorCode::ReasoningFailed))?;
            Some(analysis)
        } else {
            debug!(job_id = %job_id, "reasoning stage disabled for this run");
            None
        };

        Ok(RunOutcome::Completed(Self::assemble_result(
            request,
            &preprocessed.enhancer,
            preprocessed.enhanced,
            &transcript,
            &summary,
            reasoning,
        )))
    }

    fn is_cancelled(&self, job_id: Uuid) -> bool {
        match self.store.status(job_id) {
            Some(JobStatus::Cancelled) => true,
            Some(_) => false,
            None => {
                // The janitor never evicts in-flight jobs, so a missing id
                // means the job was removed out-of-band. Stop quietly.
                warn!(job_id = %job_id, "job disappeared mid-pipeline");
                true
            }
        }
    }

    fn assemble_result(
        request: &PipelineRequest,
        enhancer: &Option<String>,
        enhanced: bool,
        transcript: &Transcript,
        summary: &str,
        reasoning: Option<Value>,
    ) -> Value {
        json!({
            "success": true,
            "transcription": transcript.text,
            "segments": transcript.segments,
            "summary": summary,
            "reasoning": reasoning,
            "metadata": {
                "filename": request.filename,
                "duration_seconds": transcript.duration_seconds,
                "language": transcript.language,
                "segment_count": transcript.segments.len(),
                "ratio": request.ratio,
                "subject": request.subject,
                "enhanced": enhanced,
                "enhancer": enhancer,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use prometheus::Registry;
    use tokio::sync::Notify;

    use super::*;
    use crate::pipeline::stages::PreprocessedAudio;

    struct FakePreprocess {
        clean_path: String,
        fail_with: Option<fn() -> StageError>,
    }

    #[async_trait]
    impl PreprocessStage for FakePreprocess {
        async fn preprocess(
            &self,
            _raw_audio_path: &str,
            enhance: bool,
        ) -> Result<PreprocessedAudio, StageError> {
            if let Some(make_err) = self.fail_with {
                return Err(make_err());
            }
            Ok(PreprocessedAudio {
                clean_path: self.clean_path.clone(),
                enhanced: enhance,
                enhancer: enhance.then(|| "deepfilternet".to_string()),
            })
        }
    }

    struct FakeTranscribe {
        text: String,
        fail_with: Option<fn() -> StageError>,
    }

    #[async_trait]
    impl TranscribeStage for FakeTranscribe {
        async fn transcribe(&self, _clean_audio_path: &str) -> Result<Transcript, StageError> {
            if let Some(make_err) = self.fail_with {
                return Err(make_err());
            }
            Ok(Transcript {
                text: self.text.clone(),
                segments: Vec::new(),
                language: Some("en".to_string()),
                duration_seconds: Some(120.0),
            })
        }
    }

    #[derive(Default)]
    struct FakeSummarize {
        called: AtomicBool,
        fail_with: Option<fn() -> StageError>,
    }

    #[async_trait]
    impl SummarizeStage for FakeSummarize {
        async fn summarize(
            &self,
            _text: &str,
            _ratio: f64,
            _subject: Option<&str>,
        ) -> Result<String, StageError> {
            self.called.store(true, Ordering::SeqCst);
            if let Some(make_err) = self.fail_with {
                return Err(make_err());
            }
            Ok("## Notes".to_string())
        }
    }

    #[derive(Default)]
    struct FakeReason {
        called: AtomicBool,
    }

    #[async_trait]
    impl ReasonStage for FakeReason {
        async fn analyze(&self, _text: &str, _domain: &str) -> Result<Value, StageError> {
            self.called.store(true, Ordering::SeqCst);
            Ok(json!({"concepts": []}))
        }
    }

    struct Harness {
        store: Arc<JobStore>,
        summarize: Arc<FakeSummarize>,
        reason: Arc<FakeReason>,
        orchestrator: PipelineOrchestrator,
    }

    fn harness_with(
        preprocess_fail: Option<fn() -> StageError>,
        transcribe_fail: Option<fn() -> StageError>,
        summarize_fail: Option<fn() -> StageError>,
        transcript_text: &str,
        clean_path: &str,
    ) -> Harness {
        let store = Arc::new(JobStore::new());
        let summarize = Arc::new(FakeSummarize {
            called: AtomicBool::new(false),
            fail_with: summarize_fail,
        });
        let reason = Arc::new(FakeReason::default());
        let stages = PipelineStages {
            preprocess: Arc::new(FakePreprocess {
                clean_path: clean_path.to_string(),
                fail_with: preprocess_fail,
            }),
            transcribe: Arc::new(FakeTranscribe {
                text: transcript_text.to_string(),
                fail_with: transcribe_fail,
            }),
            summarize: Arc::clone(&summarize) as Arc<dyn SummarizeStage>,
            reason: Arc::clone(&reason) as Arc<dyn ReasonStage>,
        };
        let metrics = Arc::new(Metrics::new(&Registry::new()).expect("metrics"));
        let orchestrator = PipelineOrchestrator::new(Arc::clone(&store), stages, metrics);
        Harness {
            store,
            summarize,
            reason,
            orchestrator,
        }
    }

    fn harness(transcript_text: &str) -> Harness {
        harness_with(None, None, None, transcript_text, "/tmp/clean-missing.wav")
    }

    fn request(include_reasoning: bool) -> PipelineRequest {
        PipelineRequest {
            raw_audio_path: "/tmp/raw.wav".to_string(),
            filename: "lecture.wav".to_string(),
            ratio: 0.15,
            subject: Some("anatomy".to_string()),
            enhance: true,
            include_reasoning,
            reasoning_domain: "medicine".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_run_completes_with_result_payload() {
        let h = harness("The heart has four chambers.");
        let id = h.store.create();

        h.orchestrator.run(id, request(true)).await;

        let job = h.store.get(id).expect("job exists");
        assert_eq!(job.status, JobStatus::Completed);
        let result = job.result.expect("result payload");
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["summary"], json!("## Notes"));
        assert_eq!(result["metadata"]["filename"], json!("lecture.wav"));
        assert_eq!(result["metadata"]["enhanced"], json!(true));
        assert!(result["reasoning"].is_object());
        assert!(h.reason.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn reasoning_is_skipped_when_disabled() {
        let h = harness("Plain lecture content.");
        let id = h.store.create();

        h.orchestrator.run(id, request(false)).await;

        let job = h.store.get(id).expect("job exists");
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.expect("result")["reasoning"].is_null());
        assert!(!h.reason.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn transcription_outage_fails_as_service_unavailable() {
        let h = harness_with(
            None,
            Some(|| StageError::Unavailable("whisper timed out".to_string())),
            None,
            "",
            "/tmp/clean-missing.wav",
        );
        let id = h.store.create();

        h.orchestrator.run(id, request(false)).await;

        let job = h.store.get(id).expect("job exists");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code, Some(ErrorCode::ServiceUnavailable));
        assert!(!h.summarize.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn preprocess_failure_carries_stage_error_code() {
        let h = harness_with(
            Some(|| StageError::Failed("codec rejected input".to_string())),
            None,
            None,
            "",
            "/tmp/clean-missing.wav",
        );
        let id = h.store.create();

        h.orchestrator.run(id, request(false)).await;

        let job = h.store.get(id).expect("job exists");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code, Some(ErrorCode::PreprocessingFailed));
    }

    #[tokio::test]
    async fn summarize_failure_message_is_classified() {
        let h = harness_with(
            None,
            None,
            Some(|| StageError::Failed("ollama returned malformed output".to_string())),
            "Plain lecture content.",
            "/tmp/clean-missing.wav",
        );
        let id = h.store.create();

        h.orchestrator.run(id, request(false)).await;

        let job = h.store.get(id).expect("job exists");
        assert_eq!(job.error_code, Some(ErrorCode::SummarizationFailed));
    }

    #[tokio::test]
    async fn phi_in_transcript_rejects_before_summarization() {
        let h = harness("Patient SSN: 123-45-6789 was admitted.");
        let id = h.store.create();

        h.orchestrator.run(id, request(false)).await;

        let job = h.store.get(id).expect("job exists");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code, Some(ErrorCode::PhiDetected));
        assert!(job.error.expect("error message").contains("Rejected"));
        assert!(!h.summarize.called.load(Ordering::SeqCst));
    }

    struct GatedTranscribe {
        started: Notify,
        release: Notify,
        finished: AtomicBool,
    }

    #[async_trait]
    impl TranscribeStage for GatedTranscribe {
        async fn transcribe(&self, _clean_audio_path: &str) -> Result<Transcript, StageError> {
            self.started.notify_one();
            self.release.notified().await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(Transcript {
                text: "Plain lecture content.".to_string(),
                segments: Vec::new(),
                language: None,
                duration_seconds: None,
            })
        }
    }

    #[tokio::test]
    async fn mid_stage_cancellation_discards_the_stage_output() {
        let store = Arc::new(JobStore::new());
        let transcribe = Arc::new(GatedTranscribe {
            started: Notify::new(),
            release: Notify::new(),
            finished: AtomicBool::new(false),
        });
        let summarize = Arc::new(FakeSummarize::default());
        let stages = PipelineStages {
            preprocess: Arc::new(FakePreprocess {
                clean_path: "/tmp/clean-missing.wav".to_string(),
                fail_with: None,
            }),
            transcribe: Arc::clone(&transcribe) as Arc<dyn TranscribeStage>,
            summarize: Arc::clone(&summarize) as Arc<dyn SummarizeStage>,
            reason: Arc::new(FakeReason::default()),
        };
        let metrics = Arc::new(Metrics::new(&Registry::new()).expect("metrics"));
        let orchestrator = Arc::new(PipelineOrchestrator::new(Arc::clone(&store), stages, metrics));
        let id = store.create();

        let run = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move {
                orchestrator.run(id, request(false)).await;
            }
        });

        // Cancel while the transcribe call is parked inside the stage.
        transcribe.started.notified().await;
        assert!(store.cancel(id));
        transcribe.release.notify_one();
        run.await.expect("pipeline task");

        // The in-flight stage ran to completion; its output went nowhere.
        assert!(transcribe.finished.load(Ordering::SeqCst));
        assert!(!summarize.called.load(Ordering::SeqCst));
        let job = store.get(id).expect("job exists");
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn cancelled_job_is_not_resurrected() {
        let h = harness("Plain lecture content.");
        let id = h.store.create();
        assert!(h.store.cancel(id));

        h.orchestrator.run(id, request(false)).await;

        let job = h.store.get(id).expect("job exists");
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.result.is_none());
        assert!(!h.summarize.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stage_temp_files_are_removed_after_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clean = dir.path().join("clean.wav");
        std::fs::write(&clean, b"riff").expect("write temp");

        let h = harness_with(
            None,
            None,
            None,
            "Plain lecture content.",
            clean.to_str().expect("utf8 path"),
        );
        let id = h.store.create();

        h.orchestrator.run(id, request(false)).await;

        assert_eq!(h.store.status(id), Some(JobStatus::Completed));
        assert!(!clean.exists(), "clean audio temp should be removed");
    }
}
