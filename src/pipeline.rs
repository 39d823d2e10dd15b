//! Multi-stage audio processing pipeline.

pub mod orchestrator;
pub mod stages;

pub use orchestrator::{PipelineOrchestrator, PipelineRequest, PipelineStages};
pub use stages::{
    PreprocessStage, PreprocessedAudio, ReasonStage, StageError, SummarizeStage, TranscribeStage,
    Transcript, TranscriptSegment,
};
