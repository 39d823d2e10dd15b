//! Job records and the synchronized in-memory store that owns them.

pub mod store;
pub mod types;

pub use store::{JobStore, StoreStats};
pub use types::{Job, JobProgress, JobStatus, ProcessingStage};
