use std::io::ErrorKind;

use tracing::{debug, warn};

/// Best-effort removal of an intermediate temp file.
///
/// Missing files are fine (another exit path may have cleaned up first); any
/// other error is logged and swallowed so cleanup can never fail a job.
pub async fn delete_temp(path: &str) {
    if path.is_empty() {
        return;
    }

    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path, "removed temp file"),
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => warn!(path, error = %error, "failed to remove temp file"),
    }
}
