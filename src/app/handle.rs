use super::worker::CaptureReport;
use crate::error::{Result, TimelapseError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle on a running capture worker
pub struct CaptureHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<CaptureReport>>,
}

impl CaptureHandle {
    pub(crate) fn new(cancel: CancellationToken, task: JoinHandle<Result<CaptureReport>>) -> Self {
        Self { cancel, task }
    }

    /// Ask the worker to stop at its next tick
    pub fn cancel(&self) {
        debug!("Capture cancellation requested");
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker to finish and release its resources.
    ///
    /// An interrupted session comes back as a report with an `Interrupted`
    /// outcome, not as an error.
    pub async fn join(self) -> Result<CaptureReport> {
        self.task
            .await
            .map_err(|e| TimelapseError::system(format!("Capture worker failed: {}", e)))?
    }
}
