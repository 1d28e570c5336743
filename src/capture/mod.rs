mod metadata;
mod preview;
mod scheduler;
mod state;
#[cfg(test)]
mod tests;

pub use metadata::{save_metadata, SessionMetadata};
#[cfg(all(feature = "display", target_os = "linux"))]
pub use preview::GstPreviewBackend;
pub use preview::{default_preview_backend, run_preview, PreviewBackend, PreviewSurface};
pub use scheduler::{CaptureScheduler, SchedulerSettings};
pub use state::{CaptureOutcome, CapturePhase, CaptureState, CaptureStats};
