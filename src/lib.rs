pub mod app;
pub mod camera;
pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod frame;
pub mod storage;
pub mod video;

#[cfg(test)]
pub(crate) mod test_support;

pub use app::{
    AssemblyPrompt, CameraSelector, CaptureHandle, CaptureReport, ConsolePrompt, RunController,
    RunControllerBuilder,
};
pub use camera::{
    select_camera, CameraDevice, CameraDriver, CameraEnumerator, DeviceSession,
    ProbingEnumerator, TestPatternDriver,
};
pub use capture::{
    CaptureOutcome, CapturePhase, CaptureScheduler, CaptureStats, PreviewBackend,
    PreviewSurface, SchedulerSettings, SessionMetadata,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CaptureMode, TimelapseConfig};
pub use error::{Result, TimelapseError};
pub use frame::{FrameData, Resolution};
pub use storage::{FrameStore, StoredFrame};
pub use video::{AssemblyReport, VideoAssembler, VideoAssemblyRequest, VideoBackend, VideoWriter};
