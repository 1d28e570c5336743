use crate::camera::{CameraDriver, DeviceSession};
use crate::capture::{
    save_metadata, CaptureOutcome, CaptureScheduler, CaptureStats, PreviewBackend,
    SchedulerSettings, SessionMetadata,
};
use crate::clock::Clock;
use crate::config::TimelapseConfig;
use crate::error::{Result, TimelapseError};
use crate::frame::Resolution;
use crate::storage::FrameStore;
use crate::video::{AssemblyReport, VideoAssembler};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

/// Output resolution used when neither config nor device provide one
pub const FALLBACK_VIDEO_RESOLUTION: Resolution = Resolution::X720;

/// Preview window title
pub const PREVIEW_TITLE: &str = "Timelapse";

/// What a finished capture session produced
#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub device_index: u32,
    pub resolution: Option<Resolution>,
    pub outcome: CaptureOutcome,
    pub stats: CaptureStats,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// Set when a video was written for this session
    pub assembly: Option<AssemblyReport>,
}

impl CaptureReport {
    /// Report for a run aborted before its capture worker started
    pub(crate) fn not_started(device_index: u32, at: DateTime<Local>) -> Self {
        Self {
            device_index,
            resolution: None,
            outcome: CaptureOutcome::Interrupted,
            stats: CaptureStats::default(),
            started_at: at,
            finished_at: at,
            assembly: None,
        }
    }
}

/// Everything the capture worker owns for one session
pub(crate) struct CaptureJob {
    pub config: TimelapseConfig,
    pub device_index: u32,
    pub driver: Arc<dyn CameraDriver>,
    pub preview_backend: Option<Arc<dyn PreviewBackend>>,
    pub assembler: VideoAssembler,
    pub clock: Arc<dyn Clock>,
}

/// Body of the capture worker. Blocks until the session ends.
///
/// The device and preview surface are released before this returns,
/// whatever the outcome.
pub(crate) fn run_capture(job: CaptureJob, cancel: CancellationToken) -> Result<CaptureReport> {
    let span = info_span!("capture", device = job.device_index);
    let _enter = span.enter();

    let config = &job.config;
    let mut session = DeviceSession::new(
        Arc::clone(&job.driver),
        job.device_index,
        config.camera_resolution(),
    );

    if !config.capture.headless {
        session = attach_preview(session, job.preview_backend.as_deref());
    }

    let mut scheduler = CaptureScheduler::new(
        SchedulerSettings::from_config(config),
        FrameStore::new(config.capture_dir()),
        Arc::clone(&job.clock),
    );

    let started_at = job.clock.now();
    let result = scheduler.run(&mut session, &cancel);
    let resolution = session.resolution();
    session.close();
    let finished_at = job.clock.now();

    let outcome = result.map_err(|e| {
        error!(
            "Capture on camera {} at {} failed: {}",
            job.device_index,
            resolution.map_or_else(|| "device default".to_string(), |r| r.to_string()),
            e
        );
        e
    })?;

    let assembly = if outcome == CaptureOutcome::Stopped && config.capture.generate_video {
        assemble_or_log(config, &job.assembler, resolution)
    } else {
        None
    };

    let report = CaptureReport {
        device_index: job.device_index,
        resolution,
        outcome,
        stats: scheduler.stats().clone(),
        started_at,
        finished_at,
        assembly,
    };

    if config.capture.save_metadata {
        let metadata = SessionMetadata {
            device_index: report.device_index,
            resolution: report.resolution,
            mode: config.capture.mode,
            interval_seconds: config.capture.interval_seconds,
            period_seconds: config.capture.period_seconds,
            started_at: report.started_at,
            finished_at: report.finished_at,
            outcome: report.outcome,
            stats: report.stats.clone(),
        };
        if let Err(e) = save_metadata(&metadata, &config.capture_dir()) {
            warn!("Failed to save session metadata: {}", e);
        }
    }

    Ok(report)
}

fn attach_preview(
    session: DeviceSession,
    backend: Option<&dyn PreviewBackend>,
) -> DeviceSession {
    let Some(backend) = backend else {
        warn!("No live preview available, capturing headless");
        return session;
    };

    match backend.open_surface(PREVIEW_TITLE) {
        Ok(surface) => session.with_preview(surface),
        Err(e) => {
            warn!("Failed to open live preview, capturing headless: {}", e);
            session
        }
    }
}

/// Assemble the configured capture directory into the configured output
pub(crate) fn assemble_captures(
    config: &TimelapseConfig,
    assembler: &VideoAssembler,
    capture_resolution: Option<Resolution>,
) -> Result<AssemblyReport> {
    let resolution = config
        .video_resolution()
        .or(capture_resolution)
        .unwrap_or(FALLBACK_VIDEO_RESOLUTION);

    assembler.assemble(
        &config.capture_dir(),
        &config.video_output(),
        resolution,
        config.video.fps,
    )
}

/// Assemble, absorbing every failure into a log line
pub(crate) fn assemble_or_log(
    config: &TimelapseConfig,
    assembler: &VideoAssembler,
    capture_resolution: Option<Resolution>,
) -> Option<AssemblyReport> {
    match assemble_captures(config, assembler, capture_resolution) {
        Ok(report) => Some(report),
        Err(TimelapseError::NoFramesToAssemble { directory }) => {
            info!("Nothing to assemble in {}", directory.display());
            None
        }
        Err(e) => {
            error!("Video assembly failed: {}", e);
            None
        }
    }
}
