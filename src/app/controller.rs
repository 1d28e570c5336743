use super::handle::CaptureHandle;
use super::interrupt::{KeyListener, SignalRouter};
use super::prompt::{AssemblyPrompt, CameraSelector, ConsolePrompt};
use super::worker::{self, CaptureJob, CaptureReport, PREVIEW_TITLE};
use crate::camera::{
    default_driver, select_camera, CameraDriver, CameraEnumerator, DeviceSession,
    ProbingEnumerator,
};
use crate::capture::{default_preview_backend, run_preview, CaptureOutcome, PreviewBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::TimelapseConfig;
use crate::error::{Result, TimelapseError};
use crate::frame::Resolution;
use crate::storage::FrameStore;
use crate::video::{default_video_backend, AssemblyReport, VideoAssembler, VideoBackend};
use std::sync::Arc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns a timelapse run from validation to cleanup
pub struct RunController {
    config: TimelapseConfig,
    driver: Arc<dyn CameraDriver>,
    enumerator: Arc<dyn CameraEnumerator>,
    selector: Arc<dyn CameraSelector>,
    prompt: Arc<dyn AssemblyPrompt>,
    assembler: VideoAssembler,
    preview_backend: Option<Arc<dyn PreviewBackend>>,
    clock: Arc<dyn Clock>,
    listen_for_interrupts: bool,
    shutdown: CancellationToken,
}

impl RunController {
    pub fn builder(config: TimelapseConfig) -> RunControllerBuilder {
        RunControllerBuilder::new(config)
    }

    pub fn config(&self) -> &TimelapseConfig {
        &self.config
    }

    /// Cancelling this token interrupts every capture and preview started here
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Device index from config, or probe and pick one
    pub async fn resolve_device(&self) -> Result<u32> {
        if let Some(index) = self.config.camera.index {
            return Ok(index);
        }

        info!("No camera index configured, probing for cameras");
        let enumerator = Arc::clone(&self.enumerator);
        let selector = Arc::clone(&self.selector);
        task::spawn_blocking(move || select_camera(enumerator.as_ref(), selector.as_ref()))
            .await
            .map_err(|e| TimelapseError::system(format!("Camera probing failed: {}", e)))?
    }

    /// Spawn the capture worker on `device_index`
    pub fn start_on(&self, device_index: u32) -> CaptureHandle {
        let cancel = self.shutdown.child_token();
        let job = CaptureJob {
            config: self.config.clone(),
            device_index,
            driver: Arc::clone(&self.driver),
            preview_backend: self.preview_backend.clone(),
            assembler: self.assembler.clone(),
            clock: Arc::clone(&self.clock),
        };

        info!("Starting capture worker on camera {}", device_index);
        let worker_cancel = cancel.clone();
        let task = task::spawn_blocking(move || worker::run_capture(job, worker_cancel));
        CaptureHandle::new(cancel, task)
    }

    /// Resolve the device and spawn the capture worker
    pub async fn start(&self) -> Result<CaptureHandle> {
        let device_index = self.resolve_device().await?;
        Ok(self.start_on(device_index))
    }

    /// Full run: optional preview, capture, and video assembly.
    ///
    /// An interrupted capture is a normal outcome: the video is assembled if
    /// configured, otherwise the prompt decides. Ctrl+C during the preview
    /// ends the run before any capture starts.
    pub async fn run(&self) -> Result<CaptureReport> {
        let device_index = self.resolve_device().await?;
        let signals = self
            .listen_for_interrupts
            .then(|| SignalRouter::start(self.shutdown.clone()));

        if self.config.preview.before_start {
            self.preview_device(device_index).await?;
            if self.shutdown.is_cancelled() {
                info!("Interrupted during preview, not capturing");
                return Ok(CaptureReport::not_started(device_index, self.clock.now()));
            }
        }

        let handle = self.start_on(device_index);
        let capture_token = handle.cancellation_token();
        if let Some(signals) = &signals {
            signals.retarget(capture_token.clone());
        }
        let keys = self
            .listen_for_interrupts
            .then(|| KeyListener::start(capture_token.clone(), capture_token));
        if keys.is_some() {
            info!("Press 'q' or Ctrl+C to stop capturing");
        }

        let joined = handle.join().await;
        if let Some(keys) = keys {
            keys.stop().await;
        }
        let mut report = joined?;

        if report.outcome == CaptureOutcome::Interrupted {
            info!(
                "Capture interrupted after {} frame(s)",
                report.stats.frames_persisted
            );

            let abort = CancellationToken::new();
            if let Some(signals) = &signals {
                signals.retarget(abort.clone());
            }
            if self.should_assemble_after_interrupt(&abort).await {
                report.assembly = self.assemble(report.resolution, &abort).await;
            }
        }

        Ok(report)
    }

    async fn should_assemble_after_interrupt(&self, abort: &CancellationToken) -> bool {
        if self.config.capture.generate_video {
            return true;
        }

        let prompt = Arc::clone(&self.prompt);
        let decision = task::spawn_blocking(move || prompt.confirm_assembly());
        tokio::select! {
            _ = abort.cancelled() => {
                warn!("Interrupted at the assembly prompt, skipping video");
                false
            }
            joined = decision => match joined {
                Ok(Ok(answer)) => answer,
                Ok(Err(e)) => {
                    warn!("No assembly decision, skipping video: {}", e);
                    false
                }
                Err(e) => {
                    error!("Assembly prompt failed: {}", e);
                    false
                }
            },
        }
    }

    async fn assemble(
        &self,
        capture_resolution: Option<Resolution>,
        abort: &CancellationToken,
    ) -> Option<AssemblyReport> {
        let config = self.config.clone();
        let assembler = self.assembler.clone();
        let assembly = task::spawn_blocking(move || {
            worker::assemble_or_log(&config, &assembler, capture_resolution)
        });

        tokio::select! {
            _ = abort.cancelled() => {
                warn!("Video assembly interrupted, output may be incomplete");
                None
            }
            joined = assembly => joined.unwrap_or_else(|e| {
                error!("Video assembly task failed: {}", e);
                None
            }),
        }
    }

    /// Assemble existing captures without touching a camera.
    ///
    /// An empty capture directory is reported and yields `Ok(None)`.
    pub async fn stitch(&self) -> Result<Option<AssemblyReport>> {
        let config = self.config.clone();
        let assembler = self.assembler.clone();
        let result =
            task::spawn_blocking(move || worker::assemble_captures(&config, &assembler, None))
                .await
                .map_err(|e| {
                    TimelapseError::system(format!("Video assembly task failed: {}", e))
                })?;

        match result {
            Ok(report) => Ok(Some(report)),
            Err(TimelapseError::NoFramesToAssemble { directory }) => {
                warn!("No captures found in {}, no video written", directory.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Show the live feed of a resolved camera until interrupted
    pub async fn preview(&self) -> Result<u64> {
        let device_index = self.resolve_device().await?;
        let _signals = self
            .listen_for_interrupts
            .then(|| SignalRouter::start(self.shutdown.clone()));
        self.preview_device(device_index).await
    }

    /// Preview until `q`/Esc ends it or the shutdown token is cancelled

    async fn preview_device(&self, device_index: u32) -> Result<u64> {
        let Some(backend) = self.preview_backend.clone() else {
            warn!("No live preview available, skipping preview");
            return Ok(0);
        };

        let surface = match backend.open_surface(PREVIEW_TITLE) {
            Ok(surface) => surface,
            Err(e) => {
                warn!("Failed to open live preview, skipping preview: {}", e);
                return Ok(0);
            }
        };

        let cancel = self.shutdown.child_token();
        let keys = self
            .listen_for_interrupts
            .then(|| KeyListener::start(cancel.clone(), self.shutdown.clone()));

        info!("Showing preview, press 'q' to start capturing or Ctrl+C to quit");
        let mut session = DeviceSession::new(
            Arc::clone(&self.driver),
            device_index,
            self.config.camera_resolution(),
        )
        .with_preview(surface);
        let clock = Arc::clone(&self.clock);
        let poll_interval = self.config.poll_interval();
        let display = self.config.display_resolution();
        let worker_cancel = cancel.clone();

        let shown = task::spawn_blocking(move || {
            let shown = run_preview(
                &mut session,
                clock.as_ref(),
                poll_interval,
                display,
                &worker_cancel,
            );
            session.close();
            shown
        })
        .await;

        if let Some(keys) = keys {
            keys.stop().await;
        }

        shown.map_err(|e| TimelapseError::system(format!("Preview task failed: {}", e)))?
    }

    /// Delete every stored frame in the capture directory
    pub fn clear_captures(&self) -> Result<usize> {
        FrameStore::new(self.config.capture_dir()).clear()
    }
}

/// Assembles a [`RunController`], defaulting every collaborator it is not given
pub struct RunControllerBuilder {
    config: TimelapseConfig,
    driver: Option<Arc<dyn CameraDriver>>,
    enumerator: Option<Arc<dyn CameraEnumerator>>,
    selector: Option<Arc<dyn CameraSelector>>,
    prompt: Option<Arc<dyn AssemblyPrompt>>,
    video_backend: Option<Arc<dyn VideoBackend>>,
    preview_backend: Option<Option<Arc<dyn PreviewBackend>>>,
    clock: Option<Arc<dyn Clock>>,
    listen_for_interrupts: bool,
}

impl RunControllerBuilder {
    pub fn new(config: TimelapseConfig) -> Self {
        Self {
            config,
            driver: None,
            enumerator: None,
            selector: None,
            prompt: None,
            video_backend: None,
            preview_backend: None,
            clock: None,
            listen_for_interrupts: false,
        }
    }

    pub fn driver(mut self, driver: Arc<dyn CameraDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn enumerator(mut self, enumerator: Arc<dyn CameraEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    pub fn selector(mut self, selector: Arc<dyn CameraSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn AssemblyPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn video_backend(mut self, backend: Arc<dyn VideoBackend>) -> Self {
        self.video_backend = Some(backend);
        self
    }

    /// `None` disables live preview entirely
    pub fn preview_backend(mut self, backend: Option<Arc<dyn PreviewBackend>>) -> Self {
        self.preview_backend = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// React to Ctrl+C and the `q`/Esc keys during `run` and `preview`
    pub fn listen_for_interrupts(mut self, listen: bool) -> Self {
        self.listen_for_interrupts = listen;
        self
    }

    /// Validate the configuration, then fill in default collaborators.
    ///
    /// Nothing touches a device before validation has passed.
    pub fn build(self) -> Result<RunController> {
        self.config.validate().map_err(|e| {
            error!("Invalid configuration: {}", e);
            e
        })?;

        let driver = match self.driver {
            Some(driver) => driver,
            None => default_driver()?,
        };

        let enumerator = self
            .enumerator
            .unwrap_or_else(|| Arc::new(ProbingEnumerator::new(Arc::clone(&driver))));

        let console = Arc::new(ConsolePrompt::stdio());
        let selector = self
            .selector
            .unwrap_or_else(|| Arc::clone(&console) as Arc<dyn CameraSelector>);
        let prompt = self
            .prompt
            .unwrap_or_else(|| console as Arc<dyn AssemblyPrompt>);

        let video_backend = self
            .video_backend
            .unwrap_or_else(|| default_video_backend(&self.config.video.codec));

        let preview_backend = match self.preview_backend {
            Some(backend) => backend,
            None if self.config.capture.headless && !self.config.preview.before_start => None,
            None => default_preview_backend(),
        };

        Ok(RunController {
            config: self.config,
            driver,
            enumerator,
            selector,
            prompt,
            assembler: VideoAssembler::new(video_backend),
            preview_backend,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            listen_for_interrupts: self.listen_for_interrupts,
            shutdown: CancellationToken::new(),
        })
    }
}
