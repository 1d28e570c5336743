use super::state::{CaptureOutcome, CapturePhase, CaptureState, CaptureStats};
use crate::camera::DeviceSession;
use crate::clock::Clock;
use crate::config::{CaptureMode, TimelapseConfig};
use crate::error::Result;
use crate::frame::Resolution;
use crate::storage::FrameStore;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Timing and termination settings for one session
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub mode: CaptureMode,
    pub sample_interval: Duration,
    pub capture_period: Duration,
    pub poll_interval: Duration,
    pub headless: bool,
    pub display_resolution: Option<Resolution>,
}

impl SchedulerSettings {
    pub fn from_config(config: &TimelapseConfig) -> Self {
        Self {
            mode: config.capture.mode,
            sample_interval: config.sample_interval(),
            capture_period: config.capture_period(),
            poll_interval: config.poll_interval(),
            headless: config.capture.headless,
            display_resolution: config.display_resolution(),
        }
    }
}

/// Drives the polling loop: read, preview, gate, persist, terminate.
///
/// The gate is checked against wall-clock time on each poll, so a period of
/// `p` seconds at interval `i` persists `p / i` frames give or take one.
pub struct CaptureScheduler {
    settings: SchedulerSettings,
    store: FrameStore,
    clock: Arc<dyn Clock>,
    phase: CapturePhase,
    state: Option<CaptureState>,
    stats: CaptureStats,
}

impl CaptureScheduler {
    pub fn new(settings: SchedulerSettings, store: FrameStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            store,
            clock,
            phase: CapturePhase::Idle,
            state: None,
            stats: CaptureStats::default(),
        }
    }

    /// Run until the period elapses or `cancel` fires.
    ///
    /// Only an unopenable device is returned as an error; read and write
    /// failures are logged and the loop carries on.
    pub fn run(
        &mut self,
        session: &mut DeviceSession,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutcome> {
        session.open().map_err(|e| {
            error!("Failed to start capture: {}", e);
            e
        })?;

        if let Err(e) = self.store.ensure_directory() {
            warn!("{}; frames will be retried as they come due", e);
        }

        let mut state = CaptureState::new(self.clock.now());
        self.phase = CapturePhase::Capturing;

        match self.settings.mode {
            CaptureMode::Period => info!(
                "Capturing every {}s for {}s into {}",
                self.settings.sample_interval.as_secs(),
                self.settings.capture_period.as_secs(),
                self.store.directory().display()
            ),
            CaptureMode::Continuous => info!(
                "Capturing every {}s until interrupted into {}",
                self.settings.sample_interval.as_secs(),
                self.store.directory().display()
            ),
        }

        let outcome = loop {
            if cancel.is_cancelled() {
                info!("Capture interrupted");
                break CaptureOutcome::Interrupted;
            }

            let now = self.clock.now();
            self.tick(session, &mut state, now);

            if self.settings.mode == CaptureMode::Period
                && state.period_elapsed(now, self.settings.capture_period)
            {
                info!(
                    "Capture period of {}s elapsed",
                    self.settings.capture_period.as_secs()
                );
                break CaptureOutcome::Stopped;
            }

            self.clock.sleep(self.settings.poll_interval);
        };

        state.running = false;
        self.state = Some(state);
        self.phase = outcome.into();

        info!(
            "Capture {:?}: {} frame(s) persisted, {} read failure(s)",
            outcome, self.stats.frames_persisted, self.stats.read_failures
        );
        Ok(outcome)
    }

    /// One poll of the device
    fn tick(&mut self, session: &mut DeviceSession, state: &mut CaptureState, now: DateTime<Local>) {
        self.stats.ticks += 1;

        let frame = match session.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.read_failures += 1;
                warn!("{}", e);
                return;
            }
        };
        self.stats.frames_read += 1;

        if !self.settings.headless
            && session.render_preview(&frame, self.settings.display_resolution)
        {
            self.stats.frames_previewed += 1;
        }

        if !state.interval_elapsed(now, self.settings.sample_interval) {
            return;
        }

        match self.store.persist(&frame, now) {
            Ok(stored) => {
                state.mark_captured(now);
                self.stats.frames_persisted += 1;
                info!(
                    "Captured image from camera {} as {}",
                    session.index(),
                    stored.timestamp
                );
            }
            Err(e) => {
                self.stats.persist_failures += 1;
                error!("Failed to store frame {}: {}", frame.id, e);
            }
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// Timing state of the last run
    pub fn state(&self) -> Option<&CaptureState> {
        self.state.as_ref()
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }
}
