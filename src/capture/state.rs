use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler state machine: `Idle -> Capturing -> {Stopped, Interrupted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Capturing,
    Stopped,
    Interrupted,
}

/// How a capture session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureOutcome {
    /// The capture period elapsed
    Stopped,
    /// Cancelled by the operator
    Interrupted,
}

impl From<CaptureOutcome> for CapturePhase {
    fn from(outcome: CaptureOutcome) -> Self {
        match outcome {
            CaptureOutcome::Stopped => CapturePhase::Stopped,
            CaptureOutcome::Interrupted => CapturePhase::Interrupted,
        }
    }
}

/// Timing state owned by the scheduler
#[derive(Debug, Clone)]
pub struct CaptureState {
    pub running: bool,
    pub started_at: DateTime<Local>,
    /// Last successfully persisted frame, or the session start before any
    pub last_capture: DateTime<Local>,
}

impl CaptureState {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            running: true,
            started_at: now,
            last_capture: now,
        }
    }

    /// Interval gate: has at least `interval` passed since the last persisted frame
    pub fn interval_elapsed(&self, now: DateTime<Local>, interval: Duration) -> bool {
        elapsed(self.last_capture, now) >= interval
    }

    /// Has the session run for at least `period`
    pub fn period_elapsed(&self, now: DateTime<Local>, period: Duration) -> bool {
        elapsed(self.started_at, now) >= period
    }

    pub fn mark_captured(&mut self, now: DateTime<Local>) {
        self.last_capture = now;
    }
}

/// Wall-clock time between two instants; zero if the clock went backwards
fn elapsed(from: DateTime<Local>, to: DateTime<Local>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

/// Counters for one capture session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStats {
    pub ticks: u64,
    pub frames_read: u64,
    pub read_failures: u64,
    pub frames_persisted: u64,
    pub persist_failures: u64,
    pub frames_previewed: u64,
}
