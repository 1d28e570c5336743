use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::time::Duration;

/// Source of wall-clock time for the capture loop
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    /// Block the calling thread for roughly `duration`
    fn sleep(&self, duration: Duration);
}

/// Real wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Simulated clock that only moves when slept on or advanced explicitly
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        let mut current = self.current.lock();
        *current += step;
    }

    /// Seconds elapsed since `origin` on this clock
    pub fn seconds_since(&self, origin: DateTime<Local>) -> i64 {
        (*self.current.lock() - origin).num_seconds()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Local::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
