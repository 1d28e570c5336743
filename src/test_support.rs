//! Scripted collaborators shared by the unit tests.

use crate::app::{AssemblyPrompt, CameraSelector};
use crate::camera::{CameraDevice, CameraDriver};
use crate::capture::{PreviewBackend, PreviewSurface};
use crate::error::{Result, TimelapseError};
use crate::frame::{FrameData, Resolution};
use crate::video::{VideoBackend, VideoWriter};
use image::RgbImage;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub(crate) type ReadHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Counters shared between a scripted driver and its devices
#[derive(Default)]
pub(crate) struct DriverCounters {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub reads: AtomicU64,
    pub failed_reads: AtomicU64,
}

/// Camera driver whose devices follow a fixed script
pub(crate) struct ScriptedDriver {
    pub counters: Arc<DriverCounters>,
    devices: u32,
    readable: u32,
    resolution: Resolution,
    honour_resolution: bool,
    failing_reads: u64,
    on_read: Option<ReadHook>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(DriverCounters::default()),
            devices: 1,
            readable: u32::MAX,
            resolution: Resolution::new(4, 4),
            honour_resolution: true,
            failing_reads: 0,
            on_read: None,
        }
    }

    /// Number of indices that can be opened
    pub fn devices(mut self, devices: u32) -> Self {
        self.devices = devices;
        self
    }

    /// Indices at or above this open but never yield a frame
    pub fn readable(mut self, readable: u32) -> Self {
        self.readable = readable;
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Keep the native resolution regardless of requests
    pub fn ignore_resolution_requests(mut self) -> Self {
        self.honour_resolution = false;
        self
    }

    /// The first `count` reads of each device fail
    pub fn failing_reads(mut self, count: u64) -> Self {
        self.failing_reads = count;
        self
    }

    /// Called with the read number before every read
    pub fn on_read(mut self, hook: ReadHook) -> Self {
        self.on_read = Some(hook);
        self
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }
}

impl CameraDriver for ScriptedDriver {
    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        if index >= self.devices {
            return Err(TimelapseError::DeviceUnavailable {
                index,
                resolution: None,
                details: "no such scripted device".to_string(),
            });
        }

        Ok(Box::new(ScriptedDevice {
            index,
            counters: Arc::clone(&self.counters),
            resolution: self.resolution,
            honour_resolution: self.honour_resolution,
            readable: index < self.readable,
            failing_reads: self.failing_reads,
            on_read: self.on_read.clone(),
            reads: 0,
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedDevice {
    index: u32,
    counters: Arc<DriverCounters>,
    resolution: Resolution,
    honour_resolution: bool,
    readable: bool,
    failing_reads: u64,
    on_read: Option<ReadHook>,
    reads: u64,
    released: bool,
}

impl CameraDevice for ScriptedDevice {
    fn set_resolution(&mut self, resolution: Resolution) -> Result<()> {
        if self.honour_resolution {
            self.resolution = resolution;
        }
        Ok(())
    }

    fn resolution(&self) -> Option<Resolution> {
        Some(self.resolution)
    }

    fn read_frame(&mut self) -> Result<FrameData> {
        let read_number = self.reads;
        self.reads += 1;
        self.counters.reads.fetch_add(1, Ordering::SeqCst);

        if let Some(hook) = &self.on_read {
            hook(read_number);
        }

        if self.released || !self.readable || read_number < self.failing_reads {
            self.counters.failed_reads.fetch_add(1, Ordering::SeqCst);
            return Err(TimelapseError::ReadFailed {
                index: self.index,
                details: "scripted failure".to_string(),
            });
        }

        let shade = (read_number % 256) as u8;
        Ok(FrameData::new(
            read_number,
            SystemTime::now(),
            vec![shade; self.resolution.rgb_len()],
            self.resolution.width,
            self.resolution.height,
        ))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// What a recording video backend saw
#[derive(Default)]
pub(crate) struct VideoRecord {
    pub opened: Vec<(PathBuf, Resolution, u32)>,
    pub frames: Vec<RgbImage>,
    pub finished: usize,
}

/// Video backend that keeps every written frame in memory
#[derive(Clone, Default)]
pub(crate) struct RecordingVideoBackend {
    pub record: Arc<Mutex<VideoRecord>>,
}

impl RecordingVideoBackend {
    pub fn frame_count(&self) -> usize {
        self.record.lock().frames.len()
    }

    pub fn open_count(&self) -> usize {
        self.record.lock().opened.len()
    }
}

impl VideoBackend for RecordingVideoBackend {
    fn create_writer(&self) -> Result<Box<dyn VideoWriter>> {
        Ok(Box::new(RecordingWriter {
            record: Arc::clone(&self.record),
        }))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct RecordingWriter {
    record: Arc<Mutex<VideoRecord>>,
}

impl VideoWriter for RecordingWriter {
    fn open(&mut self, path: &Path, resolution: Resolution, fps: u32) -> Result<()> {
        self.record
            .lock()
            .opened
            .push((path.to_path_buf(), resolution, fps));
        Ok(())
    }

    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.record.lock().frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.record.lock().finished += 1;
        Ok(())
    }
}

/// Preview backend counting rendered frames
#[derive(Clone, Default)]
pub(crate) struct RecordingPreview {
    pub shown: Arc<AtomicUsize>,
    pub last_resolution: Arc<Mutex<Option<Resolution>>>,
    pub closed: Arc<AtomicBool>,
    /// Fail every `show` once this many frames were shown, like a closed window
    pub window_closes_after: Option<usize>,
}

impl RecordingPreview {
    pub fn closing_after(frames: usize) -> Self {
        Self {
            window_closes_after: Some(frames),
            ..Self::default()
        }
    }
}

impl PreviewBackend for RecordingPreview {
    fn open_surface(&self, _title: &str) -> Result<Box<dyn PreviewSurface>> {
        Ok(Box::new(self.clone()))
    }
}

impl PreviewSurface for RecordingPreview {
    fn show(&mut self, frame: &FrameData) -> Result<()> {
        if self
            .window_closes_after
            .is_some_and(|limit| self.shown.load(Ordering::SeqCst) >= limit)
        {
            return Err(TimelapseError::Preview {
                message: "window closed".to_string(),
            });
        }
        self.shown.fetch_add(1, Ordering::SeqCst);
        *self.last_resolution.lock() = Some(frame.resolution());
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Prompt with canned answers
pub(crate) struct FixedPrompt {
    pub assemble: bool,
    pub camera: u32,
    pub asked: AtomicUsize,
}

impl FixedPrompt {
    pub fn new(assemble: bool, camera: u32) -> Self {
        Self {
            assemble,
            camera,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl AssemblyPrompt for FixedPrompt {
    fn confirm_assembly(&self) -> Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.assemble)
    }
}

impl CameraSelector for FixedPrompt {
    fn select_from(&self, _candidates: &[u32]) -> Result<u32> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.camera)
    }
}

/// Write a solid-colour PNG named after `stem`
pub(crate) fn write_png(dir: &Path, stem: &str, value: u8, resolution: Resolution) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{}.png", stem));
    let image = RgbImage::from_pixel(
        resolution.width,
        resolution.height,
        image::Rgb([value, value, value]),
    );
    image.save(&path).unwrap();
    path
}

/// Tracing layer counting WARN events emitted under a target prefix
#[derive(Clone)]
pub(crate) struct WarnCounter {
    target: &'static str,
    count: Arc<AtomicUsize>,
}

impl WarnCounter {
    pub fn for_target(target: &'static str) -> Self {
        Self {
            target,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() == Level::WARN && metadata.target().starts_with(self.target) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
