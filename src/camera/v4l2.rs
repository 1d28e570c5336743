use super::driver::{CameraDevice, CameraDriver};
use crate::error::{Result, TimelapseError};
use crate::frame::{FrameData, Resolution};
use gstreamer::prelude::*;
use gstreamer::{Caps, ClockTime, Element, Pipeline, State};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// How long a single read waits for the next sample
const READ_TIMEOUT_MS: u64 = 1000;

/// How long opening waits for the pipeline to reach PLAYING
const OPEN_TIMEOUT_SECS: u64 = 5;

/// V4L2 cameras through a GStreamer appsink pipeline
pub struct GstCameraDriver;

impl GstCameraDriver {
    pub fn new() -> Result<Self> {
        gstreamer::init().map_err(|e| {
            TimelapseError::component("camera", format!("Failed to initialize GStreamer: {}", e))
        })?;
        Ok(Self)
    }

    fn build_pipeline_string(index: u32) -> String {
        format!(
            "v4l2src device=/dev/video{} ! \
             videoconvert ! videoscale ! \
             capsfilter name=caps caps=video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false",
            index
        )
    }
}

impl CameraDriver for GstCameraDriver {
    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>> {
        let unavailable = |details: String| TimelapseError::DeviceUnavailable {
            index,
            resolution: None,
            details,
        };

        let pipeline_desc = Self::build_pipeline_string(index);
        debug!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| unavailable(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| unavailable("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| unavailable("Failed to get appsink".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| unavailable("Failed to downcast to AppSink".to_string()))?;

        let capsfilter = pipeline
            .by_name("caps")
            .ok_or_else(|| unavailable("Failed to get capsfilter".to_string()))?;

        if let Err(e) = pipeline.set_state(State::Playing) {
            let _ = pipeline.set_state(State::Null);
            return Err(unavailable(format!("Failed to start pipeline: {}", e)));
        }

        let (result, _, _) = pipeline.state(ClockTime::from_seconds(OPEN_TIMEOUT_SECS));
        if let Err(e) = result {
            let _ = pipeline.set_state(State::Null);
            return Err(unavailable(format!("Pipeline did not start: {}", e)));
        }

        info!("GStreamer pipeline for /dev/video{} started", index);

        Ok(Box::new(GstCameraDevice {
            index,
            pipeline,
            appsink,
            capsfilter,
            frame_counter: 0,
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "gstreamer-v4l2"
    }
}

struct GstCameraDevice {
    index: u32,
    pipeline: Pipeline,
    appsink: AppSink,
    capsfilter: Element,
    frame_counter: u64,
    released: bool,
}

impl GstCameraDevice {
    fn read_failed(&self, details: String) -> TimelapseError {
        TimelapseError::ReadFailed {
            index: self.index,
            details,
        }
    }

    /// Copy a sample into a packed RGB24 frame, dropping row padding
    fn sample_to_frame(&mut self, sample: &gstreamer::Sample) -> Result<FrameData> {
        let caps = sample
            .caps()
            .ok_or_else(|| self.read_failed("No caps in sample".to_string()))?;
        let video_info = VideoInfo::from_caps(caps)
            .map_err(|e| self.read_failed(format!("Failed to get video info: {}", e)))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| self.read_failed("No buffer in sample".to_string()))?;
        let map = buffer
            .map_readable()
            .map_err(|e| self.read_failed(format!("Failed to map buffer: {}", e)))?;

        let width = video_info.width();
        let height = video_info.height();
        let row_len = width as usize * 3;
        let stride = video_info.stride()[0] as usize;
        let source = map.as_slice();

        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let line = source
                .get(start..start + row_len)
                .ok_or_else(|| self.read_failed(format!("Truncated frame at row {}", row)))?;
            data.extend_from_slice(line);
        }

        let frame_id = self.frame_counter;
        self.frame_counter += 1;
        trace!("Captured frame {} ({}x{})", frame_id, width, height);

        Ok(FrameData::new(frame_id, SystemTime::now(), data, width, height))
    }
}

impl CameraDevice for GstCameraDevice {
    fn set_resolution(&mut self, resolution: Resolution) -> Result<()> {
        let caps = Caps::builder("video/x-raw")
            .field("format", "RGB")
            .field("width", resolution.width as i32)
            .field("height", resolution.height as i32)
            .build();

        self.pipeline.set_state(State::Ready).map_err(|e| {
            TimelapseError::component("camera", format!("Failed to pause pipeline: {}", e))
        })?;
        self.capsfilter.set_property("caps", &caps);
        self.pipeline.set_state(State::Playing).map_err(|e| {
            TimelapseError::component("camera", format!("Failed to restart pipeline: {}", e))
        })?;

        debug!("Requested {} from camera {}", resolution, self.index);
        Ok(())
    }

    fn resolution(&self) -> Option<Resolution> {
        let caps = self.appsink.static_pad("sink")?.current_caps()?;
        let video_info = VideoInfo::from_caps(&caps).ok()?;
        Some(Resolution::new(video_info.width(), video_info.height()))
    }

    fn read_frame(&mut self) -> Result<FrameData> {
        if self.released {
            return Err(self.read_failed("device released".to_string()));
        }

        match self
            .appsink
            .try_pull_sample(ClockTime::from_mseconds(READ_TIMEOUT_MS))
        {
            Some(sample) => self.sample_to_frame(&sample),
            None => Err(self.read_failed(format!(
                "no sample within {}ms",
                READ_TIMEOUT_MS
            ))),
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.pipeline.set_state(State::Null) {
            warn!("Failed to stop pipeline for camera {}: {}", self.index, e);
        }
    }
}

impl Drop for GstCameraDevice {
    fn drop(&mut self) {
        self.release();
    }
}
