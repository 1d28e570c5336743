use crate::error::{Result, TimelapseError};
use crate::frame::Resolution;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

/// Sequential video encoder
pub trait VideoWriter: Send {
    /// Start a new output file
    fn open(&mut self, path: &Path, resolution: Resolution, fps: u32) -> Result<()>;

    /// Append one frame; frames must already be at the opened resolution
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close the output
    fn finish(&mut self) -> Result<()>;
}

/// Creates video writers
pub trait VideoBackend: Send + Sync {
    fn create_writer(&self) -> Result<Box<dyn VideoWriter>>;

    fn name(&self) -> &str;
}

/// GStreamer encoder element for a codec identifier
pub fn encoder_element(codec: &str) -> Result<&'static str> {
    match codec.to_uppercase().as_str() {
        "XVID" | "MP4V" => Ok("avenc_mpeg4"),
        "H264" => Ok("x264enc"),
        "MJPG" | "MJPEG" => Ok("jpegenc"),
        _ => Err(TimelapseError::video(format!("Unsupported codec: {}", codec))),
    }
}

/// GStreamer muxer element for an output path, chosen by extension
pub fn muxer_element(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("mp4") | Some("m4v") => "mp4mux",
        Some("mkv") => "matroskamux",
        Some("mov") => "qtmux",
        _ => "avimux",
    }
}

/// Video backend for this build
#[cfg(all(feature = "video_encoding", target_os = "linux"))]
pub fn default_video_backend(codec: &str) -> Arc<dyn VideoBackend> {
    Arc::new(gst_writer::GstVideoBackend::new(codec))
}

/// Video backend for this build
#[cfg(not(all(feature = "video_encoding", target_os = "linux")))]
pub fn default_video_backend(_codec: &str) -> Arc<dyn VideoBackend> {
    tracing::warn!("Video encoding is only available on Linux with the video_encoding feature");
    Arc::new(UnavailableVideoBackend)
}

#[cfg(not(all(feature = "video_encoding", target_os = "linux")))]
struct UnavailableVideoBackend;

#[cfg(not(all(feature = "video_encoding", target_os = "linux")))]
impl VideoBackend for UnavailableVideoBackend {
    fn create_writer(&self) -> Result<Box<dyn VideoWriter>> {
        Err(TimelapseError::video(
            "no video encoder compiled into this build",
        ))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(all(feature = "video_encoding", target_os = "linux"))]
pub use gst_writer::GstVideoBackend;

#[cfg(all(feature = "video_encoding", target_os = "linux"))]
mod gst_writer {
    use super::{encoder_element, muxer_element, VideoBackend, VideoWriter};
    use crate::error::{Result, TimelapseError};
    use crate::frame::{pad_rgb_rows, Resolution};
    use gstreamer::prelude::*;
    use gstreamer::{Buffer, ClockTime, Fraction, Pipeline, State};
    use gstreamer_app::AppSrc;
    use gstreamer_video::{VideoFormat, VideoInfo};
    use image::RgbImage;
    use std::path::Path;
    use tracing::{debug, info};

    /// How long `finish` waits for the muxer to flush
    const EOS_TIMEOUT_SECS: u64 = 30;

    /// Encodes through `appsrc ! videoconvert ! <encoder> ! <muxer> ! filesink`
    pub struct GstVideoBackend {
        codec: String,
    }

    impl GstVideoBackend {
        pub fn new(codec: &str) -> Self {
            Self {
                codec: codec.to_string(),
            }
        }
    }

    impl VideoBackend for GstVideoBackend {
        fn create_writer(&self) -> Result<Box<dyn VideoWriter>> {
            gstreamer::init().map_err(|e| {
                TimelapseError::video(format!("Failed to initialize GStreamer: {}", e))
            })?;

            Ok(Box::new(GstVideoWriter {
                codec: self.codec.clone(),
                pipeline: None,
                appsrc: None,
                resolution: Resolution::new(0, 0),
                stride: 0,
                fps: 0,
                frame_index: 0,
            }))
        }

        fn name(&self) -> &str {
            "gstreamer"
        }
    }

    struct GstVideoWriter {
        codec: String,
        pipeline: Option<Pipeline>,
        appsrc: Option<AppSrc>,
        resolution: Resolution,
        /// Bytes per row the negotiated caps expect
        stride: usize,
        fps: u32,
        frame_index: u64,
    }

    impl GstVideoWriter {
        fn build_pipeline_string(&self, path: &Path) -> Result<String> {
            let encoder = encoder_element(&self.codec)?;
            let muxer = muxer_element(path);
            let location = path.display().to_string().replace('"', "\\\"");

            Ok(format!(
                "appsrc name=src ! videoconvert ! {} ! {} ! filesink location=\"{}\"",
                encoder, muxer, location
            ))
        }

        fn frame_duration_ns(&self) -> u64 {
            1_000_000_000 / self.fps.max(1) as u64
        }
    }

    impl VideoWriter for GstVideoWriter {
        fn open(&mut self, path: &Path, resolution: Resolution, fps: u32) -> Result<()> {
            let pipeline_desc = self.build_pipeline_string(path)?;
            info!("Creating GStreamer video pipeline");
            debug!("Pipeline: {}", pipeline_desc);

            let pipeline = gstreamer::parse::launch(&pipeline_desc)
                .map_err(|e| TimelapseError::video(format!("Failed to create pipeline: {}", e)))?
                .downcast::<Pipeline>()
                .map_err(|_| TimelapseError::video("Failed to downcast to Pipeline"))?;

            let appsrc = pipeline
                .by_name("src")
                .ok_or_else(|| TimelapseError::video("Failed to get appsrc element"))?
                .downcast::<AppSrc>()
                .map_err(|_| TimelapseError::video("Failed to downcast to AppSrc"))?;

            let info = VideoInfo::builder(VideoFormat::Rgb, resolution.width, resolution.height)
                .fps(Fraction::new(fps as i32, 1))
                .build()
                .map_err(|e| TimelapseError::video(format!("Failed to build video info: {}", e)))?;
            let caps = info
                .to_caps()
                .map_err(|e| TimelapseError::video(format!("Failed to build caps: {}", e)))?;
            let stride = info
                .stride()
                .first()
                .map(|&s| s as usize)
                .unwrap_or_else(|| resolution.rgb_stride());

            appsrc.set_caps(Some(&caps));
            appsrc.set_property("format", gstreamer::Format::Time);
            appsrc.set_property("is-live", false);

            pipeline
                .set_state(State::Playing)
                .map_err(|e| TimelapseError::video(format!("Failed to start pipeline: {}", e)))?;

            info!("Started GStreamer encoding pipeline ({})", self.codec);
            self.pipeline = Some(pipeline);
            self.appsrc = Some(appsrc);
            self.resolution = resolution;
            self.stride = stride;
            self.fps = fps;
            self.frame_index = 0;
            Ok(())
        }

        fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
            let frame_ns = self.frame_duration_ns();
            let appsrc = self
                .appsrc
                .as_ref()
                .ok_or_else(|| TimelapseError::video("Video writer is not open"))?;

            let mut buffer =
                Buffer::from_mut_slice(pad_rgb_rows(frame.as_raw(), self.resolution, self.stride));
            if let Some(buffer_ref) = buffer.get_mut() {
                buffer_ref.set_pts(ClockTime::from_nseconds(self.frame_index * frame_ns));
                buffer_ref.set_duration(ClockTime::from_nseconds(frame_ns));
            }

            appsrc
                .push_buffer(buffer)
                .map_err(|e| TimelapseError::video(format!("Failed to push buffer: {:?}", e)))?;

            if self.frame_index % 30 == 0 && self.frame_index > 0 {
                debug!("Encoded {} frames", self.frame_index);
            }
            self.frame_index += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            let (Some(pipeline), Some(appsrc)) = (self.pipeline.take(), self.appsrc.take()) else {
                return Ok(());
            };

            appsrc
                .end_of_stream()
                .map_err(|e| TimelapseError::video(format!("Failed to signal EOS: {:?}", e)))?;

            if let Some(bus) = pipeline.bus() {
                for msg in bus.iter_timed(ClockTime::from_seconds(EOS_TIMEOUT_SECS)) {
                    match msg.view() {
                        gstreamer::MessageView::Eos(..) => {
                            info!("Video encoding completed successfully");
                            break;
                        }
                        gstreamer::MessageView::Error(err) => {
                            let error_msg = format!(
                                "Video encoding error: {} ({})",
                                err.error(),
                                err.debug().unwrap_or_default()
                            );
                            let _ = pipeline.set_state(State::Null);
                            return Err(TimelapseError::video(error_msg));
                        }
                        _ => {}
                    }
                }
            }

            pipeline
                .set_state(State::Null)
                .map_err(|e| TimelapseError::video(format!("Failed to stop pipeline: {}", e)))?;

            info!("GStreamer video encoding completed: {} frames", self.frame_index);
            Ok(())
        }
    }

    impl Drop for GstVideoWriter {
        fn drop(&mut self) {
            if let Some(pipeline) = self.pipeline.take() {
                let _ = pipeline.set_state(State::Null);
            }
        }
    }
}
