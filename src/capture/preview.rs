use crate::camera::DeviceSession;
use crate::clock::Clock;
use crate::error::Result;
use crate::frame::{FrameData, Resolution};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A live-preview window
pub trait PreviewSurface: Send {
    fn show(&mut self, frame: &FrameData) -> Result<()>;

    /// Tear the surface down. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Creates preview surfaces
pub trait PreviewBackend: Send + Sync {
    fn open_surface(&self, title: &str) -> Result<Box<dyn PreviewSurface>>;
}

/// Show the live feed until `cancel` fires; returns the number of frames shown.
///
/// Used to frame the shot before a timelapse starts.
pub fn run_preview(
    session: &mut DeviceSession,
    clock: &dyn Clock,
    poll_interval: Duration,
    display: Option<Resolution>,
    cancel: &CancellationToken,
) -> Result<u64> {
    session.open()?;
    if let Some(resolution) = session.resolution() {
        info!("Showing camera preview at {}", resolution);
    }

    let mut shown = 0;
    while !cancel.is_cancelled() {
        match session.read_frame() {
            Ok(frame) => {
                if !session.render_preview(&frame, display) {
                    warn!("No preview surface available, ending preview");
                    break;
                }
                shown += 1;
            }
            Err(e) => warn!("{}", e),
        }
        clock.sleep(poll_interval);
    }

    info!("Preview closed after {} frame(s)", shown);
    Ok(shown)
}

#[cfg(all(feature = "display", target_os = "linux"))]
pub use gst_preview::GstPreviewBackend;

/// Preview backend for this build, if any
#[cfg(all(feature = "display", target_os = "linux"))]
pub fn default_preview_backend() -> Option<Arc<dyn PreviewBackend>> {
    match GstPreviewBackend::new() {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            warn!("Live preview unavailable: {}", e);
            None
        }
    }
}

/// Preview backend for this build, if any
#[cfg(not(all(feature = "display", target_os = "linux")))]
pub fn default_preview_backend() -> Option<Arc<dyn PreviewBackend>> {
    warn!("Live preview is only available on Linux with the display feature");
    None
}

#[cfg(all(feature = "display", target_os = "linux"))]
mod gst_preview {
    use super::{PreviewBackend, PreviewSurface};
    use crate::error::{Result, TimelapseError};
    use crate::frame::{pad_rgb_rows, FrameData, Resolution};
    use gstreamer::prelude::*;
    use gstreamer::{Buffer, Pipeline, State};
    use gstreamer_app::AppSrc;
    use gstreamer_video::{VideoFormat, VideoInfo};
    use tracing::{debug, info, warn};

    fn preview_error(message: String) -> TimelapseError {
        TimelapseError::Preview { message }
    }

    /// Window backed by `appsrc ! videoconvert ! autovideosink`
    pub struct GstPreviewBackend;

    impl GstPreviewBackend {
        pub fn new() -> Result<Self> {
            gstreamer::init()
                .map_err(|e| preview_error(format!("Failed to initialize GStreamer: {}", e)))?;
            Ok(Self)
        }
    }

    impl PreviewBackend for GstPreviewBackend {
        fn open_surface(&self, title: &str) -> Result<Box<dyn PreviewSurface>> {
            let pipeline_desc = "appsrc name=src is-live=true format=time ! \
                 queue max-size-buffers=1 leaky=downstream ! \
                 videoconvert ! autovideosink sync=false";

            let pipeline = gstreamer::parse::launch(pipeline_desc)
                .map_err(|e| preview_error(format!("Failed to create pipeline: {}", e)))?
                .downcast::<Pipeline>()
                .map_err(|_| preview_error("Failed to downcast to Pipeline".to_string()))?;

            let appsrc = pipeline
                .by_name("src")
                .ok_or_else(|| preview_error("Failed to get appsrc element".to_string()))?
                .downcast::<AppSrc>()
                .map_err(|_| preview_error("Failed to downcast to AppSrc".to_string()))?;

            info!("Opened preview window '{}'", title);
            Ok(Box::new(GstPreviewSurface {
                pipeline,
                appsrc,
                current: None,
                stride: 0,
                closed: false,
            }))
        }
    }

    struct GstPreviewSurface {
        pipeline: Pipeline,
        appsrc: AppSrc,
        current: Option<Resolution>,
        /// Bytes per row the negotiated caps expect
        stride: usize,
        closed: bool,
    }

    impl GstPreviewSurface {
        /// (Re)negotiate caps when the frame size changes
        fn configure(&mut self, resolution: Resolution) -> Result<()> {
            if self.current == Some(resolution) {
                return Ok(());
            }

            let info = VideoInfo::builder(VideoFormat::Rgb, resolution.width, resolution.height)
                .build()
                .map_err(|e| preview_error(format!("Failed to build video info: {}", e)))?;
            let caps = info
                .to_caps()
                .map_err(|e| preview_error(format!("Failed to build caps: {}", e)))?;
            self.appsrc.set_caps(Some(&caps));
            self.stride = info
                .stride()
                .first()
                .map(|&s| s as usize)
                .unwrap_or_else(|| resolution.rgb_stride());

            if self.current.is_none() {
                self.pipeline
                    .set_state(State::Playing)
                    .map_err(|e| preview_error(format!("Failed to start preview: {}", e)))?;
            }

            debug!("Preview configured for {}", resolution);
            self.current = Some(resolution);
            Ok(())
        }
    }

    impl PreviewSurface for GstPreviewSurface {
        fn show(&mut self, frame: &FrameData) -> Result<()> {
            if self.closed {
                return Err(preview_error("preview window closed".to_string()));
            }
            self.configure(frame.resolution())?;

            let buffer = Buffer::from_mut_slice(pad_rgb_rows(
                &frame.data,
                frame.resolution(),
                self.stride,
            ));
            self.appsrc
                .push_buffer(buffer)
                .map_err(|e| preview_error(format!("Failed to push frame: {:?}", e)))?;
            Ok(())
        }

        fn close(&mut self) {
            if self.closed {
                return;
            }
            self.closed = true;

            let _ = self.appsrc.end_of_stream();
            if let Err(e) = self.pipeline.set_state(State::Null) {
                warn!("Failed to stop preview pipeline: {}", e);
            }
        }
    }

    impl Drop for GstPreviewSurface {
        fn drop(&mut self) {
            self.close();
        }
    }
}
