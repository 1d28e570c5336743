use super::driver::{CameraDevice, CameraDriver};
use crate::capture::PreviewSurface;
use crate::error::{Result, TimelapseError};
use crate::frame::{FrameData, Resolution};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never opened
    Idle,
    Open,
    Closed,
}

/// Owns one camera handle and its optional live-preview surface
pub struct DeviceSession {
    driver: Arc<dyn CameraDriver>,
    index: u32,
    requested_resolution: Option<Resolution>,
    resolution: Option<Resolution>,
    device: Option<Box<dyn CameraDevice>>,
    preview: Option<Box<dyn PreviewSurface>>,
    state: SessionState,
}

impl DeviceSession {
    /// Create a session; the device is not touched until `open`
    pub fn new(
        driver: Arc<dyn CameraDriver>,
        index: u32,
        requested_resolution: Option<Resolution>,
    ) -> Self {
        Self {
            driver,
            index,
            requested_resolution,
            resolution: None,
            device: None,
            preview: None,
            state: SessionState::Idle,
        }
    }

    /// Attach a preview surface, released together with the device
    pub fn with_preview(mut self, preview: Box<dyn PreviewSurface>) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Open and configure the device. A no-op when already open.
    pub fn open(&mut self) -> Result<()> {
        if self.state == SessionState::Open {
            debug!("Camera {} already initialized", self.index);
            return Ok(());
        }

        info!(
            "Opening camera {} via {} backend",
            self.index,
            self.driver.name()
        );

        let device = self.driver.open(self.index).map_err(|e| match e {
            TimelapseError::DeviceUnavailable { .. } => e,
            other => TimelapseError::DeviceUnavailable {
                index: self.index,
                resolution: self.requested_resolution,
                details: other.to_string(),
            },
        })?;

        self.device = Some(device);
        self.state = SessionState::Open;
        info!("Camera {} initialized", self.index);

        match self.requested_resolution {
            Some(resolution) => self.configure_resolution(resolution),
            None => {
                self.resolution = self.device.as_ref().and_then(|d| d.resolution());
                match self.resolution {
                    Some(resolution) => info!("Grabbed camera resolution {}", resolution),
                    None => warn!("Camera {} did not report a resolution", self.index),
                }
            }
        }

        Ok(())
    }

    /// Best-effort resolution change; the session adopts whatever the device reports
    pub fn configure_resolution(&mut self, resolution: Resolution) {
        self.requested_resolution = Some(resolution);

        let Some(device) = self.device.as_mut() else {
            debug!("Camera {} not open, resolution {} deferred", self.index, resolution);
            return;
        };

        if let Err(e) = device.set_resolution(resolution) {
            warn!(
                "Camera {} rejected resolution {}: {}",
                self.index, resolution, e
            );
        }

        let actual = device.resolution().unwrap_or(resolution);
        if actual != resolution {
            warn!(
                "Camera resolution adjusted by driver: requested {}, got {}",
                resolution, actual
            );
        } else {
            info!("Set camera resolution {}", actual);
        }
        self.resolution = Some(actual);
    }

    /// Read one frame. Failures are reported as `ReadFailed`.
    pub fn read_frame(&mut self) -> Result<FrameData> {
        let index = self.index;
        let device = self.device.as_mut().ok_or_else(|| TimelapseError::ReadFailed {
            index,
            details: "device is not open".to_string(),
        })?;

        let frame = device.read_frame().map_err(|e| match e {
            TimelapseError::ReadFailed { .. } => e,
            other => TimelapseError::ReadFailed {
                index,
                details: other.to_string(),
            },
        })?;

        if self.resolution.is_none() {
            self.resolution = Some(frame.resolution());
        }

        Ok(frame)
    }

    /// Render a frame on the preview surface, resized to `display` when given.
    /// Returns false when no surface is attached.
    pub fn render_preview(&mut self, frame: &FrameData, display: Option<Resolution>) -> bool {
        let Some(surface) = self.preview.as_mut() else {
            return false;
        };

        let shown = match display {
            Some(target) => frame.resized(target).and_then(|f| surface.show(&f)),
            None => surface.show(frame),
        };

        if let Err(e) = shown {
            warn!("Live preview failed, continuing without it: {}", e);
            surface.close();
            self.preview = None;
            return false;
        }

        true
    }

    /// Release the device and preview surface. Safe to call repeatedly
    /// and on a session that never opened.
    pub fn close(&mut self) {
        if let Some(mut surface) = self.preview.take() {
            surface.close();
            debug!("Preview surface for camera {} closed", self.index);
        }

        if let Some(mut device) = self.device.take() {
            device.release();
            info!("Camera {} released", self.index);
        }

        if self.state == SessionState::Open {
            self.state = SessionState::Closed;
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Resolution in effect, once known
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution.or(self.requested_resolution)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}
