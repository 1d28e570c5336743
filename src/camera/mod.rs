mod driver;
mod enumerator;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod v4l2;
mod mock;
mod session;

pub use driver::{CameraDevice, CameraDriver};
pub use enumerator::{select_camera, CameraEnumerator, ProbingEnumerator, MAX_PROBED_DEVICES};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use v4l2::GstCameraDriver;
pub use mock::TestPatternDriver;
pub use session::{DeviceSession, SessionState};

use crate::error::Result;
use std::sync::Arc;

/// Camera driver for this build: GStreamer/V4L2 on Linux, a test pattern elsewhere
#[cfg(all(feature = "camera", target_os = "linux"))]
pub fn default_driver() -> Result<Arc<dyn CameraDriver>> {
    Ok(Arc::new(GstCameraDriver::new()?))
}

/// Camera driver for this build: GStreamer/V4L2 on Linux, a test pattern elsewhere
#[cfg(not(all(feature = "camera", target_os = "linux")))]
pub fn default_driver() -> Result<Arc<dyn CameraDriver>> {
    #[cfg(not(target_os = "linux"))]
    tracing::warn!("GStreamer camera capture is only available on Linux, using test pattern");
    #[cfg(not(feature = "camera"))]
    tracing::warn!("Camera feature is disabled, using test pattern");
    Ok(Arc::new(TestPatternDriver::default()))
}
