use super::driver::CameraDriver;
use crate::app::CameraSelector;
use crate::error::{Result, TimelapseError};
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on indices probed during enumeration
pub const MAX_PROBED_DEVICES: u32 = 16;

/// Discovers which camera indices can produce frames
pub trait CameraEnumerator: Send + Sync {
    /// Candidate indices, ascending
    fn list_available(&self) -> Vec<u32>;
}

/// Probes indices from 0 with a trial read, stopping at the first failure
pub struct ProbingEnumerator {
    driver: Arc<dyn CameraDriver>,
    max_devices: u32,
}

impl ProbingEnumerator {
    pub fn new(driver: Arc<dyn CameraDriver>) -> Self {
        Self {
            driver,
            max_devices: MAX_PROBED_DEVICES,
        }
    }

    pub fn with_limit(mut self, max_devices: u32) -> Self {
        self.max_devices = max_devices;
        self
    }
}

impl CameraEnumerator for ProbingEnumerator {
    fn list_available(&self) -> Vec<u32> {
        let mut cameras = Vec::new();

        for index in 0..self.max_devices {
            let mut device = match self.driver.open(index) {
                Ok(device) => device,
                Err(e) => {
                    debug!("Probe stopped at camera {}: {}", index, e);
                    break;
                }
            };

            let readable = device.read_frame().is_ok();
            device.release();

            if !readable {
                debug!("Probe stopped at camera {}: no frame", index);
                break;
            }
            cameras.push(index);
        }

        info!("Found {} camera(s): {:?}", cameras.len(), cameras);
        cameras
    }
}

/// Pick a camera: a sole candidate is taken as-is, otherwise the selector decides
pub fn select_camera(
    enumerator: &dyn CameraEnumerator,
    selector: &dyn CameraSelector,
) -> Result<u32> {
    let candidates = enumerator.list_available();

    match candidates.as_slice() {
        [] => Err(TimelapseError::DeviceUnavailable {
            index: 0,
            resolution: None,
            details: "no cameras produced a frame during probing".to_string(),
        }),
        [only] => {
            info!("Auto-selected camera {}", only);
            Ok(*only)
        }
        _ => {
            let choice = selector.select_from(&candidates)?;
            if !candidates.contains(&choice) {
                return Err(TimelapseError::configuration(format!(
                    "Camera {} is an invalid selection",
                    choice
                )));
            }
            info!("Camera {} selected", choice);
            Ok(choice)
        }
    }
}
