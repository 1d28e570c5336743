use super::driver::{CameraDevice, CameraDriver};
use crate::error::{Result, TimelapseError};
use crate::frame::{FrameData, Resolution};
use std::time::SystemTime;
use tracing::{trace, warn};

/// Synthetic driver used when no hardware backend is compiled in
pub struct TestPatternDriver {
    devices: u32,
    resolution: Resolution,
}

impl TestPatternDriver {
    pub fn new(devices: u32) -> Self {
        Self {
            devices,
            resolution: Resolution::X480,
        }
    }
}

impl Default for TestPatternDriver {
    fn default() -> Self {
        Self::new(1)
    }
}

impl CameraDriver for TestPatternDriver {
    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>> {
        if index >= self.devices {
            return Err(TimelapseError::DeviceUnavailable {
                index,
                resolution: None,
                details: format!("test pattern driver exposes {} device(s)", self.devices),
            });
        }

        warn!("Camera {} is a synthetic test pattern", index);
        Ok(Box::new(TestPatternDevice {
            index,
            resolution: self.resolution,
            frame_counter: 0,
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "test-pattern"
    }
}

struct TestPatternDevice {
    index: u32,
    resolution: Resolution,
    frame_counter: u64,
    released: bool,
}

impl CameraDevice for TestPatternDevice {
    fn set_resolution(&mut self, resolution: Resolution) -> Result<()> {
        self.resolution = resolution;
        Ok(())
    }

    fn resolution(&self) -> Option<Resolution> {
        Some(self.resolution)
    }

    fn read_frame(&mut self) -> Result<FrameData> {
        if self.released {
            return Err(TimelapseError::ReadFailed {
                index: self.index,
                details: "device released".to_string(),
            });
        }

        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        // Horizontal gradient that drifts one column per frame
        let Resolution { width, height } = self.resolution;
        let mut data = Vec::with_capacity(self.resolution.rgb_len());
        for y in 0..height {
            for x in 0..width {
                let shade = ((x as u64 + frame_id) % 256) as u8;
                data.extend_from_slice(&[shade, (y % 256) as u8, 255 - shade]);
            }
        }

        trace!(
            "Generated test pattern frame {} ({})",
            frame_id,
            self.resolution
        );
        Ok(FrameData::new(frame_id, SystemTime::now(), data, width, height))
    }

    fn release(&mut self) {
        self.released = true;
    }
}
