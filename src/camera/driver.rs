use crate::error::Result;
use crate::frame::{FrameData, Resolution};

/// Opens imaging devices by index
pub trait CameraDriver: Send + Sync {
    /// Acquire the device exclusively; fails if the index cannot be opened
    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>>;

    /// Backend name used in logs
    fn name(&self) -> &str;
}

/// An opened imaging device, exclusively owned by one session
pub trait CameraDevice: Send {
    /// Request a capture size. Devices may ignore sizes they do not support.
    fn set_resolution(&mut self, resolution: Resolution) -> Result<()>;

    /// Size the device currently reports, if known
    fn resolution(&self) -> Option<Resolution>;

    /// Read one frame; an `Err` here is a transient `ReadFailed`
    fn read_frame(&mut self) -> Result<FrameData>;

    /// Release the device. Must tolerate being called more than once.
    fn release(&mut self);
}
