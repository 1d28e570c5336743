use crate::error::{Result, TimelapseError};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const X480: Resolution = Resolution::new(640, 480);
    pub const X720: Resolution = Resolution::new(1280, 720);
    pub const X1080: Resolution = Resolution::new(1920, 1080);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Bytes in a tightly packed RGB24 buffer of this size
    pub fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Row length of a packed RGB24 row
    pub fn rgb_row_len(&self) -> usize {
        self.width as usize * 3
    }

    /// Row stride GStreamer expects for RGB24: rows are padded to 4 bytes
    pub fn rgb_stride(&self) -> usize {
        (self.rgb_row_len() + 3) & !3
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(resolution: Resolution) -> Self {
        (resolution.width, resolution.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single RGB24 frame read from a camera
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Sequence number assigned by the device
    pub id: u64,
    /// Time the device produced the frame
    pub timestamp: SystemTime,
    /// Packed RGB24 pixels, row-major without padding
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

impl FrameData {
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Build a frame from an already decoded image
    pub fn from_image(id: u64, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(id, SystemTime::now(), image.into_raw(), width, height)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Check the buffer length against the frame dimensions
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.resolution().rgb_len()
    }

    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.as_ref().clone()).ok_or_else(|| {
            TimelapseError::system(format!(
                "Frame {} buffer holds {} bytes, expected {} for {}",
                self.id,
                self.data.len(),
                self.resolution().rgb_len(),
                self.resolution()
            ))
        })
    }

    /// Stretch the frame to exactly `target`; no aspect-ratio correction.
    pub fn resized(&self, target: Resolution) -> Result<FrameData> {
        if self.resolution() == target {
            return Ok(self.clone());
        }

        let image = stretch(&self.to_rgb_image()?, target);
        Ok(Self {
            id: self.id,
            timestamp: self.timestamp,
            data: Arc::new(image.into_raw()),
            width: target.width,
            height: target.height,
        })
    }
}

/// Stretch an image to exact target dimensions.
pub fn stretch(image: &RgbImage, target: Resolution) -> RgbImage {
    if image.dimensions() == (target.width, target.height) {
        return image.clone();
    }
    imageops::resize(image, target.width, target.height, FilterType::Triangle)
}

/// Lay packed RGB24 rows out with `stride` bytes per row.
///
/// Copied unchanged when rows need no padding; padding bytes are zero.
pub fn pad_rgb_rows(packed: &[u8], resolution: Resolution, stride: usize) -> Vec<u8> {
    let row_len = resolution.rgb_row_len();
    if stride <= row_len || row_len == 0 {
        return packed.to_vec();
    }

    let mut padded = vec![0u8; stride * resolution.height as usize];
    for (src, dst) in packed
        .chunks_exact(row_len)
        .zip(padded.chunks_exact_mut(stride))
    {
        dst[..row_len].copy_from_slice(src);
    }
    padded
}
