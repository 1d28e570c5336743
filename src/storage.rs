use crate::error::{Result, TimelapseError};
use crate::frame::FrameData;
use chrono::{DateTime, Local};
use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Filename pattern for stored frames; lexicographic order is chronological
pub const FRAME_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Extension of stored stills
pub const FRAME_EXTENSION: &str = "png";

/// A persisted still frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFrame {
    /// Second-resolution timestamp the frame is named after
    pub timestamp: String,
    pub path: PathBuf,
}

impl StoredFrame {
    /// Recover a stored frame from its path, if it looks like one of ours
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(FRAME_EXTENSION));
        if !is_frame {
            return None;
        }

        let timestamp = path.file_stem()?.to_str()?.to_string();
        Some(Self { timestamp, path })
    }
}

/// Writes sampled frames as PNG stills into one directory
#[derive(Debug, Clone)]
pub struct FrameStore {
    directory: PathBuf,
}

impl FrameStore {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the directory if it does not exist yet
    pub fn ensure_directory(&self) -> Result<()> {
        if !self.directory.exists() {
            fs::create_dir_all(&self.directory).map_err(|e| {
                TimelapseError::component(
                    "frame_store",
                    format!(
                        "Failed to create capture directory {}: {}",
                        self.directory.display(),
                        e
                    ),
                )
            })?;
            info!("No captures dir, created {}", self.directory.display());
        }
        Ok(())
    }

    /// Path a frame taken at `taken_at` is stored under
    pub fn frame_path(&self, taken_at: DateTime<Local>) -> PathBuf {
        self.directory.join(format!(
            "{}.{}",
            taken_at.format(FRAME_NAME_FORMAT),
            FRAME_EXTENSION
        ))
    }

    /// Persist a frame named after `taken_at`.
    ///
    /// Names only carry second resolution: a second frame within the same
    /// second replaces the first.
    pub fn persist(&self, frame: &FrameData, taken_at: DateTime<Local>) -> Result<StoredFrame> {
        self.ensure_directory()?;

        let path = self.frame_path(taken_at);
        if path.exists() {
            warn!(
                "Overwriting {} (two captures within one second)",
                path.display()
            );
        }

        frame
            .to_rgb_image()?
            .save_with_format(&path, ImageFormat::Png)?;

        debug!("Saved frame {} to {}", frame.id, path.display());
        Ok(StoredFrame {
            timestamp: taken_at.format(FRAME_NAME_FORMAT).to_string(),
            path,
        })
    }

    /// Stored frames in directory order; callers sort by timestamp
    pub fn list(&self) -> Result<Vec<StoredFrame>> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }

        let mut frames = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(frame) = StoredFrame::from_path(entry.path()) {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Stored frames sorted oldest first
    pub fn list_sorted(&self) -> Result<Vec<StoredFrame>> {
        let mut frames = self.list()?;
        frames.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(frames)
    }

    /// Delete every stored frame, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let frames = self.list()?;
        for frame in &frames {
            fs::remove_file(&frame.path)?;
        }
        info!(
            "Cleared {} frame(s) from {}",
            frames.len(),
            self.directory.display()
        );
        Ok(frames.len())
    }
}
