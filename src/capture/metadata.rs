use super::state::{CaptureOutcome, CaptureStats};
use crate::config::CaptureMode;
use crate::error::{Result, TimelapseError};
use crate::frame::Resolution;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Summary of a finished capture session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    pub device_index: u32,
    pub resolution: Option<Resolution>,
    pub mode: CaptureMode,
    pub interval_seconds: u64,
    pub period_seconds: u64,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub outcome: CaptureOutcome,
    pub stats: CaptureStats,
}

/// Write `metadata` as `<capture_dir>/metadata/<start>.json`
pub fn save_metadata(metadata: &SessionMetadata, capture_dir: &Path) -> Result<PathBuf> {
    let metadata_json = serde_json::to_string_pretty(metadata)?;

    let metadata_dir = capture_dir.join("metadata");
    fs::create_dir_all(&metadata_dir).map_err(|e| {
        TimelapseError::component(
            "capture",
            format!("Failed to create metadata directory: {}", e),
        )
    })?;

    let metadata_path = metadata_dir.join(format!(
        "{}.json",
        metadata.started_at.format("%Y-%m-%d_%H-%M-%S")
    ));
    fs::write(&metadata_path, metadata_json).map_err(|e| {
        TimelapseError::component("capture", format!("Failed to write metadata file: {}", e))
    })?;

    debug!("Saved metadata to {}", metadata_path.display());
    Ok(metadata_path)
}
