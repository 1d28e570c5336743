use super::encode::VideoBackend;
use crate::error::{Result, TimelapseError};
use crate::frame::{stretch, Resolution};
use crate::storage::FrameStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything needed to encode one video, frames oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct VideoAssemblyRequest {
    pub resolution: Resolution,
    pub fps: u32,
    pub output_path: PathBuf,
    pub frames: Vec<PathBuf>,
}

impl VideoAssemblyRequest {
    /// Collect the stored frames under `directory`, sorted by timestamp name
    pub fn from_directory(
        directory: &Path,
        output_path: &Path,
        resolution: Resolution,
        fps: u32,
    ) -> Result<Self> {
        let frames = FrameStore::new(directory)
            .list_sorted()?
            .into_iter()
            .map(|frame| frame.path)
            .collect();

        Ok(Self {
            resolution,
            fps,
            output_path: output_path.to_path_buf(),
            frames,
        })
    }
}

/// Result of a successful assembly
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyReport {
    pub output_path: PathBuf,
    pub resolution: Resolution,
    pub fps: u32,
    pub frames_written: usize,
    /// Stored frames that could not be decoded
    pub frames_skipped: usize,
}

/// Turns a directory of stills into one video
#[derive(Clone)]
pub struct VideoAssembler {
    backend: Arc<dyn VideoBackend>,
}

impl VideoAssembler {
    pub fn new(backend: Arc<dyn VideoBackend>) -> Self {
        Self { backend }
    }

    /// Encode every stored frame in `directory`, stretched to `resolution`.
    ///
    /// An empty directory yields `NoFramesToAssemble` and no output file.
    pub fn assemble(
        &self,
        directory: &Path,
        output_path: &Path,
        resolution: Resolution,
        fps: u32,
    ) -> Result<AssemblyReport> {
        let request = VideoAssemblyRequest::from_directory(directory, output_path, resolution, fps)?;

        if request.frames.is_empty() {
            warn!("No captures in {} to assemble", directory.display());
            return Err(TimelapseError::NoFramesToAssemble {
                directory: directory.to_path_buf(),
            });
        }

        self.encode(request)
    }

    /// Encode an already collected request in order
    pub fn encode(&self, request: VideoAssemblyRequest) -> Result<AssemblyReport> {
        let mut writer = self.backend.create_writer()?;
        writer.open(&request.output_path, request.resolution, request.fps)?;

        info!(
            "Writing {} frame(s) to {} at {} @ {}fps via {}",
            request.frames.len(),
            request.output_path.display(),
            request.resolution,
            request.fps,
            self.backend.name()
        );

        let mut frames_written = 0;
        let mut frames_skipped = 0;

        for path in &request.frames {
            let image = match image::open(path) {
                Ok(image) => image.to_rgb8(),
                Err(e) => {
                    warn!("Skipping unreadable capture {}: {}", path.display(), e);
                    frames_skipped += 1;
                    continue;
                }
            };

            let frame = stretch(&image, request.resolution);
            if let Err(e) = writer.write_frame(&frame) {
                let _ = writer.finish();
                return Err(e);
            }

            frames_written += 1;
            debug!("Encoded {}", path.display());
        }

        writer.finish()?;

        info!(
            "Video {} written with {} frame(s)",
            request.output_path.display(),
            frames_written
        );

        Ok(AssemblyReport {
            output_path: request.output_path,
            resolution: request.resolution,
            fps: request.fps,
            frames_written,
            frames_skipped,
        })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}
