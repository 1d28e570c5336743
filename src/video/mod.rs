//! Video assembly from stored stills.
//!
//! Stills are read back in timestamp order, stretched to the output
//! resolution and handed to a [`VideoWriter`]. The GStreamer writer lives
//! behind the `video_encoding` feature.

mod assembler;
mod encode;


pub use assembler::{AssemblyReport, VideoAssembler, VideoAssemblyRequest};
#[cfg(all(feature = "video_encoding", target_os = "linux"))]
pub use encode::GstVideoBackend;
pub use encode::{default_video_backend, encoder_element, muxer_element, VideoBackend, VideoWriter};
