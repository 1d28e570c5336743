use crate::frame::Resolution;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimelapseError {
    #[error("Configuration loading error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Camera {index} unavailable (resolution: {}): {details}", describe_resolution(.resolution))]
    DeviceUnavailable {
        index: u32,
        resolution: Option<Resolution>,
        details: String,
    },

    #[error("Could not grab frame from camera {index}: {details}")]
    ReadFailed { index: u32, details: String },

    #[error("No frames to assemble in {}", .directory.display())]
    NoFramesToAssemble { directory: PathBuf },

    #[error("Video encoding error: {message}")]
    Video { message: String },

    #[error("Preview error: {message}")]
    Preview { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl TimelapseError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn video<S: Into<String>>(message: S) -> Self {
        Self::Video {
            message: message.into(),
        }
    }

    /// Only invalid configuration and an unopenable device abort a session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Configuration { .. } | Self::DeviceUnavailable { .. }
        )
    }
}

fn describe_resolution(resolution: &Option<Resolution>) -> String {
    match resolution {
        Some(resolution) => resolution.to_string(),
        None => "device default".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, TimelapseError>;
