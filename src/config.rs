use crate::error::{Result, TimelapseError};
use crate::frame::Resolution;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TimelapseConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub preview: PreviewConfig,
    pub video: VideoConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0); unset to auto-select
    #[serde(default)]
    pub index: Option<u32>,

    /// Requested resolution (width, height); unset to adopt the device's own
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Directory stills are written to
    #[serde(default = "default_capture_path")]
    pub path: String,

    /// Minimum seconds between two persisted frames
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Length of a period-mode timelapse in seconds
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u64,

    #[serde(default)]
    pub mode: CaptureMode,

    /// Skip live preview rendering
    #[serde(default)]
    pub headless: bool,

    /// Assemble a video without asking once capture ends
    #[serde(default)]
    pub generate_video: bool,

    /// Delay between two polling ticks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Write a JSON summary of each session under `<path>/metadata`
    #[serde(default)]
    pub save_metadata: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct PreviewConfig {
    /// Show the live feed until `q` is pressed before capture begins
    #[serde(default)]
    pub before_start: bool,

    /// Size of the preview window, if different from the capture size
    #[serde(default)]
    pub display_resolution: Option<(u32, u32)>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VideoConfig {
    /// Output video file
    #[serde(default = "default_video_output")]
    pub output: String,

    /// Codec identifier (XVID, MP4V, H264, MJPG)
    #[serde(default = "default_video_codec")]
    pub codec: String,

    #[serde(default = "default_video_fps")]
    pub fps: u32,

    /// Output resolution; unset to use the capture resolution
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,
}

/// How a capture session terminates
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Stop automatically once the capture period has elapsed
    #[default]
    Period,
    /// Run until interrupted
    Continuous,
}

/// Codecs the encoder backend knows how to build
pub const SUPPORTED_CODECS: &[&str] = &["XVID", "MP4V", "H264", "MJPG"];

impl TimelapseConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from_file("timelapse.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("capture.path", default_capture_path())?
            .set_default("capture.interval_seconds", default_interval_seconds())?
            .set_default("capture.period_seconds", default_period_seconds())?
            .set_default("capture.mode", "period")?
            .set_default("capture.headless", false)?
            .set_default("capture.generate_video", false)?
            .set_default("capture.poll_interval_ms", default_poll_interval_ms())?
            .set_default("capture.save_metadata", false)?
            .set_default("preview.before_start", false)?
            .set_default("video.output", default_video_output())?
            .set_default("video.codec", default_video_codec())?
            .set_default("video.fps", default_video_fps())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // TIMELAPSE_<SECTION>__<KEY>, e.g. TIMELAPSE_CAPTURE__INTERVAL_SECONDS
            .add_source(
                Environment::with_prefix("TIMELAPSE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: TimelapseConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.capture.interval_seconds < 1 {
            return Err(TimelapseError::configuration(
                "Capture interval cannot be less than 1 second",
            ));
        }

        if let Some(resolution) = self.camera_resolution() {
            if resolution.is_empty() {
                return Err(TimelapseError::configuration(
                    "Camera resolution must be greater than 0",
                ));
            }
        }

        if self.display_resolution().is_some_and(|r| r.is_empty()) {
            return Err(TimelapseError::configuration(
                "Preview display resolution must be greater than 0",
            ));
        }

        if self.video_resolution().is_some_and(|r| r.is_empty()) {
            return Err(TimelapseError::configuration(
                "Video resolution must be greater than 0",
            ));
        }

        if self.video.fps == 0 {
            return Err(TimelapseError::configuration(
                "Video fps must be greater than 0",
            ));
        }

        let codec = self.video.codec.to_uppercase();
        if !SUPPORTED_CODECS.contains(&codec.as_str()) {
            return Err(TimelapseError::configuration(format!(
                "Unsupported video codec '{}' (expected one of {})",
                self.video.codec,
                SUPPORTED_CODECS.join(", ")
            )));
        }

        if self.capture.path.trim().is_empty() {
            return Err(TimelapseError::configuration(
                "Capture path must not be empty",
            ));
        }

        Ok(())
    }

    pub fn camera_resolution(&self) -> Option<Resolution> {
        self.camera.resolution.map(Resolution::from)
    }

    pub fn display_resolution(&self) -> Option<Resolution> {
        self.preview.display_resolution.map(Resolution::from)
    }

    pub fn video_resolution(&self) -> Option<Resolution> {
        self.video.resolution.map(Resolution::from)
    }

    pub fn capture_dir(&self) -> PathBuf {
        PathBuf::from(&self.capture.path)
    }

    pub fn video_output(&self) -> PathBuf {
        PathBuf::from(&self.video.output)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.capture.interval_seconds)
    }

    pub fn capture_period(&self) -> Duration {
        Duration::from_secs(self.capture.period_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.capture.poll_interval_ms)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for TimelapseConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: None,
                resolution: default_camera_resolution(),
            },
            capture: CaptureConfig {
                path: default_capture_path(),
                interval_seconds: default_interval_seconds(),
                period_seconds: default_period_seconds(),
                mode: CaptureMode::default(),
                headless: false,
                generate_video: false,
                poll_interval_ms: default_poll_interval_ms(),
                save_metadata: false,
            },
            preview: PreviewConfig::default(),
            video: VideoConfig {
                output: default_video_output(),
                codec: default_video_codec(),
                fps: default_video_fps(),
                resolution: None,
            },
        }
    }
}

// Default value functions
fn default_camera_resolution() -> Option<(u32, u32)> {
    Some(Resolution::X720.into())
}

fn default_capture_path() -> String {
    "./captures".to_string()
}
fn default_interval_seconds() -> u64 {
    5
}
fn default_period_seconds() -> u64 {
    60
}
fn default_poll_interval_ms() -> u64 {
    10
}

fn default_video_output() -> String {
    "video.avi".to_string()
}
fn default_video_codec() -> String {
    "XVID".to_string()
}
fn default_video_fps() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;

    // Loading reads the process environment, which the env override test mutates
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = TimelapseConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.camera.index, None);
        assert_eq!(config.camera_resolution(), Some(Resolution::X720));
        assert_eq!(config.capture.mode, CaptureMode::Period);
        assert_eq!(config.sample_interval(), Duration::from_secs(5));
        assert_eq!(config.capture_period(), Duration::from_secs(60));
        assert_eq!(config.video_output(), PathBuf::from("video.avi"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = TimelapseConfig::default();
        config.capture.interval_seconds = 0;

        match config.validate() {
            Err(TimelapseError::Configuration { message }) => {
                assert!(message.contains("interval"));
            }
            other => panic!("Expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = TimelapseConfig::default();

        config.camera.resolution = Some((0, 0));
        assert!(config.validate().is_err());
        config.camera.resolution = None;
        assert!(config.validate().is_ok());

        config.video.fps = 0;
        assert!(config.validate().is_err());
        config.video.fps = 24;

        config.video.codec = "vp9".to_string();
        assert!(config.validate().is_err());
        config.video.codec = "h264".to_string();
        assert!(config.validate().is_ok());

        config.preview.display_resolution = Some((640, 0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let _env = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camera]
index = 2
resolution = [1920, 1080]

[capture]
interval_seconds = 10
mode = "continuous"
headless = true

[video]
output = "out.mp4"
codec = "H264"
"#
        )
        .unwrap();

        let config = TimelapseConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.camera.index, Some(2));
        assert_eq!(config.camera_resolution(), Some(Resolution::X1080));
        assert_eq!(config.capture.interval_seconds, 10);
        assert_eq!(config.capture.period_seconds, 60);
        assert_eq!(config.capture.mode, CaptureMode::Continuous);
        assert!(config.capture.headless);
        assert_eq!(config.video.output, "out.mp4");
        assert_eq!(config.video.fps, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let _env = ENV_LOCK.lock();
        let config = TimelapseConfig::load_from_file("definitely-not-here.toml").unwrap();
        assert_eq!(config.capture.path, "./captures");
        assert_eq!(config.video.codec, "XVID");
        assert_eq!(config.camera.index, None);
        assert_eq!(config.camera_resolution(), None);
    }

    #[test]
    fn test_omitted_camera_resolution_follows_device() {
        let _env = ENV_LOCK.lock();
        let file = write_toml("[camera]\nindex = 0\n");

        let config = TimelapseConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.camera.index, Some(0));
        assert_eq!(config.camera_resolution(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides_underscored_keys() {
        let _env = ENV_LOCK.lock();
        let file = write_toml("[capture]\ninterval_seconds = 10\n");

        std::env::set_var("TIMELAPSE_CAPTURE__INTERVAL_SECONDS", "42");
        std::env::set_var("TIMELAPSE_CAPTURE__GENERATE_VIDEO", "true");
        std::env::set_var("TIMELAPSE_VIDEO__CODEC", "MJPG");
        let loaded = TimelapseConfig::load_from_file(file.path());
        std::env::remove_var("TIMELAPSE_CAPTURE__INTERVAL_SECONDS");
        std::env::remove_var("TIMELAPSE_CAPTURE__GENERATE_VIDEO");
        std::env::remove_var("TIMELAPSE_VIDEO__CODEC");

        let config = loaded.unwrap();
        assert_eq!(config.capture.interval_seconds, 42);
        assert!(config.capture.generate_video);
        assert_eq!(config.video.codec, "MJPG");
        assert_eq!(config.capture.period_seconds, 60);
    }

    #[test]
    fn test_default_config_renders_as_toml() {
        let rendered = TimelapseConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[capture]"));
        assert!(rendered.contains("interval_seconds = 5"));
    }
}
