pub mod capture;
pub mod error;
pub mod pipeline;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use capture::{CaptureEvent, CaptureStatistics, FrameNotice, FramePair, RtspCapture};
pub use error::CaptureError;
pub use pipeline::FrameQueue;

/// Prefix for environment overrides, e.g. `RTSP_CAPTURE__CAPTURE__URL`.
pub const ENV_PREFIX: &str = "RTSP_CAPTURE";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Stream locator, `rtsp://...` or `synthetic://WxH[@fps]`
    pub url: String,
    /// Frame pairs buffered between producer and consumer
    pub queue_capacity: usize,
    pub timestamp_source: TimestampSource,
    /// Pause before re-reading after the stream reports its end
    pub end_of_stream_backoff_ms: u64,
    pub thread_name: String,
}

/// Where frame timestamps come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Local receipt time, microseconds since the Unix epoch
    #[default]
    WallClock,
    /// The stream's own presentation time, wall clock when absent
    Presentation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            queue_capacity: 4,
            timestamp_source: TimestampSource::WallClock,
            end_of_stream_backoff_ms: 10,
            thread_name: "rtsp-producer".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "rtsp_capture=info".into(),
        }
    }
}

impl CaptureConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn end_of_stream_backoff(&self) -> Duration {
        Duration::from_millis(self.end_of_stream_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if self.queue_capacity < pipeline::ringbuf::MIN_CAPACITY {
            return Err(ConfigError::QueueTooSmall(self.queue_capacity));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no stream url configured")]
    MissingUrl,
    #[error("queue capacity {0} is too small (minimum 2)")]
    QueueTooSmall(usize),
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl Config {
    /// Layer an optional TOML file and `RTSP_CAPTURE__*` environment
    /// variables over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_need_url() {
        let config = CaptureConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingUrl)));
        assert!(CaptureConfig::with_url("rtsp://camera/stream").validate().is_ok());
    }

    #[test]
    fn test_queue_capacity_minimum() {
        let mut config = CaptureConfig::with_url("synthetic://4x4");
        config.queue_capacity = 1;
        assert!(matches!(config.validate(), Err(ConfigError::QueueTooSmall(1))));
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[capture]
url = "rtsp://10.0.0.5/live"
queue_capacity = 8
timestamp_source = "presentation"

[logging]
filter = "rtsp_capture=debug"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.url, "rtsp://10.0.0.5/live");
        assert_eq!(config.capture.queue_capacity, 8);
        assert_eq!(config.capture.timestamp_source, TimestampSource::Presentation);
        assert_eq!(config.capture.end_of_stream_backoff_ms, 10);
        assert_eq!(config.logging.filter, "rtsp_capture=debug");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/rtsp-capture.toml")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
