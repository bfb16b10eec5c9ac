//! Layered application settings
//!
//! Defaults, then an optional TOML file, then `DMS__*` environment
//! variables (`DMS__SERVER__PORT=9000`, `DMS__DETECTION__EYE_AR_THRESH=0.2`).

use alerting::AlertConfig;
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

/// Config file looked up when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "drowsiness-monitor.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub detection: DmsConfig,
    pub alerts: AlertSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Log and keep waiting after this long without frames
    pub idle_timeout_secs: u64,
    /// Largest accepted WebSocket message
    pub max_message_bytes: usize,
    /// Frames buffered between a connection and its pipeline
    pub frame_queue_depth: usize,
    /// Results buffered for `/ws/live` observers
    pub live_buffer: usize,
    /// Request/response sessions idle this long are dropped
    pub session_idle_secs: u64,
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 65486,
            idle_timeout_secs: 30,
            max_message_bytes: 10 * 1024 * 1024,
            frame_queue_depth: 32,
            live_buffer: 256,
            session_idle_secs: 300,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. "info" or "dms=debug,info"
    pub level: String,
    /// Structured JSON output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub snapshot_dir: PathBuf,
    pub jpeg_quality: u8,
    /// Player command and arguments, e.g. `["aplay", "alert_beep.wav"]`
    pub sound_command: Option<Vec<String>>,
    pub max_alerts_per_hour: usize,
    pub audio_queue_depth: usize,
    /// Alert log records kept in memory
    pub retention: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        let alert = AlertConfig::default();
        Self {
            snapshot_dir: PathBuf::from("dms_alerts"),
            jpeg_quality: storage::DEFAULT_JPEG_QUALITY,
            sound_command: None,
            max_alerts_per_hour: alert.max_alerts_per_hour,
            audio_queue_depth: alert.audio_queue_depth,
            retention: storage::DEFAULT_MAX_ALERT_RECORDS,
        }
    }
}

impl AlertSettings {
    pub fn alert_config(&self) -> AlertConfig {
        AlertConfig {
            max_alerts_per_hour: self.max_alerts_per_hour,
            audio_queue_depth: self.audio_queue_depth,
        }
    }
}

impl Settings {
    /// Load settings from `path` (or the default file if present) and the
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("DMS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
