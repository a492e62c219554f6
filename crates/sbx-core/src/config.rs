use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level daemon configuration (loaded from signbox.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SbxConfig {
    pub daemon: DaemonConfig,
    pub catalog: CatalogConfig,
    pub media: MediaConfig,
    pub transfer: TransferConfig,
    pub link: LinkConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog base URL, e.g. http://catalog.example.com:8005
    pub base_url: String,
    /// Stable device identifier; all endpoints are scoped under it.
    /// Empty means "read from the SBX_DEVICE_ID environment variable".
    pub device_id: String,
    /// Connect timeout for API calls (seconds)
    pub connect_timeout_secs: u64,
    /// Read timeout for API calls (seconds)
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory playback reads from
    pub live_dir: PathBuf,
    /// Staging directory used by the full-replace mode
    pub staging_dir: PathBuf,
    /// Glob patterns selecting playable files (matched case-insensitively)
    pub patterns: Vec<String>,
    /// "diff" (incremental, default) or "replace" (staging + atomic swap)
    pub sync_mode: SyncMode,
    /// Seconds between sync/heartbeat ticks
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Diff,
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Attempts per file before giving up
    pub max_attempts: u32,
    /// Linear backoff step: sleep attempt * step between retries (milliseconds)
    pub backoff_step_ms: u64,
    /// Read timeout while streaming a body (seconds)
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Exact advertised name the scan filters on
    pub device_name: String,
    /// GATT service holding the command channels
    pub service_uuid: String,
    /// Characteristic we write commands to
    pub write_char_uuid: String,
    /// Characteristic we subscribe to for inbound lines
    pub notify_char_uuid: String,
    /// Give up a scan with no match after this long (seconds)
    pub scan_timeout_secs: u64,
    /// Delay before re-entering discovery after any failure (seconds)
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Presence heartbeat period (seconds)
    pub heartbeat_interval_secs: u64,
    /// Sensor reading push period (seconds)
    pub sensor_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8005".into(),
            device_id: String::new(),
            connect_timeout_secs: 20,
            read_timeout_secs: 30,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            live_dir: PathBuf::from("/var/lib/signbox/media"),
            staging_dir: PathBuf::from("/var/lib/signbox/media_new"),
            patterns: vec!["*.mp4".into()],
            sync_mode: SyncMode::Diff,
            poll_interval_secs: 60,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step_ms: 1500,
            read_timeout_secs: 120,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        // Nordic UART service; the stock peripheral firmware exposes it.
        Self {
            device_name: "ESP32_PLAYER_CTRL_BLE".into(),
            service_uuid: "6e400001-b5a3-f393-e0a9-e50e24dcca9e".into(),
            write_char_uuid: "6e400002-b5a3-f393-e0a9-e50e24dcca9e".into(),
            notify_char_uuid: "6e400003-b5a3-f393-e0a9-e50e24dcca9e".into(),
            scan_timeout_secs: 15,
            retry_delay_secs: 5,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 60,
            sensor_interval_secs: 5,
        }
    }
}

impl SbxConfig {
    /// Resolve the device id: config value first, then SBX_DEVICE_ID.
    pub fn device_id(&self) -> Option<String> {
        if !self.catalog.device_id.is_empty() {
            return Some(self.catalog.device_id.clone());
        }
        std::env::var("SBX_DEVICE_ID").ok().filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[daemon]
log_level = "debug"
log_format = "json"

[catalog]
base_url = "http://34.248.112.237:8005"
device_id = "kiosk-7f3a"
connect_timeout_secs = 10

[media]
live_dir = "/sdcard/video"
staging_dir = "/sdcard/video_new"
patterns = ["*.mp4", "*.mov"]
sync_mode = "replace"
poll_interval_secs = 30

[transfer]
max_attempts = 3
backoff_step_ms = 500

[link]
device_name = "LOBBY_CTRL"
scan_timeout_secs = 20

[telemetry]
sensor_interval_secs = 2
"#;
        let config: SbxConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.catalog.base_url, "http://34.248.112.237:8005");
        assert_eq!(config.catalog.device_id, "kiosk-7f3a");
        assert_eq!(config.catalog.connect_timeout_secs, 10);
        assert_eq!(config.media.live_dir, PathBuf::from("/sdcard/video"));
        assert_eq!(config.media.sync_mode, SyncMode::Replace);
        assert_eq!(config.media.patterns.len(), 2);
        assert_eq!(config.transfer.max_attempts, 3);
        assert_eq!(config.link.device_name, "LOBBY_CTRL");
        assert_eq!(config.link.scan_timeout_secs, 20);
        assert_eq!(config.telemetry.sensor_interval_secs, 2);
    }

    #[test]
    fn test_parse_defaults() {
        let config: SbxConfig = toml::from_str("").unwrap();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.media.sync_mode, SyncMode::Diff);
        assert_eq!(config.media.poll_interval_secs, 60);
        assert_eq!(config.transfer.max_attempts, 5);
        assert_eq!(config.transfer.backoff_step_ms, 1500);
        assert_eq!(config.link.device_name, "ESP32_PLAYER_CTRL_BLE");
        assert_eq!(config.link.scan_timeout_secs, 15);
        assert_eq!(config.link.retry_delay_secs, 5);
        assert_eq!(config.telemetry.heartbeat_interval_secs, 60);
        assert_eq!(config.telemetry.sensor_interval_secs, 5);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[catalog]
base_url = "http://192.168.1.100:8005"
"#;
        let config: SbxConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.catalog.base_url, "http://192.168.1.100:8005");
        // Defaults
        assert_eq!(config.catalog.connect_timeout_secs, 20);
        assert_eq!(config.media.patterns, vec!["*.mp4".to_string()]);
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = SbxConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: SbxConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.media.live_dir, config.media.live_dir);
        assert_eq!(parsed.link.service_uuid, config.link.service_uuid);
        assert_eq!(parsed.media.sync_mode, config.media.sync_mode);
    }
}
