//! Configuration for the streamer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use camcast_core::discovery::{DEFAULT_ROUNDS, DISCOVERY_PORT};
use camcast_core::{DEFAULT_JPEG_QUALITY, PublisherConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    pub network: NetworkConfig,
    pub camera: CameraConfig,
    pub beacon: BeaconConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the publishers bind on.
    pub bind_ip: String,
    /// Port of the first camera; camera `i` is published on `base_port + i`.
    pub base_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera ids to stream, in port order.
    pub camera_ids: Vec<u32>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
    /// Log every this many read failures.
    pub log_every: u64,
    /// Fail every this many grabs to exercise the read-failure path; 0 never fails.
    pub dropout_every: u32,
}

/// UDP announcement of the first camera's endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub enabled: bool,
    pub port: u16,
    pub rounds: u32,
    pub interval_ms: u64,
    /// Destination address; empty means the local broadcast address.
    pub target_ip: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            base_port: 5555,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_ids: vec![0],
            width: 640,
            height: 640,
            fps: 30,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            log_every: 50,
            dropout_every: 0,
        }
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DISCOVERY_PORT,
            rounds: DEFAULT_ROUNDS,
            interval_ms: 1000,
            target_ip: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl StreamerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// `(camera id, port)` for every configured camera.
    pub fn assignments(&self) -> Vec<(u32, u16)> {
        self.camera
            .camera_ids
            .iter()
            .zip(self.network.base_port..=u16::MAX)
            .map(|(&id, port)| (id, port))
            .collect()
    }

    pub fn to_publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            target_fps: self.camera.fps.clamp(1, 120),
            jpeg_quality: self.camera.jpeg_quality.clamp(1, 100),
            log_every: self.camera.log_every.max(1),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
