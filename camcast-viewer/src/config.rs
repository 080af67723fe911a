//! Configuration for the viewer.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use camcast_core::discovery::DISCOVERY_PORT;
use camcast_core::{Endpoint, ReceiverConfig, SubscribeOptions};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub discovery: DiscoveryConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

/// Where the producers are.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host of the publisher(s).
    pub broadcast_ip: String,
    /// Port of the first stream; stream `i` is on `base_port + i`.
    pub base_port: u16,
    /// Number of consecutive ports to subscribe to.
    pub count: u16,
}

/// Per-stream timing and buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Seconds to wait for a stream's first frame.
    pub connect_timeout_secs: f64,
    /// Bound on each receive in milliseconds.
    pub recv_timeout_ms: u64,
    /// Keep only the newest undelivered frame.
    pub conflate: bool,
    /// Queue depth when not conflating.
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Listen for a producer beacon instead of using `broadcast_ip`.
    pub enabled: bool,
    pub port: u16,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Include bytes/second in the per-stream summary.
    pub show_rate: bool,
    /// Aggregation tick in milliseconds (at most 50).
    pub poll_interval_ms: u64,
    /// Seconds between summaries of the same stream.
    pub summary_interval_secs: u64,
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
            broadcast_ip: "0.0.0.0".into(),
            base_port: 5555,
            count: 1,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10.0,
            recv_timeout_ms: 500,
            conflate: true,
            queue_depth: 16,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DISCOVERY_PORT,
            timeout_secs: 30,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_rate: false,
            poll_interval_ms: 30,
            summary_interval_secs: 1,
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

impl ViewerConfig {
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

    /// Convert into the engine's receiver settings.
    pub fn to_receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            endpoint: Endpoint::new(self.network.broadcast_ip.clone(), self.network.base_port),
            count: self.network.count.max(1),
            connect_timeout: self.connect_timeout(),
            recv_timeout: Duration::from_millis(self.stream.recv_timeout_ms.max(1)),
            poll_interval: Duration::from_millis(self.display.poll_interval_ms),
            show_rate: self.display.show_rate,
        }
    }

    /// Negative or NaN becomes zero; anything too large for a `Duration`
    /// falls back to the default.
    fn connect_timeout(&self) -> Duration {
        let secs = self.stream.connect_timeout_secs;
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or_else(|_| {
            tracing::warn!("connect_timeout_secs = {secs} is out of range; using the default");
            Duration::from_secs_f64(StreamConfig::default().connect_timeout_secs)
        })
    }

    pub fn to_subscribe_options(&self) -> SubscribeOptions {
        SubscribeOptions {
            conflate: self.stream.conflate,
            queue_depth: self.stream.queue_depth.max(1),
            ..Default::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
