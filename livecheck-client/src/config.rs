//! Client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use livecheck_core::{ClientSettings, ManagerSettings, ZoomPolicy};

/// Top-level configuration for the terminal client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the verification service lives.
    pub network: NetworkConfig,
    /// Frame capture.
    pub capture: CaptureConfig,
    /// Smart-zoom tunables.
    pub zoom: ZoomPolicy,
    /// Terminal output.
    pub display: DisplayConfig,
    /// Where verified photos are saved.
    pub download: DownloadConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Page origin the endpoint is derived from (`http://host:port`).
    pub origin: String,
    /// Explicit `ws://` / `wss://` endpoint. Empty = derive from `origin`.
    pub endpoint: String,
    /// Upper bound for one connect attempt, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Delay before reconnecting after a close or error, in milliseconds.
    pub reconnect_delay_ms: u64,
}

/// Capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Time between two frames, in milliseconds.
    pub interval_ms: u64,
    /// Directory of JPEG stills replayed as the camera. Empty = no camera.
    pub frames_dir: String,
}

/// Display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Blinks the service asks for; only shown, never enforced locally.
    pub required_blinks: u32,
    /// Print the smart-zoom transform under the status lines.
    pub show_transform: bool,
}

/// Download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Target directory, created on first download.
    pub dir: String,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level / `EnvFilter` directive.
    pub level: String,
    /// Optional log file. Empty = stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8000".into(),
            endpoint: String::new(),
            connect_timeout_ms: 5000,
            reconnect_delay_ms: 3000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            frames_dir: String::new(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            required_blinks: 2,
            show_transform: true,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self { dir: ".".into() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let mut cfg: Self = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        };

        if !cfg.zoom.is_valid() {
            tracing::warn!(
                "invalid [zoom] in {}: {:?}; using defaults",
                path.display(),
                cfg.zoom
            );
            cfg.zoom = ZoomPolicy::default();
        }
        cfg
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Runtime settings for [`livecheck_core::spawn`].
    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            // A zero period would stall the capture timer.
            capture_interval: Duration::from_millis(self.capture.interval_ms.max(1)),
            connection: ManagerSettings {
                reconnect_delay: Duration::from_millis(self.network.reconnect_delay_ms),
                connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
            },
            zoom: self.zoom,
        }
    }

    /// The explicit endpoint, if one is configured.
    pub fn endpoint(&self) -> Option<&str> {
        non_empty(&self.network.endpoint)
    }

    /// The frames directory, if one is configured.
    pub fn frames_dir(&self) -> Option<PathBuf> {
        non_empty(&self.capture.frames_dir).map(PathBuf::from)
    }

    /// The log file, if one is configured.
    pub fn log_file(&self) -> Option<PathBuf> {
        non_empty(&self.logging.file).map(PathBuf::from)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

// ── Tests ────────────────────────────────────────────────────────
