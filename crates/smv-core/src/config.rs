//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! sub-configs for the HTTP server, external tools, encoding, input fetching
//! and output placement. Every section defaults sensibly so a completely
//! empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Hardware backends accepted by [`EncodingConfig::hw_accel`].
pub const HW_ACCEL_METHODS: &[&str] = &["auto", "none", "nvenc", "qsv", "amf", "videotoolbox", "vaapi"];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub encoding: EncodingConfig,
    pub fetch: FetchConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if !HW_ACCEL_METHODS.contains(&self.encoding.hw_accel.as_str()) {
            warnings.push(format!(
                "encoding.hw_accel '{}' is not a recognized method (valid: {})",
                self.encoding.hw_accel,
                HW_ACCEL_METHODS.join(", ")
            ));
        }

        if self.encoding.sample_rate == 0 {
            warnings.push("encoding.sample_rate is 0; audio transform will fail".into());
        }

        if self.encoding.frame_rate == 0 {
            warnings.push("encoding.frame_rate is 0; defaulting to the input rate".into());
        }

        if self.fetch.max_attempts == 0 {
            warnings.push("fetch.max_attempts is 0; fetches are attempted once".into());
        }

        if self.output.extension.is_empty() || self.output.extension.contains('.') {
            warnings.push(format!(
                "output.extension '{}' should be a bare extension such as 'mp4'",
                self.output.extension
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
}

/// Encoder and filter defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Hardware acceleration policy: `auto` probes the ffmpeg build, `none`
    /// forces CPU encoding, any other value restricts the ladder to that
    /// backend (plus the CPU fallback).
    pub hw_accel: String,
    /// libx264 preset for the CPU profile.
    pub cpu_preset: String,
    /// libx264 constant rate factor.
    pub cpu_crf: u32,
    /// Target bitrate for hardware encoders (they do not take a CRF).
    pub hw_bitrate: String,
    /// AAC bitrate used when muxing.
    pub audio_bitrate: String,
    /// Base sample rate of the speed transform.
    pub sample_rate: u32,
    /// Output frame rate of the background track.
    pub frame_rate: u32,
    /// Upper bound on a single external tool invocation.
    pub tool_timeout_secs: u64,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            hw_accel: "auto".into(),
            cpu_preset: "fast".into(),
            cpu_crf: 22,
            hw_bitrate: "5M".into(),
            audio_bitrate: "192k".into(),
            sample_rate: 44_100,
            frame_rate: 30,
            tool_timeout_secs: 3_600,
        }
    }
}

/// Input acquisition settings applied by the fetch implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            backoff_ms: 500,
            user_agent: concat!("spedup-mv/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Where finished artifacts land.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub extension: String,
    /// Persist the scratch directory of a failed job for diagnosis.
    pub keep_failed_scratch: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("outputs"),
            extension: "mp4".into(),
            keep_failed_scratch: true,
        }
    }
}
