//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via FLARE_CONFIG)
//! 3. Environment variables

use flare_protocol::{MaskPolicy, VideoInfo, MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Wire protocol limits and policies.
    pub protocol: ProtocolConfig,
    /// Video reported to OPEN_VIDEO requests. Absent means no video.
    pub video: Option<VideoConfig>,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("FLARE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.protocol.apply_env_overrides();
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.protocol.validate()
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Deadline for receiving the upgrade request, in seconds.
    pub handshake_timeout_secs: u64,
    /// Deadline for each read once the connection is open, in seconds.
    pub read_timeout_secs: u64,
    /// Deadline for each write, in seconds.
    pub write_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], flare_protocol::DEFAULT_PORT)),
            max_connections: 1000,
            handshake_timeout_secs: 10,
            read_timeout_secs: 300,
            write_timeout_secs: 30,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("FLARE_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(max) = std::env::var("FLARE_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }

        if let Ok(timeout) = std::env::var("FLARE_HANDSHAKE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.handshake_timeout_secs = secs;
            }
        }

        if let Ok(timeout) = std::env::var("FLARE_READ_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.read_timeout_secs = secs;
            }
        }

        if let Ok(timeout) = std::env::var("FLARE_WRITE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.write_timeout_secs = secs;
            }
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Mask key handling for inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPolicyConfig {
    /// Read a mask key on every frame.
    #[default]
    Always,
    /// Read a mask key only when the MASK bit is set.
    FromHeader,
}

impl From<MaskPolicyConfig> for MaskPolicy {
    fn from(policy: MaskPolicyConfig) -> Self {
        match policy {
            MaskPolicyConfig::Always => MaskPolicy::Always,
            MaskPolicyConfig::FromHeader => MaskPolicy::FromHeader,
        }
    }
}

/// Wire protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Largest accepted frame payload in bytes.
    pub max_payload_bytes: u64,
    /// Mask key handling for inbound frames.
    pub mask_policy: MaskPolicyConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: MAX_PAYLOAD_SIZE as u64,
            mask_policy: MaskPolicyConfig::default(),
        }
    }
}

impl ProtocolConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("FLARE_MAX_PAYLOAD") {
            if let Ok(n) = max.parse() {
                self.max_payload_bytes = n;
            }
        }

        if let Ok(policy) = std::env::var("FLARE_MASK_POLICY") {
            self.mask_policy = match policy.to_lowercase().as_str() {
                "from_header" | "fromheader" => MaskPolicyConfig::FromHeader,
                _ => MaskPolicyConfig::Always,
            };
        }
    }

    /// Validates payload limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "protocol.max_payload_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_payload_bytes > u32::MAX as u64 {
            return Err(ConfigError::ValidationError(format!(
                "protocol.max_payload_bytes must not exceed {}",
                u32::MAX
            )));
        }
        Ok(())
    }

    /// Returns the payload limit, clamped to the 32-bit size domain.
    pub fn max_payload(&self) -> u32 {
        self.max_payload_bytes.min(u32::MAX as u64) as u32
    }
}

/// Static video metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    /// Duration in seconds.
    pub duration: f64,
    pub frame_count: i32,
}

impl From<VideoConfig> for VideoInfo {
    fn from(video: VideoConfig) -> Self {
        VideoInfo {
            width: video.width,
            height: video.height,
            fps: video.fps,
            duration: video.duration,
            frame_count: video.frame_count,
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
