//! TOML Configuration File Support
//!
//! Configuration for the streaming client, loaded from
//! `~/.config/tapline/stream.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. Environment variables
//! 2. TOML configuration file
//! 3. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/tapline/stream.toml` (typically `~/.config/tapline/stream.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:8888"
//! connect_timeout_ms = 10000
//! research_path = "/api/agent/research/stream"
//!
//! [stream]
//! max_frame_bytes = 10485760
//! simple_analysis_end_of_body = "complete"
//! staged_research_end_of_body = "fail"
//! max_concurrent_sessions = 16
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{ProtocolVariant, MAX_FRAME_SIZE};
use crate::streaming::{EndOfBodyPolicy, SessionOptions};

/// Default backend address
pub const DEFAULT_BASE_URL: &str = "http://localhost:8888";

/// Default path of the staged research endpoint
pub const DEFAULT_RESEARCH_PATH: &str = "/api/agent/research/stream";

/// Default bound on concurrently registered sessions
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 16;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Backend base address
    pub base_url: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Path of the staged research endpoint
    pub research_path: Option<String>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Largest frame the decoder will buffer, in bytes
    pub max_frame_bytes: Option<usize>,

    /// What end-of-body without a terminal event means for analysis streams
    pub simple_analysis_end_of_body: Option<EndOfBodyPolicy>,

    /// What end-of-body without a terminal event means for research streams
    pub staged_research_end_of_body: Option<EndOfBodyPolicy>,

    /// Maximum sessions a registry accepts at once
    pub max_concurrent_sessions: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaplineToml {
    /// Backend configuration section
    pub backend: BackendToml,

    /// Stream configuration section
    pub stream: StreamToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Configuration of the streaming client
///
/// Use [`load_config`] to load it with proper priority handling.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Backend base address
    pub base_url: String,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Largest frame the decoder will buffer, in bytes
    pub max_frame_bytes: usize,

    /// End-of-body policy for [`ProtocolVariant::SimpleAnalysis`]
    pub simple_analysis_end_of_body: EndOfBodyPolicy,

    /// End-of-body policy for [`ProtocolVariant::StagedResearch`]
    pub staged_research_end_of_body: EndOfBodyPolicy,

    /// Path of the staged research endpoint
    pub research_path: String,

    /// Maximum sessions a registry accepts at once
    pub max_concurrent_sessions: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            max_frame_bytes: MAX_FRAME_SIZE,
            simple_analysis_end_of_body: EndOfBodyPolicy::Complete,
            staged_research_end_of_body: EndOfBodyPolicy::Fail,
            research_path: DEFAULT_RESEARCH_PATH.to_string(),
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl StreamConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// End-of-body policy for a variant
    #[must_use]
    pub fn end_of_body(&self, variant: ProtocolVariant) -> EndOfBodyPolicy {
        match variant {
            ProtocolVariant::SimpleAnalysis => self.simple_analysis_end_of_body,
            ProtocolVariant::StagedResearch => self.staged_research_end_of_body,
        }
    }

    /// Session options for a variant
    #[must_use]
    pub fn session_options(&self, variant: ProtocolVariant) -> SessionOptions {
        SessionOptions {
            max_frame_bytes: self.max_frame_bytes,
            end_of_body: self.end_of_body(variant),
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "base_url must not be empty".to_string(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_frame_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_sessions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/tapline/stream.toml` or
/// `~/.config/tapline/stream.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tapline").join("stream.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if a
/// value is out of range. A missing config file is not an error (defaults
/// are used).
pub fn load_config() -> Result<StreamConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<StreamConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment values through `env`
fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<StreamConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = StreamConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: TaplineToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env)?;

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut StreamConfig, toml: &TaplineToml) {
    // Backend settings
    if let Some(ref url) = toml.backend.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(timeout) = toml.backend.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(timeout);
    }
    if let Some(ref path) = toml.backend.research_path {
        config.research_path.clone_from(path);
    }

    // Stream settings
    if let Some(max) = toml.stream.max_frame_bytes {
        config.max_frame_bytes = max;
    }
    if let Some(policy) = toml.stream.simple_analysis_end_of_body {
        config.simple_analysis_end_of_body = policy;
    }
    if let Some(policy) = toml.stream.staged_research_end_of_body {
        config.staged_research_end_of_body = policy;
    }
    if let Some(max) = toml.stream.max_concurrent_sessions {
        config.max_concurrent_sessions = max;
    }
}

/// Parse one environment value, naming the variable on failure
fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key}: cannot parse {value:?}")))
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut StreamConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("TAPLINE_BASE_URL") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("TAPLINE_CONNECT_TIMEOUT_MS") {
        let ms: u64 = parse_env("TAPLINE_CONNECT_TIMEOUT_MS", &timeout)?;
        config.connect_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(max) = env("TAPLINE_MAX_FRAME_BYTES") {
        config.max_frame_bytes = parse_env("TAPLINE_MAX_FRAME_BYTES", &max)?;
        config.source = ConfigSource::Env;
    }
    if let Some(policy) = env("TAPLINE_ANALYSIS_END_OF_BODY") {
        config.simple_analysis_end_of_body = parse_env("TAPLINE_ANALYSIS_END_OF_BODY", &policy)?;
        config.source = ConfigSource::Env;
    }
    if let Some(policy) = env("TAPLINE_RESEARCH_END_OF_BODY") {
        config.staged_research_end_of_body = parse_env("TAPLINE_RESEARCH_END_OF_BODY", &policy)?;
        config.source = ConfigSource::Env;
    }
    Ok(())
}
