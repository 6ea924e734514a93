//! TOML configuration for the client.
//!
//! Every setting is optional: a missing file, an empty file, and a partial
//! file all resolve to usable defaults, so an embedder can ship with no
//! config at all. Unknown keys still parse, but each one is logged so a
//! typo in a key name surfaces somewhere instead of silently meaning
//! "default".
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The size gate tripped before the file was read.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Client configuration.
///
/// Each field carries a serde default, so a config file may name any
/// subset of the keys. `Debug` is hand-written to keep `api_token` out of
/// logs and error chains.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the lead-management REST backend.
    pub base_url: String,

    /// Bearer token attached to every request. The authentication gate
    /// itself is external; the client only forwards the credential.
    pub api_token: Option<String>,

    /// Delta poll interval in seconds while a scope is active.
    pub poll_interval_secs: u64,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/".to_string(),
            api_token: None,
            poll_interval_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

// The token must never appear in rendered output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Upper bound on config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: &'static [&'static str] = &[
        "base_url",
        "api_token",
        "poll_interval_secs",
        "request_timeout_secs",
    ];

    /// Read configuration from `path`.
    ///
    /// Missing and empty files are not errors; both yield the defaults.
    /// Oversized files are rejected before any bytes are read, and
    /// malformed TOML surfaces with the parser's position info.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Size gate on metadata, before any bytes are read
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // The file can vanish between the metadata call and the read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // A raw-table pass surfaces unknown keys; the typed parse below
        // simply ignores them
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Ignoring unknown config key");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), base_url = %config.base_url, "Loaded configuration");
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
