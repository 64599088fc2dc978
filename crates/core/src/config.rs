//! Configuration: `debscan.toml` parsing and runtime settings.
//!
//! [`DebscanConfig`] holds every section the scanner and its collaborators read.
//!
//! # Precedence
//! 1. CLI flags (highest)
//! 2. Environment variables (`DEBSCAN_UPLOAD_POLL_TIMEOUT_SECS=600`, plus
//!    `DEBRICKED_URI` and `DEBRICKED_TOKEN`)
//! 3. Config file (`debscan.toml`)
//! 4. Defaults
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), debscan_core::error::DebscanError> {
//! use debscan_core::config::DebscanConfig;
//!
//! let config = DebscanConfig::load("debscan.toml").await?;
//! let config = DebscanConfig::parse("[upload]\npoll_timeout_secs = 600")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::DEFAULT_URI;
use crate::discovery::DEFAULT_EXCLUSIONS;
use crate::error::{ConfigError, DebscanError};
use crate::git::MetaField;

/// Config file looked up when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "debscan.toml";

/// Overrides the service base URL.
pub const URI_ENV: &str = "DEBRICKED_URI";

/// Supplies the access token when none is configured.
pub const TOKEN_ENV: &str = "DEBRICKED_TOKEN";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebscanConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub git: GitConfig,
}

impl DebscanConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DebscanError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file means defaults.
    ///
    /// Used for the implicit default path; an explicitly named file should go
    /// through `load` so that a typo is reported.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, DebscanError> {
        let path = path.as_ref();
        let mut config = match Self::from_file(path).await {
            Ok(config) => config,
            Err(DebscanError::Config(ConfigError::FileNotFound { .. })) => {
                debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DebscanError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DebscanError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DebscanError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    pub fn parse(toml_str: &str) -> Result<Self, DebscanError> {
        toml::from_str(toml_str).map_err(|e| {
            DebscanError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Applies environment overrides.
    ///
    /// A non-empty `DEBRICKED_URI` always wins over the file. `DEBRICKED_TOKEN`
    /// is only a fallback for an empty token. Every other field follows
    /// `DEBSCAN_{SECTION}_{FIELD}`.
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "DEBSCAN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DEBSCAN_GENERAL_LOG_FORMAT");

        override_non_empty(&mut self.client.uri, URI_ENV);
        override_string(&mut self.client.access_token, "DEBSCAN_CLIENT_ACCESS_TOKEN");
        if self.client.access_token.trim().is_empty() {
            override_string(&mut self.client.access_token, TOKEN_ENV);
        }
        override_u64(
            &mut self.client.request_timeout_secs,
            "DEBSCAN_CLIENT_REQUEST_TIMEOUT_SECS",
        );

        override_u64(
            &mut self.upload.poll_interval_secs,
            "DEBSCAN_UPLOAD_POLL_INTERVAL_SECS",
        );
        override_u64(
            &mut self.upload.poll_timeout_secs,
            "DEBSCAN_UPLOAD_POLL_TIMEOUT_SECS",
        );

        override_csv(&mut self.scan.exclusions, "DEBSCAN_SCAN_EXCLUSIONS");
        override_parsed_csv(&mut self.git.required, "DEBSCAN_GIT_REQUIRED");
    }

    pub fn validate(&self) -> Result<(), DebscanError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.client.uri.trim().is_empty() {
            return Err(invalid("client.uri", "must not be empty".to_owned()));
        }

        if self.client.request_timeout_secs == 0 {
            return Err(invalid(
                "client.request_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.upload.poll_interval_secs == 0 {
            return Err(invalid(
                "upload.poll_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Config with sensitive values masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.client.access_token.is_empty() {
            config.client.access_token = "***REDACTED***".to_owned();
        }
        config
    }
}

fn invalid(field: &str, reason: String) -> DebscanError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// json, pretty
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Scanning service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub uri: String,
    pub access_token: String,
    /// Per-request timeout; an expired request counts as no response.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_owned(),
            access_token: String::new(),
            request_timeout_secs: 60,
        }
    }
}

/// Result polling budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub poll_interval_secs: u64,
    /// Total polling budget before reporting a soft timeout.
    pub poll_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            poll_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Glob patterns, relative to the scanned directory.
    pub exclusions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Metadata fields that must be known before uploading.
    pub required: Vec<MetaField>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            required: MetaField::DEFAULT_REQUIRED.to_vec(),
        }
    }
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

/// Like [`override_string`], but a blank value counts as unset.
fn override_non_empty(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        let val = val.trim();
        if !val.is_empty() {
            *target = val.to_owned();
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

fn override_parsed_csv<T: FromStr>(target: &mut Vec<T>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        let parsed: Result<Vec<T>, _> = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(T::from_str)
            .collect();
        match parsed {
            Ok(values) => *target = values,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse list from env var, ignoring"
            ),
        }
    }
}
