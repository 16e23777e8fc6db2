//! Master configuration via `docmaster.toml`
//!
//! A master is configured by a small TOML document. Values can be overridden
//! from the environment, which is how deployments usually set the scheme.
//!
//! | Key | Env override | Default |
//! |-----|--------------|---------|
//! | `scheme` | `DOCMASTER_SCHEME` | required |
//! | `max_retries` | `DOCMASTER_MAX_RETRIES` | 10 |
//! | `retry_base_delay_ms` | | 0 |
//! | `retry_max_delay_ms` | | 100 |
//! | `operation_timeout_ms` | `DOCMASTER_OPERATION_TIMEOUT_MS` | none |

use crate::retry::RetryConfig;
use docmaster_core::{CallContext, IdCodec, MasterError, MasterResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name used by [`MasterConfig::write_default_if_missing`]
pub const CONFIG_FILE_NAME: &str = "docmaster.toml";

/// Environment variable overriding `scheme`
pub const ENV_SCHEME: &str = "DOCMASTER_SCHEME";
/// Environment variable overriding `max_retries`
pub const ENV_MAX_RETRIES: &str = "DOCMASTER_MAX_RETRIES";
/// Environment variable overriding `operation_timeout_ms`
pub const ENV_OPERATION_TIMEOUT_MS: &str = "DOCMASTER_OPERATION_TIMEOUT_MS";

/// Configuration of one document master
///
/// # Example
///
/// ```toml
/// scheme = "DbCfg"
/// max_retries = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Identifier scheme owned by this master
    pub scheme: String,
    /// Retries after a write conflict before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Base delay of the exponential backoff between retries
    #[serde(default)]
    pub retry_base_delay_ms: u64,
    /// Cap on the backoff delay
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Deadline applied to calls made without an explicit context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u64>,
}

fn default_max_retries() -> usize {
    10
}

fn default_retry_max_delay_ms() -> u64 {
    100
}

impl MasterConfig {
    /// Config for `scheme` with every other value defaulted
    pub fn new(scheme: impl Into<String>) -> Self {
        MasterConfig {
            scheme: scheme.into(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: 0,
            retry_max_delay_ms: default_retry_max_delay_ms(),
            operation_timeout_ms: None,
        }
    }

    /// Set `max_retries`
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set `operation_timeout_ms`
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Check values that serde cannot
    ///
    /// # Errors
    ///
    /// `Config` if the scheme is unusable or the retry delays are inverted.
    pub fn validate(&self) -> MasterResult<()> {
        IdCodec::new(self.scheme.as_str())?;
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(MasterError::config(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }
        Ok(())
    }

    /// Retry settings derived from this config
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(self.max_retries)
            .with_base_delay_ms(self.retry_base_delay_ms)
            .with_max_delay_ms(self.retry_max_delay_ms)
    }

    /// Context used by calls that do not supply one
    pub fn default_context(&self) -> CallContext {
        match self.operation_timeout_ms {
            Some(ms) => CallContext::background().with_timeout(Duration::from_millis(ms)),
            None => CallContext::background(),
        }
    }

    /// Parse from TOML text and validate
    ///
    /// # Errors
    ///
    /// `Config` if the text does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> MasterResult<Self> {
        let config: MasterConfig = toml::from_str(content)
            .map_err(|e| MasterError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    ///
    /// # Errors
    ///
    /// `Config` if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> MasterResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MasterError::config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            MasterError::Config { reason } => {
                MasterError::config(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    /// Apply `DOCMASTER_*` overrides from the process environment
    ///
    /// # Errors
    ///
    /// `Config` if an override is not a valid number or the result fails
    /// validation.
    pub fn with_env_overrides(self) -> MasterResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    ///
    /// # Errors
    ///
    /// Same as [`MasterConfig::with_env_overrides`].
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> MasterResult<Self> {
        if let Some(scheme) = lookup(ENV_SCHEME) {
            self.scheme = scheme;
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = raw.trim().parse().map_err(|_| {
                MasterError::config(format!("{} must be a non-negative integer, got '{}'", ENV_MAX_RETRIES, raw))
            })?;
        }
        if let Some(raw) = lookup(ENV_OPERATION_TIMEOUT_MS) {
            self.operation_timeout_ms = Some(raw.trim().parse().map_err(|_| {
                MasterError::config(format!(
                    "{} must be a non-negative integer, got '{}'",
                    ENV_OPERATION_TIMEOUT_MS, raw
                ))
            })?);
        }
        self.validate()?;
        Ok(self)
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# Document master configuration
#
# Identifier scheme owned by this master. Identifiers from any other scheme
# are rejected. Can be overridden with DOCMASTER_SCHEME.
scheme = "DbDoc"

# Retries after a write conflict (default: 10)
max_retries = 10

# Exponential backoff between retries, in milliseconds
retry_base_delay_ms = 0
retry_max_delay_ms = 100

# Deadline for calls made without an explicit context (default: none)
# operation_timeout_ms = 5000
"#
    }

    /// Write the default config file if it does not already exist
    ///
    /// # Errors
    ///
    /// `Config` if the file cannot be written.
    pub fn write_default_if_missing(path: &Path) -> MasterResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                MasterError::config(format!(
                    "failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
