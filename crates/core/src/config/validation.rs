//! Checks run on `AppConfig` once every layer has been merged.

use crate::config::AppConfig;
use thiserror::Error;

const MAX_BODY_LIMIT: usize = 50 * 1024 * 1024;
const TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=300_000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid { field: field.to_string(), reason: reason.into() }
    }
}

impl AppConfig {
    /// Check the merged configuration.
    ///
    /// # Errors
    ///
    /// `ConfigError::Missing` for an empty manifest, `ConfigError::Invalid`
    /// naming the first offending field otherwise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_generation()?;
        self.validate_routing()?;
        self.validate_network()
    }

    fn validate_generation(&self) -> Result<(), ConfigError> {
        if self.cache_version.trim().is_empty() {
            return Err(ConfigError::invalid("cache_version", "must not be empty"));
        }

        if self.manifest.is_empty() {
            return Err(ConfigError::Missing {
                field: "manifest".into(),
                hint: "Set SHELTER_MANIFEST or list URLs under `manifest` in the config file".into(),
            });
        }
        if let Some(pos) = self.manifest.iter().position(|u| u.trim().is_empty()) {
            return Err(ConfigError::invalid("manifest", format!("entry {pos} is empty")));
        }
        if !self.manifest.iter().any(|u| u == "/") {
            tracing::warn!("manifest does not include '/', navigation fallback will be unavailable");
        }

        Ok(())
    }

    fn validate_routing(&self) -> Result<(), ConfigError> {
        self.origin_url()?;

        if !(self.api_prefix.starts_with('/') && self.api_prefix.ends_with('/')) {
            return Err(ConfigError::invalid("api_prefix", "must start and end with '/'"));
        }
        if !(200..=599).contains(&self.offline_status) {
            return Err(ConfigError::invalid("offline_status", "must be between 200 and 599"));
        }

        Ok(())
    }

    fn validate_network(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_BODY_LIMIT).contains(&self.max_bytes) {
            return Err(ConfigError::invalid("max_bytes", "must be between 1 byte and 50MB"));
        }
        if !TIMEOUT_RANGE_MS.contains(&self.timeout_ms) {
            return Err(ConfigError::invalid("timeout_ms", "must be between 100ms and 5 minutes"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("user_agent", "must not be empty"));
        }

        Ok(())
    }
}
