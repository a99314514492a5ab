//! Runtime configuration.

use std::time::Duration;

use thiserror::Error;

pub const ENV_VIEW_STALENESS_SECS: &str = "PRINTFLEET_VIEW_STALENESS_SECS";
pub const ENV_FANOUT_CONCURRENCY: &str = "PRINTFLEET_FANOUT_CONCURRENCY";
pub const ENV_DEFAULT_LOCATION: &str = "PRINTFLEET_DEFAULT_LOCATION";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Fleet service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    /// Upper bound on how old a cached view may be, even without notifications.
    pub view_staleness: Duration,
    /// Worker pool size for maintenance fan-out.
    pub fanout_concurrency: usize,
    /// Name of the location auto-created with each department.
    pub default_location_name: String,
    /// Postgres connection string (Postgres backend only).
    pub database_url: Option<String>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            view_staleness: Duration::from_secs(300),
            fanout_concurrency: 4,
            default_location_name: "Main".to_string(),
            database_url: None,
        }
    }
}

impl FleetConfig {
    pub fn with_view_staleness(mut self, staleness: Duration) -> Self {
        self.view_staleness = staleness;
        self
    }

    pub fn with_fanout_concurrency(mut self, n: usize) -> Self {
        self.fanout_concurrency = n;
        self
    }

    pub fn with_default_location_name(mut self, name: impl Into<String>) -> Self {
        self.default_location_name = name.into();
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Load from the process environment; unset keys keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_VIEW_STALENESS_SECS) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid(ENV_VIEW_STALENESS_SECS, &raw))?;
            config.view_staleness = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(ENV_FANOUT_CONCURRENCY) {
            let n = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid(ENV_FANOUT_CONCURRENCY, &raw))?;
            config.fanout_concurrency = n;
        }

        if let Some(raw) = lookup(ENV_DEFAULT_LOCATION) {
            let name = raw.trim();
            if name.is_empty() {
                return Err(invalid(ENV_DEFAULT_LOCATION, &raw));
            }
            config.default_location_name = name.to_string();
        }

        config.database_url = lookup(ENV_DATABASE_URL).filter(|url| !url.trim().is_empty());

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}
