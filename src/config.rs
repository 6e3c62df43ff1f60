//! Client configuration.
//!
//! Resolution order: defaults, then an optional JSON file, then
//! `NETPROFILER_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};
use crate::metadata::store::default_cache_dir;

pub const ENV_POLL_INTERVAL: &str = "NETPROFILER_POLL_INTERVAL_SECS";
pub const ENV_POLL_TIMEOUT: &str = "NETPROFILER_POLL_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT: &str = "NETPROFILER_REQUEST_TIMEOUT_SECS";
pub const ENV_CACHE_DIR: &str = "NETPROFILER_CACHE_DIR";

fn default_poll_interval() -> f64 {
    1.0
}

fn default_poll_timeout() -> f64 {
    600.0
}

fn default_request_timeout() -> f64 {
    60.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Seconds between report status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Seconds before a synchronous run stops waiting.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: f64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: f64,

    /// Where the column and area caches live. Defaults to the user data dir.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
            request_timeout_secs: default_request_timeout(),
            cache_dir: None,
        }
    }
}

impl ProfilerConfig {
    pub fn parse_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_json(&content)
    }

    /// Defaults, or `path` when given, with environment overrides applied.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_json_file(p)?,
            None => Self::default(),
        };
        base.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |name: &str| -> Result<Option<f64>> {
            match lookup(name) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| ProfilerError::InvalidArgument(format!("{}={:?} is not a number", name, raw))),
            }
        };

        if let Some(v) = secs(ENV_POLL_INTERVAL)? {
            self.poll_interval_secs = v;
        }
        if let Some(v) = secs(ENV_POLL_TIMEOUT)? {
            self.poll_timeout_secs = v;
        }
        if let Some(v) = secs(ENV_REQUEST_TIMEOUT)? {
            self.request_timeout_secs = v;
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|d| !d.is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("poll_interval_secs", self.poll_interval_secs),
            ("poll_timeout_secs", self.poll_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ProfilerError::InvalidArgument(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.poll_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }
}
