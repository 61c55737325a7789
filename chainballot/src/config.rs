use crate::*;
use std::env::var;
use std::time::Duration;

pub const MAX_CONCURRENCY_VAR: &str = "CHAINBALLOT_MAX_CONCURRENCY";
pub const TIMEOUT_SECS_VAR: &str = "CHAINBALLOT_TIMEOUT_SECS";

const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Chain parsing settings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ParseConfig {
    /// Entries verified at the same time. Zero behaves as one.
    pub max_concurrency: usize,

    /// Deadline for a whole parse, in seconds. Zero disables it.
    pub timeout_secs: u64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout_secs: 0,
        }
    }
}

impl ParseConfig {
    /// Read settings from `CHAINBALLOT_*` environment variables, using defaults for unset ones
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ParseConfig::default();

        if let Some(val) = lookup(MAX_CONCURRENCY_VAR) {
            config.max_concurrency = val
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} must be an integer, got {:?}", MAX_CONCURRENCY_VAR, val)))?;
        }

        if let Some(val) = lookup(TIMEOUT_SECS_VAR) {
            config.timeout_secs = val
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} must be an integer, got {:?}", TIMEOUT_SECS_VAR, val)))?;
        }

        Ok(config)
    }

    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}
