use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::{DEFAULT_MAX_BATCH_AGE_MS, DEFAULT_MAX_BATCH_SIZE, default_settings_path};

pub const ENV_MAX_BATCH_SIZE: &str = "FERRY_MAX_BATCH_SIZE";
pub const ENV_MAX_BATCH_AGE_MS: &str = "FERRY_MAX_BATCH_AGE_MS";
pub const ENV_MAX_IN_FLIGHT: &str = "FERRY_MAX_IN_FLIGHT";
pub const ENV_FLUSH_ON_STOP: &str = "FERRY_FLUSH_ON_STOP";
pub const ENV_WORKERS: &str = "FERRY_WORKERS";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Serializable batching settings, as read from disk and the environment.
///
/// Field semantics mirror the stage options: a missing or zero batch size
/// means no size limit, a zero or negative age disables age-based closing and
/// a missing in-flight limit means unbounded concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    #[serde(deserialize_with = "limit")]
    pub max_batch_size: Option<usize>,
    pub max_batch_age_ms: i64,
    #[serde(deserialize_with = "limit")]
    pub max_in_flight: Option<usize>,
    pub flush_on_stop: bool,
    /// Threads in the dispatch worker pool.
    pub workers: usize,
    /// Bound on queued dispatch units; `None` queues without limit.
    pub queue_capacity: Option<usize>,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            max_batch_size: Some(DEFAULT_MAX_BATCH_SIZE),
            max_batch_age_ms: DEFAULT_MAX_BATCH_AGE_MS,
            max_in_flight: None,
            flush_on_stop: true,
            workers: 2,
            queue_capacity: None,
        }
    }
}

impl StageSettings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` (or the default location) and apply `FERRY_*`
    /// environment overrides on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self, SettingsError> {
        let settings = match path {
            Some(p) => Self::load(p)?,
            None => Self::load(&default_settings_path())?,
        };
        settings.with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self, SettingsError> {
        if let Some(raw) = env_value(ENV_MAX_BATCH_SIZE) {
            self.max_batch_size = parse_limit(ENV_MAX_BATCH_SIZE, &raw)?;
        }

        if let Some(raw) = env_value(ENV_MAX_BATCH_AGE_MS) {
            self.max_batch_age_ms = raw
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_MAX_BATCH_AGE_MS, &raw))?;
        }

        if let Some(raw) = env_value(ENV_MAX_IN_FLIGHT) {
            self.max_in_flight = parse_limit(ENV_MAX_IN_FLIGHT, &raw)?;
        }

        if let Some(raw) = env_value(ENV_FLUSH_ON_STOP) {
            self.flush_on_stop = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(invalid(ENV_FLUSH_ON_STOP, &raw)),
            };
        }

        if let Some(raw) = env_value(ENV_WORKERS) {
            self.workers = raw
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_WORKERS, &raw))?;
        }

        Ok(self)
    }

    /// Batch age as a duration; zero when age-based closing is disabled.
    pub fn max_batch_age(&self) -> Duration {
        u64::try_from(self.max_batch_age_ms)
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO)
    }
}

fn env_value(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn invalid(var: &'static str, value: &str) -> SettingsError {
    SettingsError::InvalidEnv {
        var,
        value: value.to_string(),
    }
}

/// A `0` limit in a settings file means "no limit", as it does in the env.
fn limit<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<usize>::deserialize(deserializer)?.filter(|&n| n > 0))
}

/// `none` and `0` both mean "no limit".
fn parse_limit(var: &'static str, raw: &str) -> Result<Option<usize>, SettingsError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    match trimmed.parse::<usize>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(invalid(var, raw)),
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
