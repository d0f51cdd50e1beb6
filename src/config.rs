use crate::workflow::progress::DriverTiming;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a whole number of milliseconds, got {value:?}")]
    InvalidMillis { key: &'static str, value: String },
    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base: String,
    pub download_dir: PathBuf,
    pub driver_timing: DriverTiming,
    pub toast_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            driver_timing: DriverTiming::default(),
            toast_ttl: Duration::from_millis(4000),
        }
    }
}

impl AppConfig {
    /// Reads `MESHSTEP_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_base = match lookup("MESHSTEP_API_BASE") {
            Some(raw) => {
                let trimmed = raw.trim().trim_end_matches('/').to_string();
                if trimmed.is_empty() {
                    return Err(ConfigError::Empty {
                        key: "MESHSTEP_API_BASE",
                    });
                }
                trimmed
            }
            None => defaults.api_base,
        };

        let download_dir = lookup("MESHSTEP_DOWNLOAD_DIR")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.download_dir);

        let millis = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidMillis { key, value: raw }),
                None => Ok(default),
            }
        };

        Ok(Self {
            api_base,
            download_dir,
            driver_timing: DriverTiming {
                cadence: millis("MESHSTEP_PHASE_CADENCE_MS", defaults.driver_timing.cadence)?,
                settle: millis("MESHSTEP_SETTLE_DELAY_MS", defaults.driver_timing.settle)?,
            },
            toast_ttl: millis("MESHSTEP_TOAST_TTL_MS", defaults.toast_ttl)?,
        })
    }
}
