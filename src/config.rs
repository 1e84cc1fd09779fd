use std::time::Duration;

use log::warn;

const HTTP_TIMEOUT_ENV: &str = "ACM_RESOURCE_HTTP_TIMEOUT_SECS";
const RECORD_ATTEMPTS_ENV: &str = "ACM_RESOURCE_RECORD_ATTEMPTS";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RECORD_ATTEMPTS: u32 = 5;
const RECORD_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Process-level settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Timeout for the response callback PUT.
    pub http_timeout: Duration,
    /// How many times to describe a fresh certificate while ACM has not yet
    /// published its validation record.
    pub record_attempts: u32,
    pub record_retry_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            record_attempts: DEFAULT_RECORD_ATTEMPTS,
            record_retry_delay: RECORD_RETRY_DELAY,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            http_timeout: Duration::from_secs(positive_from_env(
                HTTP_TIMEOUT_ENV,
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
            record_attempts: positive_from_env(RECORD_ATTEMPTS_ENV, DEFAULT_RECORD_ATTEMPTS as u64)
                .try_into()
                .unwrap_or(DEFAULT_RECORD_ATTEMPTS),
            record_retry_delay: RECORD_RETRY_DELAY,
        }
    }
}

fn positive_from_env(key: &str, default: u64) -> u64 {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            warn!("[config] invalid value {raw:?} for {key}; using default {default}");
            default
        }
        Ok(value) => value,
    }
}
