//! Saga configuration loaded from environment variables.

use std::time::Duration;

use crate::error::SagaError;

/// Delay before an unacknowledged command is considered failed.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Saga configuration.
///
/// Reads from environment variables:
/// - `SAGA_COMMAND_DESTINATION`: address every saga command is sent to (required)
/// - `SAGA_STEP_TIMEOUT_SECS`: per-step acknowledgment timeout (default: `10`)
/// - `SAGA_INBOX_CAPACITY`: runtime inbox capacity (default: `1024`)
/// - `SAGA_MAX_PARALLELISM`: concurrently handled messages (default: `16`)
/// - `SAGA_MAX_REDELIVERIES`: retries of a transiently failing message (default: `3`)
/// - `SAGA_REDELIVERY_DELAY_MS`: delay between retries (default: `500`)
#[derive(Debug, Clone)]
pub struct SagaConfig {
    pub command_destination: Option<String>,
    pub step_timeout: Duration,
    pub inbox_capacity: usize,
    pub max_parallelism: usize,
    pub max_redeliveries: u32,
    pub redelivery_delay: Duration,
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            command_destination: std::env::var("SAGA_COMMAND_DESTINATION")
                .ok()
                .filter(|d| !d.trim().is_empty()),
            step_timeout: env_parse("SAGA_STEP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.step_timeout),
            inbox_capacity: env_parse("SAGA_INBOX_CAPACITY").unwrap_or(defaults.inbox_capacity),
            max_parallelism: env_parse("SAGA_MAX_PARALLELISM").unwrap_or(defaults.max_parallelism),
            max_redeliveries: env_parse("SAGA_MAX_REDELIVERIES")
                .unwrap_or(defaults.max_redeliveries),
            redelivery_delay: env_parse("SAGA_REDELIVERY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.redelivery_delay),
        }
    }

    /// Sets the command destination.
    pub fn with_command_destination(mut self, destination: impl Into<String>) -> Self {
        self.command_destination = Some(destination.into());
        self
    }

    /// Sets the per-step timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Returns the command destination, or a configuration error if unset.
    pub fn command_destination(&self) -> Result<&str, SagaError> {
        self.command_destination
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                SagaError::Configuration(
                    "command saga requires a command destination (SAGA_COMMAND_DESTINATION)"
                        .to_string(),
                )
            })
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            command_destination: None,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            inbox_capacity: 1024,
            max_parallelism: 16,
            max_redeliveries: 3,
            redelivery_delay: Duration::from_millis(500),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
