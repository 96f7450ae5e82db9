//! Webhook delivery configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery engine settings (`[webhooks]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Whole-request timeout for one delivery
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound of concurrent deliveries during one fan-out
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,
    /// Bytes of the receiver's response body kept in the attempt log
    #[serde(default = "default_max_response_body_bytes")]
    pub max_response_body_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_max_concurrent_deliveries() -> usize {
    8
}
fn default_max_response_body_bytes() -> usize {
    1024
}
fn default_user_agent() -> String {
    concat!("octofhir-webhooks/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            max_response_body_bytes: default_max_response_body_bytes(),
            user_agent: default_user_agent(),
            retry: RetryConfig::default(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("webhooks.timeout_secs must be > 0".into());
        }
        if self.connect_timeout_secs == 0 {
            return Err("webhooks.connect_timeout_secs must be > 0".into());
        }
        if self.max_concurrent_deliveries == 0 {
            return Err("webhooks.max_concurrent_deliveries must be > 0".into());
        }
        self.retry.validate()
    }
}

/// Automatic retry of failed deliveries (`[webhooks.retry]` section).
///
/// Disabled by default: retries are otherwise caller-initiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Wait before retrying attempt `n` is `delays_secs[n - 1]`; chains
    /// longer than the schedule are not retried further.
    #[serde(default = "default_delays_secs")]
    pub delays_secs: Vec<u64>,
}

fn default_poll_interval_secs() -> u64 {
    30
}
fn default_delays_secs() -> Vec<u64> {
    vec![60, 300, 1800]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: default_poll_interval_secs(),
            delays_secs: default_delays_secs(),
        }
    }
}

impl RetryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Backoff before retrying an attempt with the given 1-based counter.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        let index = usize::try_from(attempt).ok()?.checked_sub(1)?;
        self.delays_secs
            .get(index)
            .map(|secs| Duration::from_secs(*secs))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.enabled {
            if self.poll_interval_secs == 0 {
                return Err("webhooks.retry.poll_interval_secs must be > 0".into());
            }
            if self.delays_secs.is_empty() {
                return Err("webhooks.retry.delays_secs must not be empty when retry is enabled".into());
            }
        }
        Ok(())
    }
}
