//! Redelivery of recorded attempts.
//!
//! [`DeliveryEngine::retry_delivery`] is the caller-initiated path used by the
//! management API. [`RetryScheduler`] is an optional background worker that
//! walks failed delivery chains and retries them along a fixed backoff
//! schedule, through the same path.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;

use crate::config::RetryConfig;
use crate::delivery::DeliveryEngine;
use crate::error::{WebhookError, WebhookResult};
use crate::types::DeliveryAttempt;

impl DeliveryEngine {
    /// Redeliver the event carried by a recorded attempt.
    ///
    /// The new attempt is recorded as `original.attempt + 1` with the same
    /// `event_id`; the original record is left untouched. Paused endpoints
    /// are retried too, a manual retry being an explicit request.
    pub async fn retry_delivery(&self, delivery_id: &str) -> WebhookResult<DeliveryAttempt> {
        let original = self
            .store()
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| WebhookError::delivery_not_found(delivery_id))?;

        let endpoint = self
            .store()
            .get_endpoint(&original.webhook_id)
            .await?
            .ok_or_else(|| WebhookError::endpoint_not_found(&original.webhook_id))?;

        let event = original.event()?;

        let attempt = self
            .attempt_delivery(&endpoint, &event, original.attempt.saturating_add(1))
            .await;
        self.record(&attempt).await;

        tracing::info!(
            delivery_id = %original.id,
            retry_id = %attempt.id,
            webhook_id = %endpoint.id,
            attempt = attempt.attempt,
            status = ?attempt.status,
            "Retried webhook delivery"
        );

        Ok(attempt)
    }
}

/// Background worker retrying failed deliveries on a backoff schedule.
pub struct RetryScheduler {
    engine: Arc<DeliveryEngine>,
    config: RetryConfig,
}

impl RetryScheduler {
    pub fn new(engine: Arc<DeliveryEngine>, config: RetryConfig) -> Self {
        Self { engine, config }
    }

    /// Run until the shutdown signal flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            delays_secs = ?self.config.delays_secs,
            poll_interval_secs = self.config.poll_interval_secs,
            "Starting webhook retry scheduler"
        );

        loop {
            let retried = self.process_due(OffsetDateTime::now_utc()).await;
            if retried > 0 {
                tracing::info!(count = retried, "Retried failed webhook deliveries");
            }

            tokio::select! {
                biased;

                result = shutdown.changed() => {
                    match result {
                        Ok(()) if *shutdown.borrow() => {
                            tracing::info!("Webhook retry scheduler shutting down");
                            break;
                        }
                        Ok(()) => {}
                        Err(_) => {
                            tracing::info!("Webhook retry scheduler shutdown channel closed");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
    }

    /// Retry every failed chain whose backoff has elapsed at `now`.
    /// Returns the number of retries performed.
    pub async fn process_due(&self, now: OffsetDateTime) -> usize {
        let candidates = match self.engine.store().retry_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load retry candidates");
                return 0;
            }
        };

        let mut retried = 0;
        for candidate in candidates {
            if self.engine.is_shut_down() {
                break;
            }

            // Chains longer than the schedule are exhausted
            let Some(delay) = self.config.delay_after(candidate.attempt) else {
                continue;
            };
            if !is_due(candidate.created_at, delay, now) {
                continue;
            }

            match self.engine.store().get_endpoint(&candidate.webhook_id).await {
                Ok(Some(endpoint)) if endpoint.is_active() => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!(webhook_id = %candidate.webhook_id, error = %e, "Failed to load webhook endpoint");
                    continue;
                }
            }

            match self.engine.retry_delivery(&candidate.id).await {
                Ok(_) => retried += 1,
                Err(e) => {
                    tracing::warn!(delivery_id = %candidate.id, error = %e, "Automatic webhook retry failed");
                }
            }
        }

        retried
    }
}

/// `created_at + delay <= now`. A due time past the representable range is
/// never reached.
fn is_due(created_at: OffsetDateTime, delay: std::time::Duration, now: OffsetDateTime) -> bool {
    time::Duration::try_from(delay)
        .ok()
        .and_then(|delay| created_at.checked_add(delay))
        .is_some_and(|due| due <= now)
}
