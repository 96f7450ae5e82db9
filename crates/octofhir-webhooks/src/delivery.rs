//! Signed HTTP delivery of webhook events.
//!
//! Every attempt, whatever its outcome, is written to the store before it is
//! returned. Transport failures and non-2xx responses are recorded as
//! `failed` attempts and never surface as errors, so one bad endpoint cannot
//! abort a fan-out.

use std::sync::Arc;
use std::time::Instant;

use futures_util::{StreamExt, stream};
use reqwest::{Client, Response, header};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;

use crate::config::WebhookConfig;
use crate::error::{WebhookError, WebhookResult};
use crate::matcher::endpoint_matches;
use crate::signer;
use crate::storage::WebhookStore;
use crate::types::{DeliveryAttempt, DeliveryResult, DeliveryStatus, WebhookEndpoint, WebhookEvent};

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const WEBHOOK_ID_HEADER: &str = "X-Webhook-ID";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";

/// Error recorded when shutdown aborts an in-flight request.
pub const CANCELLED_ERROR: &str = "delivery cancelled";

/// What came back from the receiver, if anything.
enum Exchange {
    Response { status: u16, body: String },
    Transport(String),
}

/// Delivery engine: signs payloads, POSTs them and records attempts.
pub struct DeliveryEngine {
    store: Arc<dyn WebhookStore>,
    client: Client,
    config: WebhookConfig,
    cancel: CancellationToken,
}

impl DeliveryEngine {
    /// Create an engine with an HTTP client built from `config`.
    pub fn new(store: Arc<dyn WebhookStore>, config: WebhookConfig) -> WebhookResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| WebhookError::Http(e.to_string()))?;
        Ok(Self::with_client(store, client, config))
    }

    /// Create with a custom client.
    pub fn with_client(store: Arc<dyn WebhookStore>, client: Client, config: WebhookConfig) -> Self {
        Self {
            store,
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn WebhookStore> {
        &self.store
    }

    /// Abort in-flight deliveries; they are recorded as failed.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fan an event out to every active endpoint of its tenant whose
    /// patterns match the event type.
    ///
    /// Deliveries run concurrently up to `max_concurrent_deliveries`;
    /// results come back in endpoint registration order.
    pub async fn deliver(&self, event: &WebhookEvent) -> Vec<DeliveryResult> {
        let endpoints = match self.store.endpoints_for_tenant(&event.tenant_id).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    tenant_id = %event.tenant_id,
                    error = %e,
                    "Failed to load webhook endpoints"
                );
                return Vec::new();
            }
        };

        let matched: Vec<WebhookEndpoint> = endpoints
            .into_iter()
            .filter(|endpoint| endpoint_matches(endpoint, event))
            .collect();

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            endpoints = matched.len(),
            "Dispatching webhook event"
        );

        let concurrency = self.config.max_concurrent_deliveries.max(1);
        let deliveries: Vec<_> = matched
            .iter()
            .map(|endpoint| async move {
                let attempt = self.deliver_to_endpoint(endpoint, event).await;
                DeliveryResult::from(&attempt)
            })
            .collect();
        stream::iter(deliveries)
            .buffered(concurrency)
            .collect()
            .await
    }

    /// Deliver one event to one endpoint as attempt #1 and record it.
    pub async fn deliver_to_endpoint(
        &self,
        endpoint: &WebhookEndpoint,
        event: &WebhookEvent,
    ) -> DeliveryAttempt {
        let attempt = self.attempt_delivery(endpoint, event, 1).await;
        self.record(&attempt).await;
        attempt
    }

    /// Perform one delivery tagged with `attempt_number`, without recording it.
    pub(crate) async fn attempt_delivery(
        &self,
        endpoint: &WebhookEndpoint,
        event: &WebhookEvent,
        attempt_number: u32,
    ) -> DeliveryAttempt {
        let mut attempt = DeliveryAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            webhook_id: endpoint.id.clone(),
            event_type: event.event_type.clone(),
            event_id: event.id.clone(),
            payload: String::new(),
            signature: String::new(),
            status_code: 0,
            response_body: String::new(),
            duration_ms: 0,
            attempt: attempt_number,
            status: DeliveryStatus::Pending,
            error: None,
            created_at: OffsetDateTime::now_utc(),
        };

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                attempt.status = DeliveryStatus::Failed;
                attempt.error = Some(format!("failed to serialize event: {e}"));
                return attempt;
            }
        };
        attempt.signature = signer::sign(payload.as_bytes(), &endpoint.secret);
        attempt.payload = payload;

        let start = Instant::now();
        let exchange = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Exchange::Transport(CANCELLED_ERROR.to_string()),
            exchange = self.post(endpoint, &attempt.payload, &attempt.signature) => exchange,
        };
        attempt.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match exchange {
            Exchange::Response { status, body } => {
                attempt.status_code = status;
                attempt.response_body = body;
                if (200..300).contains(&status) {
                    attempt.status = DeliveryStatus::Success;
                    tracing::debug!(
                        webhook_id = %endpoint.id,
                        event_id = %event.id,
                        status,
                        elapsed_ms = attempt.duration_ms,
                        attempt = attempt.attempt,
                        "Webhook delivery succeeded"
                    );
                } else {
                    attempt.status = DeliveryStatus::Failed;
                    attempt.error = Some(format!("non-2xx response: {status}"));
                    tracing::warn!(
                        webhook_id = %endpoint.id,
                        event_id = %event.id,
                        status,
                        elapsed_ms = attempt.duration_ms,
                        attempt = attempt.attempt,
                        "Webhook delivery rejected by receiver"
                    );
                }
            }
            Exchange::Transport(error) => {
                tracing::warn!(
                    webhook_id = %endpoint.id,
                    event_id = %event.id,
                    error = %error,
                    elapsed_ms = attempt.duration_ms,
                    attempt = attempt.attempt,
                    "Webhook delivery failed with network error"
                );
                attempt.status = DeliveryStatus::Failed;
                attempt.error = Some(error);
            }
        }

        attempt
    }

    async fn post(&self, endpoint: &WebhookEndpoint, payload: &str, signature: &str) -> Exchange {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        let response = self
            .client
            .post(&endpoint.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signer::signature_header(signature))
            .header(WEBHOOK_ID_HEADER, endpoint.id.as_str())
            .header(TIMESTAMP_HEADER, timestamp)
            .body(payload.to_owned())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = read_capped(response, self.config.max_response_body_bytes).await;
                Exchange::Response { status, body }
            }
            Err(e) => Exchange::Transport(e.to_string()),
        }
    }

    /// Persist an attempt. Failures are logged; the attempt is still reported.
    pub(crate) async fn record(&self, attempt: &DeliveryAttempt) {
        if let Err(e) = self.store.save_delivery(attempt).await {
            tracing::error!(
                delivery_id = %attempt.id,
                webhook_id = %attempt.webhook_id,
                error = %e,
                "Failed to record delivery attempt"
            );
        }
    }
}

/// Reads at most `cap` bytes of the body; the rest is never pulled off the wire.
async fn read_capped(mut response: Response, cap: usize) -> String {
    let mut body = Vec::with_capacity(cap.min(1024));
    while body.len() < cap {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (cap - body.len()).min(chunk.len());
                body.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read webhook response body");
                break;
            }
        }
    }
    decode_capped(&body, cap)
}

/// Lossy UTF-8 decode that never yields more than `cap` bytes. Replacement
/// characters take three bytes, so the decoded text is cut again at a char
/// boundary.
fn decode_capped(bytes: &[u8], cap: usize) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.len() > cap {
        let mut end = cap;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
