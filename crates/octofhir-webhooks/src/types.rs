use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Placeholder shown instead of an endpoint secret in read responses.
pub const MASKED_SECRET: &str = "***";

/// Event type of the synthetic event sent by the endpoint test action.
pub const TEST_EVENT_TYPE: &str = "webhook.test";

/// Endpoint status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Active,
    Paused,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

/// A registered delivery target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: String,
    pub url: String,

    /// HMAC key shared with the receiver
    pub secret: String,

    /// Subscription patterns (`Patient.create`, `*.delete`, `Observation.*`)
    pub events: Vec<String>,

    pub tenant_id: String,
    pub client_id: String,
    pub status: EndpointStatus,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WebhookEndpoint {
    pub fn is_active(&self) -> bool {
        self.status == EndpointStatus::Active
    }

    /// Copy of the endpoint with the secret replaced by [`MASKED_SECRET`].
    pub fn masked(&self) -> Self {
        Self {
            secret: MASKED_SECRET.to_string(),
            ..self.clone()
        }
    }
}

/// An occurrence to fan out to matching endpoints.
///
/// Events are never stored on their own; the serialized form lives inside
/// every [`DeliveryAttempt`] produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,

    /// Dotted event type, e.g. `Patient.create`
    #[serde(rename = "type")]
    pub event_type: String,

    pub resource_type: String,
    pub resource_id: String,
    pub tenant_id: String,
    pub payload: serde_json::Value,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl WebhookEvent {
    pub fn new(
        event_type: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        tenant_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            tenant_id: tenant_id.into(),
            payload,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Synthetic `webhook.test` event addressed to one endpoint.
    pub fn test(endpoint: &WebhookEndpoint) -> Self {
        Self::new(
            TEST_EVENT_TYPE,
            "WebhookEndpoint",
            endpoint.id.clone(),
            endpoint.tenant_id.clone(),
            serde_json::json!({
                "message": "This is a test event",
                "webhook_id": endpoint.id,
            }),
        )
    }
}

/// Delivery attempt status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
}

/// One try at delivering one event to one endpoint.
///
/// Records are write-once: retries produce new records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: String,
    pub webhook_id: String,
    pub event_type: String,
    pub event_id: String,

    /// Exact JSON body that was signed and sent
    pub payload: String,

    /// Lower-case hex HMAC-SHA256 of `payload`
    pub signature: String,

    /// HTTP status, 0 when no response was received
    pub status_code: u16,

    /// First bytes of the response body
    pub response_body: String,

    pub duration_ms: u64,

    /// 1-based attempt counter
    pub attempt: u32,

    pub status: DeliveryStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl DeliveryAttempt {
    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Success
    }

    /// Reconstructs the event that this attempt carried.
    pub fn event(&self) -> Result<WebhookEvent, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Per-endpoint outcome of a fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub endpoint_id: String,
    pub delivery_id: String,
    pub success: bool,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&DeliveryAttempt> for DeliveryResult {
    fn from(attempt: &DeliveryAttempt) -> Self {
        Self {
            endpoint_id: attempt.webhook_id.clone(),
            delivery_id: attempt.id.clone(),
            success: attempt.is_success(),
            status_code: attempt.status_code,
            error: attempt.error.clone(),
        }
    }
}

/// Request to register an endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterEndpoint {
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Partial update; absent fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEndpoint {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<EndpointStatus>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// One page of an insertion-ordered listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: usize, limit: usize, offset: usize) -> Self {
        Self {
            data,
            total,
            limit,
            offset,
            has_more: offset.saturating_add(limit) < total,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
            has_more: self.has_more,
        }
    }
}
