//! Webhook delivery for OctoFHIR.
//!
//! Registered endpoints subscribe to resource events with dotted patterns
//! (`Patient.create`, `*.delete`, `Observation.*`). When an event fires, every
//! active endpoint of the event's tenant whose patterns match receives an
//! HMAC-SHA256 signed HTTP POST. Each try is recorded as a
//! [`DeliveryAttempt`] that can be inspected and retried.
//!
//! ## Architecture
//!
//! ```text
//! WebhookEvent
//!      ↓
//! DeliveryEngine::deliver ── WebhookStore (tenant endpoints)
//!      ↓
//! matcher (active + tenant + pattern)
//!      ↓
//! signer → HTTP POST (bounded concurrency)
//!      ↓
//! DeliveryAttempt recorded ── retry_delivery / RetryScheduler
//! ```
//!
//! ## Wire contract
//!
//! ```text
//! POST <endpoint.url>
//! Content-Type: application/json
//! X-Webhook-Signature: sha256=<hex hmac of body>
//! X-Webhook-ID: <endpoint id>
//! X-Webhook-Timestamp: <RFC 3339 UTC>
//!
//! <serialized WebhookEvent>
//! ```

pub mod config;
pub mod delivery;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod retry;
pub mod service;
pub mod signer;
pub mod storage;
pub mod types;

pub use config::{RetryConfig, WebhookConfig};
pub use delivery::{DeliveryEngine, SIGNATURE_HEADER, TIMESTAMP_HEADER, WEBHOOK_ID_HEADER};
pub use error::{WebhookError, WebhookResult};
pub use registry::{EndpointRegistry, generate_secret, validate_url};
pub use retry::RetryScheduler;
pub use service::WebhookService;
pub use storage::{InMemoryWebhookStore, WebhookStore};
pub use types::*;
