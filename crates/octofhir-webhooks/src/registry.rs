//! Endpoint registration and lifecycle.

use std::sync::Arc;

use time::OffsetDateTime;
use url::Url;

use crate::error::{WebhookError, WebhookResult};
use crate::storage::WebhookStore;
use crate::types::{EndpointStatus, Page, RegisterEndpoint, UpdateEndpoint, WebhookEndpoint};

/// Random bytes in a generated secret (hex encoded = 64 chars).
const SECRET_BYTES: usize = 32;

/// Generates a cryptographically random, hex-encoded endpoint secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    hex::encode(bytes)
}

/// Checks that `url` is an absolute http(s) URL.
pub fn validate_url(url: &str) -> WebhookResult<Url> {
    if url.trim().is_empty() {
        return Err(WebhookError::validation("url is required"));
    }
    let parsed = Url::parse(url)
        .map_err(|e| WebhookError::validation(format!("invalid url '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(WebhookError::validation(format!(
            "unsupported url scheme '{other}', expected http or https"
        ))),
    }
}

/// Validates, creates and maintains webhook endpoints.
#[derive(Clone)]
pub struct EndpointRegistry {
    store: Arc<dyn WebhookStore>,
}

impl EndpointRegistry {
    pub fn new(store: Arc<dyn WebhookStore>) -> Self {
        Self { store }
    }

    /// Register a new endpoint. A missing or empty secret is generated.
    pub async fn register_endpoint(
        &self,
        request: RegisterEndpoint,
    ) -> WebhookResult<WebhookEndpoint> {
        validate_url(&request.url)?;
        if request.tenant_id.trim().is_empty() {
            return Err(WebhookError::validation("tenant_id is required"));
        }

        let secret = match request.secret {
            Some(secret) if !secret.is_empty() => secret,
            _ => generate_secret(),
        };

        let now = OffsetDateTime::now_utc();
        let endpoint = WebhookEndpoint {
            id: uuid::Uuid::new_v4().to_string(),
            url: request.url,
            secret,
            events: request.events,
            tenant_id: request.tenant_id,
            client_id: request.client_id,
            status: EndpointStatus::Active,
            created_at: now,
            updated_at: now,
            metadata: request.metadata,
        };

        self.store.save_endpoint(&endpoint).await?;

        tracing::info!(
            webhook_id = %endpoint.id,
            tenant_id = %endpoint.tenant_id,
            url = %endpoint.url,
            events = ?endpoint.events,
            "Registered webhook endpoint"
        );

        Ok(endpoint)
    }

    pub async fn get_endpoint(&self, id: &str) -> WebhookResult<WebhookEndpoint> {
        self.store
            .get_endpoint(id)
            .await?
            .ok_or_else(|| WebhookError::endpoint_not_found(id))
    }

    pub async fn list_endpoints(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> WebhookResult<Page<WebhookEndpoint>> {
        let (data, total) = self.store.list_endpoints(tenant_id, limit, offset).await?;
        Ok(Page::new(data, total, limit, offset))
    }

    /// Apply a partial update; only fields present in `update` change.
    pub async fn update_endpoint(
        &self,
        id: &str,
        update: UpdateEndpoint,
    ) -> WebhookResult<WebhookEndpoint> {
        let mut endpoint = self.get_endpoint(id).await?;

        if let Some(url) = update.url {
            validate_url(&url)?;
            endpoint.url = url;
        }
        if let Some(secret) = update.secret {
            if secret.is_empty() {
                return Err(WebhookError::validation("secret must not be empty"));
            }
            endpoint.secret = secret;
        }
        if let Some(events) = update.events {
            endpoint.events = events;
        }
        if let Some(status) = update.status {
            endpoint.status = status;
        }
        if let Some(metadata) = update.metadata {
            endpoint.metadata = metadata;
        }
        endpoint.updated_at = OffsetDateTime::now_utc();

        self.store.save_endpoint(&endpoint).await?;
        tracing::info!(webhook_id = %endpoint.id, "Updated webhook endpoint");
        Ok(endpoint)
    }

    pub async fn pause_endpoint(&self, id: &str) -> WebhookResult<WebhookEndpoint> {
        self.set_status(id, EndpointStatus::Paused).await
    }

    pub async fn resume_endpoint(&self, id: &str) -> WebhookResult<WebhookEndpoint> {
        self.set_status(id, EndpointStatus::Active).await
    }

    async fn set_status(&self, id: &str, status: EndpointStatus) -> WebhookResult<WebhookEndpoint> {
        let mut endpoint = self.get_endpoint(id).await?;
        if endpoint.status != status {
            endpoint.status = status;
            endpoint.updated_at = OffsetDateTime::now_utc();
            self.store.save_endpoint(&endpoint).await?;
        }
        tracing::info!(webhook_id = %id, status = status.as_str(), "Webhook endpoint status set");
        Ok(endpoint)
    }

    /// Remove an endpoint. Its delivery attempts stay queryable.
    pub async fn delete_endpoint(&self, id: &str) -> WebhookResult<()> {
        if !self.store.delete_endpoint(id).await? {
            return Err(WebhookError::endpoint_not_found(id));
        }
        tracing::info!(webhook_id = %id, "Deleted webhook endpoint");
        Ok(())
    }
}
