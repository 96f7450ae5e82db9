use std::sync::Arc;

use crate::config::WebhookConfig;
use crate::delivery::DeliveryEngine;
use crate::error::{WebhookError, WebhookResult};
use crate::registry::EndpointRegistry;
use crate::retry::RetryScheduler;
use crate::storage::{InMemoryWebhookStore, WebhookStore};
use crate::types::{DeliveryAttempt, DeliveryResult, Page, WebhookEvent};

/// Entry point wiring the registry, delivery engine and store together.
#[derive(Clone)]
pub struct WebhookService {
    store: Arc<dyn WebhookStore>,
    registry: EndpointRegistry,
    engine: Arc<DeliveryEngine>,
}

impl WebhookService {
    pub fn new(store: Arc<dyn WebhookStore>, config: WebhookConfig) -> WebhookResult<Self> {
        let engine = Arc::new(DeliveryEngine::new(store.clone(), config)?);
        Ok(Self::with_engine(store, engine))
    }

    pub fn with_engine(store: Arc<dyn WebhookStore>, engine: Arc<DeliveryEngine>) -> Self {
        Self {
            registry: EndpointRegistry::new(store.clone()),
            store,
            engine,
        }
    }

    /// Service backed by [`InMemoryWebhookStore`].
    pub fn in_memory(config: WebhookConfig) -> WebhookResult<Self> {
        Self::new(Arc::new(InMemoryWebhookStore::new()), config)
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<DeliveryEngine> {
        &self.engine
    }

    /// Fan an event out to matching endpoints.
    pub async fn deliver(&self, event: &WebhookEvent) -> Vec<DeliveryResult> {
        self.engine.deliver(event).await
    }

    /// Send a synthetic `webhook.test` event to one endpoint, regardless of
    /// its subscriptions or status.
    pub async fn test_endpoint(&self, id: &str) -> WebhookResult<DeliveryAttempt> {
        let endpoint = self.registry.get_endpoint(id).await?;
        let event = WebhookEvent::test(&endpoint);
        Ok(self.engine.deliver_to_endpoint(&endpoint, &event).await)
    }

    pub async fn retry_delivery(&self, delivery_id: &str) -> WebhookResult<DeliveryAttempt> {
        self.engine.retry_delivery(delivery_id).await
    }

    /// Attempts of one endpoint, most recent first. Attempts of deleted
    /// endpoints remain queryable.
    pub async fn delivery_logs(
        &self,
        webhook_id: &str,
        limit: usize,
        offset: usize,
    ) -> WebhookResult<Page<DeliveryAttempt>> {
        let (data, total) = self.store.list_deliveries(webhook_id, limit, offset).await?;
        Ok(Page::new(data, total, limit, offset))
    }

    pub async fn get_delivery(&self, id: &str) -> WebhookResult<DeliveryAttempt> {
        self.store
            .get_delivery(id)
            .await?
            .ok_or_else(|| WebhookError::delivery_not_found(id))
    }

    /// Background retry worker configured from `[webhooks.retry]`.
    pub fn retry_scheduler(&self) -> RetryScheduler {
        RetryScheduler::new(self.engine.clone(), self.engine.config().retry.clone())
    }

    /// Abort in-flight deliveries.
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}
