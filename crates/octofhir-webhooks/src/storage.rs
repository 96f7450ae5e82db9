//! Persistence for webhook endpoints and delivery attempts.
//!
//! [`WebhookStore`] is the seam for backends; [`InMemoryWebhookStore`] keeps
//! both collections in insertion-ordered maps so that pagination is
//! deterministic without a separate order list.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{WebhookError, WebhookResult};
use crate::types::{DeliveryAttempt, DeliveryStatus, WebhookEndpoint};

/// Storage trait for webhook endpoints and delivery attempts
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Insert a new endpoint or replace an existing one, keeping its position
    async fn save_endpoint(&self, endpoint: &WebhookEndpoint) -> WebhookResult<()>;

    /// Get an endpoint by ID
    async fn get_endpoint(&self, id: &str) -> WebhookResult<Option<WebhookEndpoint>>;

    /// Delete an endpoint. Returns `false` if it did not exist.
    /// Delivery attempts of the endpoint are kept.
    async fn delete_endpoint(&self, id: &str) -> WebhookResult<bool>;

    /// List endpoints in insertion order, optionally for one tenant.
    /// Returns the page and the total number of matching endpoints.
    async fn list_endpoints(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> WebhookResult<(Vec<WebhookEndpoint>, usize)>;

    /// All endpoints of a tenant, in insertion order
    async fn endpoints_for_tenant(&self, tenant_id: &str) -> WebhookResult<Vec<WebhookEndpoint>>;

    /// Record a delivery attempt. Attempts are write-once.
    async fn save_delivery(&self, attempt: &DeliveryAttempt) -> WebhookResult<()>;

    /// Get a delivery attempt by ID
    async fn get_delivery(&self, id: &str) -> WebhookResult<Option<DeliveryAttempt>>;

    /// List attempts of one endpoint, most recent first.
    /// Returns the page and the total number of attempts for the endpoint.
    async fn list_deliveries(
        &self,
        webhook_id: &str,
        limit: usize,
        offset: usize,
    ) -> WebhookResult<(Vec<DeliveryAttempt>, usize)>;

    /// Latest attempt of every (endpoint, event) chain whose latest attempt failed
    async fn retry_candidates(&self) -> WebhookResult<Vec<DeliveryAttempt>>;
}

#[derive(Debug, Default)]
struct Collections {
    endpoints: IndexMap<String, WebhookEndpoint>,
    deliveries: IndexMap<String, DeliveryAttempt>,
    /// (webhook_id, event_id) -> id of the chain's highest attempt
    chains: IndexMap<(String, String), String>,
}

/// In-memory webhook store.
///
/// A single reader/writer lock guards all collections; every write happens
/// under one lock acquisition, so readers never see a partially recorded
/// attempt. Nothing is evicted: history and the chain index grow with use.
#[derive(Debug, Default)]
pub struct InMemoryWebhookStore {
    inner: RwLock<Collections>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded delivery attempts
    pub fn delivery_count(&self) -> usize {
        self.inner.read().deliveries.len()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn save_endpoint(&self, endpoint: &WebhookEndpoint) -> WebhookResult<()> {
        let mut guard = self.inner.write();
        // IndexMap::insert keeps the original slot for existing keys
        guard
            .endpoints
            .insert(endpoint.id.clone(), endpoint.clone());
        Ok(())
    }

    async fn get_endpoint(&self, id: &str) -> WebhookResult<Option<WebhookEndpoint>> {
        Ok(self.inner.read().endpoints.get(id).cloned())
    }

    async fn delete_endpoint(&self, id: &str) -> WebhookResult<bool> {
        Ok(self.inner.write().endpoints.shift_remove(id).is_some())
    }

    async fn list_endpoints(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> WebhookResult<(Vec<WebhookEndpoint>, usize)> {
        let guard = self.inner.read();
        let matching: Vec<&WebhookEndpoint> = guard
            .endpoints
            .values()
            .filter(|e| tenant_id.is_none_or(|t| e.tenant_id == t))
            .collect();
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn endpoints_for_tenant(&self, tenant_id: &str) -> WebhookResult<Vec<WebhookEndpoint>> {
        Ok(self
            .inner
            .read()
            .endpoints
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn save_delivery(&self, attempt: &DeliveryAttempt) -> WebhookResult<()> {
        let mut guard = self.inner.write();
        let collections = &mut *guard;
        if collections.deliveries.contains_key(&attempt.id) {
            return Err(WebhookError::Storage(format!(
                "delivery attempt {} already recorded",
                attempt.id
            )));
        }

        let chain = (attempt.webhook_id.clone(), attempt.event_id.clone());
        let newer = collections
            .chains
            .get(&chain)
            .and_then(|id| collections.deliveries.get(id))
            .is_none_or(|current| current.attempt <= attempt.attempt);
        if newer {
            collections.chains.insert(chain, attempt.id.clone());
        }
        collections
            .deliveries
            .insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn get_delivery(&self, id: &str) -> WebhookResult<Option<DeliveryAttempt>> {
        Ok(self.inner.read().deliveries.get(id).cloned())
    }

    async fn list_deliveries(
        &self,
        webhook_id: &str,
        limit: usize,
        offset: usize,
    ) -> WebhookResult<(Vec<DeliveryAttempt>, usize)> {
        let guard = self.inner.read();
        let matching: Vec<&DeliveryAttempt> = guard
            .deliveries
            .values()
            .rev()
            .filter(|d| d.webhook_id == webhook_id)
            .collect();
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    /// Reads the chain index, so the cost follows the number of chains
    /// rather than the number of recorded attempts.
    async fn retry_candidates(&self) -> WebhookResult<Vec<DeliveryAttempt>> {
        let guard = self.inner.read();
        Ok(guard
            .chains
            .values()
            .filter_map(|id| guard.deliveries.get(id))
            .filter(|a| a.status == DeliveryStatus::Failed)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EndpointStatus;
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn endpoint(id: &str, tenant: &str) -> WebhookEndpoint {
        let now = OffsetDateTime::now_utc();
        WebhookEndpoint {
            id: id.into(),
            url: format!("https://example.com/{id}"),
            secret: "s".into(),
            events: vec!["Patient.*".into()],
            tenant_id: tenant.into(),
            client_id: "c".into(),
            status: EndpointStatus::Active,
            created_at: now,
            updated_at: now,
            metadata: Default::default(),
        }
    }

    fn attempt(id: &str, webhook: &str, event: &str, n: u32, status: DeliveryStatus) -> DeliveryAttempt {
        DeliveryAttempt {
            id: id.into(),
            webhook_id: webhook.into(),
            event_type: "Patient.create".into(),
            event_id: event.into(),
            payload: "{}".into(),
            signature: "00".into(),
            status_code: if status == DeliveryStatus::Success { 200 } else { 500 },
            response_body: String::new(),
            duration_ms: 1,
            attempt: n,
            status,
            error: (status == DeliveryStatus::Failed).then(|| "non-2xx response: 500".into()),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_endpoint_pagination_is_insertion_ordered() {
        let store = InMemoryWebhookStore::new();
        for id in ["a", "b", "c", "d", "e"] {
            store.save_endpoint(&endpoint(id, "t1")).await.unwrap();
        }
        store.save_endpoint(&endpoint("x", "t2")).await.unwrap();

        let (first, total1) = store.list_endpoints(Some("t1"), 2, 0).await.unwrap();
        let (second, total2) = store.list_endpoints(Some("t1"), 2, 2).await.unwrap();
        let (third, total3) = store.list_endpoints(Some("t1"), 2, 4).await.unwrap();

        assert_eq!((total1, total2, total3), (5, 5, 5));
        let ids: Vec<_> = first
            .iter()
            .chain(&second)
            .chain(&third)
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b", "c", "d", "e"]);

        let (all, total) = store.list_endpoints(None, 100, 0).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(all.len(), 6);
    }

    #[tokio::test]
    async fn test_update_keeps_position_and_delete_keeps_order() {
        let store = InMemoryWebhookStore::new();
        for id in ["a", "b", "c"] {
            store.save_endpoint(&endpoint(id, "t1")).await.unwrap();
        }
        let mut b = endpoint("b", "t1");
        b.status = EndpointStatus::Paused;
        store.save_endpoint(&b).await.unwrap();

        let listed = store.endpoints_for_tenant("t1").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(listed[1].status, EndpointStatus::Paused);

        assert!(store.delete_endpoint("a").await.unwrap());
        assert!(!store.delete_endpoint("a").await.unwrap());
        let ids: Vec<_> = store
            .endpoints_for_tenant("t1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[tokio::test]
    async fn test_deliveries_are_write_once_and_newest_first() {
        let store = InMemoryWebhookStore::new();
        store
            .save_delivery(&attempt("d1", "w1", "e1", 1, DeliveryStatus::Failed))
            .await
            .unwrap();
        store
            .save_delivery(&attempt("d2", "w2", "e1", 1, DeliveryStatus::Success))
            .await
            .unwrap();
        store
            .save_delivery(&attempt("d3", "w1", "e1", 2, DeliveryStatus::Success))
            .await
            .unwrap();

        let err = store
            .save_delivery(&attempt("d1", "w1", "e1", 1, DeliveryStatus::Success))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Storage(_)));
        assert_eq!(
            store.get_delivery("d1").await.unwrap().unwrap().status,
            DeliveryStatus::Failed
        );

        let (page, total) = store.list_deliveries("w1", 10, 0).await.unwrap();
        assert_eq!(total, 2);
        let ids: Vec<_> = page.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["d3", "d1"]);

        let (page, total) = store.list_deliveries("w1", 1, 1).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page[0].id, "d1");
    }

    #[tokio::test]
    async fn test_retry_candidates_only_latest_failed() {
        let store = InMemoryWebhookStore::new();
        // chain e1 on w1 recovered on the second attempt
        store.save_delivery(&attempt("d1", "w1", "e1", 1, DeliveryStatus::Failed)).await.unwrap();
        store.save_delivery(&attempt("d2", "w1", "e1", 2, DeliveryStatus::Success)).await.unwrap();
        // chain e2 on w1 still failing
        store.save_delivery(&attempt("d3", "w1", "e2", 1, DeliveryStatus::Failed)).await.unwrap();
        store.save_delivery(&attempt("d4", "w1", "e2", 2, DeliveryStatus::Failed)).await.unwrap();
        // chain e1 on w2 succeeded immediately
        store.save_delivery(&attempt("d5", "w2", "e1", 1, DeliveryStatus::Success)).await.unwrap();

        let candidates = store.retry_candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "d4");
        assert_eq!(candidates[0].attempt, 2);
    }

    #[tokio::test]
    async fn test_retry_candidates_follow_highest_attempt() {
        let store = InMemoryWebhookStore::new();
        // a late write of an older attempt does not replace the chain head
        store.save_delivery(&attempt("d2", "w1", "e1", 2, DeliveryStatus::Success)).await.unwrap();
        store.save_delivery(&attempt("d1", "w1", "e1", 1, DeliveryStatus::Failed)).await.unwrap();
        assert!(store.retry_candidates().await.unwrap().is_empty());

        store.save_delivery(&attempt("d3", "w1", "e1", 3, DeliveryStatus::Failed)).await.unwrap();
        let candidates = store.retry_candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "d3");

        // duplicate ids leave the index untouched
        assert!(store.save_delivery(&attempt("d3", "w1", "e1", 9, DeliveryStatus::Success)).await.is_err());
        assert_eq!(store.retry_candidates().await.unwrap()[0].id, "d3");
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let store = Arc::new(InMemoryWebhookStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..25 {
                    let id = format!("d-{i}-{j}");
                    store
                        .save_delivery(&attempt(&id, "w1", &id, 1, DeliveryStatus::Success))
                        .await
                        .unwrap();
                    store.list_deliveries("w1", 5, 0).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.delivery_count(), 400);
        let (_, total) = store.list_deliveries("w1", 1, 0).await.unwrap();
        assert_eq!(total, 400);
    }
}
