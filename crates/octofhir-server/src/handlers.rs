//! Webhook management API handlers.
//!
//! Endpoint secrets are only returned by the registration response; every
//! other response carries them masked.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use octofhir_webhooks::{
    Page, RegisterEndpoint, UpdateEndpoint, WebhookEndpoint, WebhookEvent, WebhookService,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

// =============================================================================
// State
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub service: WebhookService,
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageParams {
    pub fn bounds(&self) -> (usize, usize) {
        page_bounds(self.limit, self.offset)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListWebhooksParams {
    pub tenant_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `(limit, offset)` with the limit clamped to `1..=100`.
fn page_bounds(limit: Option<usize>, offset: Option<usize>) -> (usize, usize) {
    (
        limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        offset.unwrap_or(0),
    )
}

/// Event fired by a producer outside the process.
#[derive(Debug, Deserialize)]
pub struct FireEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub resource_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// POST /webhooks - Register an endpoint. The only response showing the secret.
pub async fn create_webhook(
    State(state): State<AppState>,
    body: Result<Json<RegisterEndpoint>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(body)?;
    let endpoint = state.service.registry().register_endpoint(request).await?;
    Ok((StatusCode::CREATED, Json(endpoint)))
}

/// GET /webhooks - List endpoints in registration order.
pub async fn list_webhooks(
    State(state): State<AppState>,
    params: Result<Query<ListWebhooksParams>, QueryRejection>,
) -> Result<Json<Page<WebhookEndpoint>>, ApiError> {
    let params = query(params)?;
    let (limit, offset) = page_bounds(params.limit, params.offset);
    let page = state
        .service
        .registry()
        .list_endpoints(params.tenant_id.as_deref(), limit, offset)
        .await?;
    Ok(Json(page.map(|endpoint| endpoint.masked())))
}

/// GET /webhooks/{id}
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WebhookEndpoint>, ApiError> {
    let endpoint = state.service.registry().get_endpoint(&id).await?;
    Ok(Json(endpoint.masked()))
}

/// PUT /webhooks/{id} - Partial update.
pub async fn update_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateEndpoint>, JsonRejection>,
) -> Result<Json<WebhookEndpoint>, ApiError> {
    let update = json_body(body)?;
    let endpoint = state.service.registry().update_endpoint(&id, update).await?;
    Ok(Json(endpoint.masked()))
}

/// DELETE /webhooks/{id}
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.registry().delete_endpoint(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /webhooks/{id}/test - Deliver a synthetic `webhook.test` event.
///
/// Responds 200 with the attempt even when the delivery failed.
pub async fn test_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let attempt = state.service.test_endpoint(&id).await?;
    Ok(Json(attempt))
}

/// GET /webhooks/{id}/deliveries - Delivery log, most recent first.
pub async fn list_deliveries(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = query(params)?.bounds();
    let page = state.service.delivery_logs(&id, limit, offset).await?;
    Ok(Json(page))
}

/// POST /webhooks/{id}/pause
pub async fn pause_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let endpoint = state.service.registry().pause_endpoint(&id).await?;
    Ok(Json(json!({ "status": endpoint.status.as_str() })))
}

/// POST /webhooks/{id}/resume
pub async fn resume_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let endpoint = state.service.registry().resume_endpoint(&id).await?;
    Ok(Json(json!({ "status": endpoint.status.as_str() })))
}

/// POST /webhooks/deliveries/{id}/retry
pub async fn retry_delivery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let attempt = state.service.retry_delivery(&id).await?;
    Ok(Json(attempt))
}

/// POST /webhooks/events - Fan an event out to matching endpoints.
pub async fn fire_event(
    State(state): State<AppState>,
    body: Result<Json<FireEvent>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(body)?;
    if request.event_type.trim().is_empty() {
        return Err(ApiError::bad_request("type is required"));
    }
    if request.tenant_id.trim().is_empty() {
        return Err(ApiError::bad_request("tenant_id is required"));
    }

    let event = WebhookEvent::new(
        request.event_type,
        request.resource_type,
        request.resource_id,
        request.tenant_id,
        request.payload,
    );
    let results = state.service.deliver(&event).await;
    Ok(Json(json!({ "event_id": event.id, "results": results })))
}
