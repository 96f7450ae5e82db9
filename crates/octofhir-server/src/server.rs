use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use octofhir_webhooks::{WebhookResult, WebhookService};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::handlers::{self, AppState};

pub struct OctofhirServer {
    addr: SocketAddr,
    config: AppConfig,
    service: WebhookService,
    app: Router,
}

pub fn build_app(cfg: &AppConfig, service: WebhookService) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route(
            "/webhooks",
            get(handlers::list_webhooks).post(handlers::create_webhook),
        )
        .route("/webhooks/events", post(handlers::fire_event))
        .route(
            "/webhooks/deliveries/{id}/retry",
            post(handlers::retry_delivery),
        )
        .route(
            "/webhooks/{id}",
            get(handlers::get_webhook)
                .put(handlers::update_webhook)
                .delete(handlers::delete_webhook),
        )
        .route("/webhooks/{id}/test", post(handlers::test_webhook))
        .route("/webhooks/{id}/deliveries", get(handlers::list_deliveries))
        .route("/webhooks/{id}/pause", post(handlers::pause_webhook))
        .route("/webhooks/{id}/resume", post(handlers::resume_webhook))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http.request",
                    http.method = %req.method(),
                    http.target = %req.uri(),
                )
            }),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(AppState { service })
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Build the server around an in-memory webhook service.
    pub fn build(self) -> WebhookResult<OctofhirServer> {
        let service = WebhookService::in_memory(self.config.webhooks.clone())?;
        let app = build_app(&self.config, service.clone());

        Ok(OctofhirServer {
            addr: self.config.addr(),
            config: self.config,
            service,
            app,
        })
    }
}

impl OctofhirServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let (stop_tx, stop_rx) = watch::channel(false);
        let scheduler = self
            .config
            .webhooks
            .retry
            .enabled
            .then(|| tokio::spawn(self.service.retry_scheduler().run(stop_rx)));

        let grace = self.config.shutdown_timeout();
        let service = self.service.clone();
        let signal = async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
            // Deliveries still running after the grace period are cancelled
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                service.shutdown();
            });
        };

        axum::serve(listener, self.app)
            .with_graceful_shutdown(signal)
            .await?;

        self.service.shutdown();
        if let Some(handle) = scheduler {
            let _ = handle.await;
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
