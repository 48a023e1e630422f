//! API server: HTTP routes plus the Prometheus exporter.

use std::net::SocketAddr;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use drip_core::config::AppConfig;
use drip_engine::SequenceEngine;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;
use crate::{auth, unsubscribe, webhooks};

/// Every route of the service, with middleware applied.
pub fn router(state: AppState) -> Router {
    let operator = Router::new()
        .route("/v1/dispatch", post(rest::handle_dispatch))
        .route("/v1/enrollments", post(rest::handle_enroll))
        .route("/v1/enrollments/:id/pause", post(rest::handle_pause))
        .route("/v1/enrollments/:id/resume", post(rest::handle_resume))
        .route("/v1/sequences", get(rest::handle_list_sequences))
        .route("/v1/sequences/:id/stats", get(rest::handle_sequence_stats))
        .route(
            "/v1/sequences/:id/enrollments",
            get(rest::handle_sequence_enrollments),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_operator,
        ));

    Router::new()
        // Public opt-out
        .route("/unsubscribe", get(unsubscribe::unsubscribe_page))
        // Inbound webhooks
        .route("/webhooks/subscriber", post(webhooks::handle_subscriber))
        .route("/webhooks/resend", post(webhooks::handle_resend))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .merge(operator)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Owns the HTTP and metrics listeners.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: SequenceEngine) -> Self {
        let state = AppState::new(engine, &config);
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Start the HTTP server. Runs until the listener fails.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }

    /// Start the metrics exporter on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
