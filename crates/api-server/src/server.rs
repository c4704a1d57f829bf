//! API server: REST router, Swagger UI, and the metrics exporter.

use crate::rest::{self, AppState};
use crate::segment_rest;
use crate::swagger::ApiDoc;
use axum::routing::{get, post};
use axum::Router;
use segment_core::config::AppConfig;
use segment_engine::SegmentStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the application router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Segments
        .route("/v1/segments", get(segment_rest::list_segments).post(segment_rest::create_segment))
        .route("/v1/segments/evaluate", post(segment_rest::evaluate_segment))
        .route("/v1/segments/fields", get(segment_rest::list_fields))
        .route(
            "/v1/segments/:id",
            get(segment_rest::get_segment)
                .put(segment_rest::update_segment)
                .delete(segment_rest::delete_segment),
        )
        .route("/v1/segments/:id/recalculate", post(segment_rest::recalculate_segment))
        // Subscriber vocabularies
        .route("/v1/subscribers/tags", get(segment_rest::subscriber_tags))
        .route("/v1/subscribers/sources", get(segment_rest::subscriber_sources))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// Main API server.
pub struct ApiServer {
    config: AppConfig,
    store: Arc<SegmentStore>,
}

impl ApiServer {
    pub fn new(config: AppConfig, store: Arc<SegmentStore>) -> Self {
        Self { config, store }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState::new(self.store.clone(), self.config.node_id.clone());

        let app = router(state)
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
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
