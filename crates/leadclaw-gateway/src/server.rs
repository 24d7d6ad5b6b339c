//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use leadclaw_core::config::LeadClawConfig;
use leadclaw_dispatch::DispatchEngine;
use leadclaw_lifecycle::LifecycleReconciler;
use leadclaw_store::Store;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub config: LeadClawConfig,
    pub store: Arc<Store>,
    /// The dispatch engine — planner, timers, queue, workers.
    pub engine: Arc<DispatchEngine>,
    /// Lifecycle event handling — tags, stage machine, sequence commands.
    pub lifecycle: Arc<LifecycleReconciler>,
    pub start_time: std::time::Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    Router::new()
        .route("/health", get(super::routes::health_check))
        // Bulk dispatch
        .route(
            "/api/whatsapp/send-bulk-message",
            post(super::routes::send_bulk_message),
        )
        .route(
            "/api/whatsapp/send-bulk-sequence",
            post(super::routes::send_bulk_sequence),
        )
        // Lifecycle events
        .route("/api/web/after-form", post(super::routes::after_form))
        .route("/api/web/sample-sent", post(super::routes::sample_sent))
        .route("/api/track/link-open", post(super::routes::link_open))
        // Lead + sequence admin
        .route("/api/leads", post(super::routes::create_lead))
        .route("/api/sequences", get(super::routes::list_sequences))
        .route(
            "/api/sequences/{name}",
            put(super::routes::put_sequence),
        )
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
