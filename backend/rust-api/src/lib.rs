use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod engine;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // The assessment page posts browser events and opens the SSE stream cross-origin
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(middlewares::trace::TRACE_ID_HEADER),
        ])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/sessions", sessions_routes().layer(cors))
        .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
        .layer(middleware::from_fn(middlewares::trace::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn sessions_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::sessions::start_session))
        .route("/{id}", get(handlers::sessions::get_session))
        .route("/{id}/answers", post(handlers::sessions::record_answer))
        .route("/{id}/navigate", post(handlers::sessions::navigate))
        .route("/{id}/events", post(handlers::sessions::browser_event))
        .route("/{id}/violations", post(handlers::sessions::report_violation))
        .route("/{id}/submit", post(handlers::sessions::submit_session))
        .route("/{id}/abandon", post(handlers::sessions::abandon_session))
        .route("/{id}/persist", post(handlers::sessions::persist_result))
        .route("/{id}/result", get(handlers::sessions::get_result))
        .route("/{id}/stream", get(handlers::sse::session_stream))
}
