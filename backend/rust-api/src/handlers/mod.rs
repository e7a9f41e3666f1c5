use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;

use crate::engine::EngineError;
use crate::metrics;
use crate::services::session_service::SessionError;
use crate::services::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut status = "healthy";
    let mut dependencies = serde_json::Map::new();
    let mut all_healthy = true;

    if let Some(mongo) = &state.mongo {
        let mongo_health = check_mongodb(mongo).await;
        if mongo_health.get("status").and_then(|v| v.as_str()) != Some("healthy") {
            all_healthy = false;
            status = "degraded";
        }
        dependencies.insert("mongodb".to_string(), json!(mongo_health));
    }

    // Redis is only a result cache, so it never degrades health
    let redis_health = match &state.redis {
        Some(redis) => check_redis(redis).await,
        None => {
            let mut result = serde_json::Map::new();
            result.insert("status".to_string(), json!("disabled"));
            result
        }
    };
    dependencies.insert("redis".to_string(), json!(redis_health));

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "skillvault-api",
            "version": env!("CARGO_PKG_VERSION"),
            "active_sessions": state.sessions.active_session_count().await,
            "pending_saves": state.sessions.pending_save_count().await,
            "cached_results": state.sessions.cached_result_count().await,
            "dependencies": dependencies
        })),
    )
}

async fn check_mongodb(
    mongo: &mongodb::Database,
) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();

    match tokio::time::timeout(
        std::time::Duration::from_secs(1),
        mongo.run_command(mongodb::bson::doc! { "ping": 1 }),
    )
    .await
    {
        Ok(Ok(_)) => {
            result.insert("status".to_string(), json!("healthy"));
            result.insert(
                "message".to_string(),
                json!("MongoDB connection successful"),
            );
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("MongoDB error: {}", e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!("MongoDB timeout after 1s"));
        }
    }

    result
}

async fn check_redis(
    redis: &redis::aio::ConnectionManager,
) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();

    let mut conn = redis.clone();
    match tokio::time::timeout(
        std::time::Duration::from_millis(500),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    {
        Ok(Ok(_)) => {
            result.insert("status".to_string(), json!("healthy"));
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("Redis error: {}", e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!("Redis timeout after 500ms"));
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Protects /metrics with HTTP Basic auth (`METRICS_AUTH=user:password`).
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let encoded = auth_header
        .strip_prefix("Basic ")
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

/// Maps driver errors onto the handlers' `(StatusCode, String)` error shape.
pub(crate) fn session_error(err: SessionError) -> (StatusCode, String) {
    let status = match &err {
        SessionError::Engine(EngineError::AlreadyStarted) => StatusCode::CONFLICT,
        SessionError::Engine(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Conflict(_) | SessionError::NothingToPersist(_) => StatusCode::CONFLICT,
        SessionError::ResultNotSaved(_) | SessionError::Transient(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    if status.is_server_error() {
        tracing::error!("Session request failed: {:#}", err);
    } else {
        tracing::debug!("Session request rejected: {}", err);
    }
    (status, err.to_string())
}

pub mod sessions;
pub mod sse;
