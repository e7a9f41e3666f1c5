use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use super::session_error;
use crate::{
    engine::{BrowserEvent, Signal},
    models::{
        NavigateRequest, RecordAnswerRequest, ReportViolationRequest, StartSessionRequest,
        Violation,
    },
    services::AppState,
};

/// POST /api/v1/sessions
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }

    tracing::info!(
        "Starting session for student_id={}, assessment_id={}",
        req.student_id,
        req.target.assessment_id()
    );

    let response = state.sessions.start(req).await.map_err(session_error)?;
    let status = if response.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(response)))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let view = state
        .sessions
        .view(&session_id)
        .await
        .map_err(session_error)?;
    Ok(Json(view))
}

/// POST /api/v1/sessions/{id}/answers
pub async fn record_answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }

    let response = state
        .sessions
        .record_answer(&session_id, req.index, req.value)
        .await
        .map_err(session_error)?;
    Ok(Json(response))
}

/// POST /api/v1/sessions/{id}/navigate
pub async fn navigate(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<NavigateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let response = state
        .sessions
        .navigate(&session_id, req.index)
        .await
        .map_err(session_error)?;
    Ok(Json(response))
}

/// POST /api/v1/sessions/{id}/events
///
/// Raw browser events from the client-side monitor.
pub async fn browser_event(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(event): Json<BrowserEvent>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::debug!("Browser event for session {}: {:?}", session_id, event);

    let response = state
        .sessions
        .browser_event(&session_id, event)
        .await
        .map_err(session_error)?;
    Ok(Json(response))
}

/// POST /api/v1/sessions/{id}/violations
pub async fn report_violation(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<ReportViolationRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }

    tracing::info!(
        "Violation reported for session {}: {}",
        session_id,
        req.violation_type.as_str()
    );

    let detail = if req.detail.is_empty() {
        req.violation_type.label().to_string()
    } else {
        req.detail
    };
    let violation = Violation::new(req.violation_type, detail, Utc::now());
    let response = state
        .sessions
        .apply(&session_id, Signal::ViolationDetected(violation))
        .await
        .map_err(session_error)?;
    Ok(Json(response))
}

/// POST /api/v1/sessions/{id}/submit
pub async fn submit_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Submitting session: {}", session_id);

    let response = state
        .sessions
        .submit(&session_id)
        .await
        .map_err(session_error)?;
    Ok(Json(response))
}

/// POST /api/v1/sessions/{id}/abandon
pub async fn abandon_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Abandoning session: {}", session_id);

    let view = state
        .sessions
        .abandon(&session_id)
        .await
        .map_err(session_error)?;
    Ok(Json(view))
}

/// POST /api/v1/sessions/{id}/persist
///
/// Retries saving a result the attempt store rejected earlier.
pub async fn persist_result(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let result = state
        .sessions
        .persist(&session_id)
        .await
        .map_err(session_error)?;
    Ok(Json(result))
}

/// GET /api/v1/sessions/{id}/result
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let result = state
        .sessions
        .result(&session_id)
        .await
        .map_err(session_error)?;
    Ok(Json(result))
}
