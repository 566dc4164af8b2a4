//! HTTP handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use meter_protocol::Measurement;
use serde::Serialize;
use tracing::info;

use super::dto::{
    AppError, FileQuery, SetDeviceRequest, SetIntervalRequest, SuccessResponse, TailQuery,
};
use crate::app_state::AppState;
use crate::config::DEFAULT_BAUD;
use crate::reader::ConnectionStatus;
use crate::recorder::{RecorderStatus, DEFAULT_LOG_INTERVAL_MS, DEFAULT_TAIL_LINES};

type ApiResult<T> = Result<Json<SuccessResponse<T>>, AppError>;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub reader_connected: bool,
    pub timestamp: String,
}

/// GET /health
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Json<SuccessResponse<HealthStatus>> {
    Json(SuccessResponse::new(HealthStatus {
        status: "healthy",
        service: "metersrv",
        reader_connected: state.reader.get_status().connected,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api/live
///
/// 204 while the link is down or before the first decoded frame, so a stale
/// value is never shown as live.
pub async fn get_live(State(state): State<Arc<AppState>>) -> Response {
    if !state.reader.get_status().connected {
        return StatusCode::NO_CONTENT.into_response();
    }
    match state.reader.get_latest() {
        Some(measurement) => {
            Json(SuccessResponse::new(Measurement::clone(&measurement))).into_response()
        },
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// GET /api/reader/status
pub async fn get_reader_status(State(state): State<Arc<AppState>>) -> ApiResult<ConnectionStatus> {
    Ok(Json(SuccessResponse::new(state.reader.get_status())))
}

/// POST /api/device/port
pub async fn set_device_port(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetDeviceRequest>,
) -> ApiResult<ConnectionStatus> {
    let port = request.port.trim().to_string();
    if port.is_empty() {
        return Err(AppError::bad_request("port required"));
    }
    let baud = if request.baud == 0 {
        DEFAULT_BAUD
    } else {
        request.baud
    };

    info!("Switching reader to {}@{}", port, baud);
    state.reader.start_reader(&port, baud);
    state
        .update_config(|config| {
            config.device_port = port;
            config.baud = baud;
        })
        .await;

    Ok(Json(SuccessResponse::new(state.reader.get_status())))
}

/// GET /api/log/status
pub async fn get_log_status(State(state): State<Arc<AppState>>) -> ApiResult<RecorderStatus> {
    Ok(Json(SuccessResponse::new(state.recorder.status())))
}

/// POST /api/log/start
pub async fn start_log(State(state): State<Arc<AppState>>) -> ApiResult<RecorderStatus> {
    let status = state.recorder.start()?;
    Ok(Json(SuccessResponse::new(status)))
}

/// POST /api/log/stop
pub async fn stop_log(State(state): State<Arc<AppState>>) -> ApiResult<RecorderStatus> {
    let status = state.recorder.stop()?;
    Ok(Json(SuccessResponse::new(status)))
}

/// POST /api/log/interval
pub async fn set_log_interval(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetIntervalRequest>,
) -> ApiResult<RecorderStatus> {
    let interval_ms = if request.interval_ms <= 0 {
        DEFAULT_LOG_INTERVAL_MS
    } else {
        request.interval_ms as u64
    };

    let status = state.recorder.set_interval(interval_ms);
    state
        .update_config(|config| config.log_interval_ms = interval_ms)
        .await;
    Ok(Json(SuccessResponse::new(status)))
}

/// GET /api/log/files
pub async fn list_log_files(State(state): State<Arc<AppState>>) -> ApiResult<Vec<String>> {
    let files = state.recorder.list_files().await?;
    Ok(Json(SuccessResponse::new(files)))
}

/// GET /api/log/file?name=
pub async fn read_log_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Result<Response, AppError> {
    let name = required_name(query.name)?;
    let data = state.recorder.read_file(&name).await?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], data).into_response())
}

/// GET /api/log/tail?name=&lines=
pub async fn tail_log_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TailQuery>,
) -> Result<Response, AppError> {
    let name = required_name(query.name)?;
    let max_lines = query
        .lines
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_TAIL_LINES);

    let lines = state.recorder.tail(&name, max_lines).await?;
    let mut body = String::new();
    for line in lines {
        body.push_str(&line);
        body.push('\n');
    }
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

fn required_name(name: Option<String>) -> Result<String, AppError> {
    match name {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(AppError::bad_request("missing name")),
    }
}
