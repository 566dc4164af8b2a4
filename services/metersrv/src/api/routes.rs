//! Route table for the meter service API

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{
    get_live, get_log_status, get_reader_status, health_check, list_log_files, read_log_file,
    set_device_port, set_log_interval, start_log, stop_log, tail_log_file,
};
use crate::app_state::AppState;

pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Live value and reader
        .route("/api/live", get(get_live))
        .route("/api/reader/status", get(get_reader_status))
        .route("/api/device/port", post(set_device_port))
        // CSV recorder
        .route("/api/log/status", get(get_log_status))
        .route("/api/log/start", post(start_log))
        .route("/api/log/stop", post(stop_log))
        .route("/api/log/interval", post(set_log_interval))
        .route("/api/log/files", get(list_log_files))
        .route("/api/log/file", get(read_log_file))
        .route("/api/log/tail", get(tail_log_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
