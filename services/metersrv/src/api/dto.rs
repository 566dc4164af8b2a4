//! Request bodies and the response envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::MeterSrvError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: u16,
    pub message: String,
}

/// Handler error carrying its HTTP status
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<MeterSrvError> for AppError {
    fn from(err: MeterSrvError) -> Self {
        if err.is_client_error() {
            Self::bad_request(err.to_string())
        } else {
            Self::internal_error(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                success: false,
                error: ErrorInfo {
                    code: self.status.as_u16(),
                    message: self.message,
                },
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetDeviceRequest {
    #[serde(default)]
    pub port: String,
    /// 0 or absent selects 2400
    #[serde(default)]
    pub baud: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetIntervalRequest {
    /// Zero or negative selects 1000
    #[serde(default)]
    pub interval_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileQuery {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TailQuery {
    pub name: Option<String>,
    pub lines: Option<String>,
}
