//! HTTP JSON API over the reader and the CSV recorder

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::{AppError, ErrorInfo, ErrorResponse, SuccessResponse};
pub use routes::create_routes;
