use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures surfaced to clients as an opaque `{ "error": "..." }` payload.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("order not found")]
    OrderNotFound,

    #[error("menu item not found")]
    MenuItemNotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("telegram delivery failed: {0}")]
    Delivery(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::OrderNotFound | AppError::MenuItemNotFound => StatusCode::NOT_FOUND,
            AppError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Delivery { .. } => StatusCode::BAD_GATEWAY,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
