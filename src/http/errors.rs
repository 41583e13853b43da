use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use validator::ValidationErrors;

use crate::domain::aggregates::{CatalogError, OrderError};
use crate::store::StoreError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (status, axum::Json(json!({ "error": code, "message": message.into() }))).into_response()
}

pub fn validation_error(errors: ValidationErrors) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", errors.to_string())
}

fn storage_error(err: &StoreError) -> Response {
    match err {
        StoreError::Timeout(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, "timeout", "the request took too long, nothing was changed"),
        other => {
            tracing::error!(error = %other, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_failure", "internal storage error")
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        match &self {
            OrderError::InvalidInput(_) => json_error(StatusCode::BAD_REQUEST, "invalid_input", self.to_string()),
            OrderError::InvalidPrice { .. } => json_error(StatusCode::BAD_REQUEST, "invalid_price", self.to_string()),
            OrderError::SnapshotNotFound { .. } => json_error(StatusCode::UNPROCESSABLE_ENTITY, "snapshot_not_found", self.to_string()),
            OrderError::OutOfStock { .. } => json_error(StatusCode::CONFLICT, "out_of_stock", self.to_string()),
            OrderError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
            OrderError::TotalMismatch { .. } => {
                tracing::error!(error = %self, "order total invariant broken");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_failure", "internal storage error")
            }
            OrderError::Storage(err) => storage_error(err),
        }
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        match &self {
            CatalogError::InvalidInput(_) => json_error(StatusCode::BAD_REQUEST, "invalid_input", self.to_string()),
            CatalogError::InvalidPrice { .. } => json_error(StatusCode::BAD_REQUEST, "invalid_price", self.to_string()),
            CatalogError::SlugTaken(_) => json_error(StatusCode::CONFLICT, "slug_taken", self.to_string()),
            CatalogError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            CatalogError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
            CatalogError::Storage(err) => storage_error(err),
        }
    }
}
