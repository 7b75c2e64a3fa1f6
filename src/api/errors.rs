use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::AppError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Client errors (try something else) and infrastructure errors (try later)
/// never share a status code.
pub fn app_error_to_response(err: AppError) -> Response {
    let message = err.to_string();
    if !err.is_client_error() {
        tracing::warn!(error = %message, "request failed");
    }

    match err {
        AppError::InvalidOperationKind(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_operation_type", message)
        }
        AppError::InvalidAmount(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_amount", message)
        }
        AppError::InsufficientFunds { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds", message)
        }
        AppError::BalanceOverflow(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "balance_overflow", message)
        }
        AppError::AccountNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "wallet_not_found", message)
        }
        AppError::SerializationConflict { .. } => {
            json_error(StatusCode::CONFLICT, "conflict", message)
        }
        AppError::StoreUnavailable(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message)
        }
        AppError::Timeout(_) => json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", message),
    }
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> Response {
    json_error(StatusCode::BAD_REQUEST, "malformed_request", rejection.body_text())
}
