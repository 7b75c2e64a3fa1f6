use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use crate::domain::Operation;

use super::AppState;
use super::dto::{WalletBalanceResponse, WalletOperationRequest, WalletOperationResponse};
use super::errors::{app_error_to_response, json_error, json_rejection_to_response};

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `POST /api/v1/wallet`
pub async fn apply_operation(
    State(state): State<AppState>,
    payload: Result<Json<WalletOperationRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(body) => body,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    let operation = match Operation::parse(req.wallet_id, &req.operation_type, req.amount) {
        Ok(op) => op,
        Err(e) => return app_error_to_response(e.into()),
    };

    match state.engine.apply_operation(&operation).await {
        Ok(entry) => {
            tracing::info!(
                wallet_id = %entry.account_id,
                kind = %entry.kind,
                amount = entry.amount,
                balance = entry.balance_after,
                "operation applied"
            );
            (StatusCode::OK, Json(WalletOperationResponse::from(entry))).into_response()
        }
        Err(e) => app_error_to_response(e),
    }
}

/// `GET /api/v1/wallets/:wallet_id`
pub async fn get_balance(State(state): State<AppState>, Path(wallet_id): Path<String>) -> Response {
    let wallet_id = match Uuid::parse_str(&wallet_id) {
        Ok(id) => id,
        Err(_) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "invalid_wallet_id",
                format!("'{wallet_id}' is not a valid UUID"),
            );
        }
    };

    match state.engine.get_balance(wallet_id).await {
        Ok(balance) => (StatusCode::OK, Json(WalletBalanceResponse { balance })).into_response(),
        Err(e) => app_error_to_response(e),
    }
}
