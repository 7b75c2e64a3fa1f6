//! HTTP gateway: JSON requests in, engine results out.

pub mod dto;
pub mod errors;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};

use crate::application::BalanceEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: BalanceEngine,
}

/// Build the router (same for production and tests).
pub fn router(engine: BalanceEngine) -> Router {
    let api = Router::new()
        .route("/wallet", post(handlers::apply_operation))
        .route("/wallets/:wallet_id", get(handlers::get_balance));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .with_state(AppState { engine })
}
