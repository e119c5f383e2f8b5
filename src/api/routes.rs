//! The thin HTTP surface over the core (§6, SPEC_FULL §6). No auth, no rate
//! limiting, no schema validation beyond what `serde`/the engine already do
//! — those are out of scope per §1's Non-goals.

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

use crate::api::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/markets", post(handlers::market::create_market))
        .route(
            "/markets/:market_id/orderbook",
            get(handlers::market::get_orderbook),
        )
        .route("/markets/:market_id/ws", get(handlers::ws::market_events))
        .route(
            "/markets/:market_id/resolve",
            post(handlers::market::resolve_market),
        )
        .route(
            "/markets/:market_id/orders",
            post(handlers::order::place_order),
        )
        .route(
            "/markets/:market_id/orders/:order_id",
            delete(handlers::order::cancel_order),
        )
        .route("/wallets/:user_id", get(handlers::wallet::get_wallet))
        .route(
            "/wallets/:user_id/deposit",
            post(handlers::wallet::deposit),
        )
        .with_state(state)
}

