//! Best-effort event notifications over WebSocket (§6's event interface).
//!
//! One connection subscribes to exactly one market's broadcast stream
//! (`book_snapshot`/`trade`/`order_update`/`market_resolved`) and forwards
//! each [`MarketEvent`] as a JSON text frame in the order the worker
//! produced it. Delivery is fire-and-forget: a slow client lags the
//! broadcast channel and misses intermediate messages rather than slowing
//! down the market's single writer — clients reconnect and re-fetch a fresh
//! `GetBookSnapshot` on drop, per §6.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::utils::response::AppError;
use crate::AppState;

pub async fn market_events(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let rx = state.matching_engine.subscribe(market_id)?;
    Ok(ws.on_upgrade(move |socket| forward_events(socket, rx)))
}

async fn forward_events(mut socket: WebSocket, mut rx: tokio::sync::broadcast::Receiver<crate::services::matching::MarketEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let body = match serde_json::to_string(&event) {
                    Ok(body) => body,
                    Err(_) => continue,
                };
                if socket.send(Message::Text(body)).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}
