//! Order API handlers (§6): place and cancel. There is no auth layer in
//! this core (§1's Non-goals), so the caller identifies itself with a plain
//! `user_id` field/query param rather than a signed session — a transport
//! fronting this core in production would inject that id from auth instead.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{OrderSide, OrderStatus, OrderType, PlaceOrderRequest};
use crate::utils::response::{ApiResponse, AppError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderHttpRequest {
    pub user_id: Uuid,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price_cents: Option<i64>,
    pub qty: i64,
    pub client_order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FillResponse {
    pub maker_order_id: Uuid,
    pub price_cents: i64,
    pub qty: i64,
    pub fee_cents: i64,
    pub seq: i64,
}

#[derive(Debug, Serialize)]
pub struct PlaceOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub fills: Vec<FillResponse>,
    pub reason: Option<String>,
}

pub async fn place_order(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
    Json(req): Json<PlaceOrderHttpRequest>,
) -> Result<Json<ApiResponse<PlaceOrderResponse>>, AppError> {
    let result = state
        .matching_engine
        .place_order(
            market_id,
            req.user_id,
            PlaceOrderRequest {
                side: req.side,
                order_type: req.order_type,
                price_cents: req.price_cents,
                qty: req.qty,
                client_order_id: req.client_order_id,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(PlaceOrderResponse {
        order_id: result.order_id,
        status: result.status,
        fills: result
            .fills
            .into_iter()
            .map(|f| FillResponse {
                maker_order_id: f.maker_order_id,
                price_cents: f.price_cents,
                qty: f.qty,
                fee_cents: f.fee_cents,
                seq: f.seq,
            })
            .collect(),
        reason: result.reason,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CancelOrderResponse {
    pub success: bool,
    pub already_terminal: bool,
}

pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path((market_id, order_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<CancelOrderQuery>,
) -> Result<Json<ApiResponse<CancelOrderResponse>>, AppError> {
    let outcome = state
        .matching_engine
        .cancel_order(market_id, query.user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(CancelOrderResponse {
        success: true,
        already_terminal: outcome.already_terminal,
    })))
}
