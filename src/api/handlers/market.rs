//! Market API handlers (§6): create, resolve, and read a book snapshot.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{CreateMarketRequest, MarketResponse, ResolveMarketRequest};
use crate::utils::response::{ApiResponse, AppError};
use crate::AppState;

/// Trivial header/config admin gate (SPEC_FULL §6) for the one endpoint that
/// can irreversibly settle a market. Not a real auth scheme — see
/// `AppConfig::admin_token`'s doc comment.
fn check_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = &state.config.admin_token else {
        return Ok(());
    };
    let provided = headers
        .get("X-Admin-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided == expected {
        Ok(())
    } else {
        Err(AppError::unauthorized("missing or invalid X-Admin-Token"))
    }
}

pub async fn create_market(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMarketRequest>,
) -> Result<Json<ApiResponse<MarketResponse>>, AppError> {
    let tick_size_cents = req
        .tick_size_cents
        .unwrap_or(state.config.default_tick_cents);
    if !(1..=10).contains(&tick_size_cents) {
        return Err(AppError::bad_request("tick_size_cents must be in 1..=10"));
    }
    let market = state
        .matching_engine
        .create_market(req.slug, req.title, req.description, tick_size_cents)
        .await?;
    Ok(Json(ApiResponse::success(market.into())))
}

#[derive(Debug, Deserialize)]
pub struct OrderBookQuery {
    #[serde(default = "default_depth")]
    pub depth: usize,
}

fn default_depth() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct PriceLevelResponse {
    pub price_cents: i64,
    pub qty: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderBookResponse {
    pub bids: Vec<PriceLevelResponse>,
    pub asks: Vec<PriceLevelResponse>,
}

pub async fn get_orderbook(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
    Query(query): Query<OrderBookQuery>,
) -> Result<Json<ApiResponse<OrderBookResponse>>, AppError> {
    let (bids, asks) = state
        .matching_engine
        .book_snapshot(market_id, query.depth)
        .await?;
    let to_levels = |levels: Vec<(i64, i64)>| {
        levels
            .into_iter()
            .map(|(price_cents, qty)| PriceLevelResponse { price_cents, qty })
            .collect()
    };
    Ok(Json(ApiResponse::success(OrderBookResponse {
        bids: to_levels(bids),
        asks: to_levels(asks),
    })))
}

pub async fn resolve_market(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<ResolveMarketRequest>,
) -> Result<Json<ApiResponse<crate::services::settlement::SettlementSummary>>, AppError> {
    check_admin(&state, &headers)?;
    let summary = state
        .matching_engine
        .resolve_market(market_id, req.resolves_to)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
