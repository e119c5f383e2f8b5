//! Wallet API handlers: balance reads and deposits (§6's `Deposit` event).
//! Withdrawals and real funds movement are out of scope (§1's Non-goals) —
//! this crate models collateral, it does not custody it.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::WalletResponse;
use crate::utils::response::{ApiResponse, AppError};
use crate::AppState;

pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<WalletResponse>>, AppError> {
    let wallet = state
        .store
        .get_wallet(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("wallet not found"))?;
    Ok(Json(ApiResponse::success(wallet.into())))
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount_cents: i64,
}

pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<ApiResponse<WalletResponse>>, AppError> {
    let wallet = state.matching_engine.deposit(user_id, req.amount_cents).await?;
    Ok(Json(ApiResponse::success(wallet.into())))
}
