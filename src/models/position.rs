#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A user's net YES-share position in one market. `yes_shares` is signed:
/// positive is long, negative is short. `locked_cents` is the short-side
/// collateral reserved against the worst-case YES payout (§4.3).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Position {
    pub market_id: Uuid,
    pub user_id: Uuid,
    pub yes_shares: i64,
    pub avg_cost_cents: i64,
    pub realized_pnl_cents: i64,
    pub locked_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn empty(market_id: Uuid, user_id: Uuid) -> Self {
        Self {
            market_id,
            user_id,
            yes_shares: 0,
            avg_cost_cents: 0,
            realized_pnl_cents: 0,
            locked_cents: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_short(&self) -> bool {
        self.yes_shares < 0
    }

    pub fn is_long(&self) -> bool {
        self.yes_shares > 0
    }
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    pub market_id: Uuid,
    pub yes_shares: i64,
    pub avg_cost_cents: i64,
    pub realized_pnl_cents: i64,
    pub locked_cents: i64,
}

impl From<Position> for PositionResponse {
    fn from(p: Position) -> Self {
        Self {
            market_id: p.market_id,
            yes_shares: p.yes_shares,
            avg_cost_cents: p.avg_cost_cents,
            realized_pnl_cents: p.realized_pnl_cents,
            locked_cents: p.locked_cents,
        }
    }
}
