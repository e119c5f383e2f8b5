use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Trade {
    pub id: Uuid,
    pub market_id: Uuid,
    pub maker_order_id: Uuid,
    pub taker_order_id: Uuid,
    pub maker_user_id: Uuid,
    pub taker_user_id: Uuid,
    pub price_cents: i64,
    pub qty: i64,
    pub taker_fee_cents: i64,
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// A trade notification broadcast to subscribers (not persisted directly;
/// see [`crate::models::event::EventPayload::TradeExecuted`] for the durable form).
#[derive(Debug, Clone, Serialize)]
pub struct TradeEvent {
    pub market_id: Uuid,
    pub trade_id: Uuid,
    pub maker_order_id: Uuid,
    pub taker_order_id: Uuid,
    pub price_cents: i64,
    pub qty: i64,
    pub taker_side: String,
    pub seq: i64,
}
