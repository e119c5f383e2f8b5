#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed event taxonomy (§4.4/§6). One variant per type, each carrying its
/// own strongly-typed payload instead of an opaque JSON blob — the idiomatic
/// replacement for the source's dynamic event payloads (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    OrderAccepted {
        order_id: Uuid,
        user_id: Uuid,
        side: String,
        order_type: String,
        price_cents: Option<i64>,
        qty: i64,
    },
    OrderCanceled {
        order_id: Uuid,
        reason: String,
    },
    OrderFilled {
        order_id: Uuid,
    },
    TradeExecuted {
        trade_id: Uuid,
        maker_order_id: Uuid,
        taker_order_id: Uuid,
        price_cents: i64,
        qty: i64,
        taker_fee_cents: i64,
    },
    MarketCreated {
        slug: String,
        tick_size_cents: i32,
    },
    MarketResolved {
        resolves_to: String,
    },
    MarketPromoted {
        note: String,
    },
    PositionSettled {
        user_id: Uuid,
        payout_cents: i64,
        realized_pnl_delta_cents: i64,
    },
    Deposit {
        user_id: Uuid,
        amount_cents: i64,
    },
}

impl EventPayload {
    /// The closed-set type string persisted in the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::OrderAccepted { .. } => "OrderAccepted",
            EventPayload::OrderCanceled { .. } => "OrderCanceled",
            EventPayload::OrderFilled { .. } => "OrderFilled",
            EventPayload::TradeExecuted { .. } => "TradeExecuted",
            EventPayload::MarketCreated { .. } => "MarketCreated",
            EventPayload::MarketResolved { .. } => "MarketResolved",
            EventPayload::MarketPromoted { .. } => "MarketPromoted",
            EventPayload::PositionSettled { .. } => "PositionSettled",
            EventPayload::Deposit { .. } => "Deposit",
        }
    }
}

/// An append-only EventLog row. Never updated or deleted (§4.4).
#[derive(Debug, Clone, Serialize)]
pub struct EventLogEntry {
    pub id: i64,
    pub market_id: Option<Uuid>,
    pub seq: Option<i64>,
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
}
