//! Shared types for the matching engine.

use crate::models::{OrderSide as Side, OrderStatus, OrderType, Resolution};
use uuid::Uuid;

/// A broadcast notification fanned out to any subscriber of one market's
/// mailbox (§6's event interface), independent of the request/reply that
/// produced it — a client watching the book doesn't need to be the one who
/// placed the order that moved it.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum MarketEvent {
    BookSnapshot {
        bids: Vec<(i64, i64)>,
        asks: Vec<(i64, i64)>,
    },
    Trade {
        trade_id: Uuid,
        price_cents: i64,
        qty: i64,
    },
    OrderUpdate {
        order_id: Uuid,
        status: OrderStatus,
        remaining_qty: i64,
    },
    MarketResolved {
        resolves_to: Resolution,
    },
}

/// A resting order inside one market's [`super::book::OrderBook`]. Carries
/// just enough to plan and apply fills; the durable `Order` row is the
/// source of truth and is never read back during matching.
#[derive(Debug, Clone)]
pub struct RestingOrder {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub side: Side,
    pub price_cents: i64,
    pub remaining_qty: i64,
    pub seq: i64,
}

/// One planned fill produced by a non-mutating book walk (§4.1). `fill_price`
/// is always the maker's resting price — the taker never receives price
/// improvement beyond what the book already offers.
#[derive(Debug, Clone)]
pub struct PlannedFill {
    pub maker_order_id: Uuid,
    pub maker_user_id: Uuid,
    pub maker_seq: i64,
    pub fill_price_cents: i64,
    pub fill_qty: i64,
}

/// Outcome of `PlaceOrder` returned to the caller (§4.2/§6).
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub remaining_qty: i64,
    pub locked_cents: i64,
    pub fills: Vec<FillReceipt>,
    pub reason: Option<String>,
}

/// Outcome of `CancelOrder` (§6): cancelling an order already in a terminal
/// status is not an error, it is reported back as `already_terminal` so the
/// caller can tell a no-op cancel apart from one that actually released a
/// resting order's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOutcome {
    pub already_terminal: bool,
}

/// A single executed fill as reported back to the taker, including the fee
/// charged on this leg.
#[derive(Debug, Clone)]
pub struct FillReceipt {
    pub trade_id: Uuid,
    pub maker_order_id: Uuid,
    pub price_cents: i64,
    pub qty: i64,
    pub fee_cents: i64,
    pub seq: i64,
}

/// The five error kinds from §7, surfaced by the matching engine.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("market not found: {0}")]
    MarketNotFound(Uuid),

    #[error("market is not open")]
    MarketNotOpen,

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid quantity: {0}")]
    InvalidQty(String),

    #[error("duplicate client_order_id for this user")]
    DuplicateClientOrderId,

    #[error("insufficient funds: available={available_cents} required={required_cents}")]
    InsufficientFunds {
        available_cents: i64,
        required_cents: i64,
    },

    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("forbidden: not the order owner")]
    Forbidden,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("internal engine error: {0}")]
    Internal(String),
}

pub(crate) fn validate_order_type(order_type: OrderType, price_cents: Option<i64>) -> Result<(), MatchingError> {
    match (order_type, price_cents) {
        (OrderType::Limit, None) => Err(MatchingError::InvalidPrice(
            "limit orders require a price".to_string(),
        )),
        (OrderType::Market, Some(_)) => Err(MatchingError::InvalidPrice(
            "market orders must not specify a price".to_string(),
        )),
        _ => Ok(()),
    }
}
