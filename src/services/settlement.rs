//! Market resolution (§4.5).
//!
//! Resolution is one market-wide transaction: every resting order is
//! cancelled, every position is paid out or debited according to
//! `resolves_to`, the market flips to RESOLVED, and a single
//! `MarketResolved` event closes the book, rather than a per-user claim
//! settled on demand — a binary market with full pre-trade
//! collateralization has no reason to defer payout to a later claim, so
//! resolution settles everyone at once.

use crate::models::{EventPayload, Order, Position, Resolution};
use crate::services::store::Store;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("market not found: {0}")]
    MarketNotFound(Uuid),

    #[error("market is already resolved")]
    AlreadyResolved,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<SettlementError> for crate::services::matching::types::MatchingError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::MarketNotFound(id) => Self::MarketNotFound(id),
            SettlementError::AlreadyResolved => Self::MarketNotOpen,
            SettlementError::Storage(e) => Self::Storage(e),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementSummary {
    pub market_id: Uuid,
    pub resolves_to: Resolution,
    pub orders_cancelled: usize,
    pub positions_settled: usize,
    pub total_payout_cents: i64,
}

/// Resolves a market: cancels every resting order, settles every non-flat
/// position, flips the market to RESOLVED, and appends the closing event —
/// all inside one transaction (§4.5's one-shot contract).
pub async fn resolve_market(
    store: &Store,
    market_id: Uuid,
    resolves_to: Resolution,
) -> Result<SettlementSummary, crate::services::matching::types::MatchingError> {
    let mut tx = store.begin().await?;

    let market = Store::lock_market_for_update(&mut tx, market_id)
        .await?
        .ok_or(SettlementError::MarketNotFound(market_id))?;
    if market.status == crate::models::MarketStatus::Resolved {
        tx.rollback().await?;
        return Err(SettlementError::AlreadyResolved.into());
    }

    let now = Utc::now();
    let cancelled: Vec<Order> = Store::cancel_all_resting_orders_in_tx(&mut tx, market_id, now).await?;
    for order in &cancelled {
        Store::adjust_wallet(&mut tx, order.user_id, 0, -order.locked_cents, now).await?;
        Store::append_event(
            &mut tx,
            Some(market_id),
            None,
            &EventPayload::OrderCanceled {
                order_id: order.id,
                reason: "market resolved".to_string(),
            },
        )
        .await?;
    }

    let positions: Vec<Position> = Store::list_positions_for_market(&mut tx, market_id).await?;
    let mut total_payout = 0i64;
    for position in &positions {
        // Releasing the position's lock is unconditional (§4.5 step 2); the
        // cash payout on top of that release depends on resolves_to and side.
        let (payout_cents, pnl_delta) = settle_position(position, resolves_to);
        total_payout += payout_cents.max(0);

        Store::adjust_wallet(&mut tx, position.user_id, payout_cents, -position.locked_cents, now).await?;

        let settled = Position {
            market_id: position.market_id,
            user_id: position.user_id,
            yes_shares: 0,
            avg_cost_cents: 0,
            realized_pnl_cents: position.realized_pnl_cents + pnl_delta,
            locked_cents: 0,
            updated_at: now,
        };
        Store::upsert_position(&mut tx, &settled).await?;
        Store::append_event(
            &mut tx,
            Some(market_id),
            None,
            &EventPayload::PositionSettled {
                user_id: position.user_id,
                payout_cents,
                realized_pnl_delta_cents: pnl_delta,
            },
        )
        .await?;
    }

    Store::resolve_market(&mut tx, market_id, resolves_to, now).await?;
    Store::append_event(
        &mut tx,
        Some(market_id),
        None,
        &EventPayload::MarketResolved {
            resolves_to: format!("{:?}", resolves_to).to_uppercase(),
        },
    )
    .await?;

    tx.commit().await?;

    Ok(SettlementSummary {
        market_id,
        resolves_to,
        orders_cancelled: cancelled.len(),
        positions_settled: positions.len(),
        total_payout_cents: total_payout,
    })
}

/// Cash payout and realized-PnL delta for one position at resolution (§4.5,
/// §8 scenario 6). `locked_cents` is released from the wallet unconditionally
/// by the caller; what's computed here is the *additional* cash movement on
/// top of that release.
///
/// A long is paid `yes_shares * 100` on YES and nothing on NO (it already
/// paid its cost basis at trade time, so a NO resolution is a pure loss of
/// that basis). A short is debited `|yes_shares| * 100` on YES (solvent
/// because its lock, released alongside, covers exactly that debit net of
/// the premium it already received) and owes nothing on NO, keeping the
/// premium it was paid at entry.
fn settle_position(position: &Position, resolves_to: Resolution) -> (i64, i64) {
    let yes_wins = matches!(resolves_to, Resolution::Yes);
    if position.yes_shares > 0 {
        let qty = position.yes_shares;
        if yes_wins {
            (qty * 100, qty * 100 - qty * position.avg_cost_cents)
        } else {
            (0, -qty * position.avg_cost_cents)
        }
    } else if position.yes_shares < 0 {
        let qty = -position.yes_shares;
        if yes_wins {
            (-qty * 100, -position.locked_cents)
        } else {
            (0, qty * 100 - position.locked_cents)
        }
    } else {
        (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn position(yes_shares: i64, avg_cost_cents: i64, locked_cents: i64) -> Position {
        Position {
            market_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            yes_shares,
            avg_cost_cents,
            realized_pnl_cents: 0,
            locked_cents,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn long_yes_wins_paid_in_full_pnl_is_gain_over_cost() {
        let p = position(10, 40, 0);
        let (payout, pnl) = settle_position(&p, Resolution::Yes);
        assert_eq!(payout, 1000);
        assert_eq!(pnl, 600);
    }

    #[test]
    fn long_no_wins_paid_nothing_pnl_is_loss_of_cost_basis() {
        let p = position(10, 40, 0);
        let (payout, pnl) = settle_position(&p, Resolution::No);
        assert_eq!(payout, 0);
        assert_eq!(pnl, -400);
    }

    #[test]
    fn short_yes_wins_debits_full_notional_beyond_released_lock() {
        // Bob: short 10 @ avg 70, locked 300 = 10 * (100 - 70).
        let p = position(-10, 70, 300);
        let (payout, pnl) = settle_position(&p, Resolution::Yes);
        assert_eq!(payout, -1000);
        assert_eq!(pnl, -300);
    }

    #[test]
    fn short_no_wins_keeps_premium_no_cash_movement_beyond_lock_release() {
        let p = position(-10, 70, 300);
        let (payout, pnl) = settle_position(&p, Resolution::No);
        assert_eq!(payout, 0);
        // Realizes the full premium received at entry: 10 * 70.
        assert_eq!(pnl, 700);
    }

    #[test]
    fn flat_position_settles_to_nothing() {
        let p = position(0, 0, 0);
        assert_eq!(settle_position(&p, Resolution::Yes), (0, 0));
        assert_eq!(settle_position(&p, Resolution::No), (0, 0));
    }
}
