//! Collateral and position accounting as pure functions (§4.3).
//!
//! Nothing here touches the database or the book — every function takes
//! plain values and returns plain values, so the rules can be unit tested
//! in isolation and reused identically by both the matching engine and
//! settlement.

use crate::models::{OrderSide as Side, OrderType};

/// Worst-case price per share a MARKET order can walk to (§4.3) — the
/// resolved answer to the "what does a MARKET order lock" open question:
/// both sides lock symmetrically against the 99-cent worst case, since a
/// market order carries no price protection in this engine (Non-goals, §1).
pub const MARKET_WORST_CASE_PRICE_CENTS: i64 = 99;

/// Cents locked per share for one order, before multiplying by quantity.
///
/// - BUY LIMIT at `P` locks `P` (the most it could pay per share).
/// - SELL LIMIT at `P` locks `100 - P` (the most a short seller could owe
///   if YES resolves true, per share).
/// - MARKET orders of either side lock the symmetric worst case, 99 cents,
///   since there is no limit price to bound the walk.
pub fn per_share_lock_cents(side: Side, order_type: OrderType, price_cents: Option<i64>) -> i64 {
    match (side, order_type) {
        (Side::Buy, OrderType::Limit) => price_cents.unwrap_or(MARKET_WORST_CASE_PRICE_CENTS),
        (Side::Sell, OrderType::Limit) => {
            100 - price_cents.unwrap_or(100 - MARKET_WORST_CASE_PRICE_CENTS)
        }
        (Side::Buy, OrderType::Market) | (Side::Sell, OrderType::Market) => {
            MARKET_WORST_CASE_PRICE_CENTS
        }
    }
}

/// Total collateral an order must lock up front (invariant 1, §3): full
/// pre-trade collateralization, no partial margining.
pub fn required_lock_cents(side: Side, order_type: OrderType, price_cents: Option<i64>, qty: i64) -> i64 {
    per_share_lock_cents(side, order_type, price_cents) * qty
}

/// The reference price a fee estimate is computed against: the order's own
/// limit price, or the worst case for a MARKET order which has none (§4.3,
/// "`P_ref = P` for LIMIT and `MAX_PRICE` for MARKET").
pub fn fee_reference_price_cents(price_cents: Option<i64>) -> i64 {
    price_cents.unwrap_or(MARKET_WORST_CASE_PRICE_CENTS)
}

/// Total collateral an order must lock up front, including the conservative
/// (ceil-rounded) taker fee estimate on top of the worst-case per-share
/// notional (§4.3's `L = (per_share_lock × qty) + fee_estimate`).
pub fn required_lock_with_fee_cents(
    side: Side,
    order_type: OrderType,
    price_cents: Option<i64>,
    qty: i64,
    fee_bps: i64,
) -> i64 {
    let notional_lock = required_lock_cents(side, order_type, price_cents, qty);
    let fee_ref = fee_reference_price_cents(price_cents);
    notional_lock + fee_estimate_cents(fee_ref * qty, fee_bps)
}

/// Taker fee estimated against an order before it is known how it will
/// fill, rounded UP so a resting order never runs short of locked
/// collateral once the real (rounded-down) fee is charged per fill.
pub fn fee_estimate_cents(notional_cents: i64, fee_bps: i64) -> i64 {
    ceil_div(notional_cents * fee_bps, 10_000)
}

/// Fee-estimate lock reserved against the first `qty_filled` shares of an
/// order's total quantity, at the order's own reference price. Computing a
/// fill's fee-lock release as the difference of this function at the
/// cumulative filled quantity before and after the fill keeps the sum of
/// per-fill releases across an order's lifetime exactly equal to the single
/// `ceil` reserved at placement (`fee_estimate_cents(fee_ref * qty, bps)`),
/// rather than summing independent per-fill `ceil`s, which can exceed the
/// reserve since `Σ ceil(x_i) ≥ ceil(Σ x_i)` — e.g. price 50c, qty 2, two
/// 1-share fills, fee_bps 100: reserved is `ceil(100·100/10000) = 1`, but
/// `ceil(50·100/10000) + ceil(50·100/10000) = 1 + 1 = 2` over-releases by 1.
pub fn cumulative_fee_lock_cents(price_cents: Option<i64>, qty_filled: i64, fee_bps: i64) -> i64 {
    let fee_ref = fee_reference_price_cents(price_cents);
    fee_estimate_cents(fee_ref * qty_filled, fee_bps)
}

/// Taker fee actually charged on one executed fill, rounded DOWN — the
/// platform never collects more than `fee_bps` of the traded notional.
pub fn fee_charge_cents(notional_cents: i64, fee_bps: i64) -> i64 {
    (notional_cents * fee_bps) / 10_000
}

fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    if numerator == 0 {
        0
    } else {
        (numerator + denominator - 1) / denominator
    }
}

/// New weighted-average cost after adding `trade_qty` shares at
/// `trade_price_cents` to an existing long of `existing_qty` shares at
/// `existing_avg_cost_cents`. Rounds down, matching [`fee_charge_cents`]'s
/// bias toward never overstating the user's cost basis.
pub fn weighted_avg_cost_cents(
    existing_qty: i64,
    existing_avg_cost_cents: i64,
    trade_qty: i64,
    trade_price_cents: i64,
) -> i64 {
    let total_qty = existing_qty + trade_qty;
    if total_qty == 0 {
        return 0;
    }
    let total_cost = existing_qty * existing_avg_cost_cents + trade_qty * trade_price_cents;
    total_cost / total_qty
}

/// Collateral released when a short position is covered (bought back) by
/// `covered_qty` shares, pro-rata to the fraction of the short being
/// closed. This is the resolved form of the "how much of a maker's lock
/// is released on a partial cover" open question: release is linear in
/// shares covered, not first-in-first-out against specific lock events,
/// since short collateral is fungible per unit once locked.
pub fn short_cover_release_cents(short_locked_cents: i64, short_qty_before: i64, covered_qty: i64) -> i64 {
    if short_qty_before == 0 {
        return 0;
    }
    // Integer division floors the per-unit release so cumulative releases
    // across several partial covers never exceed the original lock.
    (short_locked_cents * covered_qty) / short_qty_before
}

/// Net cash effect of closing `qty` shares of a long position at
/// `trade_price_cents`, given the position's average cost. Positive is a
/// gain. This is realized PnL in the "actual cash effect" sense (the
/// resolved open question on what realized PnL means here): it is the
/// difference between sale proceeds and cost basis, not a mark against a
/// hypothetical resolution price.
pub fn realized_pnl_on_close_cents(qty: i64, trade_price_cents: i64, avg_cost_cents: i64) -> i64 {
    qty * (trade_price_cents - avg_cost_cents)
}

/// Result of folding one trade leg into an existing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionDelta {
    pub new_yes_shares: i64,
    pub new_avg_cost_cents: i64,
    pub realized_pnl_delta_cents: i64,
    pub new_locked_cents: i64,
}

/// Fold one fill leg into a position (§4.3). `side` is this party's side of
/// the trade (BUY acquires shares, SELL disposes of them); `qty`/`price_cents`
/// describe the fill; `short_lock_rate_cents` is the per-share collateral
/// rate (`100 - price_cents` for a SELL) charged against any portion of
/// `qty` that opens or extends a short.
///
/// A long position never carries a lock of its own — only a short does, so
/// `short_lock_rate_cents` is only consulted when this leg nets the position
/// further negative.
pub fn apply_trade_to_position(
    prev_yes_shares: i64,
    prev_avg_cost_cents: i64,
    prev_locked_cents: i64,
    side: Side,
    qty: i64,
    price_cents: i64,
    short_lock_rate_cents: i64,
) -> PositionDelta {
    let signed_qty = match side {
        Side::Buy => qty,
        Side::Sell => -qty,
    };
    let mut avg = prev_avg_cost_cents;
    let mut locked = prev_locked_cents;
    let mut realized = 0i64;

    if prev_yes_shares == 0 || prev_yes_shares.signum() == signed_qty.signum() {
        // Opening fresh, or extending an existing long/short in the same direction.
        avg = weighted_avg_cost_cents(prev_yes_shares.abs(), avg, qty, price_cents);
        if signed_qty < 0 {
            locked += short_lock_rate_cents * qty;
        }
    } else {
        // Reducing, fully closing, or flipping through flat.
        let closing_qty = qty.min(prev_yes_shares.abs());
        if prev_yes_shares > 0 {
            realized += realized_pnl_on_close_cents(closing_qty, price_cents, avg);
        } else {
            realized += closing_qty * (avg - price_cents);
            let release = short_cover_release_cents(locked, prev_yes_shares.abs(), closing_qty);
            locked -= release;
        }
        let opening_qty = qty - closing_qty;
        if opening_qty > 0 {
            avg = price_cents;
            if signed_qty < 0 {
                locked += short_lock_rate_cents * opening_qty;
            }
        }
    }

    let new_yes_shares = prev_yes_shares + signed_qty;
    if new_yes_shares == 0 {
        avg = 0;
    }

    PositionDelta {
        new_yes_shares,
        new_avg_cost_cents: avg,
        realized_pnl_delta_cents: realized,
        new_locked_cents: locked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_share_lock_matches_limit_rules() {
        assert_eq!(per_share_lock_cents(Side::Buy, OrderType::Limit, Some(37)), 37);
        assert_eq!(per_share_lock_cents(Side::Sell, OrderType::Limit, Some(37)), 63);
        assert_eq!(per_share_lock_cents(Side::Buy, OrderType::Market, None), 99);
        assert_eq!(per_share_lock_cents(Side::Sell, OrderType::Market, None), 99);
    }

    #[test]
    fn required_lock_scales_by_qty() {
        assert_eq!(required_lock_cents(Side::Buy, OrderType::Limit, Some(40), 10), 400);
        assert_eq!(required_lock_cents(Side::Sell, OrderType::Limit, Some(40), 10), 600);
    }

    #[test]
    fn required_lock_with_fee_matches_worked_example() {
        // §8 scenario 3: BUY LIMIT 50, qty 10, fee_bps 100 -> 500 + ceil(500*100/10000) = 505.
        assert_eq!(
            required_lock_with_fee_cents(Side::Buy, OrderType::Limit, Some(50), 10, 100),
            505
        );
        // MARKET orders estimate fee off the 99-cent worst case, not a real price.
        assert_eq!(
            required_lock_with_fee_cents(Side::Buy, OrderType::Market, None, 10, 100),
            990 + fee_estimate_cents(99 * 10, 100)
        );
    }

    #[test]
    fn fee_estimate_rounds_up_fee_charge_rounds_down() {
        // 1 cent short of dividing evenly: 101 * 50 / 10000 = 0.505
        assert_eq!(fee_estimate_cents(101, 50), 1);
        assert_eq!(fee_charge_cents(101, 50), 0);

        assert_eq!(fee_estimate_cents(0, 50), 0);
        assert_eq!(fee_charge_cents(0, 50), 0);

        // Evenly divisible: both agree.
        assert_eq!(fee_estimate_cents(20_000, 50), 100);
        assert_eq!(fee_charge_cents(20_000, 50), 100);
    }

    #[test]
    fn cumulative_fee_lock_sums_to_the_single_reserved_ceiling() {
        // price 50c, qty 2, fee_bps 100: reserved = ceil(50*2*100/10000) = 1.
        let reserved = fee_estimate_cents(50 * 2, 100);
        assert_eq!(reserved, 1);

        // Two 1-share fills: release as the difference of the cumulative
        // function, not as two independent per-fill ceilings (which would be
        // 1 + 1 = 2 and over-release).
        let after_fill_1 = cumulative_fee_lock_cents(Some(50), 1, 100);
        let after_fill_2 = cumulative_fee_lock_cents(Some(50), 2, 100);
        let release_1 = after_fill_1 - 0;
        let release_2 = after_fill_2 - after_fill_1;
        assert_eq!(release_1 + release_2, reserved);
        assert_eq!((release_1, release_2), (1, 0));
    }

    #[test]
    fn weighted_avg_cost_blends_existing_and_new() {
        // 10 shares @ 40c, buy 10 more @ 60c -> avg 50c.
        assert_eq!(weighted_avg_cost_cents(10, 40, 10, 60), 50);
        // Opening a fresh position: avg is just the trade price.
        assert_eq!(weighted_avg_cost_cents(0, 0, 5, 33), 33);
    }

    #[test]
    fn short_cover_release_is_linear_in_covered_qty() {
        // 600 cents locked against 10 short shares, cover 4 -> release 240.
        assert_eq!(short_cover_release_cents(600, 10, 4), 240);
        // Covering all of it releases everything.
        assert_eq!(short_cover_release_cents(600, 10, 10), 600);
        assert_eq!(short_cover_release_cents(0, 0, 0), 0);
    }

    #[test]
    fn realized_pnl_is_cash_effect_of_closing() {
        // Bought at 40c avg, sell 5 shares at 55c -> gain of 75c.
        assert_eq!(realized_pnl_on_close_cents(5, 55, 40), 75);
        // Selling at a loss.
        assert_eq!(realized_pnl_on_close_cents(5, 30, 40), -50);
    }

    #[test]
    fn opening_long_sets_avg_cost_no_lock() {
        let d = apply_trade_to_position(0, 0, 0, Side::Buy, 10, 40, 60);
        assert_eq!(d.new_yes_shares, 10);
        assert_eq!(d.new_avg_cost_cents, 40);
        assert_eq!(d.realized_pnl_delta_cents, 0);
        assert_eq!(d.new_locked_cents, 0);
    }

    #[test]
    fn opening_short_locks_at_fill_price_rate() {
        let d = apply_trade_to_position(0, 0, 0, Side::Sell, 10, 35, 65);
        assert_eq!(d.new_yes_shares, -10);
        assert_eq!(d.new_avg_cost_cents, 35);
        assert_eq!(d.new_locked_cents, 650);
    }

    #[test]
    fn closing_long_realizes_pnl_and_keeps_zero_lock() {
        // Long 10 @ 40c, sell all 10 @ 55c.
        let d = apply_trade_to_position(10, 40, 0, Side::Sell, 10, 55, 45);
        assert_eq!(d.new_yes_shares, 0);
        assert_eq!(d.realized_pnl_delta_cents, 150);
        assert_eq!(d.new_locked_cents, 0);
        assert_eq!(d.new_avg_cost_cents, 0);
    }

    #[test]
    fn covering_short_releases_lock_pro_rata_and_realizes_pnl() {
        // Short 10 @ 35c (locked 650 at 65c/share), cover 4 @ 20c.
        let d = apply_trade_to_position(-10, 35, 650, Side::Buy, 4, 20, 0);
        assert_eq!(d.new_yes_shares, -6);
        // covered 4/10 of the short -> release 4/10 of 650 = 260
        assert_eq!(d.new_locked_cents, 650 - 260);
        // profit: sold at 35, bought back at 20, 4 shares -> 60
        assert_eq!(d.realized_pnl_delta_cents, 60);
        assert_eq!(d.new_avg_cost_cents, 35);
    }

    #[test]
    fn flipping_short_to_long_opens_fresh_avg_with_no_lock() {
        // Short 5 @ 30c (locked 350), buy 8 @ 25c: covers 5, opens 3 long.
        let d = apply_trade_to_position(-5, 30, 350, Side::Buy, 8, 25, 0);
        assert_eq!(d.new_yes_shares, 3);
        assert_eq!(d.new_locked_cents, 0);
        assert_eq!(d.new_avg_cost_cents, 25);
        // covering 5 shares at a 5c profit each = 25
        assert_eq!(d.realized_pnl_delta_cents, 25);
    }
}
