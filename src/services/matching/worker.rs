//! The per-market engine task (§4.2, §5, §9).
//!
//! Each open market gets exactly one `MarketWorker` running on its own
//! tokio task, draining a bounded mpsc mailbox. Owning the book and the seq
//! counter on a single task — rather than behind a `Mutex`/`RwLock` shared
//! across handler tasks — is what makes price-time ordering and
//! read-your-writes trivial: nothing else ever touches this market's book.
//! The mailbox's bounded capacity is the backpressure mechanism called for
//! in §5: a market under sustained overload fills its mailbox and callers
//! see that as a slow `send`, rather than the server silently reordering
//! or dropping requests.

use super::book::OrderBook;
use super::types::{
    validate_order_type, CancelOutcome, FillReceipt, MarketEvent, MatchResult, MatchingError, PlannedFill,
    RestingOrder,
};
use crate::models::{
    EventPayload, Market, MarketStatus, Order, OrderSide as Side, OrderStatus, OrderType,
    PlaceOrderRequest, Position, Trade,
};
use crate::services::ledger;
use crate::services::settlement::{self, SettlementSummary};
use crate::services::store::Store;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

/// Matches the teacher's `broadcast::channel::<OrderUpdateEvent>(1000)` sizing
/// in `main.rs` — generous enough that a momentarily slow subscriber lags
/// instead of blocking the worker that's actually moving the book.
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

pub enum EngineCommand {
    PlaceOrder {
        user_id: Uuid,
        req: PlaceOrderRequest,
        reply: oneshot::Sender<Result<MatchResult, MatchingError>>,
    },
    CancelOrder {
        user_id: Uuid,
        order_id: Uuid,
        reply: oneshot::Sender<Result<CancelOutcome, MatchingError>>,
    },
    Snapshot {
        depth: usize,
        reply: oneshot::Sender<(Vec<(i64, i64)>, Vec<(i64, i64)>)>,
    },
    Resolve {
        resolves_to: crate::models::Resolution,
        reply: oneshot::Sender<Result<SettlementSummary, MatchingError>>,
    },
}

/// Spawns the worker task, returning a sender to its command mailbox and the
/// broadcast sender subscribers can use to watch this market's events.
pub fn spawn(
    store: Store,
    market: Market,
    taker_fee_bps: i64,
    mailbox_capacity: usize,
) -> (mpsc::Sender<EngineCommand>, broadcast::Sender<MarketEvent>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(run(store, market, taker_fee_bps, rx, events_tx.clone()));
    (tx, events_tx)
}

async fn run(
    store: Store,
    market: Market,
    taker_fee_bps: i64,
    mut rx: mpsc::Receiver<EngineCommand>,
    events: broadcast::Sender<MarketEvent>,
) {
    let market_id = market.id;
    let mut book = OrderBook::new(market_id);
    let mut seq = match rebuild_book(&store, &mut book, market_id).await {
        Ok(seq) => seq,
        Err(err) => {
            tracing::error!(%market_id, error = %err, "failed to rebuild order book on startup");
            0
        }
    };
    let mut resolved = market.status == MarketStatus::Resolved;
    tracing::info!(%market_id, slug = %market.slug, seq, resolved, "market worker started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            EngineCommand::PlaceOrder { user_id, req, reply } => {
                let side = req.side.to_string();
                let result = if resolved {
                    Err(MatchingError::MarketNotOpen)
                } else {
                    let seq_before = seq;
                    let outcome =
                        handle_place_order(&store, &mut book, &market, &mut seq, taker_fee_bps, user_id, req).await;
                    if outcome.is_err() {
                        // Nothing committed, so no seq this attempt reserved should
                        // stick — a trade-heavy plan can reserve several before
                        // failing partway through.
                        seq = seq_before;
                    }
                    outcome
                };
                match &result {
                    Ok(outcome) => {
                        crate::metrics::record_order_accepted(&market_id.to_string(), &side);
                        for fill in &outcome.fills {
                            crate::metrics::record_trade(&market_id.to_string(), fill.qty, fill.price_cents * fill.qty);
                            // Best-effort fan-out (§6): dropped if nobody is subscribed.
                            let _ = events.send(MarketEvent::Trade {
                                trade_id: fill.trade_id,
                                price_cents: fill.price_cents,
                                qty: fill.qty,
                            });
                        }
                        let _ = events.send(MarketEvent::OrderUpdate {
                            order_id: outcome.order_id,
                            status: outcome.status,
                            remaining_qty: outcome.remaining_qty,
                        });
                    }
                    Err(err) => crate::metrics::record_order_rejected(&market_id.to_string(), &err.to_string()),
                }
                let (bid_levels, ask_levels) = book.snapshot(usize::MAX);
                crate::metrics::record_book_depth(&market_id.to_string(), bid_levels.len(), ask_levels.len());
                if result.is_ok() {
                    let (bids, asks) = book.snapshot(20);
                    let _ = events.send(MarketEvent::BookSnapshot { bids, asks });
                }
                let _ = reply.send(result);
            }
            EngineCommand::CancelOrder { user_id, order_id, reply } => {
                let result = if resolved {
                    Err(MatchingError::MarketNotOpen)
                } else {
                    handle_cancel_order(&store, &mut book, market_id, user_id, order_id).await
                };
                if let Ok(outcome) = &result {
                    crate::metrics::record_order_cancelled(&market_id.to_string());
                    if !outcome.already_terminal {
                        let _ = events.send(MarketEvent::OrderUpdate {
                            order_id,
                            status: OrderStatus::Cancelled,
                            remaining_qty: 0,
                        });
                        let (bids, asks) = book.snapshot(20);
                        let _ = events.send(MarketEvent::BookSnapshot { bids, asks });
                    }
                }
                let _ = reply.send(result);
            }
            EngineCommand::Snapshot { depth, reply } => {
                let _ = reply.send(book.snapshot(depth));
            }
            EngineCommand::Resolve { resolves_to, reply } => {
                if resolved {
                    let _ = reply.send(Err(MatchingError::MarketNotOpen));
                    continue;
                }
                let result = settlement::resolve_market(&store, market_id, resolves_to).await;
                if result.is_ok() {
                    resolved = true;
                    book = OrderBook::new(market_id);
                    let _ = events.send(MarketEvent::MarketResolved { resolves_to });
                }
                let _ = reply.send(result);
            }
        }
    }
    tracing::info!(%market_id, "market worker mailbox closed, exiting");
}

/// Rebuilds in-memory book state from durably-resting orders (§4.4): every
/// OPEN/PARTIAL order, oldest `seq` first, re-enters the book in the order
/// it was originally accepted so price-time priority survives a restart.
async fn rebuild_book(store: &Store, book: &mut OrderBook, market_id: Uuid) -> Result<i64, sqlx::Error> {
    let resting = store.load_resting_orders(market_id).await?;
    for order in resting {
        if let Some(price) = order.price_cents {
            let _ = book.add(RestingOrder {
                order_id: order.id,
                user_id: order.user_id,
                side: order.side,
                price_cents: price,
                remaining_qty: order.remaining_qty,
                seq: order.seq,
            });
        }
    }
    store.max_seq(market_id).await
}

async fn handle_place_order(
    store: &Store,
    book: &mut OrderBook,
    market: &Market,
    seq: &mut i64,
    taker_fee_bps: i64,
    user_id: Uuid,
    req: PlaceOrderRequest,
) -> Result<MatchResult, MatchingError> {
    validate_order_type(req.order_type, req.price_cents)?;
    if req.qty <= 0 {
        return Err(MatchingError::InvalidQty("qty must be positive".to_string()));
    }
    if let OrderType::Limit = req.order_type {
        let price = req.price_cents.expect("validated above");
        if !market.is_valid_price(price) {
            return Err(MatchingError::InvalidPrice(format!(
                "price {} is not a multiple of the {}-cent tick in [1, 99]",
                price, market.tick_size_cents
            )));
        }
    }
    if let Some(client_order_id) = &req.client_order_id {
        if store.client_order_id_exists(user_id, client_order_id).await? {
            return Err(MatchingError::DuplicateClientOrderId);
        }
    }

    let limit_price = match req.order_type {
        OrderType::Limit => req.price_cents,
        OrderType::Market => None,
    };
    let plan = book.find_matches(req.side, limit_price, req.qty, user_id);
    let planned_qty: i64 = plan.iter().map(|f| f.fill_qty).sum();
    let remaining_after_plan = req.qty - planned_qty;

    let rests = matches!(req.order_type, OrderType::Limit) && remaining_after_plan > 0;
    let final_status = if remaining_after_plan == 0 {
        OrderStatus::Filled
    } else if rests {
        if planned_qty > 0 {
            OrderStatus::Partial
        } else {
            OrderStatus::Open
        }
    } else {
        // MARKET order with unfilled remainder never rests (Non-goals, §1).
        OrderStatus::Cancelled
    };
    let reason = if matches!(req.order_type, OrderType::Market) && remaining_after_plan > 0 {
        Some("insufficient liquidity".to_string())
    } else {
        None
    };

    let order_id = Uuid::new_v4();
    let now = Utc::now();
    let requested_lock =
        ledger::required_lock_with_fee_cents(req.side, req.order_type, req.price_cents, req.qty, taker_fee_bps);
    let requested_fee_reserve = ledger::cumulative_fee_lock_cents(req.price_cents, req.qty, taker_fee_bps);

    // The order consumes the next seq; each trade it produces consumes one
    // more after that, in plan order (§4.2 step 5) — both draw from the
    // same per-market counter so Order.seq and Trade.seq never collide.
    *seq += 1;
    let order_seq = *seq;

    let mut tx = store.begin().await?;

    // A fill touches the taker's wallet plus every distinct maker's wallet.
    // Two markets can each be mid-transaction against the same pair of
    // users at once, so every participant's wallet is locked up front here,
    // in one ascending-by-user-id pass (§5), rather than the taker's first
    // and each maker's only as its fill is applied in plan order — the
    // latter lets two concurrent fills lock the same two wallets in
    // opposite orders and deadlock.
    let mut participants: Vec<Uuid> = plan.iter().map(|f| f.maker_user_id).collect();
    participants.push(user_id);
    participants.sort();
    participants.dedup();
    let mut locked_wallets = std::collections::HashMap::with_capacity(participants.len());
    for participant in &participants {
        if let Some(wallet) = Store::lock_wallet_for_update(&mut tx, *participant).await? {
            locked_wallets.insert(*participant, wallet);
        }
    }

    let taker_wallet = locked_wallets
        .get(&user_id)
        .ok_or(MatchingError::InsufficientFunds {
            available_cents: 0,
            required_cents: requested_lock,
        })?;
    let available = taker_wallet.balance_cents - taker_wallet.locked_cents;
    if available < requested_lock {
        tx.rollback().await?;
        return Err(MatchingError::InsufficientFunds {
            available_cents: available,
            required_cents: requested_lock,
        });
    }

    // Lock the full worst-case amount for the order up front (invariant 1, §3).
    Store::adjust_wallet(&mut tx, user_id, 0, requested_lock, now).await?;
    let mut taker_locked_remaining = requested_lock;

    // Releasing the fee-estimate slice of the lock per fill as an
    // independent `ceil` would over-release versus the single `ceil`
    // reserved at placement (Σ ceil(x_i) ≥ ceil(Σ x_i)). Tracking the
    // cumulative quantity filled and releasing the *difference* of
    // `ledger::cumulative_fee_lock_cents` before/after each fill keeps the
    // running total exactly bounded by what was actually reserved.
    let mut taker_filled_qty: i64 = 0;
    let mut taker_fee_released: i64 = 0;

    let mut fills = Vec::with_capacity(plan.len());

    for planned in &plan {
        *seq += 1;
        let trade_seq = *seq;
        let notional = planned.fill_price_cents * planned.fill_qty;
        let taker_fee = ledger::fee_charge_cents(notional, taker_fee_bps);

        let maker_order = Store::lock_order_for_update(&mut tx, planned.maker_order_id)
            .await?
            .ok_or(MatchingError::Internal(format!(
                "maker order {} vanished mid-match",
                planned.maker_order_id
            )))?;
        let maker_remaining = maker_order.remaining_qty - planned.fill_qty;
        if maker_remaining < 0 {
            return Err(MatchingError::Internal(format!(
                "plan overfilled maker order {}",
                planned.maker_order_id
            )));
        }
        let maker_status = if maker_remaining == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
        // A resting order's lock was computed at placement time from the same
        // `required_lock_with_fee_cents` formula regardless of whether it
        // would end up taker or maker (§4.2 step 2 runs once, before either
        // role is known), so filling it as a maker releases both the
        // per-share worst case and its slice of the fee-estimate reserve —
        // the maker never actually pays that fee, so nothing else ever
        // releases it, and a fully-filled order must reach locked_cents == 0
        // (invariant 4, §3). The fee slice is released as the difference of
        // the cumulative ceiling before/after this fill, not as its own
        // independent `ceil`, so a maker order filled across several taker
        // orders never releases more than the single ceiling it reserved at
        // placement.
        let maker_filled_before = maker_order.qty - maker_order.remaining_qty;
        let maker_filled_after = maker_order.qty - maker_remaining;
        let maker_fee_release = ledger::cumulative_fee_lock_cents(maker_order.price_cents, maker_filled_after, taker_fee_bps)
            - ledger::cumulative_fee_lock_cents(maker_order.price_cents, maker_filled_before, taker_fee_bps);
        let maker_release =
            leg_lock_release(maker_order.side, maker_order.order_type, maker_order.price_cents, planned.fill_qty) + maker_fee_release;
        Store::update_order_progress(
            &mut tx,
            maker_order.id,
            maker_remaining,
            maker_order.locked_cents - maker_release,
            maker_status,
            now,
        )
        .await?;

        apply_trade_leg(
            &mut tx,
            market.id,
            maker_order.user_id,
            maker_order.side,
            planned.fill_qty,
            planned.fill_price_cents,
            now,
        )
        .await?;
        // The order-row release above only updates `orders.locked_cents`;
        // the wallet's lock bucket needs its own matching release or the
        // maker's wallet would still be holding collateral for shares that
        // just filled (invariant 2, §3).
        Store::adjust_wallet(&mut tx, maker_order.user_id, 0, -maker_release, now).await?;

        apply_trade_leg(
            &mut tx,
            market.id,
            user_id,
            req.side,
            planned.fill_qty,
            planned.fill_price_cents,
            now,
        )
        .await?;
        // The taker fee is an extra debit on top of the leg's cash movement.
        Store::adjust_wallet(&mut tx, user_id, -taker_fee, 0, now).await?;
        Store::credit_platform_fee(&mut tx, taker_fee).await?;

        // Release both the per-share worst-case lock and its pro-rated slice
        // of the fee estimate for this fill's quantity: the fee actually
        // charged above is debited from balance, not lock, so the estimate
        // reserved against it must come out of lock now or it never would.
        // As on the maker side, the fee slice is the difference of the
        // cumulative ceiling before/after this fill so the running total
        // release across the order's fills never exceeds the single ceiling
        // reserved in `requested_lock` at placement.
        taker_filled_qty += planned.fill_qty;
        let taker_fee_lock_after = ledger::cumulative_fee_lock_cents(req.price_cents, taker_filled_qty, taker_fee_bps);
        let taker_fee_release = taker_fee_lock_after - taker_fee_released;
        taker_fee_released = taker_fee_lock_after;
        let taker_release = leg_lock_release(req.side, req.order_type, req.price_cents, planned.fill_qty) + taker_fee_release;
        Store::adjust_wallet(&mut tx, user_id, 0, -taker_release, now).await?;
        taker_locked_remaining -= taker_release;

        let trade_id = Uuid::new_v4();
        let trade = Trade {
            id: trade_id,
            market_id: market.id,
            maker_order_id: maker_order.id,
            taker_order_id: order_id,
            maker_user_id: maker_order.user_id,
            taker_user_id: user_id,
            price_cents: planned.fill_price_cents,
            qty: planned.fill_qty,
            taker_fee_cents: taker_fee,
            seq: trade_seq,
            created_at: now,
        };
        Store::insert_trade(&mut tx, &trade).await?;
        Store::append_event(
            &mut tx,
            Some(market.id),
            Some(trade_seq),
            &EventPayload::TradeExecuted {
                trade_id,
                maker_order_id: maker_order.id,
                taker_order_id: order_id,
                price_cents: planned.fill_price_cents,
                qty: planned.fill_qty,
                taker_fee_cents: taker_fee,
            },
        )
        .await?;
        if maker_status == OrderStatus::Filled {
            Store::append_event(
                &mut tx,
                Some(market.id),
                None,
                &EventPayload::OrderFilled { order_id: maker_order.id },
            )
            .await?;
        }

        fills.push(FillReceipt {
            trade_id,
            maker_order_id: maker_order.id,
            price_cents: planned.fill_price_cents,
            qty: planned.fill_qty,
            fee_cents: taker_fee,
            seq: trade_seq,
        });
    }

    // Release any lock left over for quantity that never rests (MARKET
    // remainder) or was never meant to be locked again once resolved. The
    // fee slice here is whatever's left of the original reserve after every
    // fill's cumulative release above, not a fresh `ceil` over the
    // remainder — the same reasoning as each fill's release, just collapsed
    // to the one leg left at the end of the order's life.
    if !rests && remaining_after_plan > 0 {
        let unused_per_share = ledger::per_share_lock_cents(req.side, req.order_type, req.price_cents);
        let remaining_fee_release = requested_fee_reserve - taker_fee_released;
        let release = unused_per_share * remaining_after_plan + remaining_fee_release;
        Store::adjust_wallet(&mut tx, user_id, 0, -release, now).await?;
        taker_locked_remaining -= release;
    }

    let order = Order {
        id: order_id,
        market_id: market.id,
        user_id,
        side: req.side,
        order_type: req.order_type,
        price_cents: req.price_cents,
        qty: req.qty,
        remaining_qty: if rests { remaining_after_plan } else { 0 },
        locked_cents: if rests { taker_locked_remaining } else { 0 },
        status: final_status,
        seq: order_seq,
        client_order_id: req.client_order_id.clone(),
        created_at: now,
        updated_at: now,
    };
    Store::insert_order(&mut tx, &order).await?;
    Store::append_event(
        &mut tx,
        Some(market.id),
        Some(order_seq),
        &EventPayload::OrderAccepted {
            order_id,
            user_id,
            side: req.side.to_string(),
            order_type: req.order_type.to_string(),
            price_cents: req.price_cents,
            qty: req.qty,
        },
    )
    .await?;
    if final_status == OrderStatus::Filled {
        Store::append_event(&mut tx, Some(market.id), None, &EventPayload::OrderFilled { order_id }).await?;
    }

    tx.commit().await?;

    // Only now, after a committed transaction, mutate the in-memory book
    // (§9): a crash between commit and here is recovered by `rebuild_book`
    // on the next startup, so the book is always reconstructible from the
    // store alone.
    for planned in &plan {
        let _ = book.apply_fill(planned.maker_order_id, planned.fill_qty);
    }
    if rests {
        let _ = book.add(RestingOrder {
            order_id,
            user_id,
            side: req.side,
            price_cents: req.price_cents.expect("limit order rests only with a price"),
            remaining_qty: remaining_after_plan,
            seq: order_seq,
        });
    }

    Ok(MatchResult {
        order_id,
        status: final_status,
        remaining_qty: order.remaining_qty,
        locked_cents: order.locked_cents,
        fills,
        reason,
    })
}

/// Cents released from an order's own collateral lock for `qty` shares
/// filled at the order's declared terms — always the full per-share rate,
/// since a fill either pays cash (BUY) or converts the lock into the
/// position's short collateral (SELL), both handled by [`apply_trade_leg`].
fn leg_lock_release(side: Side, order_type: OrderType, price_cents: Option<i64>, qty: i64) -> i64 {
    ledger::per_share_lock_cents(side, order_type, price_cents) * qty
}

/// Applies one fill leg's cash and position effects for `user_id` (§4.3).
///
/// This only ever moves cash and the *position*-side lock (the short
/// collateral a SELL opens or a BUY releases by covering). The order's own
/// upfront collateral reservation is a separate bucket the caller releases
/// explicitly — once per fill for the maker, once in total for the taker
/// (§4.2 step 5) — since double-releasing it here as well as at the call
/// site would push a wallet's lock below what invariant 2 says it should be.
#[allow(clippy::too_many_arguments)]
async fn apply_trade_leg(
    tx: &mut crate::services::store::Tx<'_>,
    market_id: Uuid,
    user_id: Uuid,
    side: Side,
    fill_qty: i64,
    fill_price_cents: i64,
    now: chrono::DateTime<Utc>,
) -> Result<(), MatchingError> {
    let position = Store::get_position(tx, market_id, user_id)
        .await?
        .unwrap_or_else(|| Position::empty(market_id, user_id));

    let short_lock_rate = 100 - fill_price_cents;
    let delta = ledger::apply_trade_to_position(
        position.yes_shares,
        position.avg_cost_cents,
        position.locked_cents,
        side,
        fill_qty,
        fill_price_cents,
        short_lock_rate,
    );

    let position_locked_delta = delta.new_locked_cents - position.locked_cents;
    let notional = fill_price_cents * fill_qty;
    let cash_delta = match side {
        Side::Buy => -notional,
        Side::Sell => notional,
    };

    Store::adjust_wallet(tx, user_id, cash_delta, position_locked_delta, now).await?;

    let updated = Position {
        market_id,
        user_id,
        yes_shares: delta.new_yes_shares,
        avg_cost_cents: delta.new_avg_cost_cents,
        realized_pnl_cents: position.realized_pnl_cents + delta.realized_pnl_delta_cents,
        locked_cents: delta.new_locked_cents,
        updated_at: now,
    };
    Store::upsert_position(tx, &updated).await?;
    Ok(())
}

async fn handle_cancel_order(
    store: &Store,
    book: &mut OrderBook,
    market_id: Uuid,
    user_id: Uuid,
    order_id: Uuid,
) -> Result<CancelOutcome, MatchingError> {
    let mut tx = store.begin().await?;
    let order = Store::lock_order_for_update(&mut tx, order_id)
        .await?
        .ok_or(MatchingError::OrderNotFound(order_id))?;
    if order.user_id != user_id {
        tx.rollback().await?;
        return Err(MatchingError::Forbidden);
    }
    if order.market_id != market_id {
        tx.rollback().await?;
        return Err(MatchingError::OrderNotFound(order_id));
    }
    if order.status.is_terminal() {
        // Cancelling an already-terminal order is idempotent, not an error.
        tx.rollback().await?;
        return Ok(CancelOutcome { already_terminal: true });
    }

    let now = Utc::now();
    Store::update_order_progress(&mut tx, order_id, 0, 0, OrderStatus::Cancelled, now).await?;
    Store::adjust_wallet(&mut tx, user_id, 0, -order.locked_cents, now).await?;
    Store::append_event(
        &mut tx,
        Some(market_id),
        None,
        &EventPayload::OrderCanceled {
            order_id,
            reason: "user requested".to_string(),
        },
    )
    .await?;
    tx.commit().await?;

    book.remove(order_id);
    Ok(CancelOutcome { already_terminal: false })
}
