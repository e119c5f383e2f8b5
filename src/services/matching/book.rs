//! Per-market limit order book (§4.1).
//!
//! Bids are kept highest-first, asks lowest-first, each as a
//! `BTreeMap<price_cents, VecDeque<RestingOrder>>` so a price level is a
//! plain FIFO queue and level iteration is already sorted by price. A flat
//! index gives O(1) lookup and cancel by order id. The book is owned by
//! exactly one writer (the market's engine task, §4.2) — it carries no
//! internal locking of its own.

use super::types::{MatchingError, PlannedFill, RestingOrder};
use crate::models::OrderSide as Side;
use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

pub struct OrderBook {
    market_id: Uuid,
    bids: BTreeMap<i64, VecDeque<RestingOrder>>,
    asks: BTreeMap<i64, VecDeque<RestingOrder>>,
    index: HashMap<Uuid, (Side, i64)>,
}

impl OrderBook {
    pub fn new(market_id: Uuid) -> Self {
        Self {
            market_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn market_id(&self) -> Uuid {
        self.market_id
    }

    pub fn best_bid(&self) -> Option<i64> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<i64> {
        self.asks.keys().next().copied()
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    pub fn has_order(&self, order_id: &Uuid) -> bool {
        self.index.contains_key(order_id)
    }

    fn side_book(&self, side: Side) -> &BTreeMap<i64, VecDeque<RestingOrder>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_book_mut(&mut self, side: Side) -> &mut BTreeMap<i64, VecDeque<RestingOrder>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Insert a resting order. Rejects a duplicate `order_id`.
    pub fn add(&mut self, entry: RestingOrder) -> Result<(), MatchingError> {
        if self.index.contains_key(&entry.order_id) {
            return Err(MatchingError::Internal(format!(
                "order {} already present in book",
                entry.order_id
            )));
        }
        let side = entry.side;
        let price = entry.price_cents;
        let order_id = entry.order_id;
        self.side_book_mut(side)
            .entry(price)
            .or_insert_with(VecDeque::new)
            .push_back(entry);
        self.index.insert(order_id, (side, price));
        Ok(())
    }

    /// Remove an order unconditionally (used for cancels and settlement).
    pub fn remove(&mut self, order_id: Uuid) -> Option<RestingOrder> {
        let (side, price) = self.index.remove(&order_id)?;
        let book = self.side_book_mut(side);
        let queue = book.get_mut(&price)?;
        let pos = queue.iter().position(|o| o.order_id == order_id)?;
        let removed = queue.remove(pos)?;
        if queue.is_empty() {
            book.remove(&price);
        }
        Some(removed)
    }

    /// Decrement an order's remaining quantity, removing it once it reaches
    /// zero. Returns the new remaining quantity.
    pub fn apply_fill(&mut self, order_id: Uuid, qty: i64) -> Result<i64, MatchingError> {
        let (side, price) = *self
            .index
            .get(&order_id)
            .ok_or(MatchingError::OrderNotFound(order_id))?;
        let book = self.side_book_mut(side);
        let queue = book
            .get_mut(&price)
            .ok_or(MatchingError::OrderNotFound(order_id))?;
        let entry = queue
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or(MatchingError::OrderNotFound(order_id))?;
        if qty > entry.remaining_qty {
            return Err(MatchingError::Internal(format!(
                "apply_fill qty {} exceeds remaining {} for order {}",
                qty, entry.remaining_qty, order_id
            )));
        }
        entry.remaining_qty -= qty;
        let remaining = entry.remaining_qty;
        if remaining == 0 {
            let pos = queue.iter().position(|o| o.order_id == order_id).unwrap();
            queue.remove(pos);
            if queue.is_empty() {
                book.remove(&price);
            }
            self.index.remove(&order_id);
        }
        Ok(remaining)
    }

    /// Walk the opposite side of the book and produce a non-mutating fill
    /// plan for an incoming order of `side`/`limit_price`/`max_qty` (§4.1).
    /// Entries belonging to `exclude_user_id` are skipped silently
    /// (self-trade prevention) — their quantity is left for the next
    /// eligible entry and no fill is produced against them.
    pub fn find_matches(
        &self,
        side: Side,
        limit_price: Option<i64>,
        max_qty: i64,
        exclude_user_id: Uuid,
    ) -> Vec<PlannedFill> {
        let mut plan = Vec::new();
        let mut remaining = max_qty;
        let opposite = self.side_book(side.opposite());

        let levels: Vec<i64> = match side {
            Side::Buy => opposite.keys().copied().collect(),
            Side::Sell => opposite.keys().rev().copied().collect(),
        };

        for price in levels {
            if remaining <= 0 {
                break;
            }
            if let Some(limit) = limit_price {
                let crosses = match side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                };
                if !crosses {
                    break;
                }
            }
            let Some(queue) = opposite.get(&price) else {
                continue;
            };
            for maker in queue.iter() {
                if remaining <= 0 {
                    break;
                }
                if maker.user_id == exclude_user_id {
                    continue;
                }
                let fill_qty = remaining.min(maker.remaining_qty);
                if fill_qty <= 0 {
                    continue;
                }
                plan.push(PlannedFill {
                    maker_order_id: maker.order_id,
                    maker_user_id: maker.user_id,
                    maker_seq: maker.seq,
                    fill_price_cents: maker.price_cents,
                    fill_qty,
                });
                remaining -= fill_qty;
            }
        }

        plan
    }

    /// Aggregated depth snapshot: bids descending, asks ascending, at most
    /// `depth` levels per side.
    pub fn snapshot(&self, depth: usize) -> (Vec<(i64, i64)>, Vec<(i64, i64)>) {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(price, q)| (*price, q.iter().map(|o| o.remaining_qty).sum()))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(price, q)| (*price, q.iter().map(|o| o.remaining_qty).sum()))
            .collect();
        (bids, asks)
    }
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(order_id: Uuid, user_id: Uuid, side: Side, price: i64, qty: i64, seq: i64) -> RestingOrder {
        RestingOrder {
            order_id,
            user_id,
            side,
            price_cents: price,
            remaining_qty: qty,
            seq,
        }
    }

    #[test]
    fn add_and_cancel_round_trips() {
        let mut book = OrderBook::new(Uuid::new_v4());
        let id = Uuid::new_v4();
        book.add(entry(id, Uuid::new_v4(), Side::Buy, 50, 10, 1)).unwrap();
        assert!(book.has_order(&id));
        assert_eq!(book.order_count(), 1);

        let removed = book.remove(id).unwrap();
        assert_eq!(removed.order_id, id);
        assert!(!book.has_order(&id));
        assert_eq!(book.order_count(), 0);
    }

    #[test]
    fn best_bid_ask_and_duplicate_rejected() {
        let mut book = OrderBook::new(Uuid::new_v4());
        book.add(entry(Uuid::new_v4(), Uuid::new_v4(), Side::Buy, 40, 5, 1)).unwrap();
        book.add(entry(Uuid::new_v4(), Uuid::new_v4(), Side::Buy, 45, 5, 2)).unwrap();
        book.add(entry(Uuid::new_v4(), Uuid::new_v4(), Side::Sell, 55, 5, 3)).unwrap();
        book.add(entry(Uuid::new_v4(), Uuid::new_v4(), Side::Sell, 58, 5, 4)).unwrap();

        assert_eq!(book.best_bid(), Some(45));
        assert_eq!(book.best_ask(), Some(55));

        let dup = Uuid::new_v4();
        book.add(entry(dup, Uuid::new_v4(), Side::Buy, 40, 1, 5)).unwrap();
        assert!(book.add(entry(dup, Uuid::new_v4(), Side::Buy, 40, 1, 6)).is_err());
    }

    #[test]
    fn find_matches_walks_price_then_fifo() {
        let mut book = OrderBook::new(Uuid::new_v4());
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let ask1 = Uuid::new_v4();
        let ask2 = Uuid::new_v4();
        let ask3 = Uuid::new_v4();
        book.add(entry(ask1, user_a, Side::Sell, 55, 10, 1)).unwrap();
        book.add(entry(ask2, user_a, Side::Sell, 58, 5, 2)).unwrap();
        book.add(entry(ask3, user_a, Side::Sell, 60, 20, 3)).unwrap();

        let plan = book.find_matches(Side::Buy, Some(60), 18, user_b);
        assert_eq!(plan.len(), 3);
        assert_eq!((plan[0].fill_price_cents, plan[0].fill_qty), (55, 10));
        assert_eq!((plan[1].fill_price_cents, plan[1].fill_qty), (58, 5));
        assert_eq!((plan[2].fill_price_cents, plan[2].fill_qty), (60, 3));

        // find_matches never mutates the book.
        assert_eq!(book.order_count(), 3);
    }

    #[test]
    fn self_trade_is_skipped_not_matched() {
        let mut book = OrderBook::new(Uuid::new_v4());
        let user = Uuid::new_v4();
        book.add(entry(Uuid::new_v4(), user, Side::Sell, 55, 10, 1)).unwrap();

        let plan = book.find_matches(Side::Buy, Some(60), 10, user);
        assert!(plan.is_empty());
    }

    #[test]
    fn apply_fill_removes_on_zero_and_errors_on_overfill() {
        let mut book = OrderBook::new(Uuid::new_v4());
        let id = Uuid::new_v4();
        book.add(entry(id, Uuid::new_v4(), Side::Buy, 50, 10, 1)).unwrap();

        let remaining = book.apply_fill(id, 4).unwrap();
        assert_eq!(remaining, 6);
        assert!(book.has_order(&id));

        assert!(book.apply_fill(id, 100).is_err());

        let remaining = book.apply_fill(id, 6).unwrap();
        assert_eq!(remaining, 0);
        assert!(!book.has_order(&id));
    }

    #[test]
    fn snapshot_aggregates_per_level() {
        let mut book = OrderBook::new(Uuid::new_v4());
        book.add(entry(Uuid::new_v4(), Uuid::new_v4(), Side::Buy, 50, 4, 1)).unwrap();
        book.add(entry(Uuid::new_v4(), Uuid::new_v4(), Side::Buy, 50, 6, 2)).unwrap();
        book.add(entry(Uuid::new_v4(), Uuid::new_v4(), Side::Sell, 60, 3, 3)).unwrap();

        let (bids, asks) = book.snapshot(10);
        assert_eq!(bids, vec![(50, 10)]);
        assert_eq!(asks, vec![(60, 3)]);
    }
}
