//! Metrics for the core matching/settlement path: just what this crate
//! itself produces — no funding/liquidation/cache/WS metrics here, since
//! those subsystems don't exist in this core.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub mod names {
    pub const ORDERS_ACCEPTED_TOTAL: &str = "orders_accepted_total";
    pub const ORDERS_REJECTED_TOTAL: &str = "orders_rejected_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const TRADE_VOLUME_CENTS_TOTAL: &str = "trade_volume_cents_total";
    pub const MARKET_ORDERBOOK_DEPTH: &str = "market_orderbook_depth";
}

pub mod labels {
    pub const MARKET_ID: &str = "market_id";
    pub const SIDE: &str = "side";
    pub const REASON: &str = "reason";
}

/// Installs the process-wide Prometheus recorder. Called once at startup.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_order_accepted(market_id: &str, side: &str) {
    counter!(
        names::ORDERS_ACCEPTED_TOTAL,
        labels::MARKET_ID => market_id.to_string(),
        labels::SIDE => side.to_string()
    )
    .increment(1);
}

pub fn record_order_rejected(market_id: &str, reason: &str) {
    counter!(
        names::ORDERS_REJECTED_TOTAL,
        labels::MARKET_ID => market_id.to_string(),
        labels::REASON => reason.to_string()
    )
    .increment(1);
}

pub fn record_order_cancelled(market_id: &str) {
    counter!(names::ORDERS_CANCELLED_TOTAL, labels::MARKET_ID => market_id.to_string()).increment(1);
}

pub fn record_trade(market_id: &str, qty: i64, notional_cents: i64) {
    counter!(names::TRADES_EXECUTED_TOTAL, labels::MARKET_ID => market_id.to_string()).increment(1);
    counter!(names::TRADE_VOLUME_CENTS_TOTAL, labels::MARKET_ID => market_id.to_string())
        .increment(notional_cents.max(0) as u64);
    let _ = qty;
}

pub fn record_book_depth(market_id: &str, bid_levels: usize, ask_levels: usize) {
    gauge!(names::MARKET_ORDERBOOK_DEPTH, labels::MARKET_ID => market_id.to_string(), "side" => "bid")
        .set(bid_levels as f64);
    gauge!(names::MARKET_ORDERBOOK_DEPTH, labels::MARKET_ID => market_id.to_string(), "side" => "ask")
        .set(ask_levels as f64);
}
