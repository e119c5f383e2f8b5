//! The per-market limit order book and matching engine (§4.1, §4.2).

pub mod book;
pub mod engine;
pub mod types;
pub mod worker;

pub use engine::MatchingEngine;
pub use types::{CancelOutcome, FillReceipt, MarketEvent, MatchResult, MatchingError, PlannedFill, RestingOrder};
