//! The top-level market registry (§4.2, §9).
//!
//! `MatchingEngine` hands every request to the one mailbox for that
//! market — it holds no book state itself. Looking markets up by id is the
//! only thing that needs to be safe for concurrent readers, so it is a
//! `DashMap` rather than anything heavier; everything past that point runs
//! single-threaded inside the market's own worker task.

use super::types::{CancelOutcome, MarketEvent, MatchResult, MatchingError};
use super::worker::{self, EngineCommand};
use crate::models::{Market, MarketStatus, PlaceOrderRequest, Resolution, Wallet};
use crate::services::settlement::SettlementSummary;
use crate::services::store::Store;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

#[derive(Clone)]
struct MarketHandle {
    sender: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<MarketEvent>,
}

#[derive(Clone)]
pub struct MatchingEngine {
    store: Store,
    markets: Arc<DashMap<Uuid, MarketHandle>>,
    taker_fee_bps: i64,
    mailbox_capacity: usize,
}

impl MatchingEngine {
    pub fn new(store: Store, taker_fee_bps: i64, mailbox_capacity: usize) -> Self {
        Self {
            store,
            markets: Arc::new(DashMap::new()),
            taker_fee_bps,
            mailbox_capacity,
        }
    }

    /// Spawns a worker for every OPEN market found in the store. Resolved
    /// markets need no worker: there is nothing left for them to process.
    pub async fn recover(&self) -> Result<usize, sqlx::Error> {
        let markets = self.store.list_open_markets().await?;
        let count = markets.len();
        for market in markets {
            self.spawn_worker(market);
        }
        Ok(count)
    }

    fn spawn_worker(&self, market: Market) {
        let (sender, events) = worker::spawn(
            self.store.clone(),
            market.clone(),
            self.taker_fee_bps,
            self.mailbox_capacity,
        );
        self.markets.insert(market.id, MarketHandle { sender, events });
    }

    pub async fn create_market(
        &self,
        slug: String,
        title: String,
        description: String,
        tick_size_cents: i32,
    ) -> Result<Market, sqlx::Error> {
        let market = Market {
            id: Uuid::new_v4(),
            slug,
            title,
            description,
            tick_size_cents,
            status: MarketStatus::Open,
            resolves_to: None,
            resolved_at: None,
            created_at: Utc::now(),
        };
        self.store.insert_market(&market).await?;
        let mut tx = self.store.begin().await?;
        crate::services::store::Store::append_event(
            &mut tx,
            Some(market.id),
            None,
            &crate::models::EventPayload::MarketCreated {
                slug: market.slug.clone(),
                tick_size_cents: market.tick_size_cents,
            },
        )
        .await?;
        tx.commit().await?;
        self.spawn_worker(market.clone());
        Ok(market)
    }

    /// Credits a user's wallet balance out-of-band from any market (§6's
    /// `Deposit` event). Not routed through a market worker: deposits touch
    /// only the depositor's own wallet row, so there is nothing for a
    /// per-market single writer to serialize against.
    pub async fn deposit(&self, user_id: Uuid, amount_cents: i64) -> Result<Wallet, MatchingError> {
        if amount_cents <= 0 {
            return Err(MatchingError::InvalidQty(
                "deposit amount must be positive".to_string(),
            ));
        }
        self.store.ensure_wallet(user_id).await?;
        let mut tx = self.store.begin().await?;
        let wallet = Store::adjust_wallet(&mut tx, user_id, amount_cents, 0, Utc::now()).await?;
        Store::append_event(
            &mut tx,
            None,
            None,
            &crate::models::EventPayload::Deposit {
                user_id,
                amount_cents,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(wallet)
    }

    fn handle(&self, market_id: Uuid) -> Result<mpsc::Sender<EngineCommand>, MatchingError> {
        self.markets
            .get(&market_id)
            .map(|h| h.sender.clone())
            .ok_or(MatchingError::MarketNotFound(market_id))
    }

    /// Subscribes to one market's best-effort notification stream (§6):
    /// `book_snapshot`/`trade`/`order_update`/`market_resolved`. A lagging
    /// subscriber just misses older messages (`broadcast::error::RecvError::Lagged`)
    /// rather than blocking the worker that produces them.
    pub fn subscribe(&self, market_id: Uuid) -> Result<broadcast::Receiver<MarketEvent>, MatchingError> {
        self.markets
            .get(&market_id)
            .map(|h| h.events.subscribe())
            .ok_or(MatchingError::MarketNotFound(market_id))
    }

    pub async fn place_order(
        &self,
        market_id: Uuid,
        user_id: Uuid,
        req: PlaceOrderRequest,
    ) -> Result<MatchResult, MatchingError> {
        let sender = self.handle(market_id)?;
        let (reply, rx) = oneshot::channel();
        sender
            .send(EngineCommand::PlaceOrder { user_id, req, reply })
            .await
            .map_err(|_| MatchingError::Internal("market worker mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| MatchingError::Internal("market worker dropped reply".to_string()))?
    }

    pub async fn cancel_order(
        &self,
        market_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<CancelOutcome, MatchingError> {
        let sender = self.handle(market_id)?;
        let (reply, rx) = oneshot::channel();
        sender
            .send(EngineCommand::CancelOrder { user_id, order_id, reply })
            .await
            .map_err(|_| MatchingError::Internal("market worker mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| MatchingError::Internal("market worker dropped reply".to_string()))?
    }

    pub async fn book_snapshot(
        &self,
        market_id: Uuid,
        depth: usize,
    ) -> Result<(Vec<(i64, i64)>, Vec<(i64, i64)>), MatchingError> {
        let sender = self.handle(market_id)?;
        let (reply, rx) = oneshot::channel();
        sender
            .send(EngineCommand::Snapshot { depth, reply })
            .await
            .map_err(|_| MatchingError::Internal("market worker mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| MatchingError::Internal("market worker dropped reply".to_string()))
    }

    pub async fn resolve_market(
        &self,
        market_id: Uuid,
        resolves_to: Resolution,
    ) -> Result<SettlementSummary, MatchingError> {
        let sender = self.handle(market_id)?;
        let (reply, rx) = oneshot::channel();
        sender
            .send(EngineCommand::Resolve { resolves_to, reply })
            .await
            .map_err(|_| MatchingError::Internal("market worker mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| MatchingError::Internal("market worker dropped reply".to_string()))?
    }
}
