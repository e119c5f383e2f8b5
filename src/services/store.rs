//! Durable persistence primitives.
//!
//! Each function here does one row-level thing against a transaction handed
//! to it by the caller; the matching engine and settlement service compose
//! these into whole-operation transactions (§3/§4.2/§4.5). Keeping commit
//! boundaries at the call site — instead of each function opening and
//! committing its own transaction — is what lets `PlaceOrder` cover the
//! wallet lock, order row, trades, position updates and event append with
//! one atomic commit.

use crate::models::{
    EventPayload, Market, MarketStatus, Order, OrderStatus, Position, Trade, Wallet,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub type Tx<'a> = Transaction<'a, Postgres>;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Tx<'_>, sqlx::Error> {
        self.pool.begin().await
    }

    // -- markets --------------------------------------------------------

    pub async fn get_market(&self, market_id: Uuid) -> Result<Option<Market>, sqlx::Error> {
        sqlx::query_as::<_, Market>("SELECT * FROM markets WHERE id = $1")
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_market_by_slug(&self, slug: &str) -> Result<Option<Market>, sqlx::Error> {
        sqlx::query_as::<_, Market>("SELECT * FROM markets WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_open_markets(&self) -> Result<Vec<Market>, sqlx::Error> {
        sqlx::query_as::<_, Market>("SELECT * FROM markets WHERE status = 'open'")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn insert_market(&self, market: &Market) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO markets (id, slug, title, description, tick_size_cents, status, resolves_to, resolved_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(market.id)
        .bind(&market.slug)
        .bind(&market.title)
        .bind(&market.description)
        .bind(market.tick_size_cents)
        .bind(market.status)
        .bind(market.resolves_to)
        .bind(market.resolved_at)
        .bind(market.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn lock_market_for_update(
        tx: &mut Tx<'_>,
        market_id: Uuid,
    ) -> Result<Option<Market>, sqlx::Error> {
        sqlx::query_as::<_, Market>("SELECT * FROM markets WHERE id = $1 FOR UPDATE")
            .bind(market_id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub async fn resolve_market(
        tx: &mut Tx<'_>,
        market_id: Uuid,
        resolves_to: crate::models::Resolution,
        resolved_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE markets SET status = $2, resolves_to = $3, resolved_at = $4 WHERE id = $1",
        )
        .bind(market_id)
        .bind(MarketStatus::Resolved)
        .bind(resolves_to)
        .bind(resolved_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    // -- orders -----------------------------------------------------------

    pub async fn load_resting_orders(&self, market_id: Uuid) -> Result<Vec<Order>, sqlx::Error> {
        sqlx::query_as::<_, Order>(
            "SELECT * FROM orders
             WHERE market_id = $1 AND status IN ('open', 'partial')
             ORDER BY seq ASC",
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn max_seq(&self, market_id: Uuid) -> Result<i64, sqlx::Error> {
        let row: (Option<i64>,) =
            sqlx::query_as("SELECT MAX(seq) FROM orders WHERE market_id = $1")
                .bind(market_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0.unwrap_or(0))
    }

    pub async fn client_order_id_exists(
        &self,
        user_id: Uuid,
        client_order_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE user_id = $1 AND client_order_id = $2)",
        )
        .bind(user_id)
        .bind(client_order_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn insert_order(tx: &mut Tx<'_>, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO orders
             (id, market_id, user_id, side, order_type, price_cents, qty, remaining_qty,
              locked_cents, status, seq, client_order_id, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
        )
        .bind(order.id)
        .bind(order.market_id)
        .bind(order.user_id)
        .bind(order.side)
        .bind(order.order_type)
        .bind(order.price_cents)
        .bind(order.qty)
        .bind(order.remaining_qty)
        .bind(order.locked_cents)
        .bind(order.status)
        .bind(order.seq)
        .bind(&order.client_order_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn lock_order_for_update(
        tx: &mut Tx<'_>,
        order_id: Uuid,
    ) -> Result<Option<Order>, sqlx::Error> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, sqlx::Error> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn update_order_progress(
        tx: &mut Tx<'_>,
        order_id: Uuid,
        remaining_qty: i64,
        locked_cents: i64,
        status: OrderStatus,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE orders SET remaining_qty = $2, locked_cents = $3, status = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(order_id)
        .bind(remaining_qty)
        .bind(locked_cents)
        .bind(status)
        .bind(updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn cancel_all_resting_orders_in_tx(
        tx: &mut Tx<'_>,
        market_id: Uuid,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Order>, sqlx::Error> {
        sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = 'cancelled', remaining_qty = 0, locked_cents = 0, updated_at = $2
             WHERE market_id = $1 AND status IN ('open', 'partial')
             RETURNING *",
        )
        .bind(market_id)
        .bind(updated_at)
        .fetch_all(&mut **tx)
        .await
    }

    // -- trades -------------------------------------------------------------

    pub async fn insert_trade(tx: &mut Tx<'_>, trade: &Trade) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO trades
             (id, market_id, maker_order_id, taker_order_id, maker_user_id, taker_user_id,
              price_cents, qty, taker_fee_cents, seq, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
        )
        .bind(trade.id)
        .bind(trade.market_id)
        .bind(trade.maker_order_id)
        .bind(trade.taker_order_id)
        .bind(trade.maker_user_id)
        .bind(trade.taker_user_id)
        .bind(trade.price_cents)
        .bind(trade.qty)
        .bind(trade.taker_fee_cents)
        .bind(trade.seq)
        .bind(trade.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    // -- wallets --------------------------------------------------------

    pub async fn ensure_wallet(&self, user_id: Uuid) -> Result<Wallet, sqlx::Error> {
        sqlx::query_as::<_, Wallet>(
            "INSERT INTO wallets (user_id, balance_cents, locked_cents, updated_at)
             VALUES ($1, 0, 0, now())
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
             RETURNING *",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn lock_wallet_for_update(
        tx: &mut Tx<'_>,
        user_id: Uuid,
    ) -> Result<Option<Wallet>, sqlx::Error> {
        sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, sqlx::Error> {
        sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn adjust_wallet(
        tx: &mut Tx<'_>,
        user_id: Uuid,
        delta_balance_cents: i64,
        delta_locked_cents: i64,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Wallet, sqlx::Error> {
        sqlx::query_as::<_, Wallet>(
            "UPDATE wallets
             SET balance_cents = balance_cents + $2,
                 locked_cents = locked_cents + $3,
                 updated_at = $4
             WHERE user_id = $1
             RETURNING *",
        )
        .bind(user_id)
        .bind(delta_balance_cents)
        .bind(delta_locked_cents)
        .bind(updated_at)
        .fetch_one(&mut **tx)
        .await
    }

    pub async fn credit_platform_fee(tx: &mut Tx<'_>, amount_cents: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO platform_fee_wallet (id, collected_cents) VALUES (1, $1)
             ON CONFLICT (id) DO UPDATE SET collected_cents = platform_fee_wallet.collected_cents + $1",
        )
        .bind(amount_cents)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    // -- positions --------------------------------------------------------

    pub async fn get_position(
        tx: &mut Tx<'_>,
        market_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Position>, sqlx::Error> {
        sqlx::query_as::<_, Position>(
            "SELECT * FROM positions WHERE market_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(market_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn list_positions_for_market(
        tx: &mut Tx<'_>,
        market_id: Uuid,
    ) -> Result<Vec<Position>, sqlx::Error> {
        sqlx::query_as::<_, Position>(
            "SELECT * FROM positions WHERE market_id = $1 AND yes_shares != 0 FOR UPDATE",
        )
        .bind(market_id)
        .fetch_all(&mut **tx)
        .await
    }

    pub async fn upsert_position(tx: &mut Tx<'_>, position: &Position) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO positions
             (market_id, user_id, yes_shares, avg_cost_cents, realized_pnl_cents, locked_cents, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             ON CONFLICT (market_id, user_id) DO UPDATE SET
               yes_shares = EXCLUDED.yes_shares,
               avg_cost_cents = EXCLUDED.avg_cost_cents,
               realized_pnl_cents = EXCLUDED.realized_pnl_cents,
               locked_cents = EXCLUDED.locked_cents,
               updated_at = EXCLUDED.updated_at",
        )
        .bind(position.market_id)
        .bind(position.user_id)
        .bind(position.yes_shares)
        .bind(position.avg_cost_cents)
        .bind(position.realized_pnl_cents)
        .bind(position.locked_cents)
        .bind(position.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    // -- events -------------------------------------------------------------

    pub async fn append_event(
        tx: &mut Tx<'_>,
        market_id: Option<Uuid>,
        seq: Option<i64>,
        payload: &EventPayload,
    ) -> Result<(), sqlx::Error> {
        let body = serde_json::to_value(payload).expect("EventPayload always serializes");
        sqlx::query(
            "INSERT INTO event_log (market_id, seq, event_type, payload, created_at)
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(market_id)
        .bind(seq)
        .bind(payload.type_name())
        .bind(body)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
