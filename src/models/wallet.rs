#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A user's collateral wallet. `locked_cents <= balance_cents` is enforced by
/// a `CHECK` constraint at the store boundary (invariant 1, §3) in addition
/// to being reasserted after every order transaction.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance_cents: i64,
    pub locked_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn available_cents(&self) -> i64 {
        self.balance_cents - self.locked_cents
    }

    pub fn is_solvent(&self) -> bool {
        self.locked_cents >= 0 && self.balance_cents >= 0 && self.locked_cents <= self.balance_cents
    }
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub balance_cents: i64,
    pub locked_cents: i64,
    pub available_cents: i64,
}

impl From<Wallet> for WalletResponse {
    fn from(w: Wallet) -> Self {
        Self {
            available_cents: w.available_cents(),
            balance_cents: w.balance_cents,
            locked_cents: w.locked_cents,
        }
    }
}

/// Singleton row accumulating taker fees collected platform-wide.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlatformFeeWallet {
    pub id: i32,
    pub collected_cents: i64,
}
