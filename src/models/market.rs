#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which side of a binary market an order/position refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "resolution", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Resolution {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "market_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Market {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub tick_size_cents: i32,
    pub status: MarketStatus,
    pub resolves_to: Option<Resolution>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Market {
    /// `true` if `price` is within `[1, 99]` and a multiple of the market's tick size.
    pub fn is_valid_price(&self, price_cents: i64) -> bool {
        price_cents >= 1
            && price_cents <= 99
            && price_cents % self.tick_size_cents as i64 == 0
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMarketRequest {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub tick_size_cents: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveMarketRequest {
    pub resolves_to: Resolution,
}

#[derive(Debug, Serialize)]
pub struct MarketResponse {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub tick_size_cents: i32,
    pub status: MarketStatus,
    pub resolves_to: Option<Resolution>,
}

impl From<Market> for MarketResponse {
    fn from(m: Market) -> Self {
        Self {
            id: m.id,
            slug: m.slug,
            title: m.title,
            description: m.description,
            tick_size_cents: m.tick_size_cents,
            status: m.status,
            resolves_to: m.resolves_to,
        }
    }
}
