//! Process-wide configuration (§6), read once at startup.

use serde::Deserialize;

/// Configuration table from §6. `jwt_secret`/auth wiring is intentionally
/// absent: authentication is out of scope for this core (§1's Non-goals),
/// and the thin HTTP layer here has no session to secure.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Integer basis points, 0..=500 (§6).
    #[serde(default = "default_taker_fee_bps")]
    pub taker_fee_bps: i64,
    /// Default tick size for newly created markets, 1..=10 (§6).
    #[serde(default = "default_tick_cents")]
    pub default_tick_cents: i32,
    /// Per-market mailbox depth before `PlaceOrder`/`CancelOrder` callers see
    /// a transient backpressure error (§5).
    #[serde(default = "default_mailbox_capacity")]
    pub market_mailbox_capacity: usize,
    /// Trivial admin gate for `ResolveMarket` (SPEC_FULL §6): callers must
    /// send this value back in an `X-Admin-Token` header. `None` means the
    /// route is ungated, for local development. Full auth is out of scope
    /// (§1's Non-goals) — this is not a session or signature scheme.
    pub admin_token: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_taker_fee_bps() -> i64 {
    100
}

fn default_tick_cents() -> i32 {
    1
}

fn default_mailbox_capacity() -> usize {
    1024
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("taker_fee_bps must be in 0..=500, got {0}")]
    InvalidFeeBps(i64),

    #[error("default_tick_cents must be in 1..=10, got {0}")]
    InvalidTickCents(i32),
}

impl AppConfig {
    /// Loads configuration from environment variables (optionally seeded by
    /// a `.env` file via `dotenvy`, loaded by the caller before this runs),
    /// validating the numeric boundaries from §6.
    pub fn load() -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .set_default("host", default_host())?
            .set_default("port", default_port() as i64)?
            .set_default("log_level", default_log_level())?
            .set_default("taker_fee_bps", default_taker_fee_bps())?
            .set_default("default_tick_cents", default_tick_cents() as i64)?
            .set_default("market_mailbox_capacity", default_mailbox_capacity() as i64)?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;
        let cfg: AppConfig = raw.try_deserialize()?;

        if !(0..=500).contains(&cfg.taker_fee_bps) {
            return Err(ConfigError::InvalidFeeBps(cfg.taker_fee_bps));
        }
        if !(1..=10).contains(&cfg.default_tick_cents) {
            return Err(ConfigError::InvalidTickCents(cfg.default_tick_cents));
        }
        Ok(cfg)
    }
}
