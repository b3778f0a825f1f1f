//! Price feed types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Asset symbol this agent trades
pub const ASSET: &str = "BTC/USD";

/// Where a tick came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickSource {
    /// The resolution oracle stream (authoritative)
    Oracle,
    /// The oracle venue's mirror of the Binance price (same stream)
    RtdsBinance,
    /// Binance REST bookTicker mid
    Binance,
    /// CoinGecko simple price
    CoinGecko,
}

impl TickSource {
    /// Only the resolution oracle is primary; secondaries detect lag/manipulation
    pub fn is_primary(&self) -> bool {
        matches!(self, TickSource::Oracle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TickSource::Oracle => "oracle",
            TickSource::RtdsBinance => "rtds_binance",
            TickSource::Binance => "binance",
            TickSource::CoinGecko => "coingecko",
        }
    }
}

/// A single price observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub source: TickSource,
    pub asset: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(source: TickSource, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            source,
            asset: ASSET.to_string(),
            price,
            timestamp,
        }
    }

    /// Age of this tick relative to `now`, in milliseconds
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_milliseconds()
    }

    /// A tick older than `stale_ms` carries no information
    pub fn is_stale(&self, now: DateTime<Utc>, stale_ms: i64) -> bool {
        self.age_ms(now) > stale_ms
    }
}

/// Aggregate across sources with divergence flag
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledPrice {
    /// Oracle price when available, otherwise the best fallback
    pub price: Decimal,
    /// Max divergence across fresh sources, percent
    pub spread_pct: Decimal,
    pub sources: Vec<TickSource>,
    /// True when spread exceeds the configured divergence threshold
    pub diverged: bool,
    /// The resolution oracle's own price, if fresh
    pub oracle_price: Option<Decimal>,
}

/// One OHLCV candle from the candle source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
