//! Market discovery module
//!
//! Finds and tracks active BTC up/down markets via the Gamma API using
//! deterministic window slugs, with a pagination scan as fallback.

mod gamma;

pub use gamma::GammaClient;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market window length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    M5,
    M15,
    M30,
    H1,
}

impl Timeframe {
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
        }
    }

    pub fn secs(&self) -> i64 {
        self.minutes() as i64 * 60
    }

    /// Slug label as the venue writes it
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "30m" => Some(Timeframe::M30),
            "1h" => Some(Timeframe::H1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A binary up/down market for one window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryMarket {
    pub condition_id: String,
    pub question: String,
    pub slug: String,
    pub token_id_up: String,
    pub token_id_down: String,
    /// Best known price of the Up (YES) outcome
    pub price_up: Decimal,
    /// Best known price of the Down (NO) outcome
    pub price_down: Decimal,
    pub liquidity: Decimal,
    pub volume: Decimal,
    pub timeframe: Timeframe,
    pub end_ts: DateTime<Utc>,
}

impl BinaryMarket {
    /// Window open unix timestamp, parsed from the deterministic slug
    pub fn window_open_ts(&self) -> Option<i64> {
        let tail = self.slug.rsplit('-').next()?;
        tail.parse().ok()
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.end_ts - now).num_seconds()
    }

    /// Sum of both outcome asks; below 1.0 means free edge
    pub fn combined(&self) -> Decimal {
        self.price_up + self.price_down
    }

    /// Arbitrage edge as a percentage, zero when combined >= 1
    pub fn edge_pct(&self) -> Decimal {
        let combined = self.combined();
        if combined > Decimal::ZERO && combined < Decimal::ONE {
            (Decimal::ONE - combined) * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        }
    }
}

/// Deterministic slugs for the windows around `now`
///
/// Offsets cover the previous, current and next two windows so discovery
/// survives clock skew at boundaries.
pub fn generate_slugs(timeframes: &[Timeframe], now: DateTime<Utc>) -> Vec<(String, Timeframe)> {
    let offsets = [-1i64, 0, 1, 2];
    let unix = now.timestamp();
    let mut slugs = Vec::with_capacity(timeframes.len() * offsets.len());
    for tf in timeframes {
        let secs = tf.secs();
        for offset in offsets {
            let window_ts = (unix / secs + offset) * secs;
            if window_ts > 0 {
                slugs.push((format!("btc-updown-{}-{}", tf.label(), window_ts), *tf));
            }
        }
    }
    slugs
}

/// Filter markets to the window the lane is targeting
///
/// Within 90s of the next boundary the lane is trading the upcoming window;
/// earlier in the window it is still inside the current one.
pub fn filter_target_window(
    markets: Vec<BinaryMarket>,
    timeframe: Timeframe,
    now: DateTime<Utc>,
) -> Vec<BinaryMarket> {
    let secs = timeframe.secs();
    let unix = now.timestamp();
    let current_boundary = (unix / secs) * secs;
    let next_boundary = current_boundary + secs;
    let close_to_boundary = unix - current_boundary >= secs - 90;

    let mut next_window = Vec::new();
    let mut current_window = Vec::new();
    let mut unknown = Vec::new();

    for m in markets {
        if m.timeframe != timeframe {
            continue;
        }
        match m.window_open_ts() {
            Some(ts) if ts == next_boundary => next_window.push(m),
            Some(ts) if ts == current_boundary => current_window.push(m),
            Some(_) => {}
            None => unknown.push(m),
        }
    }

    if close_to_boundary && !next_window.is_empty() {
        next_window
    } else if !close_to_boundary && !current_window.is_empty() {
        current_window
    } else if !next_window.is_empty() {
        next_window
    } else if !current_window.is_empty() {
        current_window
    } else {
        unknown
    }
}
