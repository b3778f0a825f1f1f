//! Signal generation module
//!
//! Pure, deterministic scoring over a price window. The drift from the window
//! anchor dominates; the technical indicators are tiebreakers.

mod engine;
mod indicators;
mod late_window;

pub use engine::{ComponentValues, SignalEngine};
pub use late_window::evaluate_late_window;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Predicted direction for the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Hold,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Hold => "hold",
        }
    }
}

/// Why the engine held instead of trading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// Drift within bid-ask noise
    DeadZone,
    /// Indicators gang up against the drift
    Agreement,
    /// Expected edge below estimated fee
    Fee,
    /// Volatility outside the tradeable band
    Volatility,
    /// Not enough candle history
    History,
}

/// A trading signal for one window
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub direction: Direction,
    /// In [0, 1]
    pub confidence: Decimal,
    /// Current vs anchor, percent
    pub drift_pct: Decimal,
    pub volatility_pct: f64,
    /// Sign of each component: -1, 0, +1
    pub indicator_votes: BTreeMap<&'static str, i8>,
    pub hold_reason: Option<HoldReason>,
    pub reason: String,
}

impl Signal {
    /// A Hold with the given reason
    pub fn hold(
        hold_reason: HoldReason,
        drift_pct: Decimal,
        volatility_pct: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            direction: Direction::Hold,
            confidence: Decimal::ZERO,
            drift_pct,
            volatility_pct,
            indicator_votes: BTreeMap::new(),
            hold_reason: Some(hold_reason),
            reason: reason.into(),
        }
    }

    pub fn is_hold(&self) -> bool {
        self.direction == Direction::Hold
    }
}
