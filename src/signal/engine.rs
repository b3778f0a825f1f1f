//! Drift-dominant signal engine
//!
//! Each component emits a value in [-1, +1]; the weighted sum decides the
//! direction and its magnitude the confidence. The drift from the window
//! anchor carries 70% of the weight, so the dead-zone and agreement filters
//! below exist to keep the drift from trading on noise.

use super::indicators;
use super::{Direction, HoldReason, Signal};
use crate::config::StrategyConfig;
use crate::feed::Candle;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

const W_PRICE_VS_OPEN: f64 = 0.70;
const W_MOMENTUM: f64 = 0.09;
const W_RSI: f64 = 0.075;
const W_MACD: f64 = 0.075;
const W_EMA_CROSS: f64 = 0.06;

/// Raw component values, each in [-1, +1]
#[derive(Debug, Clone, Copy)]
pub struct ComponentValues {
    pub price_vs_open: f64,
    pub momentum: f64,
    pub rsi: f64,
    pub macd: f64,
    pub ema_cross: f64,
}

impl ComponentValues {
    fn votes(&self) -> BTreeMap<&'static str, i8> {
        let mut votes = BTreeMap::new();
        votes.insert("price_vs_open", sign(self.price_vs_open));
        votes.insert("momentum", sign(self.momentum));
        votes.insert("rsi_14", sign(self.rsi));
        votes.insert("macd", sign(self.macd));
        votes.insert("ema_cross", sign(self.ema_cross));
        votes
    }

    fn score(&self) -> f64 {
        W_PRICE_VS_OPEN * self.price_vs_open
            + W_MOMENTUM * self.momentum
            + W_RSI * self.rsi
            + W_MACD * self.macd
            + W_EMA_CROSS * self.ema_cross
    }
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Pure signal engine; no I/O, no clock
pub struct SignalEngine {
    config: StrategyConfig,
}

impl SignalEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Evaluate a window given its anchor, the current oracle price, and
    /// recent 1-minute candles. `fee_pct` comes from the executor.
    pub fn evaluate(
        &self,
        anchor_price: Decimal,
        current_price: Decimal,
        candles: &[Candle],
        fee_pct: Decimal,
    ) -> Signal {
        if anchor_price <= Decimal::ZERO {
            return Signal::hold(HoldReason::History, Decimal::ZERO, 0.0, "No anchor price");
        }
        let drift_pct = (current_price - anchor_price) / anchor_price * Decimal::ONE_HUNDRED;

        if candles.len() < self.config.min_candles {
            return Signal::hold(
                HoldReason::History,
                drift_pct,
                0.0,
                format!("Insufficient history ({} candles)", candles.len()),
            );
        }

        let tail = &candles[candles.len().saturating_sub(20)..];
        let volatility_pct = indicators::volatility_pct(tail);
        let components = self.components(drift_pct, candles);

        self.decide(drift_pct, &components, volatility_pct, fee_pct)
    }

    /// Compute the component values from candle history
    fn components(&self, drift_pct: Decimal, candles: &[Candle]) -> ComponentValues {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let cfg = &self.config;

        let full_scale = cfg.drift_full_scale_pct.to_f64().unwrap_or(0.10);
        let drift = drift_pct.to_f64().unwrap_or(0.0);
        let price_vs_open = (drift / full_scale).clamp(-1.0, 1.0);

        // Momentum below 0.02% is flat, not a vote
        let momentum_raw = indicators::momentum_pct(&closes, cfg.momentum_lookback);
        let momentum = if momentum_raw.abs() < 0.02 {
            0.0
        } else {
            (momentum_raw / 0.5).clamp(-1.0, 1.0)
        };

        // RSI mapped from [0, 100] to [-1, +1] with 50 neutral
        let rsi = (indicators::rsi(&closes, cfg.rsi_period) - 50.0) / 50.0;

        let (_, _, histogram) = indicators::macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let last_close = closes.last().copied().unwrap_or(1.0);
        let macd_norm = if last_close > 0.0 {
            (histogram.abs() / last_close * 10_000.0 / 10.0).min(1.0)
        } else {
            0.0
        };
        let macd = sign(histogram) as f64 * macd_norm;

        let fast = indicators::ema(&closes, cfg.ema_fast);
        let slow = indicators::ema(&closes, cfg.ema_slow);
        let ema_cross = match (fast.last(), slow.last()) {
            (Some(f), Some(s)) if last_close > 0.0 => {
                let gap_pct = (f - s).abs() / last_close * 100.0;
                sign(f - s) as f64 * (gap_pct / 0.15).min(1.0)
            }
            _ => 0.0,
        };

        ComponentValues {
            price_vs_open,
            momentum,
            rsi,
            macd,
            ema_cross,
        }
    }

    /// Apply the gates and produce the final signal
    ///
    /// Split from `evaluate` so the filters can be exercised with synthetic
    /// component values.
    pub fn decide(
        &self,
        drift_pct: Decimal,
        components: &ComponentValues,
        volatility_pct: f64,
        fee_pct: Decimal,
    ) -> Signal {
        let cfg = &self.config;

        if volatility_pct < cfg.min_volatility_pct || volatility_pct > cfg.max_volatility_pct {
            return Signal::hold(
                HoldReason::Volatility,
                drift_pct,
                volatility_pct,
                format!("Volatility {:.3}% outside tradeable band", volatility_pct),
            );
        }

        // Below the dead zone the drift is bid-ask noise and the dominant
        // signal carries no information
        if drift_pct.abs() <= cfg.dead_zone_pct {
            return Signal::hold(
                HoldReason::DeadZone,
                drift_pct,
                volatility_pct,
                format!(
                    "Drift {:+.4}% within dead zone",
                    drift_pct.to_f64().unwrap_or(0.0)
                ),
            );
        }

        let votes = components.votes();

        // Agreement filter: drift direction fighting three of the four
        // indicators is chop, not trend
        let pvo_vote = sign(components.price_vs_open);
        if pvo_vote != 0 {
            let opposing = [
                sign(components.momentum),
                sign(components.rsi),
                sign(components.macd),
                sign(components.ema_cross),
            ]
            .iter()
            .filter(|&&v| v == -pvo_vote)
            .count();
            if opposing >= 3 {
                return Signal {
                    direction: Direction::Hold,
                    confidence: Decimal::ZERO,
                    drift_pct,
                    volatility_pct,
                    indicator_votes: votes,
                    hold_reason: Some(HoldReason::Agreement),
                    reason: format!("{} indicators oppose the drift direction", opposing),
                };
            }
        }

        let score = components.score();
        let direction = match sign(score) {
            1 => Direction::Up,
            -1 => Direction::Down,
            _ => Direction::Hold,
        };
        let confidence = Decimal::try_from(score.abs().min(1.0))
            .unwrap_or(Decimal::ZERO)
            .round_dp(4);

        if direction == Direction::Hold {
            return Signal {
                direction,
                confidence: Decimal::ZERO,
                drift_pct,
                volatility_pct,
                indicator_votes: votes,
                hold_reason: None,
                reason: "Zero score".to_string(),
            };
        }

        // Fee-adjusted edge: skip when the expected edge cannot clear costs
        let edge_pct = (confidence * Decimal::TWO - Decimal::ONE) * Decimal::ONE_HUNDRED;
        if edge_pct < fee_pct {
            return Signal {
                direction: Direction::Hold,
                confidence,
                drift_pct,
                volatility_pct,
                indicator_votes: votes,
                hold_reason: Some(HoldReason::Fee),
                reason: format!("Edge {:.2}% below fee {:.2}%", edge_pct, fee_pct),
            };
        }

        Signal {
            direction,
            confidence,
            drift_pct,
            volatility_pct,
            indicator_votes: votes,
            hold_reason: None,
            reason: format!(
                "score={:+.3} {} @ {} (drift {:+.4}% from open)",
                score,
                direction.as_str(),
                confidence,
                drift_pct.to_f64().unwrap_or(0.0)
            ),
        }
    }
}
