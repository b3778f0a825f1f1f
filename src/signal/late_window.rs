//! Late-window conviction signal
//!
//! Near the end of a window a large oracle drift from the anchor makes the
//! outcome nearly certain. Pure drift; no indicators.

use super::{Direction, HoldReason, Signal};
use crate::config::LateWindowConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

/// Evaluate a late-window entry for one market
pub fn evaluate_late_window(
    current_price: Decimal,
    anchor_price: Decimal,
    remaining_secs: i64,
    config: &LateWindowConfig,
) -> Signal {
    if anchor_price <= Decimal::ZERO {
        return Signal::hold(HoldReason::History, Decimal::ZERO, 0.0, "No anchor price");
    }

    let drift_pct = (current_price - anchor_price) / anchor_price * Decimal::ONE_HUNDRED;
    let abs_drift = drift_pct.abs();

    if abs_drift < config.min_drift_pct {
        return Signal::hold(
            HoldReason::DeadZone,
            drift_pct,
            0.0,
            format!(
                "Late-window drift {:+.4}% below threshold",
                drift_pct.to_f64().unwrap_or(0.0)
            ),
        );
    }

    let direction = if drift_pct > Decimal::ZERO {
        Direction::Up
    } else {
        Direction::Down
    };

    // Linear ramp from base confidence at the threshold to max at the scale
    let mut confidence = if abs_drift >= config.drift_scale_pct {
        config.max_confidence
    } else {
        let span = config.drift_scale_pct - config.min_drift_pct;
        let t = if span > Decimal::ZERO {
            (abs_drift - config.min_drift_pct) / span
        } else {
            Decimal::ONE
        };
        config.base_confidence + t * (config.max_confidence - config.base_confidence)
    };

    // Less time for a reversal
    if remaining_secs < 60 {
        confidence = (confidence + dec!(0.02)).min(config.max_confidence);
    }
    confidence = confidence
        .max(config.base_confidence)
        .min(config.max_confidence)
        .round_dp(4);

    let mut votes = BTreeMap::new();
    votes.insert("late_window_drift", if direction == Direction::Up { 1 } else { -1 });

    Signal {
        direction,
        confidence,
        drift_pct,
        volatility_pct: 0.0,
        indicator_votes: votes,
        hold_reason: None,
        reason: format!(
            "Late-window {} drift {:+.4}% with {}s left",
            direction.as_str(),
            drift_pct.to_f64().unwrap_or(0.0),
            remaining_secs
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LateWindowConfig {
        LateWindowConfig::default()
    }

    #[test]
    fn test_below_threshold_holds() {
        // 0.05% drift, threshold 0.08%
        let signal = evaluate_late_window(dec!(60030), dec!(60000), 120, &config());
        assert_eq!(signal.direction, Direction::Hold);
        assert_eq!(signal.hold_reason, Some(HoldReason::DeadZone));
    }

    #[test]
    fn test_at_threshold_trades() {
        // 0.08% drift exactly
        let signal = evaluate_late_window(dec!(60048), dec!(60000), 120, &config());
        assert_eq!(signal.direction, Direction::Up);
        assert_eq!(signal.confidence, dec!(0.80));
    }

    #[test]
    fn test_confidence_ramps_with_drift() {
        // 0.25% drift hits the max
        let signal = evaluate_late_window(dec!(60150), dec!(60000), 120, &config());
        assert_eq!(signal.confidence, dec!(0.95));

        let mid = evaluate_late_window(dec!(60100), dec!(60000), 120, &config());
        assert!(mid.confidence > dec!(0.80) && mid.confidence < dec!(0.95));
    }

    #[test]
    fn test_down_drift() {
        let signal = evaluate_late_window(dec!(59900), dec!(60000), 120, &config());
        assert_eq!(signal.direction, Direction::Down);
    }

    #[test]
    fn test_final_minute_bonus() {
        let early = evaluate_late_window(dec!(60060), dec!(60000), 120, &config());
        let late = evaluate_late_window(dec!(60060), dec!(60000), 45, &config());
        assert!(late.confidence > early.confidence);
    }

    #[test]
    fn test_no_anchor() {
        let signal = evaluate_late_window(dec!(60000), dec!(0), 120, &config());
        assert_eq!(signal.hold_reason, Some(HoldReason::History));
    }
}
