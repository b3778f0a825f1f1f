//! Property tests for the signal filters and risk bucket invariants

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use poly_updown::config::{RiskConfig, StrategyConfig};
use poly_updown::risk::{BucketName, RiskManager};
use poly_updown::signal::{ComponentValues, Direction, HoldReason, SignalEngine};

fn engine() -> SignalEngine {
    SignalEngine::new(StrategyConfig::default())
}

// ── Signal filter properties ────────────────────────────────

proptest! {
    /// Any drift within the dead zone holds, whatever the indicators say.
    #[test]
    fn dead_zone_always_holds(
        drift_bp in -400i64..=400,
        pvo in -1.0f64..1.0,
        momentum in -1.0f64..1.0,
        rsi in -1.0f64..1.0,
        macd in -1.0f64..1.0,
        ema in -1.0f64..1.0,
        vol in 0.05f64..2.0,
    ) {
        // drift_bp is hundredths of a basis point of drift percent:
        // 400 → exactly 0.04%
        let drift = Decimal::new(drift_bp, 4);
        let components = ComponentValues {
            price_vs_open: pvo,
            momentum,
            rsi,
            macd,
            ema_cross: ema,
        };
        let signal = engine().decide(drift, &components, vol, Decimal::ZERO);
        prop_assert_eq!(signal.direction, Direction::Hold);
    }

    /// Three or more indicators opposing the drift force an agreement hold.
    #[test]
    fn agreement_override_holds(
        drift_bp in 410i64..=2000,
        a in -1.0f64..-0.001,
        b in -1.0f64..-0.001,
        c in -1.0f64..-0.001,
        d in -1.0f64..1.0,
        pvo in 0.001f64..1.0,
        vol in 0.05f64..2.0,
        up in any::<bool>(),
    ) {
        // Flip the whole scenario for Down drifts too
        let flip = if up { 1.0 } else { -1.0 };
        let drift = Decimal::new(drift_bp, 4) * if up { dec!(1) } else { dec!(-1) };
        let components = ComponentValues {
            price_vs_open: pvo * flip,
            momentum: a * flip,
            rsi: b * flip,
            macd: c * flip,
            ema_cross: d * flip,
        };
        let signal = engine().decide(drift, &components, vol, Decimal::ZERO);
        prop_assert_eq!(signal.direction, Direction::Hold);
        prop_assert_eq!(signal.hold_reason, Some(HoldReason::Agreement));
    }
}

// ── Risk bucket invariants ──────────────────────────────────

#[derive(Debug, Clone)]
enum RiskOp {
    Size(i64),
    Reserve(i64),
    Win(i64),
    Loss(i64),
    Push,
}

fn risk_op() -> impl Strategy<Value = RiskOp> {
    prop_oneof![
        (50i64..100).prop_map(RiskOp::Size),
        (1i64..40).prop_map(RiskOp::Reserve),
        (1i64..30).prop_map(RiskOp::Win),
        (1i64..30).prop_map(RiskOp::Loss),
        Just(RiskOp::Push),
    ]
}

fn apply(manager: &mut RiskManager, bucket: BucketName, op: &RiskOp) {
    let now = Utc::now();
    match op {
        RiskOp::Size(conf_pct) => {
            let confidence = Decimal::new(*conf_pct, 2);
            if let Ok(stake) = manager.size(bucket, confidence, now) {
                manager.record_stake(bucket, stake, now);
            }
        }
        RiskOp::Reserve(amount) => {
            let _ = manager.reserve(bucket, Decimal::from(*amount), now);
        }
        RiskOp::Win(pnl) => manager.record_win(bucket, Decimal::from(*pnl), now),
        RiskOp::Loss(pnl) => manager.record_loss(bucket, -Decimal::from(*pnl), now),
        RiskOp::Push => manager.record_push(bucket, now),
    }
}

proptest! {
    /// used_usd never exceeds the bucket budget under any op sequence.
    #[test]
    fn bucket_never_overdraws(ops in prop::collection::vec(risk_op(), 1..60)) {
        let config = RiskConfig::default();
        let mut manager = RiskManager::new(&config, dec!(500), Utc::now());

        for op in &ops {
            apply(&mut manager, BucketName::FiveMin, op);
            let status = manager.status(Utc::now());
            let five = status.iter().find(|b| b.name == BucketName::FiveMin).unwrap();
            match five.daily_budget_usd {
                Some(budget) => prop_assert!(
                    five.used_usd <= budget,
                    "used {} exceeds budget {}",
                    five.used_usd,
                    budget
                ),
                None => prop_assert_eq!(five.used_usd, Decimal::ZERO),
            }
        }
    }

    /// Operations on the 5m bucket never touch the 15m bucket.
    #[test]
    fn buckets_are_isolated(ops in prop::collection::vec(risk_op(), 1..60)) {
        let config = RiskConfig::default();
        let mut manager = RiskManager::new(&config, dec!(500), Utc::now());

        for op in &ops {
            apply(&mut manager, BucketName::FiveMin, op);
        }

        let status = manager.status(Utc::now());
        let fifteen = status
            .iter()
            .find(|b| b.name == BucketName::FifteenMin)
            .unwrap();
        prop_assert_eq!(fifteen.trades_today, 0);
        prop_assert_eq!(fifteen.used_usd, Decimal::ZERO);
        prop_assert_eq!(fifteen.daily_pnl, Decimal::ZERO);
        prop_assert_eq!(fifteen.losses_streak, 0);
        prop_assert!(!fifteen.in_cooldown);
    }
}
