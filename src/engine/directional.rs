//! Directional trading lanes
//!
//! One lane per timeframe, each driving the full per-window pipeline:
//! anchor capture, drift delay, evaluation, risk, execution, resolution.
//! The 5m lane yields shared boundaries to the 15m lane.

use super::window::{self, SkipReason, Window};
use super::{sleep_until_utc, AppContext};
use crate::config::Config;
use crate::execution::{ExecutionReport, Side};
use crate::journal::Stream;
use crate::market::{filter_target_window, BinaryMarket, Timeframe};
use crate::risk::BucketName;
use crate::signal::{Direction, Signal, SignalEngine};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration as StdDuration;

const ANCHOR_TICK_TIMEOUT: StdDuration = StdDuration::from_secs(2);
const RESOLUTION_GRACE_SECS: i64 = 2;
const RESOLUTION_RETRIES: u32 = 3;

/// Per-lane timing
#[derive(Debug, Clone)]
pub struct LaneTuning {
    pub entry_lead_secs: i64,
    pub entry_window_secs: i64,
    pub strategy_delay_secs: i64,
}

/// A boundary-aligned directional trading lane
pub struct DirectionalLane {
    timeframe: Timeframe,
    bucket: BucketName,
    tuning: LaneTuning,
    engine: SignalEngine,
    min_confidence: Decimal,
    min_liquidity_usd: Decimal,
    /// 0 = unbounded
    cycle_cap: u64,
}

impl DirectionalLane {
    /// The primary 15-minute lane; honors the --cycles cap
    pub fn fifteen_min(config: &Config, cycle_cap: u64) -> Self {
        Self {
            timeframe: Timeframe::M15,
            bucket: BucketName::FifteenMin,
            tuning: LaneTuning {
                entry_lead_secs: config.entry_lead_secs as i64,
                entry_window_secs: config.entry_window_secs as i64,
                strategy_delay_secs: config.strategy_delay_secs as i64,
            },
            engine: SignalEngine::new(config.strategy.clone()),
            min_confidence: config.strategy.confidence_threshold,
            min_liquidity_usd: config.clob.min_liquidity_usd,
            cycle_cap,
        }
    }

    /// The parallel 5-minute lane; tighter timing, optional tighter dead zone
    pub fn five_min(config: &Config) -> Self {
        let mut strategy = config.strategy.clone();
        if let Some(dead_zone) = config.five_min.dead_zone_pct {
            strategy.dead_zone_pct = dead_zone;
        }
        Self {
            timeframe: Timeframe::M5,
            bucket: BucketName::FiveMin,
            tuning: LaneTuning {
                entry_lead_secs: config.five_min.entry_lead_secs as i64,
                entry_window_secs: config.five_min.entry_window_secs as i64,
                strategy_delay_secs: config.five_min.strategy_delay_secs as i64,
            },
            min_confidence: strategy.confidence_threshold,
            engine: SignalEngine::new(strategy),
            min_liquidity_usd: config.clob.min_liquidity_usd,
            cycle_cap: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.bucket.as_str()
    }

    pub async fn run(self, ctx: Arc<AppContext>) -> anyhow::Result<()> {
        let mut shutdown = ctx.shutdown_signal();
        let mut last_open_ts: Option<i64> = None;
        let mut completed: u64 = 0;
        tracing::info!(lane = self.name(), "Directional lane started");

        while !ctx.is_shutting_down() {
            let now = Utc::now();
            let boundary = window::next_boundary(now, self.timeframe);

            // Never two pipelines for the same (timeframe, open_ts)
            if last_open_ts == Some(boundary.timestamp()) {
                if !sleep_until_utc(boundary + Duration::seconds(1), &mut shutdown).await {
                    break;
                }
                continue;
            }

            // Shared boundaries belong to the 15m lane
            if self.timeframe == Timeframe::M5 && window::shared_with_15m(boundary) {
                let mut w = Window::at_boundary(self.timeframe, boundary);
                w.skip(SkipReason::Overlap);
                ctx.journal_skip(&w, SkipReason::Overlap, "shared boundary, 15m lane handles");
                last_open_ts = Some(boundary.timestamp());
                if !sleep_until_utc(boundary + Duration::seconds(1), &mut shutdown).await {
                    break;
                }
                continue;
            }

            let entry_at = boundary - Duration::seconds(self.tuning.entry_lead_secs);
            if now >= entry_at + Duration::seconds(self.tuning.entry_window_secs) {
                // Too late for this window
                if !sleep_until_utc(boundary + Duration::seconds(1), &mut shutdown).await {
                    break;
                }
                continue;
            }
            if !sleep_until_utc(entry_at, &mut shutdown).await {
                break;
            }

            last_open_ts = Some(boundary.timestamp());
            let w = Window::at_boundary(self.timeframe, boundary);
            tracing::info!(lane = self.name(), window = %w.id, "Entry");

            if let Err(e) = self.run_pipeline(&ctx, w).await {
                tracing::error!(lane = self.name(), error = %e, "Cycle error");
                ctx.journal_entry(
                    Stream::Errors,
                    json!({"lane": self.name(), "error": e.to_string()}),
                );
            }

            completed += 1;
            if self.cycle_cap > 0 && completed >= self.cycle_cap {
                tracing::info!(lane = self.name(), completed, "Cycle cap reached");
                ctx.request_shutdown();
                break;
            }
        }

        tracing::info!(lane = self.name(), "Directional lane stopped");
        Ok(())
    }

    /// One window: anchor → delay → evaluate → risk → execute → resolve
    async fn run_pipeline(&self, ctx: &Arc<AppContext>, mut w: Window) -> anyhow::Result<()> {
        let mut shutdown = ctx.shutdown_signal();

        // Anchor phase
        let anchor_tick = match ctx.feed.fresh_tick(ANCHOR_TICK_TIMEOUT).await {
            Ok(tick) => tick,
            Err(e) => {
                w.skip(SkipReason::NoAnchor);
                ctx.journal_skip(&w, SkipReason::NoAnchor, &e.to_string());
                return Ok(());
            }
        };
        let anchor_price = anchor_tick.price;
        w.anchor(anchor_price, anchor_tick.timestamp);
        ctx.record_anchor(w.id, anchor_price).await;
        ctx.journal_entry(
            Stream::Oracle,
            json!({
                "window": w.id.to_string(),
                "event": "anchor",
                "price": anchor_price,
                "source": anchor_tick.source.as_str(),
            }),
        );
        tracing::info!(window = %w.id, anchor = %anchor_price, "Anchor captured");

        // Drift delay: without it the dominant price_vs_open signal reads ~0
        let eval_at = Utc::now() + Duration::seconds(self.tuning.strategy_delay_secs);
        if !sleep_until_utc(eval_at, &mut shutdown).await {
            return Ok(());
        }

        // Evaluation phase
        let current_tick = match ctx.feed.fresh_tick(ANCHOR_TICK_TIMEOUT).await {
            Ok(tick) => tick,
            Err(e) => {
                w.skip(SkipReason::Signal);
                ctx.journal_skip(&w, SkipReason::Signal, &format!("stale oracle tick: {e}"));
                return Ok(());
            }
        };
        let candles = match ctx.candles.fetch("1m", 60).await {
            Ok(candles) => candles,
            Err(e) => {
                w.skip(SkipReason::Signal);
                ctx.journal_skip(&w, SkipReason::Signal, &format!("candle fetch: {e}"));
                return Ok(());
            }
        };

        // Cross-source read: divergence is surfaced in the journal, never
        // acted on automatically
        if let Ok(reconciled) = ctx.feed.reconciled().await {
            ctx.journal_entry(
                Stream::Oracle,
                json!({
                    "window": w.id.to_string(),
                    "event": "reconciled",
                    "price": reconciled.price,
                    "spread_pct": reconciled.spread_pct,
                    "sources": reconciled.sources,
                    "diverged": reconciled.diverged,
                }),
            );
        }

        // Worst-case taker fee sits at 50c
        let fee_pct = ctx.executor.estimated_fee_pct(dec!(0.5));
        let signal = self
            .engine
            .evaluate(anchor_price, current_tick.price, &candles, fee_pct);

        ctx.journal_entry(
            Stream::Strategy,
            json!({
                "window": w.id.to_string(),
                "direction": signal.direction.as_str(),
                "confidence": signal.confidence,
                "drift_pct": signal.drift_pct,
                "volatility_pct": signal.volatility_pct,
                "votes": signal.indicator_votes,
                "reason": signal.reason,
            }),
        );
        ctx.notify_dashboard(&json!({
            "type": "state",
            "lane": self.name(),
            "window": w.id.to_string(),
            "strategy": {
                "direction": signal.direction.as_str(),
                "confidence": signal.confidence,
                "drift_pct": signal.drift_pct,
            },
        }));

        if signal.is_hold() || signal.confidence <= self.min_confidence {
            w.skip(SkipReason::Signal);
            ctx.journal_skip(&w, SkipReason::Signal, &signal.reason);
            return Ok(());
        }
        w.mark_evaluated();

        // Risk phase
        let stake = {
            let mut risk = ctx.risk.lock().await;
            risk.size(self.bucket, signal.confidence, Utc::now())
        };
        let stake = match stake {
            Ok(stake) => stake,
            Err(veto) => {
                w.skip(SkipReason::Risk);
                ctx.journal_skip(&w, SkipReason::Risk, &veto.to_string());
                return Ok(());
            }
        };

        // Execute phase, bounded by the entry window
        let deadline = StdDuration::from_secs(self.tuning.entry_window_secs.max(0) as u64);
        let executed =
            tokio::time::timeout(deadline, self.execute_phase(ctx, &w, &signal, stake)).await;
        let (report, market) = match executed {
            Err(_) => {
                w.skip(SkipReason::Execution);
                ctx.journal_skip(&w, SkipReason::Execution, "entry window expired");
                return Ok(());
            }
            Ok(Err(e)) => {
                w.skip(SkipReason::Execution);
                ctx.journal_skip(&w, SkipReason::Execution, &e.to_string());
                return Ok(());
            }
            Ok(Ok(None)) => {
                w.skip(SkipReason::Execution);
                ctx.journal_skip(&w, SkipReason::Execution, "no tradeable market or no fill");
                return Ok(());
            }
            Ok(Ok(Some(result))) => result,
        };
        w.mark_ordered();

        {
            let mut risk = ctx.risk.lock().await;
            risk.record_stake(self.bucket, stake, Utc::now());
        }
        ctx.journal_entry(
            Stream::Trades,
            json!({
                "window": w.id.to_string(),
                "lane": self.name(),
                "event": "opened",
                "market": market.question,
                "side": report.order.side.as_str(),
                "size_usd": stake,
                "limit_price": report.order.limit_price,
                "confidence": signal.confidence,
                "order_id": report.order.clob_id,
            }),
        );
        ctx.notify_dashboard(&json!({
            "type": "trade_notification",
            "action": "opened",
            "engine": self.name(),
            "direction": signal.direction.as_str(),
            "size_usd": stake,
        }));

        // Resolution hand-off
        self.resolve_phase(ctx, &mut w, &report).await;
        Ok(())
    }

    /// Discover the target market and submit the order
    async fn execute_phase(
        &self,
        ctx: &Arc<AppContext>,
        w: &Window,
        signal: &Signal,
        stake: Decimal,
    ) -> anyhow::Result<Option<(ExecutionReport, BinaryMarket)>> {
        let markets = ctx.gamma.discover(&[self.timeframe]).await?;
        let mut tradeable: Vec<BinaryMarket> = markets
            .into_iter()
            .filter(|m| m.liquidity >= self.min_liquidity_usd)
            .collect();
        tradeable = filter_target_window(tradeable, self.timeframe, Utc::now());

        let Some(market) = tradeable
            .into_iter()
            .max_by(|a, b| a.liquidity.cmp(&b.liquidity))
        else {
            return Ok(None);
        };

        let (side, token_id, quoted) = match signal.direction {
            Direction::Up => (Side::Yes, market.token_id_up.clone(), market.price_up),
            Direction::Down => (Side::No, market.token_id_down.clone(), market.price_down),
            Direction::Hold => return Ok(None),
        };

        let fee_pct = ctx.executor.fee_pct_for(&token_id, quoted).await;
        tracing::debug!(window = %w.id, fee_pct = %fee_pct, "Entry fee estimate");

        let report = ctx
            .executor
            .execute(&w.id.to_string(), side, &token_id, stake, quoted)
            .await?;

        if report.position.is_some() {
            Ok(Some((report, market)))
        } else {
            tracing::warn!(
                window = %w.id,
                state = ?report.order.state,
                "Order did not open a position"
            );
            Ok(None)
        }
    }

    /// After close, derive P&L from the settled price vs the anchor
    async fn resolve_phase(&self, ctx: &Arc<AppContext>, w: &mut Window, report: &ExecutionReport) {
        let mut shutdown = ctx.shutdown_signal();
        let settle_at = w.close_ts + Duration::seconds(RESOLUTION_GRACE_SECS);
        if !sleep_until_utc(settle_at, &mut shutdown).await {
            return;
        }

        let mut settled = None;
        for _ in 0..RESOLUTION_RETRIES {
            match ctx.feed.latest().await {
                Ok(tick) => {
                    settled = Some(tick.price);
                    break;
                }
                Err(_) => {
                    tokio::time::sleep(StdDuration::from_secs(2)).await;
                }
            }
        }

        let now = Utc::now();
        let window_tag = w.id.to_string();
        let Some(position) = ctx.executor.open_positions().await.into_iter().find(|p| p.window == window_tag) else {
            return;
        };

        let (Some(anchor), Some(settled)) = (w.anchor_price, settled) else {
            // Cannot settle without a price: flat outcome, streak untouched
            let _ = ctx.executor.resolve_position(&window_tag, Decimal::ZERO).await;
            let mut risk = ctx.risk.lock().await;
            risk.record_push(self.bucket, now);
            ctx.journal_entry(
                Stream::Errors,
                json!({"window": window_tag, "error": "no settled price, recorded push"}),
            );
            return;
        };

        let won = match position.side {
            Side::Yes => settled > anchor,
            Side::No => settled < anchor,
        };
        let push = settled == anchor;

        let pnl = if push {
            Decimal::ZERO
        } else if won {
            (position.shares - position.size_usd).round_dp(4)
        } else {
            -position.size_usd
        };

        let _ = ctx.executor.resolve_position(&window_tag, pnl).await;
        {
            let mut risk = ctx.risk.lock().await;
            if push {
                risk.record_push(self.bucket, now);
            } else if won {
                risk.record_win(self.bucket, pnl, now);
            } else {
                risk.record_loss(self.bucket, pnl, now);
            }
        }
        w.mark_resolved();

        let outcome = if push {
            "push"
        } else if won {
            "win"
        } else {
            "loss"
        };
        tracing::info!(window = %w.id, outcome, pnl = %pnl, "Window resolved");
        ctx.journal_entry(
            Stream::Trades,
            json!({
                "window": window_tag,
                "lane": self.name(),
                "event": "resolved",
                "outcome": outcome,
                "pnl": pnl,
                "anchor": anchor,
                "settled": settled,
            }),
        );
        ctx.notify_dashboard(&json!({
            "type": "trade_notification",
            "action": "resolved",
            "engine": self.name(),
            "direction": report.order.side.as_str(),
            "size_usd": position.size_usd,
            "pnl": pnl,
            "outcome": outcome,
        }));

        // Persist the running performance snapshot after each resolution
        let (bankroll, statuses) = {
            let risk = ctx.risk.lock().await;
            (risk.bankroll(), risk.status(now))
        };
        if let Err(e) = ctx.journal.save_performance(json!({
            "bankroll": bankroll,
            "buckets": statuses,
        })) {
            ctx.flag_fatal("performance snapshot", &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_lane_constructors() {
        let config = Config::default();
        let fifteen = DirectionalLane::fifteen_min(&config, 3);
        assert_eq!(fifteen.name(), "15m");
        assert_eq!(fifteen.tuning.entry_lead_secs, 60);
        assert_eq!(fifteen.tuning.entry_window_secs, 30);
        assert_eq!(fifteen.cycle_cap, 3);

        let five = DirectionalLane::five_min(&config);
        assert_eq!(five.name(), "5m");
        assert_eq!(five.tuning.entry_lead_secs, 55);
        assert_eq!(five.tuning.entry_window_secs, 20);
    }

    #[test]
    fn test_five_min_dead_zone_override() {
        let mut config = Config::default();
        config.five_min.dead_zone_pct = Some(dec!(0.02));
        let lane = DirectionalLane::five_min(&config);
        // The override lives inside the engine's strategy config; reaching
        // through it is enough to know the wiring happened
        let signal = lane.engine.decide(
            dec!(0.03),
            &crate::signal::ComponentValues {
                price_vs_open: 0.9,
                momentum: 0.9,
                rsi: 0.9,
                macd: 0.9,
                ema_cross: 0.9,
            },
            0.2,
            Decimal::ZERO,
        );
        // 0.03% drift would be dead-zoned at the default 0.04 threshold,
        // but passes with the tighter 0.02 override
        assert_ne!(signal.direction, crate::signal::Direction::Hold);
    }
}
