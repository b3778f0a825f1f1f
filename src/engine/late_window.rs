//! Late-window conviction scanner
//!
//! Scans every open window approaching resolution. A large oracle drift from
//! the window's anchor with little time left is traded on pure drift through
//! the `late_window` bucket. The ask-price cap guarantees real upside per
//! winning share.

use super::window::WindowId;
use super::AppContext;
use crate::config::LateWindowConfig;
use crate::execution::Side;
use crate::journal::Stream;
use crate::market::Timeframe;
use crate::risk::{BucketName, RiskVeto};
use crate::signal::{evaluate_late_window, Direction};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

const SCAN_TIMEFRAMES: [Timeframe; 4] =
    [Timeframe::M5, Timeframe::M15, Timeframe::M30, Timeframe::H1];

/// A filled late-window trade waiting for its window to close
struct PendingTrade {
    tag: String,
    side: Side,
    anchor: Decimal,
    shares: Decimal,
    size_usd: Decimal,
    close_ts: DateTime<Utc>,
}

/// Continuous scanner over windows in their final stretch
pub struct LateWindowScanner {
    config: LateWindowConfig,
    min_liquidity_usd: Decimal,
}

impl LateWindowScanner {
    pub fn new(config: LateWindowConfig, min_liquidity_usd: Decimal) -> Self {
        Self {
            config,
            min_liquidity_usd,
        }
    }

    pub async fn run(self, ctx: Arc<AppContext>) -> anyhow::Result<()> {
        let mut shutdown = ctx.shutdown_signal();
        let mut traded: HashSet<String> = HashSet::new();
        let mut pending: Vec<PendingTrade> = Vec::new();
        let cadence = std::time::Duration::from_secs(self.config.scan_secs.max(2));
        tracing::info!("Late-window scanner started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(cadence) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }

            self.resolve_due(&ctx, &mut pending).await;

            if let Err(e) = self.scan(&ctx, &mut traded, &mut pending).await {
                tracing::warn!(error = %e, "Late-window scan failed");
                ctx.journal_entry(
                    Stream::Errors,
                    json!({"lane": "late_window", "error": e.to_string()}),
                );
            }

            // Forget markets whose windows are long gone
            if traded.len() > 512 {
                traded.clear();
            }
        }

        tracing::info!("Late-window scanner stopped");
        Ok(())
    }

    async fn scan(
        &self,
        ctx: &Arc<AppContext>,
        traded: &mut HashSet<String>,
        pending: &mut Vec<PendingTrade>,
    ) -> anyhow::Result<()> {
        let tick = match ctx.feed.latest().await {
            Ok(tick) => tick,
            Err(_) => return Ok(()),
        };

        let markets = ctx.gamma.discover(&SCAN_TIMEFRAMES).await?;
        let now = Utc::now();

        for market in markets {
            let remaining = market.remaining_secs(now);
            if remaining < self.config.min_remaining_secs
                || remaining > self.config.max_remaining_secs
            {
                continue;
            }
            if market.liquidity < self.min_liquidity_usd {
                continue;
            }
            if traded.contains(&market.condition_id) {
                continue;
            }

            let Some(open_ts) = market.window_open_ts() else {
                continue;
            };
            let window_id = WindowId::new(market.timeframe, open_ts);
            let Some(anchor) = ctx.anchor_for(&window_id).await else {
                continue;
            };

            let signal = evaluate_late_window(tick.price, anchor, remaining, &self.config);
            if signal.is_hold() {
                continue;
            }

            let stake = {
                let mut risk = ctx.risk.lock().await;
                risk.size(BucketName::LateWindow, signal.confidence, now)
            };
            let stake = match stake {
                Ok(stake) => stake,
                Err(RiskVeto::Cooldown { .. }) | Err(RiskVeto::StakeTooSmall) => continue,
                Err(veto) => {
                    // Budget or cap style vetoes end this round of scanning
                    tracing::info!(veto = %veto, "Late-window blocked");
                    break;
                }
            };

            let (side, token_id, ask) = match signal.direction {
                Direction::Up => (Side::Yes, market.token_id_up.clone(), market.price_up),
                Direction::Down => (Side::No, market.token_id_down.clone(), market.price_down),
                Direction::Hold => continue,
            };

            // Entries above the cap leave too little upside per winning share
            if ask > self.config.max_entry_price {
                tracing::info!(
                    market = %market.condition_id,
                    ask = %ask,
                    "Late-window entry too expensive"
                );
                continue;
            }

            let tag = format!("lw:{}", window_id);
            let report = ctx
                .executor
                .execute(&tag, side, &token_id, stake, ask)
                .await?;
            let Some(position) = report.position else {
                continue;
            };

            traded.insert(market.condition_id.clone());
            {
                let mut risk = ctx.risk.lock().await;
                risk.record_stake(BucketName::LateWindow, stake, now);
            }
            pending.push(PendingTrade {
                tag,
                side,
                anchor,
                shares: position.shares,
                size_usd: stake,
                close_ts: market.end_ts,
            });

            tracing::info!(
                window = %window_id,
                direction = signal.direction.as_str(),
                stake = %stake,
                remaining,
                "Late-window entry"
            );
            ctx.journal_entry(
                Stream::Trades,
                json!({
                    "lane": "late_window",
                    "event": "opened",
                    "window": window_id.to_string(),
                    "market": market.question,
                    "side": side.as_str(),
                    "size_usd": stake,
                    "drift_pct": signal.drift_pct,
                    "remaining_secs": remaining,
                }),
            );
            ctx.notify_dashboard(&json!({
                "type": "trade_notification",
                "action": "opened",
                "engine": "late_window",
                "direction": signal.direction.as_str(),
                "size_usd": stake,
            }));
        }

        Ok(())
    }

    /// Resolve trades whose windows have closed
    async fn resolve_due(&self, ctx: &Arc<AppContext>, pending: &mut Vec<PendingTrade>) {
        let now = Utc::now();
        let mut remaining_trades = Vec::new();

        for trade in pending.drain(..) {
            if now < trade.close_ts + Duration::seconds(2) {
                remaining_trades.push(trade);
                continue;
            }

            let settled = match ctx.feed.latest().await {
                Ok(tick) => tick.price,
                Err(_) => {
                    remaining_trades.push(trade);
                    continue;
                }
            };

            let won = match trade.side {
                Side::Yes => settled > trade.anchor,
                Side::No => settled < trade.anchor,
            };
            let push = settled == trade.anchor;
            let pnl = if push {
                Decimal::ZERO
            } else if won {
                (trade.shares - trade.size_usd).round_dp(4)
            } else {
                -trade.size_usd
            };

            let _ = ctx.executor.resolve_position(&trade.tag, pnl).await;
            {
                let mut risk = ctx.risk.lock().await;
                if push {
                    risk.record_push(BucketName::LateWindow, now);
                } else if won {
                    risk.record_win(BucketName::LateWindow, pnl, now);
                } else {
                    risk.record_loss(BucketName::LateWindow, pnl, now);
                }
            }

            let outcome = if push {
                "push"
            } else if won {
                "win"
            } else {
                "loss"
            };
            tracing::info!(tag = %trade.tag, outcome, pnl = %pnl, "Late-window resolved");
            ctx.journal_entry(
                Stream::Trades,
                json!({
                    "lane": "late_window",
                    "event": "resolved",
                    "window": trade.tag,
                    "outcome": outcome,
                    "pnl": pnl,
                }),
            );
        }

        *pending = remaining_trades;
    }
}
