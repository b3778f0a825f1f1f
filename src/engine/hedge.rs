//! Hedge engine
//!
//! Watches open directional positions for a strong flip signal while their
//! window is still live, and buys the opposite side to lock the spread.

use super::window::WindowId;
use super::AppContext;
use crate::config::{HedgeConfig, StrategyConfig};
use crate::execution::{Position, Side};
use crate::journal::Stream;
use crate::signal::{Direction, SignalEngine};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

/// Opposite-side lock-in engine
pub struct HedgeEngine {
    config: HedgeConfig,
    engine: SignalEngine,
    min_liquidity_usd: Decimal,
}

impl HedgeEngine {
    pub fn new(config: HedgeConfig, strategy: StrategyConfig, min_liquidity_usd: Decimal) -> Self {
        Self {
            config,
            engine: SignalEngine::new(strategy),
            min_liquidity_usd,
        }
    }

    pub async fn run(self, ctx: Arc<AppContext>) -> anyhow::Result<()> {
        let mut shutdown = ctx.shutdown_signal();
        let cadence = std::time::Duration::from_secs(self.config.poll_secs.max(5));
        tracing::info!(min_confidence = %self.config.min_confidence, "Hedge engine started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(cadence) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }

            if let Err(e) = self.check_positions(&ctx).await {
                tracing::warn!(error = %e, "Hedge check failed");
                ctx.journal_entry(
                    Stream::Errors,
                    json!({"lane": "hedge", "error": e.to_string()}),
                );
            }
        }

        tracing::info!("Hedge engine stopped");
        Ok(())
    }

    async fn check_positions(&self, ctx: &Arc<AppContext>) -> anyhow::Result<()> {
        // Only directional-lane positions carry a bare window tag
        let candidates: Vec<Position> = ctx
            .executor
            .open_positions()
            .await
            .into_iter()
            .filter(|p| !p.hedged && p.window.parse::<WindowId>().is_ok())
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        let tick = match ctx.feed.latest().await {
            Ok(tick) => tick,
            Err(_) => return Ok(()),
        };
        let candles = ctx.candles.fetch("1m", 60).await?;
        let now = Utc::now();

        for position in candidates {
            let Ok(window_id) = position.window.parse::<WindowId>() else {
                continue;
            };
            // Window already closing; resolution handles it
            let close_ts = window_id.open_ts + window_id.timeframe.secs();
            if now.timestamp() >= close_ts - 30 {
                continue;
            }

            let Some(anchor) = ctx.anchor_for(&window_id).await else {
                continue;
            };

            let signal = self
                .engine
                .evaluate(anchor, tick.price, &candles, Decimal::ZERO);
            let flipped = matches!(
                (position.side, signal.direction),
                (Side::Yes, Direction::Down) | (Side::No, Direction::Up)
            );
            if !flipped || signal.confidence < self.config.min_confidence {
                continue;
            }

            // Find the live market for this window
            let markets = ctx.gamma.discover(&[window_id.timeframe]).await?;
            let Some(market) = markets.into_iter().find(|m| {
                m.window_open_ts() == Some(window_id.open_ts)
                    && m.liquidity >= self.min_liquidity_usd
            }) else {
                continue;
            };

            let hedge_side = position.side.opposite();
            let (token_id, price) = match hedge_side {
                Side::Yes => (market.token_id_up.clone(), market.price_up),
                Side::No => (market.token_id_down.clone(), market.price_down),
            };

            let tag = format!("hedge:{}", window_id);
            let report = ctx
                .executor
                .execute(&tag, hedge_side, &token_id, position.size_usd, price)
                .await?;
            if report.position.is_none() {
                continue;
            }

            ctx.executor.mark_hedged(&position.window).await;
            tracing::info!(
                window = %window_id,
                original = position.side.as_str(),
                hedge = hedge_side.as_str(),
                confidence = %signal.confidence,
                "Position hedged"
            );
            ctx.journal_entry(
                Stream::Trades,
                json!({
                    "lane": "hedge",
                    "event": "hedged",
                    "window": window_id.to_string(),
                    "original_side": position.side.as_str(),
                    "hedge_side": hedge_side.as_str(),
                    "size_usd": position.size_usd,
                    "confidence": signal.confidence,
                }),
            );
            ctx.notify_dashboard(&json!({
                "type": "trade_notification",
                "action": "hedged",
                "engine": "hedge",
                "direction": hedge_side.as_str(),
                "size_usd": position.size_usd,
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_constructor_defaults() {
        let hedge = HedgeEngine::new(
            HedgeConfig::default(),
            StrategyConfig::default(),
            dec!(50),
        );
        assert_eq!(hedge.config.min_confidence, dec!(0.65));
        assert_eq!(hedge.config.poll_secs, 15);
    }
}
