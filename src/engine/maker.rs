//! Market making engine
//!
//! Posts resting post-only bids on both outcome tokens around a mid derived
//! from the oracle price, pockets the spread, and pulls every quote well
//! before resolution. Fills are detected by diffing resting quotes against
//! the wallet's open orders, excluding ids we cancelled ourselves; a
//! lopsided inventory pauses the heavy side.

use super::window::WindowId;
use super::AppContext;
use crate::config::MarketMakerConfig;
use crate::execution::Side;
use crate::journal::Stream;
use crate::market::{BinaryMarket, Timeframe};
use crate::risk::BucketName;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

/// Drift percent that maps the oracle mid to certainty; matches the entry
/// signal's calibration point
const DRIFT_FULL_SCALE_PCT: Decimal = dec!(0.10);
/// Only quote balanced markets
const MIN_QUOTABLE_MID: Decimal = dec!(0.35);
const MAX_QUOTABLE_MID: Decimal = dec!(0.65);
/// Hard price filter on individual quotes
const MIN_QUOTE_PRICE: Decimal = dec!(0.25);
const MAX_QUOTE_PRICE: Decimal = dec!(0.75);

/// One resting quote we posted
#[derive(Debug, Clone)]
struct Quote {
    order_id: String,
    condition_id: String,
    side: Side,
    price: Decimal,
    size_usd: Decimal,
}

/// Quote-loop state: resting quotes, self-cancelled ids, inventory tally
struct MakerState {
    quotes: Vec<Quote>,
    /// Ids we cancelled ourselves; their disappearance from the book is
    /// not a fill
    cancelled_ids: HashSet<String>,
    yes_fills: Decimal,
    no_fills: Decimal,
}

impl MakerState {
    fn new() -> Self {
        Self {
            quotes: Vec::new(),
            cancelled_ids: HashSet::new(),
            yes_fills: Decimal::ZERO,
            no_fills: Decimal::ZERO,
        }
    }
}

/// Post-only quoting loop
pub struct MarketMaker {
    config: MarketMakerConfig,
    timeframes: Vec<Timeframe>,
}

impl MarketMaker {
    pub fn new(config: MarketMakerConfig) -> Self {
        let timeframes = config
            .timeframes
            .iter()
            .filter_map(|label| Timeframe::from_label(label))
            .collect();
        Self { config, timeframes }
    }

    pub fn half_spread(&self) -> Decimal {
        Decimal::from(self.config.spread_bps) / dec!(10000)
    }

    /// Mid for the Up outcome, derived from the oracle drift off the window
    /// anchor: zero drift reads 0.5, full-scale drift pins the outcome
    fn oracle_mid(oracle_price: Decimal, anchor_price: Decimal) -> Option<Decimal> {
        if anchor_price <= Decimal::ZERO {
            return None;
        }
        let drift_pct =
            (oracle_price - anchor_price) / anchor_price * Decimal::ONE_HUNDRED;
        let v = (drift_pct / DRIFT_FULL_SCALE_PCT).clamp(dec!(-1), dec!(1));
        Some((dec!(0.5) + v / Decimal::TWO).round_dp(4))
    }

    pub async fn run(self, ctx: Arc<AppContext>) -> anyhow::Result<()> {
        let mut shutdown = ctx.shutdown_signal();
        let mut state = MakerState::new();
        let cadence = std::time::Duration::from_secs(self.config.refresh_secs.max(1));

        tracing::info!(
            spread_bps = self.config.spread_bps,
            size = %self.config.order_size_usd,
            "Market maker started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(cadence) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }

            self.detect_fills(&ctx, &mut state).await;

            if let Err(e) = self.requote(&ctx, &mut state).await {
                tracing::warn!(error = %e, "Maker requote failed");
                ctx.journal_entry(
                    Stream::Errors,
                    json!({"lane": "mm", "error": e.to_string()}),
                );
            }
        }

        // Shutdown: pull everything still resting
        let quotes = std::mem::take(&mut state.quotes);
        for quote in quotes {
            self.cancel_quote(&ctx, &quote, &mut state.cancelled_ids).await;
        }
        tracing::info!("Market maker stopped");
        Ok(())
    }

    /// Diff resting quotes against the wallet's open orders. A tracked
    /// quote that is gone from the book and that we did not cancel is a
    /// fill; it joins the inventory tally.
    async fn detect_fills(&self, ctx: &Arc<AppContext>, state: &mut MakerState) {
        if state.quotes.is_empty() {
            return;
        }

        let open_ids: HashSet<String> = match ctx.executor.open_clob_orders().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::debug!(error = %e, "Open-orders read failed, skipping fill check");
                return;
            }
        };

        let mut still_resting = Vec::new();
        for quote in state.quotes.drain(..) {
            if open_ids.contains(&quote.order_id) {
                still_resting.push(quote);
                continue;
            }
            if state.cancelled_ids.contains(&quote.order_id) {
                // We pulled this one ourselves
                continue;
            }

            // Genuinely filled
            match quote.side {
                Side::Yes => state.yes_fills += quote.size_usd,
                Side::No => state.no_fills += quote.size_usd,
            }
            tracing::info!(
                order_id = %quote.order_id,
                side = quote.side.as_str(),
                price = %quote.price,
                yes_fills = %state.yes_fills,
                no_fills = %state.no_fills,
                "Maker quote filled"
            );
            ctx.journal_entry(
                Stream::Trades,
                json!({
                    "lane": "mm",
                    "event": "quote_filled",
                    "market": quote.condition_id,
                    "side": quote.side.as_str(),
                    "price": quote.price,
                    "size_usd": quote.size_usd,
                }),
            );
        }
        state.quotes = still_resting;
    }

    /// Record the id as self-cancelled before pulling the order, so the
    /// fill diff never mistakes the pull for a fill
    async fn cancel_quote(
        &self,
        ctx: &Arc<AppContext>,
        quote: &Quote,
        cancelled_ids: &mut HashSet<String>,
    ) {
        cancelled_ids.insert(quote.order_id.clone());
        ctx.executor.cancel_order(&quote.order_id).await;
        if cancelled_ids.len() > 512 {
            cancelled_ids.clear();
        }
    }

    /// Cancel stale quotes and post fresh ones around the oracle mid
    async fn requote(&self, ctx: &Arc<AppContext>, state: &mut MakerState) -> anyhow::Result<()> {
        let markets = ctx.gamma.discover(&self.timeframes).await?;
        let now = Utc::now();

        // Quote only the deepest market with enough runway left
        let min_runway = self.config.pull_before_close_secs + self.config.refresh_secs as i64;
        let target: Option<BinaryMarket> = markets
            .into_iter()
            .filter(|m| m.remaining_secs(now) > min_runway)
            .max_by(|a, b| a.liquidity.cmp(&b.liquidity));

        // Pull quotes that no longer belong: wrong market, or inside the
        // pre-close window
        let keep_condition = target.as_ref().map(|m| m.condition_id.clone());
        let quotes = std::mem::take(&mut state.quotes);
        let mut kept = Vec::new();
        for quote in quotes {
            let stale = keep_condition
                .as_ref()
                .map(|cid| quote.condition_id != *cid)
                .unwrap_or(true);
            if stale {
                self.cancel_quote(ctx, &quote, &mut state.cancelled_ids).await;
            } else {
                kept.push(quote);
            }
        }
        state.quotes = kept;

        let Some(market) = target else {
            return Ok(());
        };
        if !state.quotes.is_empty() {
            // Current quotes still stand for this market
            return Ok(());
        }

        // Mid comes from the oracle, not from the book being quoted
        let Ok(reconciled) = ctx.feed.reconciled().await else {
            return Ok(());
        };
        let Some(open_ts) = market.window_open_ts() else {
            return Ok(());
        };
        let window_id = WindowId::new(market.timeframe, open_ts);
        let Some(anchor) = ctx.anchor_for(&window_id).await else {
            tracing::debug!(window = %window_id, "No anchor for maker mid, skipping");
            return Ok(());
        };
        let Some(mid) = Self::oracle_mid(reconciled.price, anchor) else {
            return Ok(());
        };

        // Lopsided windows are directional territory, not maker territory
        if mid <= MIN_QUOTABLE_MID || mid >= MAX_QUOTABLE_MID {
            tracing::debug!(mid = %mid, "Market too lopsided to quote");
            return Ok(());
        }

        let imbalance = state.yes_fills - state.no_fills;
        let spread = self.half_spread();
        let sides = [
            (
                Side::Yes,
                market.token_id_up.clone(),
                (mid - spread).round_dp(2),
            ),
            (
                Side::No,
                market.token_id_down.clone(),
                (Decimal::ONE - mid - spread).round_dp(2),
            ),
        ];

        for (side, token_id, bid) in sides {
            // Pause the heavy side instead of widening it
            let heavy = match side {
                Side::Yes => imbalance >= self.config.max_inventory_imbalance,
                Side::No => -imbalance >= self.config.max_inventory_imbalance,
            };
            if heavy {
                tracing::debug!(side = side.as_str(), "Inventory heavy, side paused");
                continue;
            }

            if bid < MIN_QUOTE_PRICE || bid > MAX_QUOTE_PRICE {
                continue;
            }

            let reserved = {
                let mut risk = ctx.risk.lock().await;
                risk.reserve(BucketName::MarketMaker, self.config.order_size_usd, now)
            };
            if reserved.is_err() {
                tracing::info!("Maker budget exhausted");
                break;
            }

            if let Some(order_id) = ctx
                .executor
                .place_quote(side, &token_id, bid, self.config.order_size_usd)
                .await?
            {
                tracing::debug!(
                    side = side.as_str(),
                    price = %bid,
                    mid = %mid,
                    "Maker quote posted"
                );
                state.quotes.push(Quote {
                    order_id,
                    condition_id: market.condition_id.clone(),
                    side,
                    price: bid,
                    size_usd: self.config.order_size_usd,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_spread_from_bps() {
        let maker = MarketMaker::new(MarketMakerConfig {
            spread_bps: 400,
            ..MarketMakerConfig::default()
        });
        assert_eq!(maker.half_spread(), dec!(0.04));
    }

    #[test]
    fn test_timeframes_parsed() {
        let maker = MarketMaker::new(MarketMakerConfig::default());
        assert_eq!(maker.timeframes, vec![Timeframe::M15, Timeframe::M5]);
    }

    #[test]
    fn test_oracle_mid_mapping() {
        // Zero drift: dead even
        assert_eq!(
            MarketMaker::oracle_mid(dec!(60000), dec!(60000)),
            Some(dec!(0.5))
        );
        // +0.05% drift: halfway up
        assert_eq!(
            MarketMaker::oracle_mid(dec!(60030), dec!(60000)),
            Some(dec!(0.75))
        );
        // Full-scale drift clamps at certainty
        assert_eq!(
            MarketMaker::oracle_mid(dec!(60600), dec!(60000)),
            Some(dec!(1.0000))
        );
        // Down drift mirrors
        assert_eq!(
            MarketMaker::oracle_mid(dec!(59970), dec!(60000)),
            Some(dec!(0.25))
        );
        // No anchor, no mid
        assert_eq!(MarketMaker::oracle_mid(dec!(60000), dec!(0)), None);
    }

    #[test]
    fn test_quotable_band_brackets_even_money() {
        // A 0.05% drift mid (0.75) is already outside the quotable band;
        // the maker only works near-balanced windows
        let mid = MarketMaker::oracle_mid(dec!(60030), dec!(60000)).unwrap();
        assert!(mid >= MAX_QUOTABLE_MID);

        let balanced = MarketMaker::oracle_mid(dec!(60006), dec!(60000)).unwrap();
        assert!(balanced > MIN_QUOTABLE_MID && balanced < MAX_QUOTABLE_MID);
    }
}
