//! Cross-timeframe arbitrage scanner
//!
//! Independent fast loop over all configured timeframes. Full discovery runs
//! on a slow cadence; between discoveries only the known markets' prices are
//! refreshed. When both asks sum below the threshold and the fee-netted edge
//! clears the minimum, both legs are submitted; a lone fill is unwound with
//! an opposite-side order sized to the filled leg.

use super::AppContext;
use crate::config::ArbConfig;
use crate::execution::Side;
use crate::journal::Stream;
use crate::market::{BinaryMarket, Timeframe};
use crate::risk::BucketName;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const MAX_BACKOFF_SECS: i64 = 300;
/// Markets within this much of the threshold are tracked as near misses
const NEAR_MISS_BAND: Decimal = dec!(0.02);
/// Near misses age out of the window after this long
const NEAR_MISS_RETENTION_SECS: i64 = 300;

/// A market that almost cleared the arb threshold
#[derive(Debug, Clone, Serialize)]
pub struct NearMiss {
    pub condition_id: String,
    pub question: String,
    pub timeframe: Timeframe,
    pub combined: Decimal,
    /// Distance to break-even, percent
    pub gap_pct: Decimal,
    pub at: DateTime<Utc>,
}

/// Mutable scan-loop state: the known market set and the near-miss window
struct ScanState {
    known: HashMap<String, BinaryMarket>,
    last_discovery: Option<DateTime<Utc>>,
    near_misses: Vec<NearMiss>,
}

impl ScanState {
    fn new() -> Self {
        Self {
            known: HashMap::new(),
            last_discovery: None,
            near_misses: Vec::new(),
        }
    }
}

/// Fast-polling arbitrage engine
pub struct ArbScanner {
    config: ArbConfig,
    timeframes: Vec<Timeframe>,
    /// Worst-case taker fee percent at 50c, for netting edges
    fee_fallback_pct: Decimal,
}

impl ArbScanner {
    pub fn new(config: ArbConfig, fee_fallback_pct: Decimal) -> Self {
        let timeframes = config
            .timeframes
            .iter()
            .filter_map(|label| Timeframe::from_label(label))
            .collect();
        Self {
            config,
            timeframes,
            fee_fallback_pct,
        }
    }

    pub async fn run(self, ctx: Arc<AppContext>) -> anyhow::Result<()> {
        let mut shutdown = ctx.shutdown_signal();
        let mut state = ScanState::new();
        let mut cooldowns: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut consecutive_errors: u32 = 0;
        let mut backoff_until: Option<DateTime<Utc>> = None;
        let cadence = std::time::Duration::from_secs(self.config.poll_secs.max(1));

        tracing::info!(
            timeframes = ?self.config.timeframes,
            threshold = %self.config.threshold,
            discovery_interval_secs = self.config.discovery_interval_secs,
            "Arb scanner started"
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

            let now = Utc::now();
            if let Some(until) = backoff_until {
                if now < until {
                    continue;
                }
                backoff_until = None;
            }

            match self.scan(&ctx, &mut state, &mut cooldowns).await {
                Ok(()) => {
                    consecutive_errors = 0;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let backoff = (self.config.poll_secs as i64)
                        .saturating_mul(1i64 << consecutive_errors.min(8))
                        .min(MAX_BACKOFF_SECS);
                    backoff_until = Some(now + Duration::seconds(backoff));
                    tracing::error!(
                        error = %e,
                        consecutive_errors,
                        backoff_secs = backoff,
                        "Arb scan error, backing off"
                    );
                    ctx.journal_entry(
                        Stream::Errors,
                        json!({"lane": "arb", "error": e.to_string()}),
                    );
                }
            }
        }

        tracing::info!("Arb scanner stopped");
        Ok(())
    }

    async fn scan(
        &self,
        ctx: &Arc<AppContext>,
        state: &mut ScanState,
        cooldowns: &mut HashMap<String, DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        self.update_markets(ctx, state, now).await?;
        self.track_near_misses(ctx, state, now);

        let mut opportunities: Vec<BinaryMarket> = state
            .known
            .values()
            .filter(|m| self.is_opportunity(m))
            .filter(|m| {
                cooldowns
                    .get(&m.condition_id)
                    .map(|at| now - *at > Duration::seconds(self.config.cooldown_secs as i64))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        opportunities.sort_by(|a, b| b.edge_pct().cmp(&a.edge_pct()));

        for market in opportunities {
            cooldowns.insert(market.condition_id.clone(), now);
            if !self.execute_pair(ctx, &market).await? {
                // Budget exhausted; nothing more to do this round
                break;
            }
        }

        ctx.notify_dashboard(&json!({
            "type": "arb_status",
            "markets_live": state.known.len(),
            "near_misses": state.near_misses.iter().rev().take(5).collect::<Vec<_>>(),
        }));

        Ok(())
    }

    /// Full discovery on the slow cadence; price refresh on the known set
    /// in between
    async fn update_markets(
        &self,
        ctx: &Arc<AppContext>,
        state: &mut ScanState,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let discovery_due = state
            .last_discovery
            .map(|at| now - at >= Duration::seconds(self.config.discovery_interval_secs as i64))
            .unwrap_or(true);

        if discovery_due || state.known.is_empty() {
            let markets = ctx.gamma.discover(&self.timeframes).await?;
            state.last_discovery = Some(now);
            for market in markets {
                state.known.insert(market.condition_id.clone(), market);
            }
            tracing::debug!(markets_live = state.known.len(), "Arb discovery");
        } else {
            for market in state.known.values_mut() {
                if let Some(updated) = ctx.gamma.refresh(market).await {
                    market.price_up = updated.price_up;
                    market.price_down = updated.price_down;
                    market.liquidity = updated.liquidity;
                    market.volume = updated.volume;
                }
            }
        }

        // Expire closed windows
        state.known.retain(|_, m| m.remaining_secs(now) > 0);
        Ok(())
    }

    /// Record markets sitting just above the threshold; they show how close
    /// the book runs to free money
    fn track_near_misses(&self, ctx: &Arc<AppContext>, state: &mut ScanState, now: DateTime<Utc>) {
        state
            .near_misses
            .retain(|nm| now - nm.at < Duration::seconds(NEAR_MISS_RETENTION_SECS));

        for market in state.known.values() {
            if !self.is_near_miss(market) {
                continue;
            }
            let tracked = state
                .near_misses
                .iter()
                .any(|nm| nm.condition_id == market.condition_id);
            if tracked {
                continue;
            }

            let combined = market.combined();
            let gap_pct = ((combined - Decimal::ONE).max(Decimal::ONE - combined)
                * Decimal::ONE_HUNDRED)
                .round_dp(2);
            let near_miss = NearMiss {
                condition_id: market.condition_id.clone(),
                question: market.question.clone(),
                timeframe: market.timeframe,
                combined: combined.round_dp(4),
                gap_pct,
                at: now,
            };
            tracing::debug!(
                market = %near_miss.condition_id,
                combined = %near_miss.combined,
                "Arb near miss"
            );
            ctx.journal_entry(
                Stream::Strategy,
                json!({
                    "lane": "arb",
                    "event": "near_miss",
                    "market": near_miss.question,
                    "timeframe": near_miss.timeframe.label(),
                    "combined": near_miss.combined,
                }),
            );
            state.near_misses.push(near_miss);
        }
    }

    /// Combined sum within the near-miss band at or above the threshold
    fn is_near_miss(&self, market: &BinaryMarket) -> bool {
        let combined = market.combined();
        combined >= self.config.threshold && combined < self.config.threshold + NEAR_MISS_BAND
    }

    /// Both asks below the threshold with a fee-netted edge worth taking
    fn is_opportunity(&self, market: &BinaryMarket) -> bool {
        if market.remaining_secs(Utc::now()) <= 0 {
            return false;
        }
        let combined = market.combined();
        if combined <= Decimal::ZERO || combined >= self.config.threshold {
            return false;
        }
        let edge_pct = market.edge_pct();
        if edge_pct < self.config.min_edge_pct {
            return false;
        }
        self.net_edge_pct(market) > Decimal::ZERO
    }

    /// Edge after the parabolic taker fee on each leg
    fn net_edge_pct(&self, market: &BinaryMarket) -> Decimal {
        let fee = |p: Decimal| -> Decimal {
            if p <= Decimal::ZERO || p >= Decimal::ONE {
                return Decimal::ZERO;
            }
            self.fee_fallback_pct * dec!(4) * p * (Decimal::ONE - p)
        };
        market.edge_pct() - fee(market.price_up) - fee(market.price_down)
    }

    /// Submit both legs; returns false when the daily budget is exhausted
    async fn execute_pair(
        &self,
        ctx: &Arc<AppContext>,
        market: &BinaryMarket,
    ) -> anyhow::Result<bool> {
        let size = self.config.size_per_side_usd;
        let now = Utc::now();

        let reserved = {
            let mut risk = ctx.risk.lock().await;
            risk.reserve(BucketName::Arb, size * Decimal::TWO, now)
        };
        if let Err(veto) = reserved {
            tracing::info!(veto = %veto, "Arb blocked");
            return Ok(false);
        }

        let tag = format!("arb:{}", market.condition_id);
        let yes_tag = format!("{}:yes", tag);
        let no_tag = format!("{}:no", tag);

        let (yes_report, no_report) = tokio::join!(
            ctx.executor
                .execute(&yes_tag, Side::Yes, &market.token_id_up, size, market.price_up),
            ctx.executor
                .execute(&no_tag, Side::No, &market.token_id_down, size, market.price_down),
        );

        let yes_filled = matches!(&yes_report, Ok(r) if r.position.is_some());
        let no_filled = matches!(&no_report, Ok(r) if r.position.is_some());

        let combined = market.combined();
        let gross_profit = if combined > Decimal::ZERO {
            (size * (Decimal::ONE / combined - Decimal::ONE)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        let status = match (yes_filled, no_filled) {
            (true, true) => "filled",
            (false, false) => "failed",
            _ => "partial",
        };

        tracing::info!(
            market = %market.condition_id,
            timeframe = %market.timeframe,
            combined = %combined,
            edge_pct = %market.edge_pct(),
            gross_profit = %gross_profit,
            status,
            "Arb pair"
        );
        ctx.journal_entry(
            Stream::Trades,
            json!({
                "lane": "arb",
                "event": "arb_pair",
                "market": market.question,
                "timeframe": market.timeframe.label(),
                "price_yes": market.price_up,
                "price_no": market.price_down,
                "combined": combined,
                "edge_pct": market.edge_pct(),
                "size_per_side": size,
                "status": status,
            }),
        );

        // A lone fill is unwound with an opposite-side order sized to the
        // filled leg, accounted against the same bucket
        if status == "partial" {
            let (filled_side, token_id, price) = if yes_filled {
                (Side::Yes, market.token_id_down.clone(), market.price_down)
            } else {
                (Side::No, market.token_id_up.clone(), market.price_up)
            };
            let rollback_tag = format!("{}:rollback", tag);
            tracing::warn!(market = %market.condition_id, "Arb leg orphaned, unwinding");
            match ctx
                .executor
                .execute(&rollback_tag, filled_side.opposite(), &token_id, size, price)
                .await
            {
                Ok(report) if report.position.is_some() => {
                    let mut risk = ctx.risk.lock().await;
                    risk.record_stake(BucketName::Arb, size, now);
                }
                Ok(_) | Err(_) => {
                    ctx.journal_entry(
                        Stream::Errors,
                        json!({
                            "lane": "arb",
                            "market": market.condition_id,
                            "error": "rollback leg did not fill",
                        }),
                    );
                }
            }
        }

        ctx.notify_dashboard(&json!({
            "type": "trade_notification",
            "action": "arb",
            "engine": "arb",
            "direction": "both",
            "size_usd": size * Decimal::TWO,
            "status": status,
        }));

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn scanner() -> ArbScanner {
        ArbScanner::new(ArbConfig::default(), dec!(1.56))
    }

    fn market(price_up: Decimal, price_down: Decimal) -> BinaryMarket {
        BinaryMarket {
            condition_id: "cond".to_string(),
            question: "BTC up or down?".to_string(),
            slug: "btc-updown-15m-1771591500".to_string(),
            token_id_up: "up".to_string(),
            token_id_down: "down".to_string(),
            price_up,
            price_down,
            liquidity: dec!(1000),
            volume: dec!(0),
            timeframe: Timeframe::M15,
            end_ts: Utc::now() + Duration::minutes(10),
        }
    }

    #[test]
    fn test_opportunity_detection() {
        // 0.45 + 0.48 = 0.93, edge 7%
        assert!(scanner().is_opportunity(&market(dec!(0.45), dec!(0.48))));
        // Sum at or above the threshold is no opportunity
        assert!(!scanner().is_opportunity(&market(dec!(0.50), dec!(0.50))));
        assert!(!scanner().is_opportunity(&market(dec!(0.49), dec!(0.492))));
    }

    #[test]
    fn test_edge_must_clear_fees() {
        // 2.1% raw edge clears the threshold but two legs near 50c cost
        // ~3.1% in fees
        let thin = market(dec!(0.489), dec!(0.49));
        assert!(thin.combined() < dec!(0.98));
        assert!(thin.edge_pct() >= dec!(1.0));
        assert!(!scanner().is_opportunity(&thin));

        // Deep edge survives fees
        assert!(scanner().net_edge_pct(&market(dec!(0.45), dec!(0.48))) > Decimal::ZERO);
    }

    #[test]
    fn test_near_miss_band() {
        let s = scanner();
        // Exactly at the threshold: no longer an opportunity, still close
        assert!(s.is_near_miss(&market(dec!(0.49), dec!(0.49))));
        assert!(s.is_near_miss(&market(dec!(0.495), dec!(0.5))));
        // Past the band it is just a normal market
        assert!(!s.is_near_miss(&market(dec!(0.50), dec!(0.50))));
        // Below the threshold it is an opportunity, not a near miss
        assert!(!s.is_near_miss(&market(dec!(0.45), dec!(0.48))));
    }

    #[test]
    fn test_timeframe_parsing() {
        let s = scanner();
        assert_eq!(s.timeframes.len(), 4);
        assert!(s.timeframes.contains(&Timeframe::H1));
    }

    fn test_context(mode: crate::execution::PaperFillMode) -> (Arc<AppContext>, tempfile::TempDir) {
        use crate::config::Config;
        use crate::execution::{ExecutorConfig, OrderExecutor, PaperClob};
        use crate::feed::PriceFeed;
        use crate::journal::Journal;
        use crate::market::GammaClient;
        use crate::risk::RiskManager;

        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::default();
        let executor = OrderExecutor::new(
            Arc::new(PaperClob::new(mode)),
            ExecutorConfig::from_clob_config(&config.clob),
        );
        let journal = Journal::new(
            dir.path().join("logs"),
            dir.path().join("data/performance.json"),
        )
        .unwrap();
        let (shutdown_tx, _) = tokio::sync::watch::channel(false);
        let mut risk_config = config.risk.clone();
        risk_config.arb.budget_cap_usd = Some(config.arb.max_daily_budget);
        let ctx = AppContext::new(
            config.clone(),
            PriceFeed::detached(config.oracle.clone()),
            crate::feed::CandleClient::new(&config.oracle.binance_base_url).unwrap(),
            GammaClient::new(&config.clob.gamma_api_url).unwrap(),
            executor,
            RiskManager::new(&risk_config, config.bankroll, Utc::now()),
            journal,
            None,
            shutdown_tx,
        );
        (Arc::new(ctx), dir)
    }

    #[tokio::test(start_paused = true)]
    async fn test_arb_capture_submits_both_legs() {
        let (ctx, _dir) = test_context(crate::execution::PaperFillMode::InstantFill);
        let s = scanner();
        let m = market(dec!(0.45), dec!(0.48));
        assert!(s.is_opportunity(&m));

        let proceeded = s.execute_pair(&ctx, &m).await.unwrap();
        assert!(proceeded);

        // Both legs opened positions
        let positions = ctx.executor.open_positions().await;
        assert_eq!(positions.len(), 2);
        assert!(positions.iter().any(|p| p.side == Side::Yes));
        assert!(positions.iter().any(|p| p.side == Side::No));

        // Daily arb budget decremented by both sides
        let status = ctx.risk.lock().await.status(Utc::now());
        let arb = status
            .iter()
            .find(|b| b.name == crate::risk::BucketName::Arb)
            .unwrap();
        assert_eq!(arb.used_usd, dec!(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_arb_budget_exhaustion_stops_round() {
        let (ctx, _dir) = test_context(crate::execution::PaperFillMode::InstantFill);
        let s = scanner();
        let m = market(dec!(0.45), dec!(0.48));

        // $20/day budget admits two $10 pairs
        assert!(s.execute_pair(&ctx, &m).await.unwrap());
        assert!(s.execute_pair(&ctx, &m).await.unwrap());
        assert!(!s.execute_pair(&ctx, &m).await.unwrap());
    }

    #[tokio::test]
    async fn test_near_miss_tracking_dedups_and_ages() {
        let (ctx, _dir) = test_context(crate::execution::PaperFillMode::Reject);
        let s = scanner();
        let mut state = ScanState::new();
        let m = market(dec!(0.49), dec!(0.493));
        state.known.insert(m.condition_id.clone(), m);

        let now = Utc::now();
        s.track_near_misses(&ctx, &mut state, now);
        assert_eq!(state.near_misses.len(), 1);
        assert_eq!(state.near_misses[0].combined, dec!(0.9830));

        // Same market seen again inside the window: no duplicate
        s.track_near_misses(&ctx, &mut state, now + Duration::seconds(8));
        assert_eq!(state.near_misses.len(), 1);

        // After the retention window the entry ages out and re-records
        s.track_near_misses(&ctx, &mut state, now + Duration::seconds(301));
        assert_eq!(state.near_misses.len(), 1);
        assert_eq!(state.near_misses[0].at, now + Duration::seconds(301));
    }
}
