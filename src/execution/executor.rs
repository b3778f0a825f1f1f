//! Order executor
//!
//! First attempt is Fill-or-Kill at a limit inside the slippage band; an
//! unfilled or timed-out FoK is resubmitted Good-Til-Cancelled at the same
//! limit. Every success response is verified against the book before a
//! position is recorded; a success with no observable shares is a phantom
//! fill and records nothing.

use super::{
    ClobApi, Order, OrderAck, OrderState, OrderTicket, Position, Side, Tif,
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

const VERIFY_FIRST_WAIT: Duration = Duration::from_secs(3);
const VERIFY_SECOND_WAIT: Duration = Duration::from_secs(2);
const STATUS_CALL_TIMEOUT: Duration = Duration::from_secs(3);
const SUBMIT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Executor tuning
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub fok_timeout: Duration,
    /// Slippage band applied to the limit price, percent of the quoted price
    pub max_slippage_pct: Decimal,
    /// Taker fee percent at 50c when the venue fee endpoint is unavailable
    pub fee_fallback_pct: Decimal,
}

impl ExecutorConfig {
    pub fn from_clob_config(config: &crate::config::ClobConfig) -> Self {
        Self {
            fok_timeout: Duration::from_millis(config.fok_timeout_ms),
            max_slippage_pct: config.max_slippage_pct,
            fee_fallback_pct: config.fee_fallback_pct,
        }
    }
}

/// Outcome of one execution attempt
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub order: Order,
    /// Present only after a verified fill
    pub position: Option<Position>,
}

/// Shared order executor; serializes submits per wallet
pub struct OrderExecutor {
    clob: Arc<dyn ClobApi>,
    config: ExecutorConfig,
    /// One wallet, one nonce stream: submits must not interleave
    submit_lock: Mutex<()>,
    /// Venue order id → internal id, for shutdown cancellation
    open_orders: Mutex<HashMap<String, Uuid>>,
    /// Open positions by window tag
    positions: Mutex<Vec<Position>>,
}

impl OrderExecutor {
    pub fn new(clob: Arc<dyn ClobApi>, config: ExecutorConfig) -> Self {
        Self {
            clob,
            config,
            submit_lock: Mutex::new(()),
            open_orders: Mutex::new(HashMap::new()),
            positions: Mutex::new(Vec::new()),
        }
    }

    /// Limit price within the slippage band of the quoted price
    fn limit_price(&self, quoted: Decimal) -> Decimal {
        let banded = quoted * (Decimal::ONE + self.config.max_slippage_pct / Decimal::ONE_HUNDRED);
        banded.round_dp(2).clamp(dec!(0.01), dec!(0.99))
    }

    /// Parabolic taker-fee estimate: highest at 50c, zero at the extremes
    pub fn estimated_fee_pct(&self, price: Decimal) -> Decimal {
        if price <= Decimal::ZERO || price >= Decimal::ONE {
            return Decimal::ZERO;
        }
        (self.config.fee_fallback_pct * dec!(4) * price * (Decimal::ONE - price)).round_dp(4)
    }

    /// Fee estimate for a specific token, venue rate when available
    pub async fn fee_pct_for(&self, token_id: &str, price: Decimal) -> Decimal {
        match self.clob.fee_rate_bps(token_id).await {
            Ok(Some(bps)) => {
                let rate = Decimal::from(bps) / dec!(10000);
                (rate * (Decimal::ONE - price) * Decimal::ONE_HUNDRED).round_dp(4)
            }
            _ => self.estimated_fee_pct(price),
        }
    }

    /// Submit an order for a window and verify the fill
    pub async fn execute(
        &self,
        window: &str,
        side: Side,
        token_id: &str,
        size_usd: Decimal,
        quoted_price: Decimal,
    ) -> anyhow::Result<ExecutionReport> {
        let limit_price = self.limit_price(quoted_price);
        let mut order = Order {
            id: Uuid::new_v4(),
            window: window.to_string(),
            side,
            token_id: token_id.to_string(),
            size_usd,
            limit_price,
            tif: Tif::Fok,
            state: OrderState::Submitted,
            clob_id: None,
            submitted_at: Utc::now(),
        };

        // Attempt 1: Fill-or-Kill
        let fok_ticket = OrderTicket {
            token_id: token_id.to_string(),
            side,
            limit_price,
            size_usd,
            tif: Tif::Fok,
            post_only: false,
        };
        let fok_ack = self.submit_with_timeout(&fok_ticket, self.config.fok_timeout).await;

        let ack = match fok_ack {
            Some(ack) if ack.success || ack.status_is("matched") => ack,
            other => {
                // Attempt 2: Good-Til-Cancelled at the same limit
                if let Some(ack) = &other {
                    tracing::warn!(
                        window,
                        status = %ack.status,
                        "FoK unfilled, resubmitting as GTC"
                    );
                } else {
                    tracing::warn!(window, "FoK timed out, resubmitting as GTC");
                }
                order.tif = Tif::Gtc;
                let gtc_ticket = OrderTicket {
                    tif: Tif::Gtc,
                    ..fok_ticket.clone()
                };
                match self.submit_with_timeout(&gtc_ticket, SUBMIT_FALLBACK_TIMEOUT).await {
                    Some(ack) => ack,
                    None => {
                        order.state = OrderState::Failed;
                        tracing::error!(window, "GTC submit failed");
                        return Ok(ExecutionReport {
                            order,
                            position: None,
                        });
                    }
                }
            }
        };

        order.clob_id = Some(ack.id.clone());
        if ack.status_is("rejected") || (!ack.success && !ack.status_is("live") && !ack.status_is("matched")) {
            order.state = OrderState::Failed;
            tracing::error!(window, status = %ack.status, "Order rejected");
            return Ok(ExecutionReport {
                order,
                position: None,
            });
        }

        if !ack.id.is_empty() {
            self.open_orders.lock().await.insert(ack.id.clone(), order.id);
        }
        let claimed_success = ack.success || ack.status_is("matched");
        if claimed_success {
            order.state = OrderState::Matched;
        }

        // Fill verification: 3s then 2s
        tokio::time::sleep(VERIFY_FIRST_WAIT).await;
        let mut verified = self.check_filled(&ack.id).await;
        if verified.is_none() {
            tokio::time::sleep(VERIFY_SECOND_WAIT).await;
            verified = self.check_filled(&ack.id).await;
        }

        self.open_orders.lock().await.remove(&ack.id);

        match verified {
            Some(filled_size) => {
                order.state = OrderState::Filled;
                let shares = if filled_size > Decimal::ZERO {
                    filled_size
                } else {
                    (size_usd / limit_price).round_dp(2)
                };
                let position = Position {
                    window: window.to_string(),
                    side,
                    shares,
                    entry_price: limit_price,
                    size_usd,
                    entry_ts: Utc::now(),
                    realized_pnl: None,
                    hedged: false,
                };
                self.positions.lock().await.push(position.clone());
                tracing::info!(
                    window,
                    side = side.as_str(),
                    size = %size_usd,
                    price = %limit_price,
                    "Fill verified"
                );
                Ok(ExecutionReport {
                    order,
                    position: Some(position),
                })
            }
            None if claimed_success => {
                // Success response with no shares on the book or settled
                order.state = OrderState::Phantom;
                tracing::error!(
                    window,
                    order_id = %ack.id,
                    "Phantom fill: success response but no shares; not recording a position"
                );
                Ok(ExecutionReport {
                    order,
                    position: None,
                })
            }
            None => {
                // A resting GTC that never filled is cancelled, not phantom
                if let Err(e) = self.clob.cancel(&ack.id).await {
                    tracing::warn!(order_id = %ack.id, error = %e, "Cancel after no-fill failed");
                }
                order.state = OrderState::Cancelled;
                tracing::info!(window, order_id = %ack.id, "Unfilled order cancelled");
                Ok(ExecutionReport {
                    order,
                    position: None,
                })
            }
        }
    }

    /// Post-only resting quote for the maker lane; no fill verification
    pub async fn place_quote(
        &self,
        side: Side,
        token_id: &str,
        price: Decimal,
        size_usd: Decimal,
    ) -> anyhow::Result<Option<String>> {
        let ticket = OrderTicket {
            token_id: token_id.to_string(),
            side,
            limit_price: price,
            size_usd,
            tif: Tif::Gtc,
            post_only: true,
        };

        let ack = match self.submit_with_timeout(&ticket, SUBMIT_FALLBACK_TIMEOUT).await {
            Some(ack) => ack,
            None => return Ok(None),
        };

        if ack.status_is("live") || ack.success {
            if !ack.id.is_empty() {
                self.open_orders.lock().await.insert(ack.id.clone(), Uuid::new_v4());
            }
            Ok(Some(ack.id))
        } else {
            tracing::debug!(status = %ack.status, "Maker quote rejected");
            Ok(None)
        }
    }

    /// Ids of every order still resting on the book for this wallet
    pub async fn open_clob_orders(&self) -> anyhow::Result<Vec<String>> {
        self.clob.open_orders().await
    }

    /// Cancel a specific venue order id
    pub async fn cancel_order(&self, order_id: &str) {
        if let Err(e) = self.clob.cancel(order_id).await {
            tracing::warn!(order_id, error = %e, "Cancel failed");
        }
        self.open_orders.lock().await.remove(order_id);
    }

    /// Best-effort cancel of everything still open (shutdown path)
    pub async fn cancel_all_open(&self) {
        let ids: Vec<String> = self.open_orders.lock().await.keys().cloned().collect();
        for id in ids {
            self.cancel_order(&id).await;
        }
    }

    /// Live account balance, when the venue exposes one
    pub async fn live_balance_usd(&self) -> Option<Decimal> {
        match self.clob.available_balance_usd().await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(error = %e, "Balance read failed");
                None
            }
        }
    }

    /// Open positions snapshot
    pub async fn open_positions(&self) -> Vec<Position> {
        self.positions.lock().await.clone()
    }

    /// Mark a window's position as hedged
    pub async fn mark_hedged(&self, window: &str) {
        let mut positions = self.positions.lock().await;
        for p in positions.iter_mut() {
            if p.window == window {
                p.hedged = true;
            }
        }
    }

    /// Close out a window's position with its realized P&L
    pub async fn resolve_position(&self, window: &str, pnl: Decimal) -> Option<Position> {
        let mut positions = self.positions.lock().await;
        let idx = positions.iter().position(|p| p.window == window)?;
        let mut position = positions.remove(idx);
        position.realized_pnl = Some(pnl);
        Some(position)
    }

    async fn submit_with_timeout(
        &self,
        ticket: &OrderTicket,
        timeout: Duration,
    ) -> Option<OrderAck> {
        let signed = match self.clob.sign_order(ticket).await {
            Ok(signed) => signed,
            Err(e) => {
                tracing::error!(error = %e, "Order signing failed");
                return None;
            }
        };

        let _guard = self.submit_lock.lock().await;
        match tokio::time::timeout(timeout, self.clob.submit(&signed)).await {
            Ok(Ok(ack)) => Some(ack),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Submit failed");
                None
            }
            Err(_) => {
                tracing::warn!("Submit timed out");
                None
            }
        }
    }

    /// One status poll; Some(filled_size) when shares are observable
    async fn check_filled(&self, order_id: &str) -> Option<Decimal> {
        if order_id.is_empty() {
            return None;
        }
        match tokio::time::timeout(STATUS_CALL_TIMEOUT, self.clob.status(order_id)).await {
            Ok(Ok(status)) if status.is_filled() => Some(status.filled_size),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(order_id, error = %e, "Status poll failed");
                None
            }
            Err(_) => {
                tracing::warn!(order_id, "Status poll timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{PaperClob, PaperFillMode};

    fn executor(mode: PaperFillMode) -> OrderExecutor {
        OrderExecutor::new(
            Arc::new(PaperClob::new(mode)),
            ExecutorConfig {
                fok_timeout: Duration::from_secs(2),
                max_slippage_pct: dec!(2.0),
                fee_fallback_pct: dec!(1.56),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_fill_opens_position() {
        let exec = executor(PaperFillMode::InstantFill);
        let report = exec
            .execute("15m@1771591500", Side::Yes, "tok", dec!(25), dec!(0.52))
            .await
            .unwrap();

        assert_eq!(report.order.state, OrderState::Filled);
        let position = report.position.unwrap();
        assert_eq!(position.side, Side::Yes);
        assert_eq!(position.size_usd, dec!(25));
        assert_eq!(exec.open_positions().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phantom_fill_records_no_position() {
        let exec = executor(PaperFillMode::PhantomFill);
        let report = exec
            .execute("15m@1771591500", Side::Yes, "tok", dec!(25), dec!(0.52))
            .await
            .unwrap();

        assert_eq!(report.order.state, OrderState::Phantom);
        assert!(report.position.is_none());
        assert!(exec.open_positions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fill_is_cancelled() {
        let exec = executor(PaperFillMode::NeverFill);
        let report = exec
            .execute("5m@1771591500", Side::No, "tok", dec!(10), dec!(0.48))
            .await
            .unwrap();

        assert_eq!(report.order.state, OrderState::Cancelled);
        assert!(report.position.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_is_failed() {
        let exec = executor(PaperFillMode::Reject);
        let report = exec
            .execute("15m@1771591500", Side::Yes, "tok", dec!(25), dec!(0.52))
            .await
            .unwrap();
        assert_eq!(report.order.state, OrderState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fok_falls_back_to_gtc() {
        let exec = executor(PaperFillMode::NeverFill);
        let report = exec
            .execute("15m@1771591500", Side::Yes, "tok", dec!(25), dec!(0.52))
            .await
            .unwrap();
        assert_eq!(report.order.tif, Tif::Gtc);
    }

    #[test]
    fn test_limit_price_band() {
        let exec = executor(PaperFillMode::InstantFill);
        // 0.50 with 2% slippage → 0.51
        assert_eq!(exec.limit_price(dec!(0.50)), dec!(0.51));
        // Clamped to the price grid
        assert_eq!(exec.limit_price(dec!(0.99)), dec!(0.99));
        assert_eq!(exec.limit_price(dec!(0.005)), dec!(0.01));
    }

    #[test]
    fn test_fee_curve() {
        let exec = executor(PaperFillMode::InstantFill);
        assert_eq!(exec.estimated_fee_pct(dec!(0.50)), dec!(1.5600));
        assert!(exec.estimated_fee_pct(dec!(0.10)) < dec!(0.6));
        assert_eq!(exec.estimated_fee_pct(dec!(0)), dec!(0));
        assert_eq!(exec.estimated_fee_pct(dec!(1)), dec!(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_position() {
        let exec = executor(PaperFillMode::InstantFill);
        exec.execute("15m@1771591500", Side::Yes, "tok", dec!(25), dec!(0.52))
            .await
            .unwrap();

        let resolved = exec.resolve_position("15m@1771591500", dec!(21.15)).await;
        assert_eq!(resolved.unwrap().realized_pnl, Some(dec!(21.15)));
        assert!(exec.open_positions().await.is_empty());
        assert!(exec.resolve_position("15m@1771591500", dec!(0)).await.is_none());
    }
}
