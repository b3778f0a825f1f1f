//! In-process CLOB for tests and paper trading

use super::{ClobApi, OrderAck, OrderStatus, OrderTicket, SignedOrder};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Scripted fill behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperFillMode {
    /// Every FoK matches and verifies immediately
    InstantFill,
    /// Orders rest on the book and never fill
    NeverFill,
    /// Submit reports matched but no shares ever appear
    PhantomFill,
    /// Submit is rejected outright
    Reject,
}

/// Paper CLOB with scripted responses
pub struct PaperClob {
    mode: PaperFillMode,
    counter: AtomicU64,
    statuses: Mutex<HashMap<String, OrderStatus>>,
    submitted: Mutex<Vec<SignedOrder>>,
    cancelled: Mutex<Vec<String>>,
}

impl PaperClob {
    pub fn new(mode: PaperFillMode) -> Self {
        Self {
            mode,
            counter: AtomicU64::new(1),
            statuses: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub async fn submitted_orders(&self) -> Vec<SignedOrder> {
        self.submitted.lock().await.clone()
    }

    pub async fn cancelled_orders(&self) -> Vec<String> {
        self.cancelled.lock().await.clone()
    }

    fn next_id(&self) -> String {
        format!("paper-{}", self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Flip a resting order to filled (scripting fills in tests/paper runs)
    pub async fn force_fill(&self, order_id: &str, filled_size: Decimal) {
        let mut statuses = self.statuses.lock().await;
        if let Some(status) = statuses.get_mut(order_id) {
            status.status = "matched".to_string();
            status.filled_size = filled_size;
        }
    }
}

#[async_trait]
impl ClobApi for PaperClob {
    async fn sign_order(&self, ticket: &OrderTicket) -> anyhow::Result<SignedOrder> {
        Ok(SignedOrder {
            ticket: ticket.clone(),
            maker: "paper".to_string(),
            signature_type: 0,
            signature: "0xpaper".to_string(),
        })
    }

    async fn submit(&self, signed: &SignedOrder) -> anyhow::Result<OrderAck> {
        self.submitted.lock().await.push(signed.clone());
        let id = self.next_id();

        let (status, success, fill) = match self.mode {
            PaperFillMode::InstantFill => {
                let shares = if signed.ticket.limit_price > Decimal::ZERO {
                    signed.ticket.size_usd / signed.ticket.limit_price
                } else {
                    Decimal::ZERO
                };
                ("matched", true, shares)
            }
            PaperFillMode::NeverFill => ("live", false, Decimal::ZERO),
            PaperFillMode::PhantomFill => ("matched", true, Decimal::ZERO),
            PaperFillMode::Reject => ("rejected", false, Decimal::ZERO),
        };

        let verify_status = match self.mode {
            PaperFillMode::InstantFill => "matched",
            PaperFillMode::NeverFill => "live",
            PaperFillMode::PhantomFill => "live",
            PaperFillMode::Reject => "rejected",
        };
        self.statuses.lock().await.insert(
            id.clone(),
            OrderStatus {
                status: verify_status.to_string(),
                filled_size: fill,
            },
        );

        Ok(OrderAck {
            id,
            status: status.to_string(),
            success,
        })
    }

    async fn status(&self, order_id: &str) -> anyhow::Result<OrderStatus> {
        let statuses = self.statuses.lock().await;
        statuses
            .get(order_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown order {}", order_id))
    }

    async fn cancel(&self, order_id: &str) -> anyhow::Result<()> {
        self.cancelled.lock().await.push(order_id.to_string());
        let mut statuses = self.statuses.lock().await;
        if let Some(status) = statuses.get_mut(order_id) {
            status.status = "cancelled".to_string();
        }
        Ok(())
    }

    async fn open_orders(&self) -> anyhow::Result<Vec<String>> {
        let statuses = self.statuses.lock().await;
        Ok(statuses
            .iter()
            .filter(|(_, status)| status.status.eq_ignore_ascii_case("live"))
            .map(|(id, _)| id.clone())
            .collect())
    }
}
