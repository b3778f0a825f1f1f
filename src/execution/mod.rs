//! Execution engine module
//!
//! Thin wrapper over the signed-order submission primitive, with fill
//! verification and best-effort cancellation.

mod clob;
mod executor;
mod paper;
mod types;
mod wallet;

pub use clob::HttpClobClient;
pub use executor::{ExecutionReport, ExecutorConfig, OrderExecutor};
pub use paper::{PaperClob, PaperFillMode};
pub use types::{
    Order, OrderAck, OrderId, OrderState, OrderStatus, OrderTicket, Position, Side, SignedOrder,
    Tif,
};
pub use wallet::{SigType, WalletCredentials, WalletError};

use async_trait::async_trait;

/// The CLOB SDK boundary: signing, submission, status, cancellation.
///
/// The cryptography behind `sign_order` belongs to the venue SDK; every
/// implementation here only shapes payloads and carries credentials.
#[async_trait]
pub trait ClobApi: Send + Sync {
    /// Sign an order ticket for submission
    async fn sign_order(&self, ticket: &OrderTicket) -> anyhow::Result<SignedOrder>;
    /// Submit a signed order to the book
    async fn submit(&self, signed: &SignedOrder) -> anyhow::Result<OrderAck>;
    /// Query order status by the venue's order id
    async fn status(&self, order_id: &str) -> anyhow::Result<OrderStatus>;
    /// Cancel an open order
    async fn cancel(&self, order_id: &str) -> anyhow::Result<()>;
    /// Venue fee rate for a token in basis points, when the venue exposes it
    async fn fee_rate_bps(&self, _token_id: &str) -> anyhow::Result<Option<u32>> {
        Ok(None)
    }
    /// Available collateral balance, when the venue exposes it
    async fn available_balance_usd(&self) -> anyhow::Result<Option<rust_decimal::Decimal>> {
        Ok(None)
    }
    /// Ids of every order still resting on the book for this wallet
    async fn open_orders(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}
