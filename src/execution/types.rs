//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internal order identifier
pub type OrderId = Uuid;

/// Which outcome token the order buys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The Up outcome
    Yes,
    /// The Down outcome
    No,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

/// Order time-in-force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tif {
    /// Fill-or-Kill
    Fok,
    /// Good-Til-Cancelled
    Gtc,
}

/// Order lifecycle state; owned by the executor from Submitted to terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Submitted,
    Matched,
    Filled,
    /// Success response with no observable shares
    Phantom,
    Failed,
    Cancelled,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderState::Submitted | OrderState::Matched)
    }
}

/// What gets signed and submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    pub token_id: String,
    pub side: Side,
    pub limit_price: Decimal,
    pub size_usd: Decimal,
    pub tif: Tif,
    /// Reject instead of crossing the spread (maker quoting)
    #[serde(default)]
    pub post_only: bool,
}

/// A ticket plus the venue signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedOrder {
    pub ticket: OrderTicket,
    pub maker: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Venue response to a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub id: String,
    pub status: String,
    pub success: bool,
}

impl OrderAck {
    /// Status strings from the venue are compared case-insensitively
    pub fn status_is(&self, expected: &str) -> bool {
        self.status.eq_ignore_ascii_case(expected)
    }
}

/// Venue order status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatus {
    pub status: String,
    pub filled_size: Decimal,
}

impl OrderStatus {
    pub fn is_filled(&self) -> bool {
        let s = self.status.to_ascii_lowercase();
        (s == "matched" || s == "filled") && self.filled_size > Decimal::ZERO
    }
}

/// One tracked order record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Window tag `timeframe@open_ts`
    pub window: String,
    pub side: Side,
    pub token_id: String,
    pub size_usd: Decimal,
    pub limit_price: Decimal,
    pub tif: Tif,
    pub state: OrderState,
    /// Venue order id once acknowledged
    pub clob_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// An open position; exists only after a verified fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub window: String,
    pub side: Side,
    pub shares: Decimal,
    pub entry_price: Decimal,
    pub size_usd: Decimal,
    pub entry_ts: DateTime<Utc>,
    pub realized_pnl: Option<Decimal>,
    /// Set once a hedge lane has locked this position
    #[serde(default)]
    pub hedged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Yes.opposite(), Side::No);
        assert_eq!(Side::No.opposite(), Side::Yes);
    }

    #[test]
    fn test_order_state_terminal() {
        assert!(!OrderState::Submitted.is_terminal());
        assert!(!OrderState::Matched.is_terminal());
        assert!(OrderState::Filled.is_terminal());
        assert!(OrderState::Phantom.is_terminal());
        assert!(OrderState::Failed.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
    }

    #[test]
    fn test_ack_status_case_insensitive() {
        let ack = OrderAck {
            id: "o-1".to_string(),
            status: "MATCHED".to_string(),
            success: true,
        };
        assert!(ack.status_is("matched"));
        assert!(ack.status_is("Matched"));
        assert!(!ack.status_is("live"));
    }

    #[test]
    fn test_order_status_filled() {
        let filled = OrderStatus {
            status: "Filled".to_string(),
            filled_size: dec!(10),
        };
        assert!(filled.is_filled());

        let empty = OrderStatus {
            status: "matched".to_string(),
            filled_size: dec!(0),
        };
        assert!(!empty.is_filled());

        let live = OrderStatus {
            status: "live".to_string(),
            filled_size: dec!(0),
        };
        assert!(!live.is_filled());
    }
}
