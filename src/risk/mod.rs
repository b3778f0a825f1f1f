//! Risk management module
//!
//! One isolated accounting bucket per engine lane. Buckets never share
//! counters; a veto in one lane says nothing about another.

mod bucket;
mod manager;

pub use bucket::{BucketStatus, RiskBucket};
pub use manager::RiskManager;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine lane identifier; one bucket each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketName {
    FifteenMin,
    FiveMin,
    LateWindow,
    Arb,
    MarketMaker,
}

impl BucketName {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketName::FifteenMin => "15m",
            BucketName::FiveMin => "5m",
            BucketName::LateWindow => "late_window",
            BucketName::Arb => "arb",
            BucketName::MarketMaker => "mm",
        }
    }

    pub fn all() -> [BucketName; 5] {
        [
            BucketName::FifteenMin,
            BucketName::FiveMin,
            BucketName::LateWindow,
            BucketName::Arb,
            BucketName::MarketMaker,
        ]
    }
}

impl std::fmt::Display for BucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a bucket refuses a stake
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskVeto {
    #[error("cooldown ({remaining_secs}s remaining)")]
    Cooldown { remaining_secs: i64 },
    #[error("daily trade cap ({max})")]
    TradeCap { max: u32 },
    #[error("daily loss circuit breaker ({loss_pct}%)")]
    CircuitBreaker { loss_pct: Decimal },
    #[error("bucket budget exhausted")]
    BudgetExhausted,
    #[error("stake below $1 minimum")]
    StakeTooSmall,
    #[error("no capital")]
    NoCapital,
    #[error("unknown bucket")]
    UnknownBucket,
}
