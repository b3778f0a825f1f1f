//! CLI interface for poly-updown
//!
//! Engine lanes are selected by flags; the 15m directional lane always runs
//! unless --arb-only is given.

mod run;

pub use run::{run, RunOutcome};

use clap::Parser;
use rust_decimal::Decimal;

#[derive(Parser, Debug)]
#[command(name = "poly-updown")]
#[command(about = "Clock-synced trading agent for BTC up/down prediction markets")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,

    /// Starting bankroll in USD
    #[arg(long, default_value = "500")]
    pub bankroll: Decimal,

    /// Max 15m entry cycles, 0 = unbounded
    #[arg(long, default_value = "0")]
    pub cycles: u64,

    /// Enable the arbitrage scanner alongside directional trading
    #[arg(long)]
    pub arb: bool,

    /// Run ONLY the arb scanner, no directional trading
    #[arg(long)]
    pub arb_only: bool,

    /// Enable late-window conviction trading
    #[arg(long)]
    pub late_window: bool,

    /// Enable the parallel 5m directional lane
    #[arg(long = "5m")]
    pub five_min: bool,

    /// Enable the market making engine
    #[arg(long)]
    pub mm: bool,

    /// Enable the hedge engine
    #[arg(long)]
    pub hedge: bool,

    /// Serve the live dashboard on :8765
    #[arg(long)]
    pub dashboard: bool,

    /// Sync the working bankroll from the live account balance
    #[arg(long)]
    pub sync_live_bankroll: bool,
}
