//! Configuration types for poly-updown

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub oracle: OracleConfig,
    pub clob: ClobConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub arb: ArbConfig,
    pub late_window: LateWindowConfig,
    pub market_maker: MarketMakerConfig,
    pub five_min: FiveMinConfig,
    #[serde(default)]
    pub hedge: HedgeConfig,
    pub journal: JournalConfig,
    pub dashboard: DashboardConfig,
    pub telemetry: TelemetryConfig,
    /// Starting bankroll in USD, overridden by --bankroll
    #[serde(default = "default_bankroll")]
    pub bankroll: Decimal,
    /// Seconds before a boundary to capture the anchor (15m lane)
    #[serde(default = "default_entry_lead_secs")]
    pub entry_lead_secs: u64,
    /// Seconds after entry opens before the cycle is abandoned (15m lane)
    #[serde(default = "default_entry_window_secs")]
    pub entry_window_secs: u64,
    /// Seconds to wait after anchor capture before running the strategy
    #[serde(default = "default_strategy_delay_secs")]
    pub strategy_delay_secs: u64,
}

fn default_bankroll() -> Decimal {
    dec!(500)
}
fn default_entry_lead_secs() -> u64 {
    60
}
fn default_entry_window_secs() -> u64 {
    30
}
fn default_strategy_delay_secs() -> u64 {
    45
}

/// Oracle price feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Resolution oracle streaming endpoint (primary)
    pub rtds_url: String,
    /// Binance REST base URL (secondary)
    pub binance_base_url: String,
    /// CoinGecko REST base URL (secondary)
    pub coingecko_base_url: String,
    /// Secondary poll cadence in seconds (floor 2s)
    pub secondary_poll_secs: u64,
    /// Ticks older than this are stale, in milliseconds
    pub stale_ms: i64,
    /// Divergence above this percentage is flagged
    pub max_divergence_pct: Decimal,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            rtds_url: "wss://ws-live-data.polymarket.com".to_string(),
            binance_base_url: "https://api.binance.com/api/v3".to_string(),
            coingecko_base_url: "https://api.coingecko.com/api/v3".to_string(),
            secondary_poll_secs: 2,
            stale_ms: 30_000,
            max_divergence_pct: dec!(1.0),
        }
    }
}

/// CLOB connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClobConfig {
    pub clob_api_url: String,
    pub gamma_api_url: String,
    pub chain_id: u64,
    /// Slippage band applied to the limit price, percent of mid
    pub max_slippage_pct: Decimal,
    /// Minimum market liquidity to trade, USD
    pub min_liquidity_usd: Decimal,
    /// Time to wait for a FoK response before falling back to GTC, ms
    pub fok_timeout_ms: u64,
    /// Fallback taker fee percent at 50c when the fee endpoint is unavailable
    pub fee_fallback_pct: Decimal,
    /// How long fee-rate lookups stay cached, seconds
    pub fee_cache_ttl_secs: u64,
    /// Overwrite the working bankroll from the live balance
    #[serde(default)]
    pub sync_live_bankroll: bool,
    /// Live balance poll interval, seconds (floor 5s)
    #[serde(default = "default_bankroll_poll_secs")]
    pub live_bankroll_poll_secs: u64,
}

fn default_bankroll_poll_secs() -> u64 {
    60
}

impl Default for ClobConfig {
    fn default() -> Self {
        Self {
            clob_api_url: "https://clob.polymarket.com".to_string(),
            gamma_api_url: "https://gamma-api.polymarket.com".to_string(),
            chain_id: 137,
            max_slippage_pct: dec!(2.0),
            min_liquidity_usd: dec!(50),
            fok_timeout_ms: 2000,
            fee_fallback_pct: dec!(1.56),
            fee_cache_ttl_secs: 60,
            sync_live_bankroll: false,
            live_bankroll_poll_secs: 60,
        }
    }
}

/// Signal engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Confidence must exceed this to trade
    pub confidence_threshold: Decimal,
    /// Drift magnitude below which no directional signal is emitted, percent
    pub dead_zone_pct: Decimal,
    /// Drift percent that maps the price_vs_open component to 1.0
    pub drift_full_scale_pct: Decimal,
    pub rsi_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub momentum_lookback: usize,
    pub min_volatility_pct: f64,
    pub max_volatility_pct: f64,
    /// Minimum candle history before the engine will evaluate
    pub min_candles: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: dec!(0.60),
            dead_zone_pct: dec!(0.04),
            drift_full_scale_pct: dec!(0.10),
            rsi_period: 14,
            ema_fast: 5,
            ema_slow: 15,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            momentum_lookback: 3,
            min_volatility_pct: 0.03,
            max_volatility_pct: 3.0,
            min_candles: 30,
        }
    }
}

/// Per-bucket risk limits
#[derive(Debug, Clone, Deserialize)]
pub struct BucketLimits {
    /// Fraction of bankroll this bucket may commit per day
    pub budget_pct: Decimal,
    /// Absolute daily budget ceiling in USD, on top of the percentage
    #[serde(default)]
    pub budget_cap_usd: Option<Decimal>,
    pub max_trades: u32,
    pub max_streak: u32,
    pub cooldown_mins: i64,
    pub daily_loss_cap_pct: Decimal,
    pub kelly_fraction: Decimal,
    pub hard_cap_usd: Decimal,
}

/// Risk manager configuration, one limit set per engine lane
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    pub fifteen_min: BucketLimits,
    pub five_min: BucketLimits,
    pub late_window: BucketLimits,
    pub arb: BucketLimits,
    pub market_maker: BucketLimits,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            fifteen_min: BucketLimits {
                budget_pct: dec!(100),
                budget_cap_usd: None,
                max_trades: 20,
                max_streak: 5,
                cooldown_mins: 60,
                daily_loss_cap_pct: dec!(25),
                kelly_fraction: dec!(0.25),
                hard_cap_usd: dec!(25),
            },
            five_min: BucketLimits {
                budget_pct: dec!(30),
                budget_cap_usd: None,
                max_trades: 30,
                max_streak: 4,
                cooldown_mins: 30,
                daily_loss_cap_pct: dec!(15),
                kelly_fraction: dec!(0.25),
                hard_cap_usd: dec!(10),
            },
            late_window: BucketLimits {
                budget_pct: dec!(25),
                budget_cap_usd: None,
                max_trades: 12,
                max_streak: 4,
                cooldown_mins: 30,
                daily_loss_cap_pct: dec!(15),
                kelly_fraction: dec!(0.25),
                hard_cap_usd: dec!(8),
            },
            arb: BucketLimits {
                budget_pct: dec!(100),
                budget_cap_usd: Some(dec!(20)),
                max_trades: 50,
                max_streak: 10,
                cooldown_mins: 10,
                daily_loss_cap_pct: dec!(100),
                kelly_fraction: dec!(1),
                hard_cap_usd: dec!(20),
            },
            market_maker: BucketLimits {
                budget_pct: dec!(10),
                budget_cap_usd: Some(dec!(50)),
                max_trades: 200,
                max_streak: 20,
                cooldown_mins: 10,
                daily_loss_cap_pct: dec!(10),
                kelly_fraction: dec!(1),
                hard_cap_usd: dec!(50),
            },
        }
    }
}

/// Arbitrage scanner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArbConfig {
    #[serde(default)]
    pub enabled: bool,
    pub poll_secs: u64,
    /// Full market discovery cadence; prices refresh between discoveries
    pub discovery_interval_secs: u64,
    /// Buy both sides when best_ask(YES) + best_ask(NO) < this
    pub threshold: Decimal,
    /// Skip edges below this percent
    pub min_edge_pct: Decimal,
    pub size_per_side_usd: Decimal,
    pub max_daily_budget: Decimal,
    /// Don't re-arb the same market within this many seconds
    pub cooldown_secs: u64,
    pub timeframes: Vec<String>,
}

impl Default for ArbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_secs: 8,
            discovery_interval_secs: 45,
            threshold: dec!(0.98),
            min_edge_pct: dec!(1.0),
            size_per_side_usd: dec!(5),
            max_daily_budget: dec!(20),
            cooldown_secs: 120,
            timeframes: vec![
                "5m".to_string(),
                "15m".to_string(),
                "30m".to_string(),
                "1h".to_string(),
            ],
        }
    }
}

/// Late-window conviction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LateWindowConfig {
    #[serde(default)]
    pub enabled: bool,
    pub scan_secs: u64,
    /// Remaining-time band in which a window is considered late
    pub min_remaining_secs: i64,
    pub max_remaining_secs: i64,
    /// Minimum oracle drift percent from the anchor to trigger
    pub min_drift_pct: Decimal,
    pub base_confidence: Decimal,
    pub max_confidence: Decimal,
    /// Drift percent at which confidence hits max
    pub drift_scale_pct: Decimal,
    /// Skip entries above this ask price
    pub max_entry_price: Decimal,
}

impl Default for LateWindowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scan_secs: 3,
            min_remaining_secs: 30,
            max_remaining_secs: 150,
            min_drift_pct: dec!(0.08),
            base_confidence: dec!(0.80),
            max_confidence: dec!(0.95),
            drift_scale_pct: dec!(0.25),
            max_entry_price: dec!(0.80),
        }
    }
}

/// Market maker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MarketMakerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Half-spread in basis points around the oracle-derived mid
    pub spread_bps: u32,
    pub order_size_usd: Decimal,
    pub refresh_secs: u64,
    /// Cancel all quotes this many seconds before window close
    pub pull_before_close_secs: i64,
    /// Max net YES-minus-NO fill imbalance before the heavy side pauses, USD
    pub max_inventory_imbalance: Decimal,
    pub timeframes: Vec<String>,
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            spread_bps: 400,
            order_size_usd: dec!(3),
            refresh_secs: 15,
            pull_before_close_secs: 60,
            max_inventory_imbalance: dec!(10),
            timeframes: vec!["15m".to_string(), "5m".to_string()],
        }
    }
}

/// Parallel 5-minute lane configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FiveMinConfig {
    #[serde(default)]
    pub enabled: bool,
    pub entry_lead_secs: u64,
    pub entry_window_secs: u64,
    pub strategy_delay_secs: u64,
    /// Optional tighter dead zone for the 5m lane, percent
    pub dead_zone_pct: Option<Decimal>,
}

impl Default for FiveMinConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            entry_lead_secs: 55,
            entry_window_secs: 20,
            strategy_delay_secs: 45,
            dead_zone_pct: None,
        }
    }
}

/// Hedge engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HedgeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Only hedge when the flip signal is at least this confident
    pub min_confidence: Decimal,
    pub poll_secs: u64,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_confidence: dec!(0.65),
            poll_secs: 15,
        }
    }
}

/// Journal output paths
#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    pub log_dir: PathBuf,
    pub performance_file: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            performance_file: PathBuf::from("data/performance.json"),
        }
    }
}

/// Dashboard server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8765,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            clob: ClobConfig::default(),
            strategy: StrategyConfig::default(),
            risk: RiskConfig::default(),
            arb: ArbConfig::default(),
            late_window: LateWindowConfig::default(),
            market_maker: MarketMakerConfig::default(),
            five_min: FiveMinConfig::default(),
            hedge: HedgeConfig::default(),
            journal: JournalConfig::default(),
            dashboard: DashboardConfig::default(),
            telemetry: TelemetryConfig::default(),
            bankroll: default_bankroll(),
            entry_lead_secs: default_entry_lead_secs(),
            entry_window_secs: default_entry_window_secs(),
            strategy_delay_secs: default_strategy_delay_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lane_timings() {
        let config = Config::default();
        assert_eq!(config.entry_lead_secs, 60);
        assert_eq!(config.entry_window_secs, 30);
        assert_eq!(config.strategy_delay_secs, 45);
        assert_eq!(config.five_min.entry_lead_secs, 55);
        assert_eq!(config.five_min.entry_window_secs, 20);
        assert_eq!(config.bankroll, dec!(500));
    }

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            bankroll = 750.0

            [oracle]
            rtds_url = "wss://ws-live-data.polymarket.com"
            binance_base_url = "https://api.binance.com/api/v3"
            coingecko_base_url = "https://api.coingecko.com/api/v3"
            secondary_poll_secs = 3
            stale_ms = 30000
            max_divergence_pct = 1.0

            [clob]
            clob_api_url = "https://clob.polymarket.com"
            gamma_api_url = "https://gamma-api.polymarket.com"
            chain_id = 137
            max_slippage_pct = 2.0
            min_liquidity_usd = 50.0
            fok_timeout_ms = 2000
            fee_fallback_pct = 1.56
            fee_cache_ttl_secs = 60

            [strategy]
            confidence_threshold = 0.60
            dead_zone_pct = 0.04
            drift_full_scale_pct = 0.10
            rsi_period = 14
            ema_fast = 5
            ema_slow = 15
            macd_fast = 12
            macd_slow = 26
            macd_signal = 9
            momentum_lookback = 3
            min_volatility_pct = 0.03
            max_volatility_pct = 3.0
            min_candles = 30

            [risk.fifteen_min]
            budget_pct = 100
            max_trades = 20
            max_streak = 5
            cooldown_mins = 60
            daily_loss_cap_pct = 25
            kelly_fraction = 0.25
            hard_cap_usd = 25

            [risk.five_min]
            budget_pct = 30
            max_trades = 30
            max_streak = 4
            cooldown_mins = 30
            daily_loss_cap_pct = 15
            kelly_fraction = 0.25
            hard_cap_usd = 10

            [risk.late_window]
            budget_pct = 25
            max_trades = 12
            max_streak = 4
            cooldown_mins = 30
            daily_loss_cap_pct = 15
            kelly_fraction = 0.25
            hard_cap_usd = 8

            [risk.arb]
            budget_pct = 100
            max_trades = 50
            max_streak = 10
            cooldown_mins = 10
            daily_loss_cap_pct = 100
            kelly_fraction = 1
            hard_cap_usd = 20

            [risk.market_maker]
            budget_pct = 10
            max_trades = 200
            max_streak = 20
            cooldown_mins = 10
            daily_loss_cap_pct = 10
            kelly_fraction = 1
            hard_cap_usd = 50

            [arb]
            poll_secs = 8
            discovery_interval_secs = 45
            threshold = 0.98
            min_edge_pct = 1.0
            size_per_side_usd = 5.0
            max_daily_budget = 20.0
            cooldown_secs = 120
            timeframes = ["5m", "15m", "30m", "1h"]

            [late_window]
            scan_secs = 3
            min_remaining_secs = 30
            max_remaining_secs = 150
            min_drift_pct = 0.08
            base_confidence = 0.80
            max_confidence = 0.95
            drift_scale_pct = 0.25
            max_entry_price = 0.80

            [market_maker]
            spread_bps = 400
            order_size_usd = 3.0
            refresh_secs = 15
            pull_before_close_secs = 60
            max_inventory_imbalance = 10.0
            timeframes = ["15m", "5m"]

            [five_min]
            entry_lead_secs = 55
            entry_window_secs = 20
            strategy_delay_secs = 45

            [journal]
            log_dir = "logs"
            performance_file = "data/performance.json"

            [dashboard]
            port = 8765

            [telemetry]
            log_level = "info"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.bankroll, dec!(750));
        assert_eq!(config.arb.threshold, dec!(0.98));
        assert_eq!(config.risk.fifteen_min.max_streak, 5);
        assert!(config.five_min.dead_zone_pct.is_none());
    }
}
