//! Price feed module
//!
//! Maintains one persistent subscription to the resolution oracle plus two
//! secondary REST pollers. Exposes a latest-tick snapshot with staleness and
//! divergence flags; callers decide what to do with a stale answer.

mod candles;
mod rest;
mod rtds;
mod types;

pub use candles::CandleClient;
pub use types::{Candle, PriceTick, ReconciledPrice, TickSource, ASSET};

use crate::config::OracleConfig;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch, RwLock};

/// Price feed errors
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// The primary tick is older than the staleness budget
    #[error("primary tick stale")]
    Stale,
    /// No source has delivered a fresh tick
    #[error("all price sources down")]
    AllSourcesDown,
}

pub(crate) struct FeedShared {
    pub(crate) config: OracleConfig,
    /// Most recent tick per source
    pub(crate) buffer: RwLock<HashMap<TickSource, PriceTick>>,
    /// Fanout of primary ticks only
    pub(crate) tick_tx: broadcast::Sender<PriceTick>,
}

/// Handle to the shared price feed; cheap to clone
#[derive(Clone)]
pub struct PriceFeed {
    shared: Arc<FeedShared>,
}

impl PriceFeed {
    /// Create the feed and spawn the stream and poller tasks
    pub fn start(config: OracleConfig, shutdown: watch::Receiver<bool>) -> Self {
        let (tick_tx, _) = broadcast::channel(1024);
        let shared = Arc::new(FeedShared {
            config,
            buffer: RwLock::new(HashMap::new()),
            tick_tx,
        });

        tokio::spawn(rtds::run_oracle_stream(shared.clone(), shutdown.clone()));
        tokio::spawn(rest::run_secondary_polls(shared.clone(), shutdown));

        Self { shared }
    }

    /// Construct a feed with no background tasks; ticks are pushed by hand
    pub fn detached(config: OracleConfig) -> Self {
        let (tick_tx, _) = broadcast::channel(1024);
        Self {
            shared: Arc::new(FeedShared {
                config,
                buffer: RwLock::new(HashMap::new()),
                tick_tx,
            }),
        }
    }

    /// Most recent primary tick, if not stale
    pub async fn latest(&self) -> Result<PriceTick, FeedError> {
        let now = Utc::now();
        let buffer = self.shared.buffer.read().await;
        match buffer.get(&TickSource::Oracle) {
            Some(tick) if !tick.is_stale(now, self.shared.config.stale_ms) => Ok(tick.clone()),
            Some(_) => Err(FeedError::Stale),
            None => Err(FeedError::AllSourcesDown),
        }
    }

    /// Aggregate across fresh sources with the max divergence surfaced
    ///
    /// Divergence above the configured threshold is flagged, never acted on.
    pub async fn reconciled(&self) -> Result<ReconciledPrice, FeedError> {
        let now = Utc::now();
        let buffer = self.shared.buffer.read().await;

        let mut fresh: Vec<&PriceTick> = buffer
            .values()
            .filter(|t| !t.is_stale(now, self.shared.config.stale_ms))
            .collect();

        if fresh.is_empty() {
            return Err(FeedError::AllSourcesDown);
        }
        fresh.sort_by_key(|t| t.source.as_str());

        let oracle_price = fresh
            .iter()
            .find(|t| t.source == TickSource::Oracle)
            .map(|t| t.price);

        // Price selection: oracle first, then the venue's Binance mirror,
        // then whatever is left
        let price = oracle_price
            .or_else(|| {
                fresh
                    .iter()
                    .find(|t| t.source == TickSource::RtdsBinance)
                    .map(|t| t.price)
            })
            .unwrap_or(fresh[0].price);

        let max = fresh.iter().map(|t| t.price).max().unwrap_or(price);
        let min = fresh.iter().map(|t| t.price).min().unwrap_or(price);
        let spread_pct = if fresh.len() > 1 && !price.is_zero() {
            (max - min) / price * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        let diverged = spread_pct > self.shared.config.max_divergence_pct;
        if diverged {
            tracing::warn!(spread_pct = %spread_pct, "Price sources diverged");
        }

        Ok(ReconciledPrice {
            price,
            spread_pct,
            sources: fresh.iter().map(|t| t.source).collect(),
            diverged,
            oracle_price,
        })
    }

    /// Subscribe to every primary tick
    pub fn subscribe(&self) -> broadcast::Receiver<PriceTick> {
        self.shared.tick_tx.subscribe()
    }

    /// Wait up to `timeout` for a fresh primary tick
    pub async fn fresh_tick(&self, timeout: std::time::Duration) -> Result<PriceTick, FeedError> {
        if let Ok(tick) = self.latest().await {
            return Ok(tick);
        }
        let mut rx = self.subscribe();
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Ok(tick)) => Ok(tick),
            _ => Err(FeedError::Stale),
        }
    }

    /// Push a tick into the buffer (secondary sources and tests)
    pub async fn ingest(&self, tick: PriceTick) {
        let primary = tick.source.is_primary();
        {
            let mut buffer = self.shared.buffer.write().await;
            buffer.insert(tick.source, tick.clone());
        }
        if primary {
            let _ = self.shared.tick_tx.send(tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn feed() -> PriceFeed {
        PriceFeed::detached(OracleConfig::default())
    }

    #[tokio::test]
    async fn test_latest_requires_fresh_primary() {
        let feed = feed();
        assert!(matches!(
            feed.latest().await,
            Err(FeedError::AllSourcesDown)
        ));

        feed.ingest(PriceTick::new(
            TickSource::Oracle,
            dec!(60000),
            Utc::now() - Duration::seconds(60),
        ))
        .await;
        assert!(matches!(feed.latest().await, Err(FeedError::Stale)));

        feed.ingest(PriceTick::new(TickSource::Oracle, dec!(60010), Utc::now()))
            .await;
        assert_eq!(feed.latest().await.unwrap().price, dec!(60010));
    }

    #[tokio::test]
    async fn test_secondaries_never_become_primary() {
        let feed = feed();
        feed.ingest(PriceTick::new(TickSource::Binance, dec!(60000), Utc::now()))
            .await;
        assert!(feed.latest().await.is_err());

        // But they do participate in reconciliation
        let rec = feed.reconciled().await.unwrap();
        assert_eq!(rec.price, dec!(60000));
        assert!(rec.oracle_price.is_none());
    }

    #[tokio::test]
    async fn test_reconciled_flags_divergence() {
        let feed = feed();
        let now = Utc::now();
        feed.ingest(PriceTick::new(TickSource::Oracle, dec!(60000), now))
            .await;
        feed.ingest(PriceTick::new(TickSource::Binance, dec!(61000), now))
            .await;

        let rec = feed.reconciled().await.unwrap();
        assert_eq!(rec.price, dec!(60000));
        assert!(rec.spread_pct > dec!(1.0));
        assert!(rec.diverged);
    }

    #[tokio::test]
    async fn test_reconciled_within_tolerance() {
        let feed = feed();
        let now = Utc::now();
        feed.ingest(PriceTick::new(TickSource::Oracle, dec!(60000), now))
            .await;
        feed.ingest(PriceTick::new(TickSource::Binance, dec!(60050), now))
            .await;

        let rec = feed.reconciled().await.unwrap();
        assert!(!rec.diverged);
        assert_eq!(rec.sources.len(), 2);
        assert_eq!(rec.oracle_price, Some(dec!(60000)));
    }

    #[tokio::test]
    async fn test_subscribe_sees_primary_ticks_only() {
        let feed = feed();
        let mut rx = feed.subscribe();

        feed.ingest(PriceTick::new(TickSource::Binance, dec!(59000), Utc::now()))
            .await;
        feed.ingest(PriceTick::new(TickSource::Oracle, dec!(60000), Utc::now()))
            .await;

        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.source, TickSource::Oracle);
        assert_eq!(tick.price, dec!(60000));
        assert!(rx.try_recv().is_err());
    }
}
