//! Secondary REST pollers
//!
//! Binance and CoinGecko are polled on a slow cadence purely to detect oracle
//! lag or manipulation. They update the reconciliation buffer and are never
//! promoted to primary.

use super::types::{PriceTick, TickSource};
use super::FeedShared;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const FETCH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct BinanceBookTicker {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoPrice {
    bitcoin: CoinGeckoUsd,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoUsd {
    usd: f64,
}

/// Poll both secondaries until shutdown
pub(crate) async fn run_secondary_polls(
    shared: Arc<FeedShared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client for secondaries");
            return;
        }
    };

    let cadence = Duration::from_secs(shared.config.secondary_poll_secs.max(2));
    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (binance, coingecko) = tokio::join!(
                    fetch_binance(&client, &shared.config.binance_base_url),
                    fetch_coingecko(&client, &shared.config.coingecko_base_url),
                );

                let mut buffer = shared.buffer.write().await;
                if let Some(tick) = binance {
                    buffer.insert(tick.source, tick);
                }
                if let Some(tick) = coingecko {
                    buffer.insert(tick.source, tick);
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("Secondary pollers stopping");
                    return;
                }
            }
        }
    }
}

/// Binance bookTicker mid price
async fn fetch_binance(client: &reqwest::Client, base_url: &str) -> Option<PriceTick> {
    let url = format!("{}/ticker/bookTicker", base_url);
    let resp = client
        .get(&url)
        .query(&[("symbol", "BTCUSDT")])
        .send()
        .await
        .map_err(|e| tracing::debug!(error = %e, "Binance fetch failed"))
        .ok()?;

    if !resp.status().is_success() {
        tracing::debug!(status = %resp.status(), "Binance returned error");
        return None;
    }

    let ticker: BinanceBookTicker = resp.json().await.ok()?;
    let bid = Decimal::from_str(&ticker.bid_price).ok()?;
    let ask = Decimal::from_str(&ticker.ask_price).ok()?;
    let mid = (bid + ask) / Decimal::TWO;

    Some(PriceTick::new(TickSource::Binance, mid, Utc::now()))
}

/// CoinGecko simple price
async fn fetch_coingecko(client: &reqwest::Client, base_url: &str) -> Option<PriceTick> {
    let url = format!("{}/simple/price", base_url);
    let resp = client
        .get(&url)
        .query(&[("ids", "bitcoin"), ("vs_currencies", "usd")])
        .send()
        .await
        .map_err(|e| tracing::debug!(error = %e, "CoinGecko fetch failed"))
        .ok()?;

    if !resp.status().is_success() {
        tracing::debug!(status = %resp.status(), "CoinGecko returned error");
        return None;
    }

    let parsed: CoinGeckoPrice = resp.json().await.ok()?;
    let price = Decimal::from_str(&parsed.bitcoin.usd.to_string()).ok()?;

    Some(PriceTick::new(TickSource::CoinGecko, price, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binance_ticker_deserialize() {
        let json = r#"{"symbol":"BTCUSDT","bidPrice":"60000.00","bidQty":"1.0","askPrice":"60002.00","askQty":"2.0"}"#;
        let ticker: BinanceBookTicker = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.bid_price, "60000.00");
        assert_eq!(ticker.ask_price, "60002.00");
    }

    #[test]
    fn test_coingecko_deserialize() {
        let json = r#"{"bitcoin":{"usd":60001.5}}"#;
        let parsed: CoinGeckoPrice = serde_json::from_str(json).unwrap();
        assert!((parsed.bitcoin.usd - 60001.5).abs() < f64::EPSILON);
    }
}
