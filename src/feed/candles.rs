//! Historical candles for the indicator stack

use super::types::Candle;
use anyhow::Context;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::time::Duration;

/// Fetches 1-minute candles from the Binance klines endpoint
pub struct CandleClient {
    client: reqwest::Client,
    base_url: String,
}

impl CandleClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("building candle HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fetch the most recent `limit` candles at the given interval, oldest first
    pub async fn fetch(&self, interval: &str, limit: usize) -> anyhow::Result<Vec<Candle>> {
        let url = format!("{}/klines", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("symbol", "BTCUSDT"),
                ("interval", interval),
                ("limit", &limit.min(1000).to_string()),
            ])
            .send()
            .await
            .context("candle fetch")?;

        if !resp.status().is_success() {
            anyhow::bail!("candle endpoint returned {}", resp.status());
        }

        let rows: Vec<Vec<Value>> = resp.json().await.context("candle payload")?;
        Ok(rows.iter().filter_map(|row| parse_kline(row)).collect())
    }
}

/// One kline row: [open_time, open, high, low, close, volume, ...]
fn parse_kline(row: &[Value]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    let ts_ms = row[0].as_i64()?;
    let timestamp = Utc.timestamp_millis_opt(ts_ms).single()?;
    let field = |i: usize| row[i].as_str().and_then(|s| s.parse::<f64>().ok());

    Some(Candle {
        timestamp,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_kline_row() {
        let row = vec![
            json!(1704067200000i64),
            json!("60000.00"),
            json!("60100.00"),
            json!("59900.00"),
            json!("60050.00"),
            json!("12.5"),
            json!(1704067259999i64),
        ];

        let candle = parse_kline(&row).unwrap();
        assert!((candle.open - 60000.0).abs() < f64::EPSILON);
        assert!((candle.close - 60050.0).abs() < f64::EPSILON);
        assert!((candle.volume - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_kline_short_row() {
        let row = vec![json!(1704067200000i64), json!("60000.00")];
        assert!(parse_kline(&row).is_none());
    }

    #[test]
    fn test_parse_kline_bad_number() {
        let row = vec![
            json!(1704067200000i64),
            json!("not-a-price"),
            json!("60100.00"),
            json!("59900.00"),
            json!("60050.00"),
            json!("12.5"),
        ];
        assert!(parse_kline(&row).is_none());
    }
}
