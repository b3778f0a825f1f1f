//! Gamma API client for market discovery
//!
//! Primary path is a direct event lookup by deterministic slug; the fallback
//! paginates the events listing and filters by slug pattern. Token ids and
//! outcome prices arrive as JSON-encoded strings inside the JSON payload.

use super::{generate_slugs, BinaryMarket, Timeframe};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

/// Client for the venue's Gamma API
pub struct GammaClient {
    client: reqwest::Client,
    base_url: String,
}

impl GammaClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("building Gamma HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Discover active up/down markets for the given timeframes
    pub async fn discover(&self, timeframes: &[Timeframe]) -> anyhow::Result<Vec<BinaryMarket>> {
        let found = self.discover_by_slug(timeframes).await?;
        if !found.is_empty() {
            return Ok(found);
        }
        tracing::info!("Slug lookup found 0 markets, trying events pagination");
        self.discover_by_pagination(timeframes).await
    }

    /// Direct event lookups by deterministic slug
    async fn discover_by_slug(
        &self,
        timeframes: &[Timeframe],
    ) -> anyhow::Result<Vec<BinaryMarket>> {
        let slugs = generate_slugs(timeframes, Utc::now());
        let mut found = Vec::new();
        for (slug, tf) in slugs {
            if let Some(market) = self.fetch_event_by_slug(&slug, tf).await {
                found.push(market);
            }
        }
        Ok(found)
    }

    /// Re-fetch a known market's event to pick up fresh prices and liquidity
    pub async fn refresh(&self, market: &BinaryMarket) -> Option<BinaryMarket> {
        self.fetch_event_by_slug(&market.slug, market.timeframe).await
    }

    async fn fetch_event_by_slug(&self, slug: &str, timeframe: Timeframe) -> Option<BinaryMarket> {
        let url = format!("{}/events/slug/{}", self.base_url, slug);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| tracing::debug!(slug, error = %e, "Event slug lookup failed"))
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let event: Value = resp.json().await.ok()?;
        parse_market_from_event(&event, slug, timeframe)
    }

    /// Fallback: paginate /events and match slugs by pattern
    async fn discover_by_pagination(
        &self,
        timeframes: &[Timeframe],
    ) -> anyhow::Result<Vec<BinaryMarket>> {
        let mut found = Vec::new();
        let mut offset = 0usize;

        for _ in 0..5 {
            let resp = self
                .client
                .get(format!("{}/events", self.base_url))
                .query(&[
                    ("active", "true"),
                    ("closed", "false"),
                    ("limit", "100"),
                    ("offset", &offset.to_string()),
                    ("order", "id"),
                    ("ascending", "false"),
                ])
                .send()
                .await
                .context("events pagination")?;
            if !resp.status().is_success() {
                break;
            }

            let page: Vec<Value> = resp.json().await.context("events page payload")?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            for event in &page {
                let slug = event.get("slug").and_then(Value::as_str).unwrap_or("");
                let Some(tf) = timeframe_from_slug(slug) else {
                    continue;
                };
                if !timeframes.contains(&tf) {
                    continue;
                }
                if let Some(market) = parse_market_from_event(event, slug, tf) {
                    found.push(market);
                }
            }

            if page_len < 100 {
                break;
            }
            offset += 100;
        }

        Ok(found)
    }
}

/// Match slugs like `btc-updown-15m-1771591500`
fn timeframe_from_slug(slug: &str) -> Option<Timeframe> {
    let rest = slug.strip_prefix("btc-updown-")?;
    let (label, ts) = rest.split_once('-')?;
    ts.parse::<i64>().ok()?;
    Timeframe::from_label(label)
}

/// Parse a value that might be a JSON array or a JSON-encoded array string
fn decode_nested_array(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn decode_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// Extract a tradeable market from a Gamma event response
pub(crate) fn parse_market_from_event(
    event: &Value,
    slug: &str,
    timeframe: Timeframe,
) -> Option<BinaryMarket> {
    let markets = event.get("markets")?.as_array()?;
    let m = markets.first()?;

    let condition_id = m
        .get("conditionId")
        .or_else(|| m.get("id"))
        .and_then(Value::as_str)?
        .to_string();

    let token_ids = decode_nested_array(m.get("clobTokenIds"));
    if token_ids.len() < 2 {
        return None;
    }
    let token_id_up = token_ids[0].as_str()?.to_string();
    let token_id_down = token_ids[1].as_str()?.to_string();

    let prices = decode_nested_array(m.get("outcomePrices"));
    let (price_up, price_down) = if prices.len() >= 2 {
        (
            decode_decimal(&prices[0]).unwrap_or(Decimal::new(5, 1)),
            decode_decimal(&prices[1]).unwrap_or(Decimal::new(5, 1)),
        )
    } else {
        (Decimal::new(5, 1), Decimal::new(5, 1))
    };

    let liquidity = m
        .get("liquidityClob")
        .or_else(|| m.get("liquidityNum"))
        .and_then(decode_decimal)
        .unwrap_or(Decimal::ZERO);
    let volume = m
        .get("volumeNum")
        .or_else(|| m.get("volume"))
        .and_then(decode_decimal)
        .unwrap_or(Decimal::ZERO);

    let end_raw = m
        .get("endDate")
        .or_else(|| event.get("endDate"))
        .and_then(Value::as_str)?;
    let end_ts: DateTime<Utc> = end_raw.parse().ok()?;

    let question = m
        .get("question")
        .or_else(|| event.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    Some(BinaryMarket {
        condition_id,
        question,
        slug: slug.to_string(),
        token_id_up,
        token_id_down,
        price_up,
        price_down,
        liquidity,
        volume,
        timeframe,
        end_ts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sample_event() -> Value {
        json!({
            "title": "Bitcoin Up or Down",
            "endDate": "2026-03-01T14:15:00Z",
            "markets": [{
                "conditionId": "0xabc123",
                "question": "Bitcoin Up or Down - March 1, 2:00 PM ET",
                "clobTokenIds": "[\"111\",\"222\"]",
                "outcomePrices": "[\"0.515\",\"0.485\"]",
                "liquidityClob": "2400.5",
                "volumeNum": 120.0
            }]
        })
    }

    #[test]
    fn test_parse_market_from_event() {
        let market =
            parse_market_from_event(&sample_event(), "btc-updown-15m-1771591500", Timeframe::M15)
                .unwrap();
        assert_eq!(market.condition_id, "0xabc123");
        assert_eq!(market.token_id_up, "111");
        assert_eq!(market.token_id_down, "222");
        assert_eq!(market.price_up, dec!(0.515));
        assert_eq!(market.price_down, dec!(0.485));
        assert_eq!(market.liquidity, dec!(2400.5));
        assert_eq!(market.timeframe, Timeframe::M15);
    }

    #[test]
    fn test_parse_market_native_arrays() {
        let event = json!({
            "endDate": "2026-03-01T14:15:00Z",
            "markets": [{
                "conditionId": "0xdef",
                "clobTokenIds": ["aaa", "bbb"],
                "outcomePrices": ["0.40", "0.55"]
            }]
        });
        let market =
            parse_market_from_event(&event, "btc-updown-5m-1771591500", Timeframe::M5).unwrap();
        assert_eq!(market.token_id_up, "aaa");
        assert_eq!(market.price_down, dec!(0.55));
    }

    #[test]
    fn test_parse_market_missing_tokens() {
        let event = json!({
            "endDate": "2026-03-01T14:15:00Z",
            "markets": [{"conditionId": "0xdef", "clobTokenIds": "[]"}]
        });
        assert!(parse_market_from_event(&event, "s", Timeframe::M15).is_none());
    }

    #[test]
    fn test_parse_market_no_markets() {
        let event = json!({"endDate": "2026-03-01T14:15:00Z", "markets": []});
        assert!(parse_market_from_event(&event, "s", Timeframe::M15).is_none());
    }

    #[test]
    fn test_timeframe_from_slug() {
        assert_eq!(
            timeframe_from_slug("btc-updown-15m-1771591500"),
            Some(Timeframe::M15)
        );
        assert_eq!(
            timeframe_from_slug("btc-updown-1h-1771591500"),
            Some(Timeframe::H1)
        );
        assert_eq!(timeframe_from_slug("eth-updown-15m-1771591500"), None);
        assert_eq!(timeframe_from_slug("btc-updown-15m-notats"), None);
    }
}
