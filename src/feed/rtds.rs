//! Persistent oracle stream
//!
//! One long-lived WebSocket to the venue's real-time data service carries both
//! the resolution oracle feed and the venue's Binance mirror. Reconnects are
//! handled by `ws::WsClient` with 5s..120s exponential backoff; every
//! reconnect replays the topic subscriptions.

use super::types::{PriceTick, TickSource};
use super::FeedShared;
use crate::ws::{WsClient, WsConfig, WsEvent};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

const ORACLE_TOPIC: &str = "crypto_prices_chainlink";
const BINANCE_TOPIC: &str = "crypto_prices";

/// Run the primary stream until shutdown
pub(crate) async fn run_oracle_stream(shared: Arc<FeedShared>, mut shutdown: watch::Receiver<bool>) {
    let ws_config = WsConfig::new(&shared.config.rtds_url);
    let client = WsClient::new(ws_config);
    let (mut events, sender) = client.connect();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(WsEvent::Connected) => {
                        tracing::info!("Oracle stream connected, subscribing");
                        for sub in subscription_messages() {
                            if sender.send(sub).await.is_err() {
                                tracing::error!("Oracle stream sender closed");
                                return;
                            }
                        }
                    }
                    Some(WsEvent::Text(text)) => {
                        if let Some(tick) = parse_stream_message(&text) {
                            let primary = tick.source.is_primary();
                            {
                                let mut buffer = shared.buffer.write().await;
                                buffer.insert(tick.source, tick.clone());
                            }
                            if primary {
                                let _ = shared.tick_tx.send(tick);
                            }
                        }
                    }
                    Some(WsEvent::Reconnecting { attempt }) => {
                        tracing::info!(attempt, "Oracle stream reconnecting");
                    }
                    Some(WsEvent::Disconnected) | None => {
                        tracing::warn!("Oracle stream closed");
                        return;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("Oracle stream stopping");
                    return;
                }
            }
        }
    }
}

/// Topic subscriptions, sent one per frame
fn subscription_messages() -> Vec<String> {
    vec![
        json!({
            "action": "subscribe",
            "subscriptions": [{"topic": ORACLE_TOPIC, "type": "*", "filters": ""}],
        })
        .to_string(),
        json!({
            "action": "subscribe",
            "subscriptions": [{"topic": BINANCE_TOPIC, "type": "update", "filters": "btcusdt"}],
        })
        .to_string(),
    ]
}

/// Parse one stream frame into a tick, if it is a price update we track
fn parse_stream_message(text: &str) -> Option<PriceTick> {
    let value: Value = serde_json::from_str(text).ok()?;
    let topic = value.get("topic")?.as_str()?;
    let payload = value.get("payload")?;
    let symbol = payload.get("symbol").and_then(Value::as_str).unwrap_or("");

    let source = match topic {
        ORACLE_TOPIC if symbol == "btc/usd" => TickSource::Oracle,
        BINANCE_TOPIC if symbol == "btcusdt" => TickSource::RtdsBinance,
        _ => return None,
    };

    let price = decode_decimal(payload.get("value")?)?;
    let timestamp = payload
        .get("timestamp")
        .and_then(decode_timestamp)
        .unwrap_or_else(Utc::now);

    Some(PriceTick::new(source, price, timestamp))
}

/// Prices arrive as either JSON numbers or numeric strings
fn decode_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// Timestamps arrive in either seconds or milliseconds
fn decode_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_f64()?;
    let millis = if raw > 1e12 { raw } else { raw * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_oracle_tick() {
        let msg = r#"{
            "topic": "crypto_prices_chainlink",
            "payload": {"symbol": "btc/usd", "value": 60123.45, "timestamp": 1704067200000}
        }"#;

        let tick = parse_stream_message(msg).unwrap();
        assert_eq!(tick.source, TickSource::Oracle);
        assert_eq!(tick.price, dec!(60123.45));
        assert_eq!(tick.timestamp.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_parse_binance_mirror_tick() {
        let msg = r#"{
            "topic": "crypto_prices",
            "payload": {"symbol": "btcusdt", "value": "60100.00", "timestamp": 1704067200}
        }"#;

        let tick = parse_stream_message(msg).unwrap();
        assert_eq!(tick.source, TickSource::RtdsBinance);
        assert_eq!(tick.price, dec!(60100.00));
    }

    #[test]
    fn test_parse_ignores_other_symbols() {
        let msg = r#"{
            "topic": "crypto_prices_chainlink",
            "payload": {"symbol": "eth/usd", "value": 3000.0}
        }"#;
        assert!(parse_stream_message(msg).is_none());
    }

    #[test]
    fn test_parse_ignores_malformed() {
        assert!(parse_stream_message("not json").is_none());
        assert!(parse_stream_message(r#"{"topic": "crypto_prices_chainlink"}"#).is_none());
    }

    #[test]
    fn test_subscription_messages_cover_both_topics() {
        let subs = subscription_messages();
        assert_eq!(subs.len(), 2);
        assert!(subs[0].contains(ORACLE_TOPIC));
        assert!(subs[1].contains("btcusdt"));
    }
}
