//! HTTP client for the off-chain order book

use super::{ClobApi, OrderAck, OrderStatus, OrderTicket, SignedOrder, WalletCredentials};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

/// REST client wrapping the venue's signed-order endpoints
pub struct HttpClobClient {
    client: reqwest::Client,
    base_url: String,
    wallet: WalletCredentials,
    /// token_id → (fee bps, cached at unix secs)
    fee_cache: Mutex<HashMap<String, (u32, i64)>>,
    fee_cache_ttl_secs: i64,
}

impl HttpClobClient {
    pub fn new(
        base_url: impl Into<String>,
        wallet: WalletCredentials,
        fee_cache_ttl_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SUBMIT_TIMEOUT)
            .build()
            .context("building CLOB HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            wallet,
            fee_cache: Mutex::new(HashMap::new()),
            fee_cache_ttl_secs: fee_cache_ttl_secs as i64,
        })
    }

    fn cached_fee(&self, token_id: &str) -> Option<u32> {
        let cache = self.fee_cache.lock().ok()?;
        let (bps, at) = cache.get(token_id)?;
        if Utc::now().timestamp() - at < self.fee_cache_ttl_secs {
            Some(*bps)
        } else {
            None
        }
    }

    fn store_fee(&self, token_id: &str, bps: u32) {
        if let Ok(mut cache) = self.fee_cache.lock() {
            cache.insert(token_id.to_string(), (bps, Utc::now().timestamp()));
        }
    }
}

#[async_trait]
impl ClobApi for HttpClobClient {
    async fn sign_order(&self, ticket: &OrderTicket) -> anyhow::Result<SignedOrder> {
        // Payload shaping only; the signature itself is the SDK's concern
        let payload = serde_json::to_string(ticket).context("serializing order ticket")?;
        Ok(SignedOrder {
            ticket: ticket.clone(),
            maker: self.wallet.maker_address(),
            signature_type: self.wallet.sig_type.as_u8(),
            signature: self.wallet.sign_digest(&payload),
        })
    }

    async fn submit(&self, signed: &SignedOrder) -> anyhow::Result<OrderAck> {
        let body = json!({
            "order": signed.ticket,
            "maker": signed.maker,
            "signatureType": signed.signature_type,
            "signature": signed.signature,
            "orderType": signed.ticket.tif,
            "postOnly": signed.ticket.post_only,
        });

        let resp = self
            .client
            .post(format!("{}/order", self.base_url))
            .json(&body)
            .send()
            .await
            .context("order submit")?;

        let status_code = resp.status();
        let value: Value = resp.json().await.context("order submit payload")?;
        if status_code.is_server_error() {
            anyhow::bail!("CLOB submit returned {}", status_code);
        }

        Ok(OrderAck {
            id: value
                .get("orderID")
                .or_else(|| value.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: value
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            success: value.get("success").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    async fn status(&self, order_id: &str) -> anyhow::Result<OrderStatus> {
        let resp = self
            .client
            .get(format!("{}/data/order/{}", self.base_url, order_id))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .context("order status")?;

        if !resp.status().is_success() {
            anyhow::bail!("CLOB status returned {}", resp.status());
        }

        let value: Value = resp.json().await.context("order status payload")?;
        let filled_size = value
            .get("size_matched")
            .or_else(|| value.get("filledSize"))
            .and_then(|v| match v {
                Value::String(s) => Decimal::from_str(s).ok(),
                Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
                _ => None,
            })
            .unwrap_or(Decimal::ZERO);

        Ok(OrderStatus {
            status: value
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            filled_size,
        })
    }

    async fn cancel(&self, order_id: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .delete(format!("{}/order/{}", self.base_url, order_id))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .context("order cancel")?;

        if !resp.status().is_success() {
            anyhow::bail!("CLOB cancel returned {}", resp.status());
        }
        Ok(())
    }

    async fn open_orders(&self) -> anyhow::Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/data/orders", self.base_url))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .context("open orders")?;

        if !resp.status().is_success() {
            anyhow::bail!("CLOB open orders returned {}", resp.status());
        }

        let value: Value = resp.json().await.context("open orders payload")?;
        let ids = value
            .as_array()
            .map(|orders| {
                orders
                    .iter()
                    .filter_map(|o| {
                        o.get("id")
                            .or_else(|| o.get("orderID"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn available_balance_usd(&self) -> anyhow::Result<Option<Decimal>> {
        let resp = self
            .client
            .get(format!("{}/balance-allowance", self.base_url))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await;

        let resp = match resp {
            Ok(r) if r.status().is_success() => r,
            _ => return Ok(None),
        };
        let value: Value = match resp.json().await {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };

        Ok(extract_balance(&value))
    }

    async fn fee_rate_bps(&self, token_id: &str) -> anyhow::Result<Option<u32>> {
        if let Some(bps) = self.cached_fee(token_id) {
            return Ok(Some(bps));
        }

        let resp = self
            .client
            .get(format!("{}/fee-rate", self.base_url))
            .query(&[("token_id", token_id)])
            .timeout(STATUS_TIMEOUT)
            .send()
            .await;

        let resp = match resp {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(status = %r.status(), "Fee lookup failed");
                return Ok(None);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Fee lookup failed");
                return Ok(None);
            }
        };

        let value: Value = match resp.json().await {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        let bps = value
            .get("fee_rate_bps")
            .or_else(|| value.get("feeRateBps"))
            .and_then(Value::as_u64)
            .map(|v| v as u32);

        if let Some(bps) = bps {
            self.store_fee(token_id, bps);
        }
        Ok(bps)
    }
}

/// Balance payloads vary by account shape; probe the usual keys
fn extract_balance(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Object(map) => {
            for key in ["available", "balance", "amount", "usdc", "collateral"] {
                if let Some(v) = map.get(key) {
                    if let Some(parsed) = extract_balance(v) {
                        return Some(parsed);
                    }
                }
            }
            None
        }
        _ => None,
    }
}
