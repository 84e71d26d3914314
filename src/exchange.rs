//! Exchange fill client. Signs requests with HMAC-SHA256 (shared-secret
//! scheme): a small request signer paired with a thin REST wrapper, both
//! returning typed `Result`, never panicking.

use crate::errors::{AppError, AppResult};
use crate::types::Fill;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Upstream page cap; hitting it means more fills may exist past the last
/// returned timestamp.
const PAGE_CAP: usize = 2000;

#[derive(Clone)]
pub struct ExchangeSigner {
    api_secret: String,
}

impl ExchangeSigner {
    pub fn new(api_secret: &str) -> Self {
        Self { api_secret: api_secret.to_string() }
    }

    /// Returns `(timestamp_ms, hex_signature)` for `method + path + body`.
    pub fn sign(&self, method: &str, path: &str, body: &str) -> AppResult<(String, String)> {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::Auth(format!("system clock: {e}")))?
            .as_millis()
            .to_string();

        let message = format!("{timestamp_ms}{}{path}{body}", method.to_uppercase());

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| AppError::Auth(format!("hmac key: {e}")))?;
        mac.update(message.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok((timestamp_ms, signature))
    }
}

#[derive(Clone)]
pub struct ExchangeClient {
    client: Client,
    base_url: String,
    api_key: String,
    signer: ExchangeSigner,
}

impl ExchangeClient {
    pub fn new(base_url: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .pool_max_idle_per_host(4)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            signer: ExchangeSigner::new(api_secret),
        }
    }

    async fn signed_post(&self, path: &str, body: &serde_json::Value) -> AppResult<serde_json::Value> {
        let body_str = body.to_string();
        let (timestamp, signature) = self.signer.sign("POST", path, &body_str)?;
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .header("X-API-TIMESTAMP", &timestamp)
            .header("X-API-SIGNATURE", &signature)
            .header("Content-Type", "application/json")
            .body(body_str)
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("exchange request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Transient(format!("exchange HTTP {status}: {body}")));
        }

        resp.json().await.map_err(|e| AppError::ParseError(format!("exchange response: {e}")))
    }

    /// Returns every fill newer than `start_time_ms`, paginating by
    /// re-requesting from `max(time_ms)+1` whenever a page hits the cap.
    /// Caller must treat the accumulated result as a set keyed by `hash`,
    /// never as an ordered stream -- the upstream returns newest-first.
    pub async fn user_fills(
        &self,
        account_type: &str,
        wallet: &str,
        start_time_ms: i64,
    ) -> AppResult<Vec<Fill>> {
        let mut all = Vec::new();
        let mut cursor = start_time_ms;

        loop {
            let body = serde_json::json!({ "type": "userFills", "user": wallet, "startTime": cursor });
            let raw = self.signed_post("/info", &body).await?;
            let page = parse_fills(&raw, account_type, wallet)?;

            let page_len = page.len();
            let max_time = page.iter().map(|f| f.time_ms).max();
            all.extend(page);

            if page_len < PAGE_CAP {
                break;
            }
            match max_time {
                Some(t) => cursor = t + 1,
                None => break,
            }
        }

        Ok(all)
    }
}

fn parse_fills(raw: &serde_json::Value, account_type: &str, wallet: &str) -> AppResult<Vec<Fill>> {
    let entries = raw
        .as_array()
        .ok_or_else(|| AppError::ParseError("exchange fills response is not an array".into()))?;

    entries
        .iter()
        .map(|e| {
            let hash = e.get("hash").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let tid = e.get("tid").and_then(|v| v.as_i64()).unwrap_or_default();
            let time_ms = e.get("time").and_then(|v| v.as_i64()).unwrap_or_default();
            let coin = e.get("coin").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let side = e.get("side").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let size: f64 = e
                .get("sz")
                .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_f64()))
                .unwrap_or_default();
            let price: f64 = e
                .get("px")
                .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_f64()))
                .unwrap_or_default();

            if hash.is_empty() {
                return Err(AppError::ParseError("fill missing hash".into()));
            }

            Ok(Fill {
                hash,
                tid,
                time_ms,
                coin,
                side,
                size,
                price,
                account_type: account_type.to_string(),
                wallet_address: wallet.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_produces_distinct_signatures_for_distinct_paths() {
        let signer = ExchangeSigner::new("test-secret");
        let (_, sig_a) = signer.sign("POST", "/info", "{}").unwrap();
        let (_, sig_b) = signer.sign("POST", "/other", "{}").unwrap();
        assert_ne!(sig_a, sig_b);
    }

    #[test]
    fn parse_fills_rejects_missing_hash() {
        let raw = serde_json::json!([{ "tid": 1, "time": 1000, "coin": "BTC", "side": "B", "sz": "0.1", "px": "60000" }]);
        assert!(parse_fills(&raw, "personal_wallet", "0xabc").is_err());
    }

    #[test]
    fn parse_fills_extracts_known_fields() {
        let raw = serde_json::json!([{ "hash": "0xh1", "tid": 1, "time": 1000, "coin": "BTC", "side": "B", "sz": "0.1", "px": "60000" }]);
        let fills = parse_fills(&raw, "personal_wallet", "0xabc").unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, 60000.0);
    }
}
