//! Crypto quotes provider client. Wraps two distinct upstream endpoints that
//! must never be mixed in a single snapshot: `latest_quotes`/`global_metrics`
//! for "now", `historical_quotes` for backfill only.

use crate::errors::{AppError, AppResult};
use crate::types::Candle;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub price: f64,
    pub market_cap: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct GlobalMetrics {
    pub total_market_cap: f64,
    pub btc_dominance: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct HistoricalPoint {
    pub timestamp_ms: i64,
    pub price: f64,
    pub market_cap: f64,
}

/// Token-bucket limiter shared by every outbound call. `acquire` never
/// blocks the scheduler indefinitely -- it times out and reports false
/// instead, so one rate-limited market never stalls the scan loop.
pub struct RateLimiter {
    rate: f64,
    per: Duration,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rate: f64, per: Duration, burst: f64) -> Self {
        Self {
            rate,
            per,
            burst,
            state: Mutex::new(BucketState { tokens: burst, last_refill: Instant::now() }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed();
        let refilled = elapsed.as_secs_f64() * (self.rate / self.per.as_secs_f64());
        state.tokens = (state.tokens + refilled).min(self.burst);
        state.last_refill = Instant::now();
    }

    /// Blocks (async-sleeps) until a token is available, up to `timeout`.
    /// Returns `false` if the timeout elapses first.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock().expect("rate limiter mutex poisoned");
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[derive(Clone)]
pub struct QuotesClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl QuotesClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .pool_max_idle_per_host(4)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn get_with_retry<T, F>(&self, path: &str, parse: F) -> AppResult<T>
    where
        F: Fn(serde_json::Value) -> AppResult<T>,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut consecutive_errors = 0u32;

        loop {
            let resp = self
                .client
                .get(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .send()
                .await;

            match resp {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(AppError::Validation(format!(
                            "quotes provider rejected request: HTTP {status}: {body}"
                        )));
                    }
                    if status.is_server_error() {
                        consecutive_errors += 1;
                        if consecutive_errors > MAX_RETRIES {
                            return Err(AppError::Transient(format!("quotes provider HTTP {status}")));
                        }
                        tokio::time::sleep(backoff(consecutive_errors)).await;
                        continue;
                    }
                    let body: serde_json::Value = resp.json().await?;
                    return parse(body);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors > MAX_RETRIES {
                        return Err(AppError::Transient(format!("quotes provider request failed: {e}")));
                    }
                    tokio::time::sleep(backoff(consecutive_errors)).await;
                }
            }
        }
    }

    pub async fn latest_quotes(&self, symbols: &[&str]) -> AppResult<HashMap<String, Quote>> {
        let query = symbols.join(",");
        let path = format!("/getData?symbol={query}");
        self.get_with_retry(&path, |body| {
            let symbols = body
                .get("symbols")
                .and_then(|v| v.as_array())
                .ok_or_else(|| AppError::Validation("quotes response missing symbols".into()))?;

            let mut out = HashMap::new();
            for entry in symbols {
                let symbol = entry.get("symbol").and_then(|v| v.as_str()).unwrap_or_default();
                let price: f64 = entry
                    .get("last")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| AppError::Validation(format!("{symbol}: unparseable price")))?;
                let market_cap: f64 = entry
                    .get("market_cap")
                    .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_f64()))
                    .ok_or_else(|| AppError::Validation(format!("{symbol}: unparseable market_cap")))?;

                if price <= 0.0 || market_cap <= 0.0 {
                    return Err(AppError::Validation(format!("{symbol}: non-positive price/cap")));
                }
                out.insert(symbol.to_string(), Quote { price, market_cap });
            }
            Ok(out)
        })
        .await
    }

    pub async fn global_metrics(&self) -> AppResult<GlobalMetrics> {
        self.get_with_retry("/global", |body| {
            let total_market_cap = body
                .get("total_market_cap")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| AppError::Validation("global metrics missing total_market_cap".into()))?;
            let btc_dominance = body
                .get("btc_dominance")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| AppError::Validation("global metrics missing btc_dominance".into()))?;

            if total_market_cap <= 0.0 || !(0.0..100.0).contains(&btc_dominance) {
                return Err(AppError::Validation("global metrics out of range".into()));
            }
            Ok(GlobalMetrics { total_market_cap, btc_dominance })
        })
        .await
    }

    /// Bootstrap-only: returns a raw time series, never used to build a
    /// "current" snapshot (that must go through `latest_quotes` +
    /// `global_metrics`).
    pub async fn historical_quotes(
        &self,
        symbol: &str,
        from_ms: i64,
        to_ms: i64,
        interval: &str,
    ) -> AppResult<Vec<HistoricalPoint>> {
        let path = format!("/history?symbol={symbol}&from={from_ms}&to={to_ms}&interval={interval}");
        self.get_with_retry(&path, |body| {
            let points = body
                .get("points")
                .and_then(|v| v.as_array())
                .ok_or_else(|| AppError::Validation("history response missing points".into()))?;

            points
                .iter()
                .map(|p| {
                    let timestamp_ms = p.get("t").and_then(|v| v.as_i64()).unwrap_or_default();
                    let price = p.get("price").and_then(|v| v.as_f64()).unwrap_or_default();
                    let market_cap = p.get("market_cap").and_then(|v| v.as_f64()).unwrap_or_default();
                    if price <= 0.0 || market_cap <= 0.0 {
                        return Err(AppError::Validation("historical point non-positive".into()));
                    }
                    Ok(HistoricalPoint { timestamp_ms, price, market_cap })
                })
                .collect()
        })
        .await
    }

    /// OHLC candles for trigger/exit detection. The provider only exposes a
    /// point-price history endpoint, so each bar's `high`/`low` is derived
    /// from the move between consecutive points rather than true intrabar
    /// extremes -- adequate for boundary-crossing detection, not for
    /// wick-precision analysis.
    pub async fn candles(&self, symbol: &str, since_ms: i64, interval: &str) -> AppResult<Vec<Candle>> {
        let to_ms = chrono::Utc::now().timestamp_millis();
        let points = self.historical_quotes(symbol, since_ms, to_ms, interval).await?;

        let mut candles = Vec::with_capacity(points.len());
        let mut prev_close = points.first().map(|p| p.price).unwrap_or(0.0);
        for point in &points {
            let open = prev_close;
            let close = point.price;
            candles.push(Candle {
                timestamp: chrono::DateTime::from_timestamp_millis(point.timestamp_ms)
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default(),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: 0.0,
            });
            prev_close = close;
        }
        Ok(candles)
    }
}

fn backoff(consecutive_errors: u32) -> Duration {
    Duration::from_secs(std::cmp::min(consecutive_errors as u64 * 2, 30))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_exhausts_burst_then_times_out() {
        let limiter = RateLimiter::new(1.0, Duration::from_secs(60), 1.0);
        assert!(limiter.acquire(Duration::from_millis(50)).await);
        assert!(!limiter.acquire(Duration::from_millis(50)).await);
    }
}
