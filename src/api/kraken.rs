use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{HistoryProvider, PrecisionProvider};
use crate::error::{BotError, BotResult};
use crate::models::{Candle, Timeframe};
use crate::risk::InstrumentPrecision;

pub const KRAKEN_REST_URL: &str = "https://api.kraken.com";
const RATE_LIMIT_PER_SEC: u32 = 1; // Public endpoints tolerate roughly one call per second
const MAX_RETRIES: u32 = 3;

type KrakenRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Kraken response envelope: `{"error": [...], "result": {...}}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AssetPairInfo {
    lot_decimals: u32,
    pair_decimals: u32,
    #[serde(default)]
    ordermin: Option<String>,
    #[serde(default)]
    tick_size: Option<String>,
}

/// Kraken public REST client for OHLC history and pair metadata
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct KrakenRestClient {
    client: Client,
    base_url: String,
    pair: String,
    fallback_min_quantity: f64,
    retry_backoff: Duration,
    rate_limiter: Arc<KrakenRateLimiter>,
}

impl KrakenRestClient {
    /// # Arguments
    /// * `base_url` - API root, `KRAKEN_REST_URL` in production
    /// * `pair` - REST pair name, e.g. `XXBTZUSD`
    /// * `fallback_min_quantity` - used when the exchange omits `ordermin`
    pub fn new(
        base_url: impl Into<String>,
        pair: impl Into<String>,
        fallback_min_quantity: f64,
    ) -> BotResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BotError::Http(format!("failed to build HTTP client: {}", e)))?;

        let rate = NonZeroU32::new(RATE_LIMIT_PER_SEC)
            .ok_or_else(|| BotError::Config("Kraken rate limit must be non-zero".to_string()))?;
        let quota = Quota::per_second(rate);

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pair: pair.into(),
            fallback_min_quantity,
            retry_backoff: Duration::from_secs(1),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Base delay between retries; doubles each attempt
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Rate-limited GET with retry on 429, 5xx and network errors
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> BotResult<T> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;
            let backoff = self.retry_backoff * 2u32.pow(attempt - 1);

            match self.client.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let envelope: Envelope<T> = response.json().await.map_err(|e| {
                            BotError::Http(format!("failed to parse {} response: {}", path, e))
                        })?;
                        if !envelope.error.is_empty() {
                            return Err(BotError::Http(format!(
                                "Kraken {} error: {}",
                                path,
                                envelope.error.join(", ")
                            )));
                        }
                        return envelope.result.ok_or_else(|| {
                            BotError::Http(format!("Kraken {} response has no result", path))
                        });
                    }

                    if (status.as_u16() == 429 || status.is_server_error()) && attempt < MAX_RETRIES
                    {
                        tracing::warn!(
                            %status,
                            attempt,
                            max_retries = MAX_RETRIES,
                            backoff_ms = backoff.as_millis() as u64,
                            "Kraken request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(BotError::Http(format!(
                        "Kraken API error ({}) on {}: {}",
                        status, path, body
                    )));
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Network error talking to Kraken, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(BotError::Http(format!(
                        "network error after {} attempts: {}",
                        MAX_RETRIES, e
                    )))
                }
            }
        }

        Err(BotError::Http(format!(
            "{} failed after {} attempts",
            path, MAX_RETRIES
        )))
    }
}

#[async_trait]
impl HistoryProvider for KrakenRestClient {
    async fn fetch(
        &self,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
    ) -> BotResult<Vec<Candle>> {
        let mut query = vec![
            ("pair", self.pair.clone()),
            ("interval", timeframe.minutes().to_string()),
        ];
        if let Some(since) = since {
            query.push(("since", since.timestamp().to_string()));
        }

        let result: HashMap<String, Value> = self.get_json("/0/public/OHLC", &query).await?;
        // The result holds one pair key plus a "last" cursor
        let rows = result
            .iter()
            .find(|(key, _)| key.as_str() != "last")
            .and_then(|(_, rows)| rows.as_array())
            .ok_or_else(|| BotError::Http("OHLC response has no rows".to_string()))?;

        let candles = rows
            .iter()
            .map(parse_ohlc_row)
            .collect::<BotResult<Vec<_>>>()?;

        tracing::info!(
            pair = %self.pair,
            %timeframe,
            count = candles.len(),
            "Fetched OHLC history"
        );
        Ok(candles)
    }
}

#[async_trait]
impl PrecisionProvider for KrakenRestClient {
    async fn get_precision(&self, instrument: &str) -> BotResult<InstrumentPrecision> {
        let result: HashMap<String, AssetPairInfo> = self
            .get_json("/0/public/AssetPairs", &[("pair", instrument.to_string())])
            .await?;
        let info = result
            .into_values()
            .next()
            .ok_or_else(|| BotError::Http(format!("no AssetPairs entry for {}", instrument)))?;

        let price_step = info
            .tick_size
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or_else(|| 10f64.powi(-(info.pair_decimals as i32)));
        let min_quantity = info
            .ordermin
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(self.fallback_min_quantity);

        Ok(InstrumentPrecision {
            quantity_step: 10f64.powi(-(info.lot_decimals as i32)),
            price_step,
            min_quantity,
        })
    }
}

/// `[time, open, high, low, close, vwap, volume, count]`, prices as strings
fn parse_ohlc_row(row: &Value) -> BotResult<Candle> {
    let fields = row
        .as_array()
        .filter(|f| f.len() >= 7)
        .ok_or_else(|| BotError::Http(format!("bad OHLC row: {}", row)))?;

    let field = |idx: usize| -> BotResult<f64> {
        let parsed = match &fields[idx] {
            Value::String(s) => s.parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        parsed.ok_or_else(|| BotError::Http(format!("non-numeric OHLC field {} in {}", idx, row)))
    };

    let open_time = Utc
        .timestamp_opt(field(0)? as i64, 0)
        .single()
        .ok_or_else(|| BotError::Http(format!("bad OHLC timestamp in {}", row)))?;

    let candle = Candle {
        open_time,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(6)?,
    };
    candle.validate().map_err(BotError::Http)?;
    Ok(candle)
}
