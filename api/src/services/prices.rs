use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use alert_engine::PriceSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Quotes from the CoinMarketCap `quotes/latest` endpoint, priced in USD.
#[derive(Clone)]
pub struct CoinMarketCapPriceSource {
    client: Client,
    api_base: String,
    api_key: String,
}

impl CoinMarketCapPriceSource {
    pub fn new(api_base: String, api_key: String, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl PriceSource for CoinMarketCapPriceSource {
    async fn fetch(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/v1/cryptocurrency/quotes/latest", self.api_base);
        let resp = self
            .client
            .get(url)
            .header("X-CMC_PRO_API_KEY", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("symbol", symbol), ("convert", "USD")])
            .send()
            .await
            .context("coinmarketcap request failed")?;
        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to decode coinmarketcap response")?;
        if !status.is_success() {
            let message = body
                .pointer("/status/error_message")
                .and_then(|v| v.as_str())
                .unwrap_or("no error message");
            anyhow::bail!("coinmarketcap returned status {status}: {message}");
        }
        parse_usd_quote(&body, symbol)
    }
}

/// Reads `data.{SYMBOL}.quote.USD.price`. Newer API versions return an array
/// per symbol; the first listing wins.
pub fn parse_usd_quote(body: &serde_json::Value, symbol: &str) -> Result<f64> {
    let entry = body
        .get("data")
        .and_then(|data| data.get(symbol))
        .ok_or_else(|| anyhow::anyhow!("coinmarketcap quote missing for {symbol}"))?;
    let entry = match entry.as_array() {
        Some(listings) => listings
            .first()
            .ok_or_else(|| anyhow::anyhow!("coinmarketcap returned no listings for {symbol}"))?,
        None => entry,
    };
    entry
        .pointer("/quote/USD/price")
        .and_then(|value| value.as_f64())
        .ok_or_else(|| anyhow::anyhow!("coinmarketcap USD price missing for {symbol}"))
}

/// Fixed prices, mainly for local runs without an API key.
#[derive(Clone, Default)]
pub struct StaticPriceSource {
    prices: HashMap<String, f64>,
}

impl StaticPriceSource {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn fetch(&self, symbol: &str) -> Result<f64> {
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no static price configured for {symbol}"))
    }
}

pub struct FallbackPriceSource {
    primary: Arc<dyn PriceSource>,
    fallback: Arc<dyn PriceSource>,
}

impl FallbackPriceSource {
    pub fn new(primary: Arc<dyn PriceSource>, fallback: Arc<dyn PriceSource>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PriceSource for FallbackPriceSource {
    async fn fetch(&self, symbol: &str) -> Result<f64> {
        match self.primary.fetch(symbol).await {
            Ok(price) if price > 0.0 => Ok(price),
            Ok(price) => {
                debug!(%symbol, price, "primary returned non-positive price, trying fallback");
                self.fallback.fetch(symbol).await
            }
            Err(primary_err) => {
                debug!(error = %primary_err, %symbol, "primary price source failed, trying fallback");
                self.fallback.fetch(symbol).await.map_err(|fallback_err| {
                    anyhow::anyhow!(
                        "price lookup failed for {symbol}: primary: {primary_err:#}; fallback: {fallback_err:#}"
                    )
                })
            }
        }
    }
}

#[derive(Clone, Copy)]
struct CachedPrice {
    price: f64,
    fetched_at: Instant,
}

/// Keeps recent quotes in memory so `/price` lookups and ticks landing close
/// together share one upstream request.
pub struct CachedPriceSource {
    inner: Arc<dyn PriceSource>,
    cache: RwLock<HashMap<String, CachedPrice>>,
    ttl: Duration,
}

impl CachedPriceSource {
    pub fn new(inner: Arc<dyn PriceSource>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    async fn cached_price(&self, symbol: &str) -> Option<f64> {
        let cache = self.cache.read().await;
        cache
            .get(symbol)
            .filter(|entry| entry.fetched_at.elapsed() <= self.ttl)
            .map(|entry| entry.price)
    }

    async fn store_price(&self, symbol: &str, price: f64) {
        let mut cache = self.cache.write().await;
        cache.insert(
            symbol.to_string(),
            CachedPrice {
                price,
                fetched_at: Instant::now(),
            },
        );
    }
}

#[async_trait]
impl PriceSource for CachedPriceSource {
    async fn fetch(&self, symbol: &str) -> Result<f64> {
        if self.ttl.is_zero() {
            return self.inner.fetch(symbol).await;
        }
        if let Some(price) = self.cached_price(symbol).await {
            return Ok(price);
        }
        match self.inner.fetch(symbol).await {
            Ok(price) => {
                self.store_price(symbol, price).await;
                Ok(price)
            }
            Err(err) => {
                warn!(error = %err, %symbol, "price fetch failed");
                Err(err)
            }
        }
    }
}
