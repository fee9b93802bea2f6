use std::{collections::HashMap, env, time::Duration};

use alert_engine::{NotifyPolicy, SchedulerConfig};
use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub frontend_origins: Vec<String>,
    pub tick_interval: Duration,
    pub price_fetch_timeout: Duration,
    pub notify_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub notify_policy: NotifyPolicy,
    pub coinmarketcap_api_key: Option<String>,
    pub coinmarketcap_api_base: String,
    pub static_prices: HashMap<String, f64>,
    pub price_cache_ttl: Duration,
    pub telegram_bot_token: Option<String>,
    pub telegram_api_base: String,
    pub enable_alert_worker: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let tick_interval = parse_duration_seconds("TICK_INTERVAL_SECS", 60);
        let price_fetch_timeout = parse_duration_seconds("PRICE_FETCH_TIMEOUT_SECS", 10);
        let notify_timeout = parse_duration_seconds("NOTIFY_TIMEOUT_SECS", 10);
        let price_cache_ttl = parse_duration_seconds("PRICE_CACHE_TTL_SECS", 30);
        let cooldown = parse_duration_seconds("NOTIFY_COOLDOWN_SECS", 300);
        let notify_policy = match env::var("NOTIFY_POLICY") {
            Ok(raw) => NotifyPolicy::parse(&raw, cooldown).with_context(|| {
                format!("NOTIFY_POLICY must be every_tick, edge or cooldown (got {raw})")
            })?,
            Err(_) => NotifyPolicy::EveryTick,
        };

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
            frontend_origins: parse_origins(),
            tick_interval,
            price_fetch_timeout,
            notify_timeout,
            max_concurrent_fetches: parse_usize("MAX_CONCURRENT_FETCHES", 8),
            notify_policy,
            coinmarketcap_api_key: non_empty_var("COINMARKETCAP_API_KEY"),
            coinmarketcap_api_base: env::var("COINMARKETCAP_API_BASE")
                .unwrap_or_else(|_| "https://pro-api.coinmarketcap.com".to_string()),
            static_prices: parse_static_prices("STATIC_PRICES"),
            price_cache_ttl,
            telegram_bot_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
            telegram_api_base: env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            enable_alert_worker: parse_bool("ENABLE_ALERT_WORKER", true),
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: self.tick_interval,
            fetch_timeout: self.price_fetch_timeout,
            send_timeout: self.notify_timeout,
            max_concurrent_fetches: self.max_concurrent_fetches,
            policy: self.notify_policy,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            frontend_origins: vec!["http://localhost:3000".to_string()],
            tick_interval: Duration::from_secs(60),
            price_fetch_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 8,
            notify_policy: NotifyPolicy::EveryTick,
            coinmarketcap_api_key: None,
            coinmarketcap_api_base: "https://pro-api.coinmarketcap.com".to_string(),
            static_prices: HashMap::new(),
            price_cache_ttl: Duration::from_secs(30),
            telegram_bot_token: None,
            telegram_api_base: "https://api.telegram.org".to_string(),
            enable_alert_worker: true,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_origins() -> Vec<String> {
    match env::var("FRONTEND_ORIGINS") {
        Ok(list) => split_origins(&list),
        Err(_) => vec!["http://localhost:3000".to_string()],
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_duration_seconds(key: &str, default: u64) -> Duration {
    seconds_or_default(env::var(key).ok().as_deref(), default)
}

/// Zero, negative and unparsable values fall back to `default`.
fn seconds_or_default(raw: Option<&str>, default: u64) -> Duration {
    let secs = raw
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_static_prices(key: &str) -> HashMap<String, f64> {
    match env::var(key) {
        Ok(raw) => split_static_prices(&raw),
        Err(_) => HashMap::new(),
    }
}

/// `BTC=65000,eth=3000` -> `{BTC: 65000, ETH: 3000}`. Malformed entries are skipped.
fn split_static_prices(raw: &str) -> HashMap<String, f64> {
    raw.split(',')
        .filter_map(|item| {
            let (symbol, value) = item.split_once('=')?;
            let price = value.trim().parse::<f64>().ok()?;
            let symbol = domain::normalize_symbol(symbol)?;
            Some((symbol, price))
        })
        .collect()
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
        .unwrap_or(default)
}
