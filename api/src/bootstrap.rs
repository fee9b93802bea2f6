use std::sync::Arc;

use alert_engine::{
    AlertScheduler, LoggingNotifier, NotificationSink, PriceSource, WatchRegistry,
};
use anyhow::Result;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    services::{
        CachedPriceSource, CoinMarketCapPriceSource, FallbackPriceSource, StaticPriceSource,
        TelegramNotifier,
    },
    state::AppState,
};

pub fn build_state(config: &AppConfig) -> Result<AppState> {
    let prices = build_price_source(config)?;
    let notifier = build_notifier(config)?;
    let registry = Arc::new(WatchRegistry::new());
    let scheduler = Arc::new(AlertScheduler::new(
        registry.clone(),
        prices.clone(),
        notifier,
        config.scheduler_config(),
    ));

    Ok(AppState {
        config: config.clone(),
        registry,
        prices,
        scheduler,
    })
}

/// CoinMarketCap when a key is configured, falling back to `STATIC_PRICES`
/// when both are present. Whatever is chosen sits behind the quote cache.
pub fn build_price_source(config: &AppConfig) -> Result<Arc<dyn PriceSource>> {
    let static_source = if config.static_prices.is_empty() {
        None
    } else {
        let source: Arc<dyn PriceSource> =
            Arc::new(StaticPriceSource::new(config.static_prices.clone()));
        Some(source)
    };

    let upstream: Arc<dyn PriceSource> = match (&config.coinmarketcap_api_key, static_source) {
        (Some(key), fallback) => {
            let cmc: Arc<dyn PriceSource> = Arc::new(CoinMarketCapPriceSource::new(
                config.coinmarketcap_api_base.clone(),
                key.clone(),
                config.price_fetch_timeout,
            )?);
            match fallback {
                Some(fallback) => {
                    info!("using coinmarketcap prices with static fallback");
                    Arc::new(FallbackPriceSource::new(cmc, fallback))
                }
                None => {
                    info!("using coinmarketcap prices");
                    cmc
                }
            }
        }
        (None, Some(fixed)) => {
            warn!(
                symbols = config.static_prices.len(),
                "COINMARKETCAP_API_KEY not set; serving STATIC_PRICES only"
            );
            fixed
        }
        (None, None) => {
            anyhow::bail!("no price source configured: set COINMARKETCAP_API_KEY or STATIC_PRICES")
        }
    };

    Ok(Arc::new(CachedPriceSource::new(
        upstream,
        config.price_cache_ttl,
    )))
}

pub fn build_notifier(config: &AppConfig) -> Result<Arc<dyn NotificationSink>> {
    match &config.telegram_bot_token {
        Some(token) => Ok(Arc::new(TelegramNotifier::new(
            config.telegram_api_base.clone(),
            token.clone(),
            config.notify_timeout,
        )?)),
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set; alerts will only be logged");
            Ok(Arc::new(LoggingNotifier))
        }
    }
}

/// Starts the scheduler loop unless `ENABLE_ALERT_WORKER` turned it off.
pub fn spawn_alert_worker(
    state: &AppState,
    shutdown: broadcast::Receiver<()>,
) -> Option<JoinHandle<()>> {
    if !state.config.enable_alert_worker {
        info!("alert worker disabled");
        return None;
    }
    info!(
        interval_secs = state.config.tick_interval.as_secs(),
        policy = ?state.config.notify_policy,
        "alert worker started"
    );
    Some(state.scheduler.clone().spawn(shutdown))
}
