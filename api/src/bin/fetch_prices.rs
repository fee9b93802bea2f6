use api::{bootstrap::build_price_source, config::AppConfig, telemetry};
use futures::future::join_all;
use tokio::time::timeout;

/// One-shot quote lookup for `PRICE_SYMBOLS`, handy for checking API keys.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;
    let config = AppConfig::from_env()?;
    let symbols = std::env::var("PRICE_SYMBOLS").unwrap_or_else(|_| "BTC,ETH".to_string());
    let symbols: Vec<String> = symbols
        .split(',')
        .filter_map(domain::normalize_symbol)
        .collect();

    let prices = build_price_source(&config)?;
    let lookups = symbols.iter().map(|symbol| {
        let prices = prices.clone();
        let limit = config.price_fetch_timeout;
        async move {
            let result = timeout(limit, prices.fetch(symbol)).await;
            (symbol, result)
        }
    });

    let mut failures = 0usize;
    for (symbol, result) in join_all(lookups).await {
        match result {
            Ok(Ok(price)) => tracing::info!(%symbol, price, "price fetched"),
            Ok(Err(err)) => {
                failures += 1;
                tracing::warn!(%symbol, error = %err, "price fetch failed");
            }
            Err(_) => {
                failures += 1;
                tracing::warn!(%symbol, "price fetch timed out");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} lookups failed", symbols.len());
    }
    Ok(())
}
