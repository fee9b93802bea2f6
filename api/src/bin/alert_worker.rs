use api::{
    bootstrap::{build_state, spawn_alert_worker},
    config::AppConfig,
    telemetry,
};
use tokio::sync::broadcast;

/// Runs the scheduler without the HTTP surface. Watches live in memory, so
/// this is mostly useful with a process that registers them programmatically
/// or for soak-testing price sources and notifiers.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;

    let mut config = AppConfig::from_env()?;
    config.enable_alert_worker = true;
    let state = build_state(&config)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let Some(worker) = spawn_alert_worker(&state, shutdown_rx) else {
        anyhow::bail!("alert worker failed to start");
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(());
    worker.await?;
    Ok(())
}
