use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use domain::{Breach, BreachKind, UserId, Watch};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex, Semaphore},
    task::{JoinHandle, JoinSet},
    time::{interval, timeout, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    error::{AlertError, AlertResult},
    evaluator::{alert_message, decide},
    policy::{NotifyPolicy, PolicyState},
    registry::WatchRegistry,
    NotificationSink, PriceSource,
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub fetch_timeout: Duration,
    pub send_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub policy: NotifyPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 8,
            policy: NotifyPolicy::EveryTick,
        }
    }
}

/// Outcome counters for one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub watches: usize,
    pub symbols: usize,
    pub symbols_failed: usize,
    pub alerts_triggered: usize,
    pub suppressed: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

/// Periodically evaluates every registered watch against fresh prices.
pub struct AlertScheduler {
    registry: Arc<WatchRegistry>,
    prices: Arc<dyn PriceSource>,
    notifier: Arc<dyn NotificationSink>,
    config: SchedulerConfig,
    // Held for the whole tick, so ticks never overlap.
    policy_state: Mutex<PolicyState>,
}

impl AlertScheduler {
    pub fn new(
        registry: Arc<WatchRegistry>,
        prices: Arc<dyn PriceSource>,
        notifier: Arc<dyn NotificationSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            prices,
            notifier,
            config: SchedulerConfig {
                tick_interval: config.tick_interval.max(Duration::from_millis(1)),
                max_concurrent_fetches: config.max_concurrent_fetches.max(1),
                ..config
            },
            policy_state: Mutex::new(PolicyState::default()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.registry
    }

    /// Runs the timer loop until `shutdown` fires. A tick in flight at that
    /// point is abandoned.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                interval_secs = self.config.tick_interval.as_secs(),
                policy = ?self.config.policy,
                "alert scheduler started"
            );

            loop {
                let fired = tokio::select! {
                    _ = ticker.tick() => true,
                    _ = shutdown.recv() => false,
                };
                if !fired {
                    break;
                }

                let started = Instant::now();
                let finished = tokio::select! {
                    report = self.run_tick() => Some(report),
                    _ = shutdown.recv() => None,
                };
                if finished.is_none() {
                    warn!("shutdown during tick; abandoning outstanding fetches and sends");
                    break;
                }
                let elapsed = started.elapsed();
                if elapsed >= self.config.tick_interval {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        interval_secs = self.config.tick_interval.as_secs(),
                        "tick overran its interval; skipping missed firings"
                    );
                }
            }
            info!("alert scheduler stopped");
        })
    }

    /// One evaluation cycle over a fresh snapshot. A call made while another
    /// tick is running waits for it to finish.
    pub async fn run_tick(&self) -> TickReport {
        let mut policy_state = self.policy_state.lock().await;
        metrics::counter!("alert_ticks_total").increment(1);

        let snapshot = self.registry.snapshot();
        let symbols = snapshot.symbols();
        let mut report = TickReport {
            watches: snapshot.len(),
            symbols: symbols.len(),
            ..TickReport::default()
        };

        let prices = self.fetch_prices(symbols).await;
        report.symbols_failed = report.symbols - prices.len();

        let now = Instant::now();
        let mut outbox: Vec<(Watch, Breach)> = Vec::new();
        for watch in &snapshot {
            let Some(&price) = prices.get(&watch.symbol) else {
                continue;
            };
            match decide(watch, price) {
                Some(breach) => {
                    report.alerts_triggered += 1;
                    let policy = self.config.policy;
                    if policy_state.should_notify(policy, watch.id, breach.kind, now) {
                        outbox.push((watch.clone(), breach));
                    } else {
                        report.suppressed += 1;
                        metrics::counter!("alert_notifications_suppressed_total").increment(1);
                    }
                }
                None => policy_state.record_quiet(watch.id),
            }
        }

        let (outcomes, lost_sends) = self.send_all(outbox).await;
        report.notifications_failed += lost_sends;
        for (watch, kind, result) in outcomes {
            match result {
                Ok(()) => {
                    report.notifications_sent += 1;
                    policy_state.record_sent(watch.id, kind, Instant::now());
                    metrics::counter!("alert_notifications_sent_total").increment(1);
                }
                Err(err) => {
                    report.notifications_failed += 1;
                    metrics::counter!("alert_notifications_failed_total").increment(1);
                    warn!(
                        error = %err,
                        watch_id = %watch.id,
                        symbol = %watch.symbol,
                        "notification failed; will retry next tick"
                    );
                }
            }
        }

        let live: HashSet<_> = snapshot.iter().map(|w| w.id).collect();
        policy_state.retain_live(&live);

        info!(
            watches = report.watches,
            symbols = report.symbols,
            symbols_failed = report.symbols_failed,
            alerts = report.alerts_triggered,
            sent = report.notifications_sent,
            send_failed = report.notifications_failed,
            suppressed = report.suppressed,
            "alert tick finished"
        );
        report
    }

    /// Fetches each distinct symbol once, in parallel. Failed symbols are
    /// logged and left out of the returned map.
    async fn fetch_prices(&self, symbols: BTreeSet<String>) -> HashMap<String, f64> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches));
        let mut tasks = JoinSet::new();
        for symbol in symbols {
            let prices = self.prices.clone();
            let semaphore = semaphore.clone();
            let limit = self.config.fetch_timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = fetch_price(prices.as_ref(), &symbol, limit).await;
                (symbol, result)
            });
        }

        let mut fetched = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, Ok(price))) => {
                    debug!(%symbol, price, "price fetched");
                    fetched.insert(symbol, price);
                }
                Ok((symbol, Err(err))) => {
                    metrics::counter!("alert_symbol_fetch_failures_total").increment(1);
                    warn!(error = %err, %symbol, "price fetch failed; skipping symbol this tick");
                }
                Err(join_err) => {
                    metrics::counter!("alert_symbol_fetch_failures_total").increment(1);
                    warn!(error = %join_err, "price fetch task join error");
                }
            }
        }
        fetched
    }

    /// Sends every message concurrently. The second value counts send tasks
    /// that panicked or were cancelled before reporting back.
    async fn send_all(
        &self,
        outbox: Vec<(Watch, Breach)>,
    ) -> (Vec<(Watch, BreachKind, AlertResult<()>)>, usize) {
        let mut tasks = JoinSet::new();
        for (watch, breach) in outbox {
            let notifier = self.notifier.clone();
            let limit = self.config.send_timeout;
            tasks.spawn(async move {
                let message = alert_message(&watch, &breach);
                let result =
                    send_notification(notifier.as_ref(), &watch.user_id, &message, limit).await;
                (watch, breach.kind, result)
            });
        }

        let mut outcomes = Vec::new();
        let mut lost = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    lost += 1;
                    metrics::counter!("alert_notifications_failed_total").increment(1);
                    warn!(error = %join_err, "notification task join error");
                }
            }
        }
        (outcomes, lost)
    }
}

async fn fetch_price(prices: &dyn PriceSource, symbol: &str, limit: Duration) -> AlertResult<f64> {
    let failed = |reason: String| AlertError::SymbolFetchFailed {
        symbol: symbol.to_string(),
        reason,
    };
    match timeout(limit, prices.fetch(symbol)).await {
        Ok(Ok(price)) if price.is_finite() => Ok(price),
        Ok(Ok(price)) => Err(failed(format!("non-finite price {price}"))),
        Ok(Err(err)) => Err(failed(format!("{err:#}"))),
        Err(_) => Err(failed(format!("timed out after {limit:?}"))),
    }
}

async fn send_notification(
    notifier: &dyn NotificationSink,
    user_id: &UserId,
    message: &str,
    limit: Duration,
) -> AlertResult<()> {
    let failed = |reason: String| AlertError::NotificationFailed {
        user_id: user_id.clone(),
        reason,
    };
    match timeout(limit, notifier.send(user_id, message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(failed(format!("{err:#}"))),
        Err(_) => Err(failed(format!("timed out after {limit:?}"))),
    }
}
