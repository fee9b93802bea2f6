use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use alert_engine::{
    AlertScheduler, NotificationSink, NotifyPolicy, PriceSource, SchedulerConfig, TickReport,
    WatchRegistry,
};
use async_trait::async_trait;
use domain::UserId;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Serves prices from a table. Symbols mapped to `None` fail, symbols listed
/// in `hanging` never answer.
#[derive(Default)]
struct ScriptedPrices {
    prices: Mutex<HashMap<String, Option<f64>>>,
    hanging: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedPrices {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn set(&self, symbol: &str, price: f64) {
        self.prices.lock().insert(symbol.to_string(), Some(price));
    }

    fn fail(&self, symbol: &str) {
        self.prices.lock().insert(symbol.to_string(), None);
    }

    fn hang(&self, symbol: &str) {
        self.hanging.lock().insert(symbol.to_string());
    }

    fn calls(&self, symbol: &str) -> usize {
        self.calls.lock().get(symbol).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PriceSource for ScriptedPrices {
    async fn fetch(&self, symbol: &str) -> anyhow::Result<f64> {
        *self.calls.lock().entry(symbol.to_string()).or_default() += 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let hanging = self.hanging.lock().contains(symbol);
        if hanging {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.prices.lock().get(symbol).copied() {
            Some(Some(price)) => Ok(price),
            Some(None) => Err(anyhow::anyhow!("quote service unavailable")),
            None => Err(anyhow::anyhow!("unknown symbol {symbol}")),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(UserId, String)>>,
    failing: Mutex<HashSet<UserId>>,
    hanging: Mutex<HashSet<UserId>>,
    panicking: Mutex<HashSet<UserId>>,
}

impl RecordingSink {
    fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().clone()
    }

    fn fail_for(&self, user_id: &str) {
        self.failing.lock().insert(UserId::from(user_id));
    }

    fn hang_for(&self, user_id: &str) {
        self.hanging.lock().insert(UserId::from(user_id));
    }

    fn panic_for(&self, user_id: &str) {
        self.panicking.lock().insert(UserId::from(user_id));
    }

    fn recover(&self, user_id: &str) {
        self.failing.lock().remove(&UserId::from(user_id));
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, user_id: &UserId, message: &str) -> anyhow::Result<()> {
        let hanging = self.hanging.lock().contains(user_id);
        if hanging {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let panicking = self.panicking.lock().contains(user_id);
        if panicking {
            panic!("sink crashed while sending to {user_id}");
        }
        if self.failing.lock().contains(user_id) {
            anyhow::bail!("chat not found");
        }
        self.sent.lock().push((user_id.clone(), message.to_string()));
        Ok(())
    }
}

struct Harness {
    registry: Arc<WatchRegistry>,
    prices: Arc<ScriptedPrices>,
    sink: Arc<RecordingSink>,
    scheduler: Arc<AlertScheduler>,
}

fn harness_with(prices: ScriptedPrices, config: SchedulerConfig) -> Harness {
    let registry = Arc::new(WatchRegistry::new());
    let prices = Arc::new(prices);
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Arc::new(AlertScheduler::new(
        registry.clone(),
        prices.clone(),
        sink.clone(),
        config,
    ));
    Harness {
        registry,
        prices,
        sink,
        scheduler,
    }
}

fn harness() -> Harness {
    harness_with(ScriptedPrices::default(), SchedulerConfig::default())
}

#[tokio::test]
async fn btc_band_round_trip_scenario() {
    let h = harness();
    let u1 = UserId::from("U1");
    h.registry
        .add(u1.clone(), "BTC", 50_000.0, 70_000.0)
        .expect("valid watch");

    h.prices.set("BTC", 60_000.0);
    let first = h.scheduler.run_tick().await;
    assert_eq!(first.alerts_triggered, 0);
    assert!(h.sink.sent().is_empty());

    h.prices.set("BTC", 71_000.0);
    let second = h.scheduler.run_tick().await;
    assert_eq!(second.notifications_sent, 1);
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, u1);
    assert!(sent[0].1.contains("BTC"));
    assert!(sent[0].1.contains("71000"));

    assert_eq!(h.registry.remove(&u1, "BTC"), 1);
    h.prices.set("BTC", 72_000.0);
    let third = h.scheduler.run_tick().await;
    assert_eq!(third.watches, 0);
    assert_eq!(h.sink.sent().len(), 1);
}

#[tokio::test]
async fn shared_symbol_is_fetched_once_per_tick() {
    let h = harness();
    for user in ["a", "b", "c"] {
        h.registry.add(UserId::from(user), "eth", 1.0, 2.0).unwrap();
    }
    h.registry.add(UserId::from("a"), "ETH", 5.0, 6.0).unwrap();
    h.prices.set("ETH", 3.0);

    let report = h.scheduler.run_tick().await;

    assert_eq!(h.prices.calls("ETH"), 1);
    assert_eq!(report.symbols, 1);
    assert_eq!(report.watches, 4);
    assert_eq!(report.alerts_triggered, 4);
    assert_eq!(h.sink.sent().len(), 4);
}

#[tokio::test]
async fn failed_symbol_does_not_block_other_symbols() {
    let h = harness();
    h.registry.add(UserId::from("u1"), "BTC", 1.0, 2.0).unwrap();
    h.registry.add(UserId::from("u2"), "ETH", 10.0, 20.0).unwrap();
    h.prices.fail("BTC");
    h.prices.set("ETH", 25.0);

    let report = h.scheduler.run_tick().await;

    assert_eq!(report.symbols_failed, 1);
    assert_eq!(report.notifications_sent, 1);
    let sent = h.sink.sent();
    assert_eq!(sent[0].0, UserId::from("u2"));
    assert!(sent[0].1.contains("ETH"));
}

#[tokio::test(start_paused = true)]
async fn hung_price_lookup_times_out_without_stalling_tick() {
    let h = harness_with(
        ScriptedPrices::default(),
        SchedulerConfig {
            fetch_timeout: Duration::from_secs(5),
            ..SchedulerConfig::default()
        },
    );
    h.registry.add(UserId::from("u1"), "SLOW", 1.0, 2.0).unwrap();
    h.registry.add(UserId::from("u2"), "FAST", 1.0, 2.0).unwrap();
    h.prices.set("SLOW", 100.0);
    h.prices.hang("SLOW");
    h.prices.set("FAST", 0.5);

    let started = tokio::time::Instant::now();
    let report = h.scheduler.run_tick().await;

    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(report.symbols_failed, 1);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(h.sink.sent()[0].0, UserId::from("u2"));
}

#[tokio::test]
async fn sink_failure_for_one_user_does_not_block_others() {
    let h = harness();
    h.registry.add(UserId::from("u1"), "BTC", 1.0, 2.0).unwrap();
    h.registry.add(UserId::from("u2"), "BTC", 1.0, 2.0).unwrap();
    h.prices.set("BTC", 3.0);
    h.sink.fail_for("u1");

    let report = h.scheduler.run_tick().await;

    assert_eq!(report.alerts_triggered, 2);
    assert_eq!(report.notifications_failed, 1);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(h.sink.sent()[0].0, UserId::from("u2"));
}

#[tokio::test(start_paused = true)]
async fn hung_sink_call_times_out_without_blocking_other_users() {
    let h = harness_with(
        ScriptedPrices::default(),
        SchedulerConfig {
            send_timeout: Duration::from_secs(2),
            ..SchedulerConfig::default()
        },
    );
    h.registry.add(UserId::from("u1"), "BTC", 1.0, 2.0).unwrap();
    h.registry.add(UserId::from("u2"), "BTC", 1.0, 2.0).unwrap();
    h.prices.set("BTC", 3.0);
    h.sink.hang_for("u1");

    let started = tokio::time::Instant::now();
    let report = h.scheduler.run_tick().await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.alerts_triggered, 2);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.notifications_failed, 1);
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, UserId::from("u2"));
}

#[tokio::test]
async fn crashed_send_task_counts_as_failed_notification() {
    let h = harness();
    h.registry.add(UserId::from("u1"), "BTC", 1.0, 2.0).unwrap();
    h.registry.add(UserId::from("u2"), "BTC", 1.0, 2.0).unwrap();
    h.prices.set("BTC", 3.0);
    h.sink.panic_for("u1");

    let report = h.scheduler.run_tick().await;

    assert_eq!(report.alerts_triggered, 2);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.notifications_failed, 1);
}

#[tokio::test]
async fn every_tick_policy_repeats_while_outside_band() {
    let h = harness();
    h.registry.add(UserId::from("u1"), "BTC", 1.0, 2.0).unwrap();
    h.prices.set("BTC", 0.5);

    h.scheduler.run_tick().await;
    h.scheduler.run_tick().await;
    h.scheduler.run_tick().await;

    assert_eq!(h.sink.sent().len(), 3);
}

#[tokio::test]
async fn edge_triggered_policy_notifies_once_per_excursion() {
    let h = harness_with(
        ScriptedPrices::default(),
        SchedulerConfig {
            policy: NotifyPolicy::EdgeTriggered,
            ..SchedulerConfig::default()
        },
    );
    h.registry.add(UserId::from("u1"), "BTC", 10.0, 20.0).unwrap();

    h.prices.set("BTC", 25.0);
    h.scheduler.run_tick().await;
    let quiet = h.scheduler.run_tick().await;
    assert_eq!(quiet.suppressed, 1);
    assert_eq!(h.sink.sent().len(), 1);

    h.prices.set("BTC", 15.0);
    h.scheduler.run_tick().await;
    h.prices.set("BTC", 5.0);
    h.scheduler.run_tick().await;

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].1.contains("below minimum"));
}

#[tokio::test]
async fn edge_triggered_policy_alerts_when_price_jumps_to_opposite_bound() {
    let h = harness_with(
        ScriptedPrices::default(),
        SchedulerConfig {
            policy: NotifyPolicy::EdgeTriggered,
            ..SchedulerConfig::default()
        },
    );
    h.registry.add(UserId::from("u1"), "BTC", 10.0, 20.0).unwrap();

    h.prices.set("BTC", 25.0);
    let above = h.scheduler.run_tick().await;
    assert_eq!(above.notifications_sent, 1);

    h.prices.set("BTC", 5.0);
    let below = h.scheduler.run_tick().await;
    assert_eq!(below.suppressed, 0);
    assert_eq!(below.notifications_sent, 1);

    let repeat = h.scheduler.run_tick().await;
    assert_eq!(repeat.suppressed, 1);

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].1.contains("at/above maximum"));
    assert!(sent[1].1.contains("below minimum"));
}

#[tokio::test(start_paused = true)]
async fn cooldown_policy_holds_repeats_until_window_passes() {
    let h = harness_with(
        ScriptedPrices::default(),
        SchedulerConfig {
            policy: NotifyPolicy::Cooldown(Duration::from_secs(300)),
            ..SchedulerConfig::default()
        },
    );
    h.registry.add(UserId::from("u1"), "BTC", 10.0, 20.0).unwrap();
    h.prices.set("BTC", 25.0);

    let first = h.scheduler.run_tick().await;
    assert_eq!(first.notifications_sent, 1);

    tokio::time::advance(Duration::from_secs(60)).await;
    let held = h.scheduler.run_tick().await;
    assert_eq!(held.notifications_sent, 0);
    assert_eq!(held.suppressed, 1);

    tokio::time::advance(Duration::from_secs(241)).await;
    let released = h.scheduler.run_tick().await;
    assert_eq!(released.notifications_sent, 1);
    assert_eq!(h.sink.sent().len(), 2);
}

#[tokio::test]
async fn edge_triggered_retries_after_failed_send() {
    let h = harness_with(
        ScriptedPrices::default(),
        SchedulerConfig {
            policy: NotifyPolicy::EdgeTriggered,
            ..SchedulerConfig::default()
        },
    );
    h.registry.add(UserId::from("u1"), "BTC", 10.0, 20.0).unwrap();
    h.prices.set("BTC", 25.0);
    h.sink.fail_for("u1");

    let failed = h.scheduler.run_tick().await;
    assert_eq!(failed.notifications_failed, 1);

    h.sink.recover("u1");
    let retried = h.scheduler.run_tick().await;
    assert_eq!(retried.notifications_sent, 1);
    assert_eq!(h.sink.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_tick_requests_run_one_after_another() {
    let h = harness_with(
        ScriptedPrices::with_delay(Duration::from_secs(1)),
        SchedulerConfig::default(),
    );
    h.registry.add(UserId::from("u1"), "BTC", 1.0, 2.0).unwrap();
    h.prices.set("BTC", 3.0);

    let (a, b) = tokio::join!(h.scheduler.run_tick(), h.scheduler.run_tick());

    assert_eq!(a.notifications_sent + b.notifications_sent, 2);
    assert_eq!(h.prices.calls("BTC"), 2);
    assert_eq!(h.prices.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn spawned_loop_ticks_on_interval_and_stops_on_shutdown() {
    let h = harness();
    h.registry.add(UserId::from("u1"), "BTC", 1.0, 2.0).unwrap();
    h.prices.set("BTC", 3.0);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = h.scheduler.clone().spawn(shutdown_rx);

    // Fires at t=0 and t=60.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.sink.sent().len(), 2);

    shutdown_tx.send(()).expect("scheduler listening");
    handle.await.expect("scheduler task");

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.sink.sent().len(), 2);
}

#[tokio::test]
async fn registry_changes_during_ticks_are_picked_up_next_tick() {
    let h = harness();
    h.prices.set("BTC", 3.0);
    h.prices.set("ETH", 3.0);

    let empty = h.scheduler.run_tick().await;
    assert_eq!(empty, TickReport::default());

    h.registry.add(UserId::from("u1"), "BTC", 1.0, 2.0).unwrap();
    h.registry.add(UserId::from("u1"), "ETH", 1.0, 2.0).unwrap();
    let report = h.scheduler.run_tick().await;
    assert_eq!(report.symbols, 2);
    assert_eq!(report.notifications_sent, 2);
}
