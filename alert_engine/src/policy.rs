use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use domain::BreachKind;
use tokio::time::Instant;
use uuid::Uuid;

/// When a breached watch is allowed to produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyPolicy {
    /// Notify on every tick while the price stays outside the band.
    #[default]
    EveryTick,
    /// Notify once per excursion; re-arms after the price returns inside the band
    /// or crosses to the opposite bound.
    EdgeTriggered,
    /// Notify at most once per window for each watch.
    Cooldown(Duration),
}

impl NotifyPolicy {
    /// Accepts `every_tick`, `edge` or `cooldown`. The cooldown window is only
    /// used for the latter.
    pub fn parse(raw: &str, cooldown: Duration) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "every_tick" | "every-tick" | "always" => Some(NotifyPolicy::EveryTick),
            "edge" | "edge_triggered" | "edge-triggered" => Some(NotifyPolicy::EdgeTriggered),
            "cooldown" => Some(NotifyPolicy::Cooldown(cooldown)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WatchMemory {
    notified_for: Option<BreachKind>,
    last_sent: Option<Instant>,
}

/// Per-watch notification memory, keyed by watch id.
#[derive(Debug, Default)]
pub struct PolicyState {
    entries: HashMap<Uuid, WatchMemory>,
}

impl PolicyState {
    pub fn should_notify(
        &self,
        policy: NotifyPolicy,
        watch_id: Uuid,
        kind: BreachKind,
        now: Instant,
    ) -> bool {
        let memory = self.entries.get(&watch_id).copied().unwrap_or_default();
        match policy {
            NotifyPolicy::EveryTick => true,
            NotifyPolicy::EdgeTriggered => memory.notified_for != Some(kind),
            NotifyPolicy::Cooldown(window) => memory
                .last_sent
                .map_or(true, |sent| now.saturating_duration_since(sent) >= window),
        }
    }

    /// Called only after the sink accepted the message.
    pub fn record_sent(&mut self, watch_id: Uuid, kind: BreachKind, now: Instant) {
        let memory = self.entries.entry(watch_id).or_default();
        memory.notified_for = Some(kind);
        memory.last_sent = Some(now);
    }

    /// The price was seen inside the band; edge-triggered watches re-arm.
    pub fn record_quiet(&mut self, watch_id: Uuid) {
        if let Some(memory) = self.entries.get_mut(&watch_id) {
            memory.notified_for = None;
        }
    }

    /// Forgets watches that are no longer registered.
    pub fn retain_live(&mut self, live: &HashSet<Uuid>) {
        self.entries.retain(|id, _| live.contains(id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
