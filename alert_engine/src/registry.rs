use std::{collections::BTreeSet, sync::Arc};

use chrono::Utc;
use domain::{normalize_symbol, UserId, Watch};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AlertError, AlertResult};

/// Process-wide store of price watches.
///
/// Storage is an `Arc<Vec<Watch>>` behind a single lock. Mutations go through
/// `Arc::make_mut`, so a snapshot handed out earlier keeps pointing at the old
/// vector and is never touched by later adds or removes.
#[derive(Default)]
pub struct WatchRegistry {
    watches: RwLock<Arc<Vec<Watch>>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new band. Duplicates are kept as independent rules.
    pub fn add(
        &self,
        user_id: UserId,
        symbol: &str,
        min_price: f64,
        max_price: f64,
    ) -> AlertResult<Watch> {
        let symbol = normalize_symbol(symbol).ok_or(AlertError::InvalidSymbol)?;
        if !min_price.is_finite() || !max_price.is_finite() {
            return Err(AlertError::InvalidPrice);
        }
        if min_price >= max_price {
            return Err(AlertError::InvalidRange {
                min: min_price,
                max: max_price,
            });
        }
        let watch = Watch {
            id: Uuid::new_v4(),
            user_id,
            symbol,
            min_price,
            max_price,
            created_at: Utc::now(),
        };

        {
            let mut guard = self.watches.write();
            Arc::make_mut(&mut *guard).push(watch.clone());
            // Set under the lock so the gauge follows writes in order.
            metrics::gauge!("alert_watches").set(guard.len() as f64);
        }
        debug!(
            watch_id = %watch.id,
            user_id = %watch.user_id,
            symbol = %watch.symbol,
            min_price,
            max_price,
            "watch added"
        );
        Ok(watch)
    }

    /// Drops every watch for `(user_id, symbol)` and returns how many went away.
    /// Zero means the pair was not tracked.
    pub fn remove(&self, user_id: &UserId, symbol: &str) -> usize {
        let Some(symbol) = normalize_symbol(symbol) else {
            return 0;
        };
        let matches = |w: &Watch| &w.user_id == user_id && w.symbol == symbol;

        let removed = {
            let mut guard = self.watches.write();
            let removed = guard.iter().filter(|&w| matches(w)).count();
            if removed > 0 {
                Arc::make_mut(&mut *guard).retain(|w| !matches(w));
                metrics::gauge!("alert_watches").set(guard.len() as f64);
            }
            removed
        };
        if removed > 0 {
            debug!(%user_id, %symbol, removed, "watches removed");
        }
        removed
    }

    /// The user's watches in insertion order.
    pub fn list_for_user(&self, user_id: &UserId) -> Vec<Watch> {
        self.watches
            .read()
            .iter()
            .filter(|w| &w.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> WatchSnapshot {
        WatchSnapshot {
            watches: Arc::clone(&*self.watches.read()),
        }
    }

    pub fn len(&self) -> usize {
        self.watches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable point-in-time view of the registry.
#[derive(Clone, Debug, Default)]
pub struct WatchSnapshot {
    watches: Arc<Vec<Watch>>,
}

impl WatchSnapshot {
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Watch> {
        self.watches.iter()
    }

    pub fn as_slice(&self) -> &[Watch] {
        &self.watches
    }

    /// Distinct symbols referenced by the snapshot, sorted.
    pub fn symbols(&self) -> BTreeSet<String> {
        self.watches.iter().map(|w| w.symbol.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a WatchSnapshot {
    type Item = &'a Watch;
    type IntoIter = std::slice::Iter<'a, Watch>;

    fn into_iter(self) -> Self::IntoIter {
        self.watches.iter()
    }
}
