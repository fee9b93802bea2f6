//! Price-band watches: registry, evaluation and the periodic alert scheduler.

pub mod error;
pub mod evaluator;
pub mod policy;
pub mod registry;
pub mod scheduler;

use async_trait::async_trait;
use domain::UserId;
use tracing::info;

pub use error::{AlertError, AlertResult};
pub use evaluator::{alert_message, decide};
pub use policy::{NotifyPolicy, PolicyState};
pub use registry::{WatchRegistry, WatchSnapshot};
pub use scheduler::{AlertScheduler, SchedulerConfig, TickReport};

/// Quote provider. `symbol` is always the normalized upper-case form.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> anyhow::Result<f64>;
}

/// Delivers one message to one subscriber. One attempt per call; retries are
/// the implementation's business.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, user_id: &UserId, message: &str) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationSink for LoggingNotifier {
    async fn send(&self, user_id: &UserId, message: &str) -> anyhow::Result<()> {
        info!(%user_id, %message, "ALERT");
        Ok(())
    }
}
