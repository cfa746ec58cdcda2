use async_trait::async_trait;

use crate::domain::{AlertState, InvalidRule, Location, Observation, SubscriberId, Watch};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("invalid rule: {0}")]
    InvalidRule(#[from] InvalidRule),
    #[error("invalid config: {0}")]
    Config(String),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transient: eligible for retry within the tick, then degrades to
    /// INSUFFICIENT_DATA for the affected watches.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// Permanent: the watch is deactivated and the subscriber notified
    /// once.
    #[error("invalid location: {0}")]
    InvalidLocation(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// Fetch one normalized observation snapshot for a location. No
/// caching here; per-tick location dedup is the scheduler's job.
#[async_trait]
pub trait WeatherGateway: Send + Sync {
    async fn fetch(&self, location: &Location) -> Result<Observation, GatewayError>;
}

/// Durable subscriber -> watch -> rule mapping plus per (watch, rule)
/// alert state.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create_watch(&self, watch: &Watch) -> AppResult<()>;
    async fn list_active_watches(&self) -> AppResult<Vec<Watch>>;
    async fn deactivate_watch(&self, watch_id: &str) -> AppResult<()>;
    async fn get_alert_state(&self, watch_id: &str, rule_id: &str)
        -> AppResult<Option<AlertState>>;
    async fn upsert_alert_state(
        &self,
        watch_id: &str,
        rule_id: &str,
        state: &AlertState,
    ) -> AppResult<()>;
    /// Unsubscribe-all: removes the subscriber, its watches and their
    /// alert state.
    async fn remove_subscriber(&self, subscriber: &SubscriberId) -> AppResult<()>;
}

/// Deliver a rendered alert message to a subscriber.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &SubscriberId, message: &str) -> AppResult<()>;
}
