use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::application::{AppError, AppResult, SubscriptionStore};
use crate::domain::{AlertState, SubscriberId, Watch};

/// In-memory store for tests and --dry-run experiments.
#[derive(Clone, Default)]
pub struct InMemorySubscriptionStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    watches: Vec<Watch>,
    // keyed (watch_id, rule_id)
    states: HashMap<(String, String), AlertState>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watches(watches: Vec<Watch>) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.watches = watches;
        }
        store
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn create_watch(&self, watch: &Watch) -> AppResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))?;
        if let Some(existing) = inner.watches.iter_mut().find(|w| w.id == watch.id) {
            *existing = watch.clone();
        } else {
            inner.watches.push(watch.clone());
        }
        Ok(())
    }

    async fn list_active_watches(&self) -> AppResult<Vec<Watch>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))?;
        Ok(inner.watches.iter().filter(|w| w.active).cloned().collect())
    }

    async fn deactivate_watch(&self, watch_id: &str) -> AppResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))?;
        if let Some(w) = inner.watches.iter_mut().find(|w| w.id == watch_id) {
            w.active = false;
        }
        Ok(())
    }

    async fn get_alert_state(
        &self,
        watch_id: &str,
        rule_id: &str,
    ) -> AppResult<Option<AlertState>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))?;
        Ok(inner
            .states
            .get(&(watch_id.to_string(), rule_id.to_string()))
            .cloned())
    }

    async fn upsert_alert_state(
        &self,
        watch_id: &str,
        rule_id: &str,
        state: &AlertState,
    ) -> AppResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))?;
        inner
            .states
            .insert((watch_id.to_string(), rule_id.to_string()), state.clone());
        Ok(())
    }

    async fn remove_subscriber(&self, subscriber: &SubscriberId) -> AppResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("lock poisoned".into()))?;
        let removed: Vec<String> = inner
            .watches
            .iter()
            .filter(|w| &w.subscriber == subscriber)
            .map(|w| w.id.clone())
            .collect();
        inner.watches.retain(|w| &w.subscriber != subscriber);
        inner.states.retain(|(wid, _), _| !removed.contains(wid));
        Ok(())
    }
}
