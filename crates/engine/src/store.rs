//! In-process subscription store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::provider::SubscriptionStore;
use common::{Error, Result, Subscription, SubscriptionId};
use tokio::sync::RwLock;

/// Subscriptions held in memory, keyed by id.
pub struct InMemorySubscriptionStore {
    records: RwLock<BTreeMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
}

impl InMemorySubscriptionStore {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        let next = subscriptions.iter().map(|s| s.id.0).max().unwrap_or(0) + 1;
        let records = subscriptions.into_iter().map(|s| (s.id, s)).collect();
        Self {
            records: RwLock::new(records),
            next_id: AtomicU64::new(next),
        }
    }

    /// Register a new active subscription and return it.
    pub async fn subscribe(&self, subscriber: &str, place: &str, threshold: f64) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let sub = Subscription {
            id,
            subscriber: subscriber.to_string(),
            place: place.to_string(),
            active: true,
            threshold,
            last_alert_sent: None,
        };
        self.records.write().await.insert(id, sub.clone());
        sub
    }

    pub async fn deactivate(&self, id: SubscriptionId) -> Result<()> {
        let mut records = self.records.write().await;
        let sub = records
            .get_mut(&id)
            .ok_or_else(|| Error::Other(format!("unknown subscription {}", id)))?;
        sub.active = false;
        Ok(())
    }

    pub async fn get(&self, id: SubscriptionId) -> Option<Subscription> {
        self.records.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn active_for_place(&self, place_name: &str) -> Result<Vec<Subscription>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|s| s.active && s.place.eq_ignore_ascii_case(place_name))
            .cloned()
            .collect())
    }

    async fn record_alert_sent(&self, id: SubscriptionId, at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.write().await;
        let sub = records
            .get_mut(&id)
            .ok_or_else(|| Error::Other(format!("unknown subscription {}", id)))?;
        sub.last_alert_sent = Some(at);
        Ok(())
    }
}
