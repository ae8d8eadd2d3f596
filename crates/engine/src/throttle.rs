//! Alert throttling.
//!
//! Decides, per subscription, whether the current AQI warrants an alert and
//! whether the subscriber was alerted too recently. Send decisions stamp
//! `last_alert_sent` before the notifier is called; a failed delivery still
//! counts against the window.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::{ThrottleConfig, MAX_WINDOW_SECS};
use common::provider::{Notifier, SubscriptionStore};
use common::{
    AqiScore, DecisionReason, Delivery, DispatchDecision, Place, PollutantSample, SeverityTier,
    Subscription, SubscriptionId,
};
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Minimum gap between two alerts, per severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleWindows {
    pub hazardous: chrono::Duration,
    pub very_unhealthy: chrono::Duration,
    pub unhealthy: chrono::Duration,
}

impl ThrottleWindows {
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self {
            hazardous: secs(config.hazardous_window_secs),
            very_unhealthy: secs(config.very_unhealthy_window_secs),
            unhealthy: secs(config.unhealthy_window_secs),
        }
    }

    pub fn for_tier(&self, tier: SeverityTier) -> chrono::Duration {
        match tier {
            SeverityTier::Hazardous => self.hazardous,
            SeverityTier::VeryUnhealthy => self.very_unhealthy,
            SeverityTier::Unhealthy => self.unhealthy,
        }
    }
}

/// Windows longer than `MAX_WINDOW_SECS` are clamped to it.
fn secs(value: u64) -> chrono::Duration {
    let clamped = i64::try_from(value.min(MAX_WINDOW_SECS)).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(clamped).unwrap_or(chrono::Duration::MAX)
}

pub struct AlertThrottleEngine {
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn SubscriptionStore>,
    windows: ThrottleWindows,
    notifier_timeout: Duration,
    /// Last send per subscription as seen by this engine, one lock per id.
    ledger: DashMap<SubscriptionId, Arc<Mutex<Option<DateTime<Utc>>>>>,
}

impl AlertThrottleEngine {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn SubscriptionStore>,
        config: &ThrottleConfig,
    ) -> Self {
        Self {
            notifier,
            store,
            windows: ThrottleWindows::from_config(config),
            notifier_timeout: Duration::from_millis(config.notifier_timeout_ms),
            ledger: DashMap::new(),
        }
    }

    pub fn windows(&self) -> ThrottleWindows {
        self.windows
    }

    pub async fn evaluate(
        &self,
        place: &Place,
        score: &AqiScore,
        sample: &PollutantSample,
        subscriptions: &mut [Subscription],
    ) -> Vec<DispatchDecision> {
        self.evaluate_at(Utc::now(), place, score, sample, subscriptions)
            .await
    }

    /// Evaluate every active subscription for `place` as of `now`.
    ///
    /// Subscriptions that are inactive or target another place produce no
    /// decision. Each subscription is dispatched at most once per call, even
    /// when it appears more than once in the batch.
    pub async fn evaluate_at(
        &self,
        now: DateTime<Utc>,
        place: &Place,
        score: &AqiScore,
        sample: &PollutantSample,
        subscriptions: &mut [Subscription],
    ) -> Vec<DispatchDecision> {
        let tier = SeverityTier::from_aqi(score.value);
        let mut decisions = Vec::with_capacity(subscriptions.len());
        let mut sent: HashSet<SubscriptionId> = HashSet::new();
        let mut outbox: Vec<(usize, String)> = Vec::new();

        for sub in subscriptions.iter_mut() {
            if !sub.active || !sub.targets(place) {
                continue;
            }

            let reason = self.decide(now, score.value, tier, sub, &sent).await;
            let should_send = matches!(
                reason,
                DecisionReason::FirstAlert | DecisionReason::WindowElapsed { .. }
            );

            if should_send {
                sent.insert(sub.id);
                sub.last_alert_sent = Some(now);
                if let Err(e) = self.store.record_alert_sent(sub.id, now).await {
                    warn!("{}: failed to persist alert timestamp: {}", sub.id, e);
                }
                outbox.push((decisions.len(), sub.subscriber.clone()));
            } else {
                if sent.contains(&sub.id) {
                    // Later copies of a subscription sent earlier in this batch.
                    sub.last_alert_sent = Some(now);
                }
                debug!("{} ({}): no alert, {:?}", sub.id, sub.subscriber, reason);
            }

            decisions.push(DispatchDecision {
                subscription_id: sub.id,
                subscriber: sub.subscriber.clone(),
                tier,
                should_send,
                reason,
                delivery: None,
            });
        }

        let deliveries = join_all(
            outbox
                .iter()
                .map(|(_, subscriber)| self.deliver(subscriber, place, score, sample)),
        )
        .await;
        for ((idx, _), delivery) in outbox.into_iter().zip(deliveries) {
            decisions[idx].delivery = Some(delivery);
        }

        decisions
    }

    async fn decide(
        &self,
        now: DateTime<Utc>,
        aqi: f64,
        tier: Option<SeverityTier>,
        sub: &Subscription,
        sent: &HashSet<SubscriptionId>,
    ) -> DecisionReason {
        if aqi < sub.threshold {
            return DecisionReason::ThresholdNotMet {
                threshold: sub.threshold,
            };
        }
        let Some(tier) = tier else {
            return DecisionReason::BelowAlertFloor;
        };
        let window = self.windows.for_tier(tier);
        if sent.contains(&sub.id) {
            return DecisionReason::Throttled {
                remaining_secs: window.num_seconds(),
            };
        }

        let slot = Arc::clone(&self.ledger.entry(sub.id).or_default());
        let mut last = slot.lock().await;

        let previous = match (*last, sub.last_alert_sent) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let reason = match previous {
            None => DecisionReason::FirstAlert,
            Some(prev) => {
                let elapsed = now - prev;
                if elapsed >= window {
                    DecisionReason::WindowElapsed {
                        elapsed_secs: elapsed.num_seconds(),
                    }
                } else {
                    DecisionReason::Throttled {
                        remaining_secs: (window - elapsed).num_seconds(),
                    }
                }
            }
        };

        if matches!(
            reason,
            DecisionReason::FirstAlert | DecisionReason::WindowElapsed { .. }
        ) {
            *last = Some(now);
        }
        reason
    }

    async fn deliver(
        &self,
        subscriber: &str,
        place: &Place,
        score: &AqiScore,
        sample: &PollutantSample,
    ) -> Delivery {
        match timeout(
            self.notifier_timeout,
            self.notifier.send(subscriber, &place.name, score, sample),
        )
        .await
        {
            Ok(Ok(())) => {
                info!(
                    "🚨 Alert sent to {} for {} (AQI {})",
                    subscriber,
                    place.name,
                    score.rounded()
                );
                Delivery::Delivered
            }
            Ok(Err(e)) => {
                warn!("Alert to {} for {} failed: {}", subscriber, place.name, e);
                Delivery::Failed {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!(
                    "Alert to {} for {} timed out after {:?}",
                    subscriber, place.name, self.notifier_timeout
                );
                Delivery::Failed {
                    reason: format!("timed out after {}ms", self.notifier_timeout.as_millis()),
                }
            }
        }
    }
}
