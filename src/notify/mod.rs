//! Notification fan-out
//!
//! Observers (one per connected dashboard client, plus anything tests
//! register) receive every `NotificationEvent` in broadcast order. Each
//! delivery is bounded by a timeout; an observer whose delivery fails or
//! times out is unregistered during that same broadcast, and the rest still
//! receive the event.
//!
//! The registry lock is never held across an await: `broadcast` snapshots
//! the observer list, delivers concurrently, then prunes.

mod channel;
mod status;

pub use channel::ChannelObserver;
pub use status::run_status_broadcaster;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NotificationConfig;
use crate::types::NotificationEvent;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("observer channel closed")]
    Closed,

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("delivery failed: {0}")]
    Other(String),
}

/// A subscriber to pipeline notifications
#[async_trait]
pub trait Observer: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObserverId(u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

type ObserverMap = HashMap<ObserverId, Arc<dyn Observer>>;

pub struct NotificationFanout {
    observers: RwLock<ObserverMap>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl NotificationFanout {
    pub fn new(config: &NotificationConfig) -> Self {
        Self::with_timeout(Duration::from_millis(config.delivery_timeout_ms))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ObserverMap> {
        self.observers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObserverMap> {
        self.observers.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write().insert(id, observer);
        debug!(observer = %id, "Observer registered");
        id
    }

    /// Returns whether `id` was registered
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.write().remove(&id).is_some();
        if removed {
            debug!(observer = %id, "Observer unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Deliver `event` to every registered observer.
    pub async fn broadcast(&self, event: &NotificationEvent) -> BroadcastReport {
        let snapshot: Vec<(ObserverId, Arc<dyn Observer>)> = self
            .read()
            .iter()
            .map(|(id, obs)| (*id, Arc::clone(obs)))
            .collect();
        if snapshot.is_empty() {
            return BroadcastReport::default();
        }

        let timeout = self.timeout;
        let deliveries = snapshot.iter().map(|(id, observer)| async move {
            let result = match tokio::time::timeout(timeout, observer.send(event)).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(timeout)),
            };
            (*id, result)
        });
        let results = join_all(deliveries).await;

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(observer = %id, event = event.kind(), error = %e, "Dropping observer");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut observers = self.write();
            for id in &failed {
                observers.remove(id);
            }
            report.dropped = failed.len();
        }
        report
    }
}

impl Default for NotificationFanout {
    fn default() -> Self {
        Self::new(&NotificationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EquipmentStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<NotificationEvent>>,
    }

    #[async_trait]
    impl Observer for Recording {
        async fn send(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Observer for Failing {
        async fn send(&self, _event: &NotificationEvent) -> Result<(), DeliveryError> {
            Err(DeliveryError::Other("socket reset".into()))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Observer for Stalled {
        async fn send(&self, _event: &NotificationEvent) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn alert_event() -> NotificationEvent {
        NotificationEvent::Alert {
            equipment_id: 1,
            status: EquipmentStatus::Critical,
            confidence: 91.0,
        }
    }

    #[tokio::test]
    async fn test_failing_observer_is_pruned_others_delivered() {
        let fanout = NotificationFanout::default();
        let first = Arc::new(Recording::default());
        let third = Arc::new(Recording::default());
        fanout.register(first.clone());
        fanout.register(Arc::new(Failing));
        fanout.register(third.clone());
        assert_eq!(fanout.len(), 3);

        let report = fanout.broadcast(&alert_event()).await;
        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 1 });
        assert_eq!(fanout.len(), 2);
        assert_eq!(first.seen.lock().unwrap().len(), 1);
        assert_eq!(third.seen.lock().unwrap().len(), 1);

        let report = fanout.broadcast(&alert_event()).await;
        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_observer_times_out() {
        let fanout = NotificationFanout::with_timeout(Duration::from_millis(50));
        let healthy = Arc::new(Recording::default());
        fanout.register(healthy.clone());
        fanout.register(Arc::new(Stalled));

        let report = fanout.broadcast(&alert_event()).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(fanout.len(), 1);
        assert_eq!(healthy.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_and_empty_broadcast() {
        let fanout = NotificationFanout::default();
        let id = fanout.register(Arc::new(Recording::default()));
        assert!(fanout.unregister(id));
        assert!(!fanout.unregister(id));
        assert!(fanout.is_empty());
        assert_eq!(fanout.broadcast(&alert_event()).await, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_events_arrive_in_broadcast_order() {
        let fanout = NotificationFanout::default();
        let obs = Arc::new(Recording::default());
        fanout.register(obs.clone());
        fanout.broadcast(&alert_event()).await;
        fanout
            .broadcast(&NotificationEvent::StatusUpdate {
                data: Vec::new(),
                timestamp: chrono::Utc::now(),
            })
            .await;
        let kinds: Vec<_> = obs.seen.lock().unwrap().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["alert", "status_update"]);
    }
}
