use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::NotificationFanout;
use crate::health::EquipmentHealthRegistry;
use crate::types::NotificationEvent;

/// Periodically broadcast a `status_update` with every unit's status.
///
/// Runs until `cancel` fires. Returns the number of updates sent.
pub async fn run_status_broadcaster(
    health: Arc<EquipmentHealthRegistry>,
    fanout: Arc<NotificationFanout>,
    interval: Duration,
    cancel: CancellationToken,
) -> u64 {
    info!("[StatusBroadcaster] Task starting with interval {:?}", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[StatusBroadcaster] Received shutdown signal after {} updates", sent);
                return sent;
            }
            _ = ticker.tick() => {
                if fanout.is_empty() {
                    continue;
                }
                let event = NotificationEvent::StatusUpdate {
                    data: health.snapshot(),
                    timestamp: Utc::now(),
                };
                let report = fanout.broadcast(&event).await;
                sent += 1;
                debug!(
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "[StatusBroadcaster] Status update sent"
                );
            }
        }
    }
}
