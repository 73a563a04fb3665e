use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{DeliveryError, Observer};
use crate::types::NotificationEvent;

/// Observer backed by a bounded channel; the receiving half belongs to a
/// client connection. A full channel applies backpressure up to the fanout
/// timeout, a dropped receiver is a failed delivery.
pub struct ChannelObserver {
    tx: mpsc::Sender<NotificationEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<NotificationEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiver it feeds
    pub fn pair(buffer: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Observer for ChannelObserver {
    async fn send(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}
