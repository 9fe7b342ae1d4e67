//! In-process delayed event bus.
//!
//! [`ChannelEventPublisher`] hands each event to a tokio task that waits out
//! the delay and then sends it to the paired receiver.
//!
//! A closed receiver is rejected at publish time. Once an event is
//! scheduled, delivery is best-effort: if the receiver goes away during the
//! delay the event is lost, logged, and counted in
//! [`ChannelEventPublisher::dropped`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use evalorch_state::DownstreamEvent;
use tokio::sync::mpsc;
use tracing::debug;

use crate::collaborators::EventPublisher;
use crate::obs;

#[derive(Debug, Clone)]
pub struct ChannelEventPublisher {
    tx: mpsc::UnboundedSender<DownstreamEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelEventPublisher {
    /// Create a publisher and the receiver its events are delivered to.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownstreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let publisher = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (publisher, rx)
    }

    /// Scheduled events that could not be delivered.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for ChannelEventPublisher {
    async fn publish_delayed(&self, event: &DownstreamEvent, delay: Duration) -> anyhow::Result<()> {
        if self.tx.is_closed() {
            return Err(anyhow!("event receiver dropped"));
        }

        let tx = self.tx.clone();
        let dropped = Arc::clone(&self.dropped);
        let event = event.clone();
        debug!(expt_run_id = event.expt_run_id, delay_ms = delay.as_millis() as u64, "scheduling event");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(mpsc::error::SendError(event)) = tx.send(event) {
                dropped.fetch_add(1, Ordering::SeqCst);
                obs::emit_event_dropped(event.expt_run_id, event.eval_set_item_id);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_event_arrives_after_delay() {
        let (publisher, mut rx) = ChannelEventPublisher::channel();
        let event = DownstreamEvent {
            expt_run_id: 4,
            ..Default::default()
        };

        let start = tokio::time::Instant::now();
        publisher
            .publish_delayed(&event, Duration::from_secs(3))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());

        let got = rx.recv().await.unwrap();
        assert_eq!(got, event);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_publish_after_receiver_dropped_fails() {
        let (publisher, rx) = ChannelEventPublisher::channel();
        drop(rx);
        let err = publisher
            .publish_delayed(&DownstreamEvent::default(), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("receiver dropped"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receiver_dropped_during_delay_is_counted() {
        let (publisher, rx) = ChannelEventPublisher::channel();
        publisher
            .publish_delayed(&DownstreamEvent::default(), Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(publisher.dropped(), 0);

        drop(rx);
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(publisher.dropped(), 1);
    }
}
