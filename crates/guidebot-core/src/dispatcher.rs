//! Delivery dispatcher: drains the outbox into the messaging channel.

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{messaging::port::MessagingPort, outbox::NotificationQueue, Result};

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    /// Rows another sweep marked sent between our read and our mark.
    pub skipped: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.delivered == 0 && self.failed == 0 && self.skipped == 0
    }
}

#[derive(Clone)]
pub struct DeliveryDispatcher {
    queue: Arc<dyn NotificationQueue>,
    messenger: Arc<dyn MessagingPort>,
    sweep: Arc<Mutex<()>>,
}

impl DeliveryDispatcher {
    pub fn new(queue: Arc<dyn NotificationQueue>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            queue,
            messenger,
            sweep: Arc::new(Mutex::new(())),
        }
    }

    /// One delivery attempt per pending notification.
    ///
    /// A failed send leaves the row pending for the next sweep and does not
    /// stop the rest. If another sweep is already running this returns an
    /// empty report right away, so overlapping sweeps never send a row twice.
    pub async fn flush(&self) -> Result<FlushReport> {
        let Ok(_guard) = self.sweep.try_lock() else {
            tracing::debug!("dispatcher sweep already running, skipping");
            return Ok(FlushReport::default());
        };

        let pending = self.queue.drain_pending()?;
        let mut report = FlushReport::default();

        for n in pending {
            match self.messenger.send_html(n.recipient.chat(), &n.body).await {
                Ok(_) => match self.queue.mark_sent(n.id) {
                    Ok(true) => report.delivered += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        // Delivered but still flagged pending; the next sweep will resend.
                        tracing::error!(notification = %n.id, error = %e, "failed to mark notification sent");
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        notification = %n.id,
                        recipient = %n.recipient,
                        error = %e,
                        "notification delivery failed, will retry"
                    );
                    report.failed += 1;
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                delivered = report.delivered,
                failed = report.failed,
                skipped = report.skipped,
                "dispatcher sweep finished"
            );
        }
        Ok(report)
    }

    /// Run `flush` every `interval` until `cancel` fires.
    pub fn start(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                  _ = cancel.cancelled() => break,
                  _ = tick.tick() => {
                    if let Err(e) = dispatcher.flush().await {
                      tracing::error!(error = %e, "dispatcher sweep failed");
                    }
                  }
                }
            }
            tracing::info!("dispatcher stopped");
        })
    }
}
