//! Durable notification outbox.
//!
//! Workflows never talk to the messaging channel directly: they append a row
//! here (usually in the same transaction as their own write) and the
//! [`DeliveryDispatcher`](crate::dispatcher::DeliveryDispatcher) delivers it later.

use chrono::Utc;

use crate::{
    domain::{NotificationId, UserId},
    entities::Notification,
    store::{notifications, Store},
    Result,
};

pub trait NotificationQueue: Send + Sync {
    fn enqueue(&self, recipient: UserId, body: &str) -> Result<NotificationId>;

    /// Every unsent notification in row-id order.
    fn drain_pending(&self) -> Result<Vec<Notification>>;

    /// Flip a notification to sent. Returns `false` when it already was.
    fn mark_sent(&self, id: NotificationId) -> Result<bool>;
}

impl NotificationQueue for Store {
    fn enqueue(&self, recipient: UserId, body: &str) -> Result<NotificationId> {
        let conn = self.conn()?;
        notifications::insert(&conn, recipient, body, Utc::now())
    }

    fn drain_pending(&self) -> Result<Vec<Notification>> {
        let conn = self.conn()?;
        notifications::pending(&conn)
    }

    fn mark_sent(&self, id: NotificationId) -> Result<bool> {
        let conn = self.conn()?;
        notifications::mark_sent(&conn, id)
    }
}
