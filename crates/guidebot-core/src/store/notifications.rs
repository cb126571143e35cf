use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::{
    domain::{NotificationId, UserId},
    entities::Notification,
    store::{decode_ts, encode_ts},
    Result,
};

pub fn insert(
    conn: &Connection,
    recipient: UserId,
    body: &str,
    now: DateTime<Utc>,
) -> Result<NotificationId> {
    conn.execute(
        "INSERT INTO notifications (user_id, message, is_sent, created_at) VALUES (?1, ?2, 0, ?3)",
        params![recipient.0, body, encode_ts(now)],
    )?;
    Ok(NotificationId(conn.last_insert_rowid()))
}

/// All unsent rows, oldest first.
pub fn pending(conn: &Connection) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, message, is_sent, created_at FROM notifications WHERE is_sent = 0 ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, user_id, body, sent, created_at) = row?;
        out.push(Notification {
            id: NotificationId(id),
            recipient: UserId(user_id),
            body,
            sent,
            created_at: decode_ts("notifications", &created_at)?,
        });
    }
    Ok(out)
}

/// Flip unsent -> sent. Returns `false` if the row was already sent (or
/// does not exist), so a concurrent sweep can tell it lost the race.
pub fn mark_sent(conn: &Connection, id: NotificationId) -> Result<bool> {
    let n = conn.execute(
        "UPDATE notifications SET is_sent = 1 WHERE id = ?1 AND is_sent = 0",
        [id.0],
    )?;
    Ok(n > 0)
}
