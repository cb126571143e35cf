use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::{
    domain::UserId,
    entities::TravelRequest,
    store::{decode_ts, encode_ts},
    Result,
};

pub fn insert(
    conn: &Connection,
    user: UserId,
    city: &str,
    keywords: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO requests (user_id, city, keywords, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user.0, city, keywords, encode_ts(now)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest first.
pub fn all(conn: &Connection) -> Result<Vec<TravelRequest>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, city, keywords, created_at FROM requests ORDER BY id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, user_id, city, keywords, created_at) = row?;
        out.push(TravelRequest {
            id,
            user_id: UserId(user_id),
            city,
            keywords,
            created_at: decode_ts("requests", &created_at)?,
        });
    }
    Ok(out)
}
