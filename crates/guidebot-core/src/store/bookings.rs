use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    domain::{BookingId, ExcursionId, UserId},
    entities::{Booking, BookingStatus},
    errors::Error,
    store::{decode_ts, encode_ts},
    Result,
};

const COLUMNS: &str = "id, user_id, excursion_id, created_at, status";

type RawBooking = (i64, i64, i64, String, String);

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawBooking> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode((id, user_id, excursion_id, created_at, status): RawBooking) -> Result<Booking> {
    let status = BookingStatus::parse(&status).ok_or_else(|| Error::CorruptRow {
        table: "bookings",
        reason: format!("unknown status {status:?}"),
    })?;
    Ok(Booking {
        id: BookingId(id),
        user_id: UserId(user_id),
        excursion_id: ExcursionId(excursion_id),
        created_at: decode_ts("bookings", &created_at)?,
        status,
    })
}

pub fn insert(
    conn: &Connection,
    user: UserId,
    excursion: ExcursionId,
    now: DateTime<Utc>,
) -> Result<BookingId> {
    conn.execute(
        "INSERT INTO bookings (user_id, excursion_id, created_at, status) VALUES (?1, ?2, ?3, ?4)",
        params![
            user.0,
            excursion.0,
            encode_ts(now),
            BookingStatus::Confirmed.as_str()
        ],
    )?;
    Ok(BookingId(conn.last_insert_rowid()))
}

pub fn get(conn: &Connection, id: BookingId) -> Result<Option<Booking>> {
    let sql = format!("SELECT {COLUMNS} FROM bookings WHERE id = ?1");
    let raw = conn.query_row(&sql, [id.0], read_raw).optional()?;
    raw.map(decode).transpose()
}

/// Newest first.
pub fn by_user(conn: &Connection, user: UserId) -> Result<Vec<Booking>> {
    list(
        conn,
        &format!("SELECT {COLUMNS} FROM bookings WHERE user_id = ?1 ORDER BY id DESC"),
        user.0,
    )
}

pub fn set_status(conn: &Connection, id: BookingId, status: BookingStatus) -> Result<()> {
    conn.execute(
        "UPDATE bookings SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id.0],
    )?;
    Ok(())
}

fn list(conn: &Connection, sql: &str, key: i64) -> Result<Vec<Booking>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([key], read_raw)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support;

    #[test]
    fn bookings_are_listed_newest_first() {
        let store = test_support::store();
        test_support::add_guide(&store, 3, true);
        let exc = test_support::add_excursion(&store, 3, true);
        let conn = store.conn().unwrap();

        let first = insert(&conn, UserId(10), exc, Utc::now()).unwrap();
        let second = insert(&conn, UserId(10), exc, Utc::now()).unwrap();
        insert(&conn, UserId(11), exc, Utc::now()).unwrap();

        let mine: Vec<_> = by_user(&conn, UserId(10))
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(mine, vec![second, first]);
    }

    #[test]
    fn status_update_persists() {
        let store = test_support::store();
        test_support::add_guide(&store, 3, true);
        let exc = test_support::add_excursion(&store, 3, true);
        let conn = store.conn().unwrap();

        let id = insert(&conn, UserId(10), exc, Utc::now()).unwrap();
        assert_eq!(
            get(&conn, id).unwrap().unwrap().status,
            BookingStatus::Confirmed
        );
        set_status(&conn, id, BookingStatus::Cancelled).unwrap();
        assert_eq!(
            get(&conn, id).unwrap().unwrap().status,
            BookingStatus::Cancelled
        );
    }
}
