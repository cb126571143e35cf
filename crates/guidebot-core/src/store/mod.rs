//! SQLite persistence (rusqlite + r2d2).
//!
//! Each table module exposes free functions over `&Connection`, so the same
//! calls work on a pooled connection and inside a transaction. Callers take
//! a connection per request and release it right after.

use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, TransactionBehavior};

use crate::{errors::Error, Result};

pub mod bookings;
pub mod excursions;
pub mod guides;
pub mod notifications;
pub mod requests;
pub mod reviews;
pub mod stats;
pub mod subscribers;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS guides (
    user_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    city TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    experience INTEGER NOT NULL DEFAULT 0,
    is_approved INTEGER NOT NULL DEFAULT 0,
    rating REAL NOT NULL DEFAULT 0.0,
    review_count INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS excursions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guide_id INTEGER NOT NULL REFERENCES guides(user_id),
    title TEXT NOT NULL,
    city TEXT NOT NULL,
    theme TEXT NOT NULL,
    description TEXT NOT NULL,
    price INTEGER NOT NULL,
    dates TEXT NOT NULL,
    keywords TEXT NOT NULL DEFAULT '',
    start_location_lat REAL,
    start_location_lon REAL,
    is_approved INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS bookings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    excursion_id INTEGER NOT NULL REFERENCES excursions(id),
    created_at TEXT NOT NULL,
    status TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    guide_id INTEGER NOT NULL REFERENCES guides(user_id),
    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    comment TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    city TEXT NOT NULL,
    keywords TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS subscribers (
    user_id INTEGER PRIMARY KEY,
    guide_id INTEGER,
    city TEXT,
    keywords TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    message TEXT NOT NULL,
    is_sent INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notifications_pending ON notifications(is_sent, id);
CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings(user_id);
";

/// Shared handle to the database. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    /// Open (or create) the database file and make sure every table exists.
    pub fn open(database_path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(database_path).with_init(init_connection);
        let pool = Pool::builder().max_size(8).build(manager)?;
        Self::from_pool(pool)
    }

    /// Private in-memory database. The pool is capped at one connection so
    /// every caller sees the same data.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: DbPool) -> Result<Self> {
        let conn = pool.get()?;
        conn.execute_batch(SCHEMA)?;
        drop(conn);
        Ok(Self { pool })
    }

    pub fn conn(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside one transaction; commits on `Ok`, rolls back on `Err`.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`): workflows read
    /// then write, and two deferred transactions upgrading at once fail with
    /// `SQLITE_BUSY` without ever waiting on the busy timeout.
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn init_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}

pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn decode_ts(table: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::CorruptRow {
            table,
            reason: format!("bad timestamp {raw:?}: {e}"),
        })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::{
        domain::{ExcursionId, UserId},
        entities::{NewExcursion, NewGuide, DATE_FORMAT},
    };
    use chrono::NaiveDateTime;

    pub fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    pub fn add_guide(store: &Store, id: i64, approved: bool) {
        let conn = store.conn().unwrap();
        guides::insert(
            &conn,
            &NewGuide {
                id: UserId(id),
                name: format!("Guide {id}"),
                city: "Kazan".to_string(),
                description: String::new(),
                experience: 5,
            },
        )
        .unwrap();
        if approved {
            guides::approve(&conn, UserId(id)).unwrap();
        }
    }

    pub fn new_excursion(guide: i64) -> NewExcursion {
        NewExcursion {
            guide_id: UserId(guide),
            title: "Old town walk".to_string(),
            city: "Kazan".to_string(),
            theme: "history".to_string(),
            description: "Kremlin and around".to_string(),
            price: 1500,
            dates: vec![
                NaiveDateTime::parse_from_str("2099-06-01 10:00", DATE_FORMAT).unwrap(),
                NaiveDateTime::parse_from_str("2099-05-01 09:30", DATE_FORMAT).unwrap(),
            ],
            keywords: vec!["history".to_string(), "architecture".to_string()],
            start: None,
        }
    }

    pub fn add_excursion(store: &Store, guide: i64, approved: bool) -> ExcursionId {
        let conn = store.conn().unwrap();
        let id = excursions::insert(&conn, &new_excursion(guide)).unwrap();
        if approved {
            excursions::approve(&conn, id).unwrap();
        }
        id
    }
}
