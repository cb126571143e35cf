use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    domain::{ExcursionId, UserId},
    entities::{Coordinates, Excursion, NewExcursion, DATE_FORMAT},
    errors::Error,
    Result,
};

const COLUMNS: &str = "id, guide_id, title, city, theme, description, price, dates, keywords, \
                       start_location_lat, start_location_lon, is_approved";

struct RawExcursion {
    id: i64,
    guide_id: i64,
    title: String,
    city: String,
    theme: String,
    description: String,
    price: i64,
    dates: String,
    keywords: String,
    lat: Option<f64>,
    lon: Option<f64>,
    approved: bool,
}

impl RawExcursion {
    fn decode(self) -> Result<Excursion> {
        let dates = decode_dates(&self.dates)?;
        let keywords = self
            .keywords
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let start = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
            _ => None,
        };
        Ok(Excursion {
            id: ExcursionId(self.id),
            guide_id: UserId(self.guide_id),
            title: self.title,
            city: self.city,
            theme: self.theme,
            description: self.description,
            price: self.price,
            dates,
            keywords,
            start,
            approved: self.approved,
        })
    }
}

fn encode_dates(dates: &[NaiveDateTime]) -> String {
    dates
        .iter()
        .map(|d| d.format(DATE_FORMAT).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_dates(raw: &str) -> Result<Vec<NaiveDateTime>> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDateTime::parse_from_str(s, DATE_FORMAT).map_err(|e| Error::CorruptRow {
                table: "excursions",
                reason: format!("bad date {s:?}: {e}"),
            })
        })
        .collect()
}

pub fn insert(conn: &Connection, e: &NewExcursion) -> Result<ExcursionId> {
    conn.execute(
        "INSERT INTO excursions (guide_id, title, city, theme, description, price, dates, keywords, start_location_lat, start_location_lon)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            e.guide_id.0,
            e.title,
            e.city,
            e.theme,
            e.description,
            e.price,
            encode_dates(&e.dates),
            e.keywords.join(","),
            e.start.map(|c| c.lat),
            e.start.map(|c| c.lon),
        ],
    )?;
    Ok(ExcursionId(conn.last_insert_rowid()))
}

/// Any excursion, approved or not.
pub fn get(conn: &Connection, id: ExcursionId) -> Result<Option<Excursion>> {
    let sql = format!("SELECT {COLUMNS} FROM excursions WHERE id = ?1");
    let raw = conn
        .query_row(&sql, [id.0], read_raw)
        .optional()?;
    raw.map(RawExcursion::decode).transpose()
}

/// Only excursions travelers may see.
pub fn approved(conn: &Connection) -> Result<Vec<Excursion>> {
    list(
        conn,
        &format!("SELECT {COLUMNS} FROM excursions WHERE is_approved = 1 ORDER BY id"),
        params![],
    )
}

pub fn pending(conn: &Connection) -> Result<Vec<Excursion>> {
    list(
        conn,
        &format!("SELECT {COLUMNS} FROM excursions WHERE is_approved = 0 ORDER BY id"),
        params![],
    )
}

/// All excursions of a guide, including ones still awaiting moderation.
pub fn by_guide(conn: &Connection, guide: UserId) -> Result<Vec<Excursion>> {
    list(
        conn,
        &format!("SELECT {COLUMNS} FROM excursions WHERE guide_id = ?1 ORDER BY id"),
        [guide.0],
    )
}

/// Returns `false` when no such excursion exists.
pub fn approve(conn: &Connection, id: ExcursionId) -> Result<bool> {
    let n = conn.execute("UPDATE excursions SET is_approved = 1 WHERE id = ?1", [id.0])?;
    Ok(n > 0)
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawExcursion> {
    Ok(RawExcursion {
        id: row.get(0)?,
        guide_id: row.get(1)?,
        title: row.get(2)?,
        city: row.get(3)?,
        theme: row.get(4)?,
        description: row.get(5)?,
        price: row.get(6)?,
        dates: row.get(7)?,
        keywords: row.get(8)?,
        lat: row.get(9)?,
        lon: row.get(10)?,
        approved: row.get(11)?,
    })
}

fn list<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Excursion>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, read_raw)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.decode()?);
    }
    Ok(out)
}
