use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    domain::UserId,
    entities::{Guide, NewGuide},
    Result,
};

const COLUMNS: &str =
    "user_id, name, city, description, experience, is_approved, rating, review_count";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Guide> {
    Ok(Guide {
        id: UserId(row.get(0)?),
        name: row.get(1)?,
        city: row.get(2)?,
        description: row.get(3)?,
        experience: row.get(4)?,
        approved: row.get(5)?,
        rating: row.get(6)?,
        review_count: row.get(7)?,
    })
}

/// Inserts an unapproved guide. Fails with a constraint error if the user
/// is already registered.
pub fn insert(conn: &Connection, guide: &NewGuide) -> Result<()> {
    conn.execute(
        "INSERT INTO guides (user_id, name, city, description, experience) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            guide.id.0,
            guide.name,
            guide.city,
            guide.description,
            guide.experience
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: UserId) -> Result<Option<Guide>> {
    let sql = format!("SELECT {COLUMNS} FROM guides WHERE user_id = ?1");
    Ok(conn.query_row(&sql, [id.0], from_row).optional()?)
}

pub fn all(conn: &Connection) -> Result<Vec<Guide>> {
    list(conn, &format!("SELECT {COLUMNS} FROM guides ORDER BY user_id"))
}

pub fn pending(conn: &Connection) -> Result<Vec<Guide>> {
    list(
        conn,
        &format!("SELECT {COLUMNS} FROM guides WHERE is_approved = 0 ORDER BY user_id"),
    )
}

/// Returns `false` when no such guide exists.
pub fn approve(conn: &Connection, id: UserId) -> Result<bool> {
    let n = conn.execute(
        "UPDATE guides SET is_approved = 1 WHERE user_id = ?1",
        [id.0],
    )?;
    Ok(n > 0)
}

/// Recompute rating and review count from the reviews table.
pub(crate) fn refresh_rating(conn: &Connection, id: UserId) -> Result<()> {
    conn.execute(
        "UPDATE guides SET
            rating = COALESCE((SELECT AVG(rating) FROM reviews WHERE guide_id = ?1), 0.0),
            review_count = (SELECT COUNT(*) FROM reviews WHERE guide_id = ?1)
         WHERE user_id = ?1",
        [id.0],
    )?;
    Ok(())
}

fn list(conn: &Connection, sql: &str) -> Result<Vec<Guide>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support;

    #[test]
    fn registered_guide_starts_unapproved() {
        let store = test_support::store();
        test_support::add_guide(&store, 3, false);
        let conn = store.conn().unwrap();

        let g = get(&conn, UserId(3)).unwrap().unwrap();
        assert!(!g.approved);
        assert_eq!(g.review_count, 0);
        assert_eq!(pending(&conn).unwrap().len(), 1);

        assert!(approve(&conn, UserId(3)).unwrap());
        assert!(get(&conn, UserId(3)).unwrap().unwrap().approved);
        assert!(pending(&conn).unwrap().is_empty());
    }

    #[test]
    fn approve_unknown_guide_reports_false() {
        let store = test_support::store();
        let conn = store.conn().unwrap();
        assert!(!approve(&conn, UserId(42)).unwrap());
        assert!(get(&conn, UserId(42)).unwrap().is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let store = test_support::store();
        test_support::add_guide(&store, 3, false);
        let conn = store.conn().unwrap();
        let again = NewGuide {
            id: UserId(3),
            name: "Again".to_string(),
            city: String::new(),
            description: String::new(),
            experience: 1,
        };
        assert!(insert(&conn, &again).is_err());
        assert_eq!(all(&conn).unwrap().len(), 1);
    }
}
