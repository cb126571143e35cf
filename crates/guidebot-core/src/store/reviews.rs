use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::{
    domain::UserId,
    entities::Rating,
    store::{encode_ts, guides},
    Result,
};

/// Insert a review and refresh the guide's aggregate rating.
///
/// Call inside a transaction (`Store::transaction`) so the aggregate never
/// drifts from the reviews table.
pub fn insert(
    conn: &Connection,
    user: UserId,
    guide: UserId,
    rating: Rating,
    comment: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO reviews (user_id, guide_id, rating, comment, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user.0, guide.0, rating.get(), comment, encode_ts(now)],
    )?;
    let id = conn.last_insert_rowid();
    guides::refresh_rating(conn, guide)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support;

    #[test]
    fn reviews_update_guide_rating() {
        let store = test_support::store();
        test_support::add_guide(&store, 3, true);

        for (user, stars) in [(10, 5), (11, 4)] {
            store
                .transaction(|tx| {
                    insert(
                        tx,
                        UserId(user),
                        UserId(3),
                        Rating::new(stars).unwrap(),
                        "nice",
                        Utc::now(),
                    )
                })
                .unwrap();
        }

        let conn = store.conn().unwrap();
        let g = guides::get(&conn, UserId(3)).unwrap().unwrap();
        assert_eq!(g.review_count, 2);
        assert!((g.rating - 4.5).abs() < f64::EPSILON);
        let stored: i64 = conn
            .query_row("SELECT COUNT(*) FROM reviews WHERE guide_id = 3", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, 2);
    }
}
