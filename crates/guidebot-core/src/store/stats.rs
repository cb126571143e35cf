use rusqlite::Connection;

use crate::{entities::Stats, Result};

pub fn collect(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

    Ok(Stats {
        guides_total: count("SELECT COUNT(*) FROM guides")?,
        guides_approved: count("SELECT COUNT(*) FROM guides WHERE is_approved = 1")?,
        guides_pending: count("SELECT COUNT(*) FROM guides WHERE is_approved = 0")?,
        excursions_total: count("SELECT COUNT(*) FROM excursions")?,
        excursions_approved: count("SELECT COUNT(*) FROM excursions WHERE is_approved = 1")?,
        excursions_pending: count("SELECT COUNT(*) FROM excursions WHERE is_approved = 0")?,
        travelers_total: count("SELECT COUNT(DISTINCT user_id) FROM bookings")?,
        requests_total: count("SELECT COUNT(*) FROM requests")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::UserId,
        store::{bookings, requests, test_support},
    };
    use chrono::Utc;

    #[test]
    fn counts_each_category() {
        let store = test_support::store();
        test_support::add_guide(&store, 3, true);
        test_support::add_guide(&store, 4, false);
        let exc = test_support::add_excursion(&store, 3, true);
        test_support::add_excursion(&store, 3, false);

        let conn = store.conn().unwrap();
        bookings::insert(&conn, UserId(10), exc, Utc::now()).unwrap();
        bookings::insert(&conn, UserId(10), exc, Utc::now()).unwrap();
        bookings::insert(&conn, UserId(11), exc, Utc::now()).unwrap();
        requests::insert(&conn, UserId(10), "Kazan", "food", Utc::now()).unwrap();

        let s = collect(&conn).unwrap();
        assert_eq!(
            s,
            Stats {
                guides_total: 2,
                guides_approved: 1,
                guides_pending: 1,
                excursions_total: 2,
                excursions_approved: 1,
                excursions_pending: 1,
                travelers_total: 2,
                requests_total: 1,
            }
        );
    }
}
