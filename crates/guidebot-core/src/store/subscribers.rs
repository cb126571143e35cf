use rusqlite::{params, Connection};

use crate::{
    domain::UserId,
    entities::{Subscriber, SubscriptionCriteria},
    errors::Error,
    Result,
};

/// Insert or replace the user's alert criteria.
pub fn upsert(conn: &Connection, subscriber: &Subscriber) -> Result<()> {
    let c = subscriber.criteria();
    conn.execute(
        "INSERT INTO subscribers (user_id, guide_id, city, keywords) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
           guide_id = excluded.guide_id,
           city = excluded.city,
           keywords = excluded.keywords",
        params![
            subscriber.user_id.0,
            c.guide_id.map(|g| g.0),
            c.city,
            c.keywords.join(",")
        ],
    )?;
    Ok(())
}

/// Returns `false` when the user was not subscribed.
pub fn remove(conn: &Connection, user: UserId) -> Result<bool> {
    let n = conn.execute("DELETE FROM subscribers WHERE user_id = ?1", [user.0])?;
    Ok(n > 0)
}

pub fn all(conn: &Connection) -> Result<Vec<Subscriber>> {
    let mut stmt =
        conn.prepare("SELECT user_id, guide_id, city, keywords FROM subscribers ORDER BY user_id")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (user_id, guide_id, city, keywords) = row?;
        let criteria = SubscriptionCriteria {
            guide_id: guide_id.map(UserId),
            city,
            keywords: keywords
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        };
        let sub = Subscriber::new(UserId(user_id), criteria).ok_or_else(|| Error::CorruptRow {
            table: "subscribers",
            reason: format!("user {user_id} has no match criteria"),
        })?;
        out.push(sub);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support;

    #[test]
    fn resubscribing_replaces_criteria() {
        let store = test_support::store();
        let conn = store.conn().unwrap();

        let by_city = Subscriber::new(
            UserId(10),
            SubscriptionCriteria {
                city: Some("Kazan".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        upsert(&conn, &by_city).unwrap();

        let by_keywords = Subscriber::new(
            UserId(10),
            SubscriptionCriteria {
                keywords: vec!["food".to_string(), "wine".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
        upsert(&conn, &by_keywords).unwrap();

        let subs = all(&conn).unwrap();
        assert_eq!(subs, vec![by_keywords]);

        assert!(remove(&conn, UserId(10)).unwrap());
        assert!(!remove(&conn, UserId(10)).unwrap());
        assert!(all(&conn).unwrap().is_empty());
    }
}
