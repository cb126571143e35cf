//! Moderation and subscriber alerts.
//!
//! Everything here only writes to the outbox; delivery is the dispatcher's job.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::{
    domain::{ExcursionId, UserId},
    entities::{parse_keywords, Excursion, Subscriber, SubscriptionCriteria},
    errors::Error,
    formatting::escape_html,
    store::{excursions, guides, notifications, subscribers, Store},
    Result,
};

/// Queue `body` for every admin.
pub(crate) fn notify_admins(
    conn: &Connection,
    admins: &[UserId],
    body: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    for admin in admins {
        notifications::insert(conn, *admin, body, now)?;
    }
    Ok(())
}

/// Parse `/subscribe` arguments: `city <name>`, `guide <id>` or
/// `keywords <a, b, ...>`.
pub fn parse_subscription(args: &str) -> Option<SubscriptionCriteria> {
    let (kind, rest) = args.trim().split_once(char::is_whitespace)?;
    let rest = rest.trim();
    match kind.to_lowercase().as_str() {
        "city" if !rest.is_empty() => Some(SubscriptionCriteria {
            city: Some(rest.to_string()),
            ..Default::default()
        }),
        "guide" => rest.parse::<i64>().ok().map(|id| SubscriptionCriteria {
            guide_id: Some(UserId(id)),
            ..Default::default()
        }),
        "keywords" => {
            let keywords = parse_keywords(rest);
            (!keywords.is_empty()).then(|| SubscriptionCriteria {
                keywords,
                ..Default::default()
            })
        }
        _ => None,
    }
}

fn new_excursion_alert(e: &Excursion) -> String {
    format!(
        "🆕 New excursion: <b>{}</b>\n📍 {} · {}\nTo book, send /book_{}",
        escape_html(&e.title),
        escape_html(&e.city),
        escape_html(&e.theme),
        e.id
    )
}

#[derive(Clone, Debug)]
pub struct Moderation {
    store: Store,
}

impl Moderation {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Approve a guide and tell them. `false` if they were already approved.
    pub fn approve_guide(&self, id: UserId) -> Result<bool> {
        let now = Utc::now();
        let changed = self.store.transaction(|tx| {
            let guide = guides::get(tx, id)?.ok_or_else(|| Error::not_found("guide", id.0))?;
            if guide.approved {
                return Ok(false);
            }
            guides::approve(tx, id)?;
            notifications::insert(
                tx,
                id,
                "✅ Your guide profile was approved. You can now publish excursions.",
                now,
            )?;
            Ok(true)
        })?;
        if changed {
            tracing::info!(guide = %id, "guide approved");
        }
        Ok(changed)
    }

    /// Approve an excursion, tell its guide and alert every matching
    /// subscriber. Returns how many subscribers were alerted, or `None` if
    /// it was already approved (nobody is alerted twice).
    pub fn approve_excursion(&self, id: ExcursionId) -> Result<Option<usize>> {
        let now = Utc::now();
        let alerted = self.store.transaction(|tx| {
            let exc = excursions::get(tx, id)?.ok_or_else(|| Error::not_found("excursion", id.0))?;
            if exc.approved {
                return Ok(None);
            }
            excursions::approve(tx, id)?;
            notifications::insert(
                tx,
                exc.guide_id,
                &format!(
                    "✅ Your excursion <b>{}</b> (#{id}) was approved and is now visible to travelers.",
                    escape_html(&exc.title)
                ),
                now,
            )?;

            let alert = new_excursion_alert(&exc);
            let mut alerted = 0;
            for sub in subscribers::all(tx)? {
                if sub.user_id == exc.guide_id || !sub.matches(&exc) {
                    continue;
                }
                notifications::insert(tx, sub.user_id, &alert, now)?;
                alerted += 1;
            }
            Ok(Some(alerted))
        })?;
        if let Some(n) = alerted {
            tracing::info!(excursion = %id, subscribers = n, "excursion approved");
        }
        Ok(alerted)
    }

    pub fn subscribe(&self, subscriber: &Subscriber) -> Result<()> {
        let conn = self.store.conn()?;
        subscribers::upsert(&conn, subscriber)
    }

    pub fn unsubscribe(&self, user: UserId) -> Result<bool> {
        let conn = self.store.conn()?;
        subscribers::remove(&conn, user)
    }
}
