//! Booking workflow: reserve or cancel a seat and tell the guide.

use chrono::Utc;

use crate::{
    domain::{BookingId, ExcursionId, UserId},
    entities::{Booking, BookingStatus, Excursion},
    errors::Error,
    formatting::escape_html,
    store::{bookings, excursions, notifications, Store},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The booking was cancelled earlier; nothing changed, nobody notified.
    AlreadyCancelled,
}

#[derive(Clone, Debug)]
pub struct BookingService {
    store: Store,
}

impl BookingService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Book `excursion` for `user`. Repeat bookings are allowed.
    ///
    /// The booking row and the guide's notification are written in one
    /// transaction. Missing and unapproved excursions are both `NotFound`.
    pub fn book(&self, user: UserId, excursion: ExcursionId) -> Result<BookingId> {
        let now = Utc::now();
        let id = self.store.transaction(|tx| {
            let exc = excursions::get(tx, excursion)?
                .filter(|e| e.approved)
                .ok_or_else(|| Error::not_found("excursion", excursion.0))?;

            let id = bookings::insert(tx, user, excursion, now)?;
            notifications::insert(tx, exc.guide_id, &booked_message(&exc, user, id), now)?;
            Ok(id)
        })?;

        tracing::info!(user = %user, excursion = %excursion, booking = %id, "booking confirmed");
        Ok(id)
    }

    /// Cancel one of `user`'s bookings. Someone else's booking is `NotFound`.
    pub fn cancel(&self, user: UserId, booking: BookingId) -> Result<CancelOutcome> {
        let now = Utc::now();
        let outcome = self.store.transaction(|tx| {
            let b = bookings::get(tx, booking)?
                .filter(|b| b.user_id == user)
                .ok_or_else(|| Error::not_found("booking", booking.0))?;

            if b.status == BookingStatus::Cancelled {
                return Ok(CancelOutcome::AlreadyCancelled);
            }

            bookings::set_status(tx, booking, BookingStatus::Cancelled)?;
            if let Some(exc) = excursions::get(tx, b.excursion_id)? {
                notifications::insert(tx, exc.guide_id, &cancelled_message(&exc, user, booking), now)?;
            }
            Ok(CancelOutcome::Cancelled)
        })?;

        if outcome == CancelOutcome::Cancelled {
            tracing::info!(user = %user, booking = %booking, "booking cancelled");
        }
        Ok(outcome)
    }

    /// The user's bookings with their excursions, newest first.
    pub fn for_user(&self, user: UserId) -> Result<Vec<(Booking, Option<Excursion>)>> {
        let conn = self.store.conn()?;
        bookings::by_user(&conn, user)?
            .into_iter()
            .map(|b| -> Result<(Booking, Option<Excursion>)> {
                let exc = excursions::get(&conn, b.excursion_id)?;
                Ok((b, exc))
            })
            .collect()
    }
}

fn booked_message(exc: &Excursion, user: UserId, id: BookingId) -> String {
    format!(
        "📥 New booking #{id} for <b>{}</b> from user <code>{user}</code>.",
        escape_html(&exc.title)
    )
}

fn cancelled_message(exc: &Excursion, user: UserId, id: BookingId) -> String {
    format!(
        "❌ Booking #{id} for <b>{}</b> was cancelled by user <code>{user}</code>.",
        escape_html(&exc.title)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{outbox::NotificationQueue, store::test_support};

    fn setup() -> (Store, BookingService) {
        let store = test_support::store();
        test_support::add_guide(&store, 3, true);
        (store.clone(), BookingService::new(store))
    }

    #[test]
    fn booking_approved_excursion_notifies_its_guide_once() {
        let (store, svc) = setup();
        let exc = test_support::add_excursion(&store, 3, true);

        let id = svc.book(UserId(10), exc).unwrap();

        let conn = store.conn().unwrap();
        let b = bookings::get(&conn, id).unwrap().unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.excursion_id, exc);
        drop(conn);

        let pending = store.drain_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recipient, UserId(3));
        assert!(pending[0].body.contains("Old town walk"));
    }

    #[test]
    fn unapproved_or_missing_excursion_is_not_found() {
        let (store, svc) = setup();
        let hidden = test_support::add_excursion(&store, 3, false);

        assert!(svc.book(UserId(10), hidden).unwrap_err().is_not_found());
        assert!(svc.book(UserId(10), ExcursionId(999)).unwrap_err().is_not_found());
        assert!(store.drain_pending().unwrap().is_empty());
    }

    #[test]
    fn concurrent_bookings_on_a_file_database_all_succeed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("guidebot.db");
        let store = Store::open(path.to_str().unwrap()).unwrap();
        test_support::add_guide(&store, 3, true);
        let exc = test_support::add_excursion(&store, 3, true);

        let workers: Vec<_> = (0..8)
            .map(|t| {
                let svc = BookingService::new(store.clone());
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| svc.book(UserId(100 + t), exc).is_err())
                        .count()
                })
            })
            .collect();
        let failures: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

        assert_eq!(failures, 0);
        assert_eq!(store.drain_pending().unwrap().len(), 8 * 25);
    }

    #[test]
    fn repeat_bookings_are_kept() {
        let (store, svc) = setup();
        let exc = test_support::add_excursion(&store, 3, true);
        let a = svc.book(UserId(10), exc).unwrap();
        let b = svc.book(UserId(10), exc).unwrap();
        assert_ne!(a, b);
        assert_eq!(svc.for_user(UserId(10)).unwrap().len(), 2);
    }

    #[test]
    fn cancel_is_owner_only_and_idempotent() {
        let (store, svc) = setup();
        let exc = test_support::add_excursion(&store, 3, true);
        let id = svc.book(UserId(10), exc).unwrap();
        let before = store.drain_pending().unwrap().len();

        assert!(svc.cancel(UserId(11), id).unwrap_err().is_not_found());
        assert_eq!(svc.cancel(UserId(10), id).unwrap(), CancelOutcome::Cancelled);
        assert_eq!(store.drain_pending().unwrap().len(), before + 1);

        assert_eq!(
            svc.cancel(UserId(10), id).unwrap(),
            CancelOutcome::AlreadyCancelled
        );
        assert_eq!(store.drain_pending().unwrap().len(), before + 1);

        let mine = svc.for_user(UserId(10)).unwrap();
        assert_eq!(mine[0].0.status, BookingStatus::Cancelled);
    }
}
