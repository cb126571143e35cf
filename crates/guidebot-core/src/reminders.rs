//! Booking reminders and taxi quotes.

use chrono::{Local, NaiveDateTime, Utc};

use crate::{
    domain::{BookingId, NotificationId, UserId},
    entities::{BookingStatus, Coordinates, Excursion},
    errors::Error,
    formatting::{escape_html, format_date},
    ports::{Lookup, Providers, Route, Weather},
    store::{bookings, excursions, notifications, Store},
    Result,
};

/// What to wear, judged from the forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clothing {
    Umbrella,
    SunProtection,
    WarmClothes,
}

impl Clothing {
    pub fn advice(self) -> &'static str {
        match self {
            Self::Umbrella => "☔ Rain is expected, take an umbrella.",
            Self::SunProtection => "😎 Sunny weather, bring sunglasses and a cap.",
            Self::WarmClothes => "🧥 It will be cold, dress warmly.",
        }
    }
}

pub fn recommend(weather: &Weather) -> Option<Clothing> {
    let c = weather.condition.to_lowercase();
    if c.contains("rain") || c.contains("shower") || c.contains("drizzle") {
        Some(Clothing::Umbrella)
    } else if c.contains("clear") || c.contains("sunny") {
        Some(Clothing::SunProtection)
    } else if c.contains("cold") || weather.temp_c < 5.0 {
        Some(Clothing::WarmClothes)
    } else {
        None
    }
}

pub struct Reminders {
    store: Store,
    providers: Providers,
    /// Where travelers are assumed to start from.
    origin: Coordinates,
}

impl Reminders {
    pub fn new(store: Store, providers: Providers, origin: Coordinates) -> Self {
        Self {
            store,
            providers,
            origin,
        }
    }

    fn load(&self, user: UserId, booking: BookingId) -> Result<Excursion> {
        let conn = self.store.conn()?;
        let b = bookings::get(&conn, booking)?
            .filter(|b| b.user_id == user)
            .ok_or_else(|| Error::not_found("booking", booking.0))?;
        if b.status == BookingStatus::Cancelled {
            return Err(Error::not_found("booking", booking.0));
        }
        excursions::get(&conn, b.excursion_id)?
            .ok_or_else(|| Error::not_found("excursion", b.excursion_id.0))
    }

    /// Queue a reminder for `user`'s booking. `None` when the excursion has
    /// no upcoming date.
    pub async fn schedule(&self, user: UserId, booking: BookingId) -> Result<Option<NotificationId>> {
        let exc = self.load(user, booking)?;
        let now = Local::now().naive_local();
        let Some(start) = exc.next_date_after(now) else {
            tracing::info!(booking = %booking, excursion = %exc.id, "no upcoming date, reminder skipped");
            return Ok(None);
        };

        let (weather, route) = match exc.start {
            Some(point) => tokio::join!(
                self.providers.weather.forecast(point),
                self.providers.routes.walking_route(self.origin, point)
            ),
            None => (Lookup::Unavailable, Lookup::Unavailable),
        };

        let body = reminder_text(&exc, booking, start, now, &weather, &route);
        let conn = self.store.conn()?;
        let id = notifications::insert(&conn, user, &body, Utc::now())?;
        tracing::debug!(booking = %booking, notification = %id, "reminder queued");
        Ok(Some(id))
    }

    /// Price estimate from the traveler's origin to the meeting point.
    pub async fn taxi(&self, user: UserId, booking: BookingId) -> Result<String> {
        let exc = self.load(user, booking)?;
        let Some(point) = exc.start else {
            return Ok("This excursion has no meeting point, so no taxi estimate.".to_string());
        };
        Ok(match self.providers.taxi.quote(self.origin, point).await {
            Lookup::Found(q) => format!(
                "🚕 Taxi to <b>{}</b>: about {:.0} RUB.\n<a href=\"{}\">Order a ride</a>",
                escape_html(&exc.title),
                q.price,
                escape_html(&q.order_url)
            ),
            Lookup::Unavailable => "🚕 Taxi is unavailable right now, please try later.".to_string(),
        })
    }
}

fn reminder_text(
    exc: &Excursion,
    booking: BookingId,
    start: NaiveDateTime,
    now: NaiveDateTime,
    weather: &Lookup<Weather>,
    route: &Lookup<Route>,
) -> String {
    let hours = (start - now).num_minutes() as f64 / 60.0;
    let mut out = format!(
        "⏰ Reminder: <b>{}</b> starts {} (in {:.1} h).\nBooking #{booking}",
        escape_html(&exc.title),
        format_date(start),
        hours
    );

    if let Some(p) = exc.start {
        out.push_str(&format!("\n📍 Meeting point: {:.5}, {:.5}", p.lat, p.lon));
    }

    match weather {
        Lookup::Found(w) => {
            out.push_str(&format!("\n🌤 Weather: {}", escape_html(&w.to_string())));
            if let Some(c) = recommend(w) {
                out.push('\n');
                out.push_str(c.advice());
            }
        }
        Lookup::Unavailable => out.push_str("\n🌤 Weather: unknown"),
    }

    match route {
        Lookup::Found(r) => out.push_str(&format!(
            "\n🚶 About {} min on foot. <a href=\"{}\">Route on the map</a>",
            r.minutes,
            escape_html(&r.map_link)
        )),
        Lookup::Unavailable => out.push_str("\n🚶 Travel time: unknown"),
    }
    out
}
