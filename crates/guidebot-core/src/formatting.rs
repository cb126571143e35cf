//! Message bodies (Telegram HTML parse mode).

use chrono::{NaiveDateTime, Timelike};

use crate::entities::{
    Booking, BookingStatus, Excursion, Guide, Rating, Stats, TravelRequest, DATE_FORMAT,
};

const MAX_DESCRIPTION_CHARS: usize = 300;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

pub fn stars(rating: Rating) -> String {
    let filled = rating.get() as usize;
    format!(
        "{}{}",
        "★".repeat(filled),
        "☆".repeat(Rating::MAX as usize - filled)
    )
}

pub fn format_date(d: NaiveDateTime) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Greeting by local hour: morning 5-12, afternoon 12-17, evening 17-23.
pub fn greeting(now: NaiveDateTime) -> &'static str {
    match now.hour() {
        5..=11 => "Good morning",
        12..=16 => "Good afternoon",
        17..=22 => "Good evening",
        _ => "Good night",
    }
}

fn guide_line(guide: Option<&Guide>) -> String {
    match guide {
        Some(g) if g.review_count > 0 => format!(
            "{} (⭐ {:.1}, {} reviews)",
            escape_html(&g.name),
            g.rating,
            g.review_count
        ),
        Some(g) => format!("{} (no reviews yet)", escape_html(&g.name)),
        None => "unknown".to_string(),
    }
}

/// Traveler-facing excursion card. Only dates after `now` are listed.
pub fn excursion_card(e: &Excursion, guide: Option<&Guide>, now: NaiveDateTime) -> String {
    let upcoming = e.upcoming_dates(now);
    let dates = if upcoming.is_empty() {
        "no upcoming dates".to_string()
    } else {
        upcoming
            .into_iter()
            .map(format_date)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut out = format!(
        "🗺️ <b>{}</b> (#{})\n📍 {} · {}\n👤 Guide: {}\n💰 {} RUB per person\n📅 {}",
        escape_html(&e.title),
        e.id,
        escape_html(&e.city),
        escape_html(&e.theme),
        guide_line(guide),
        e.price,
        dates
    );
    if !e.description.is_empty() {
        out.push_str("\n\n");
        out.push_str(&escape_html(&truncate(&e.description, MAX_DESCRIPTION_CHARS)));
    }
    out
}

/// Guide-facing line in "My excursions" and the admin pending list.
pub fn excursion_summary(e: &Excursion) -> String {
    let state = if e.approved { "✅ approved" } else { "⏳ pending" };
    format!(
        "#{} <b>{}</b> · {} · {} RUB · {}",
        e.id,
        escape_html(&e.title),
        escape_html(&e.city),
        e.price,
        state
    )
}

pub fn booking_line(b: &Booking, excursion: Option<&Excursion>) -> String {
    let title = excursion
        .map(|e| escape_html(&e.title))
        .unwrap_or_else(|| "unknown excursion".to_string());
    let status = match b.status {
        BookingStatus::Confirmed => "✅ confirmed",
        BookingStatus::Cancelled => "❌ cancelled",
    };
    format!(
        "Booking #{} · <b>{}</b>\nBooked: {} · {}",
        b.id,
        title,
        b.created_at.format("%Y-%m-%d %H:%M UTC"),
        status
    )
}

pub fn guide_summary(g: &Guide) -> String {
    let state = if g.approved { "✅" } else { "⏳" };
    format!(
        "{state} <b>{}</b> · id <code>{}</code> · {} yrs · ⭐ {:.1} ({})",
        escape_html(&g.name),
        g.id,
        g.experience,
        g.rating,
        g.review_count
    )
}

pub fn request_line(r: &TravelRequest) -> String {
    format!(
        "#{} from <code>{}</code> · {} · {} · {}",
        r.id,
        r.user_id,
        escape_html(&r.city),
        escape_html(&r.keywords),
        r.created_at.format("%Y-%m-%d")
    )
}

pub fn stats_report(s: &Stats) -> String {
    format!(
        "📊 <b>Statistics</b>\n\
         Guides: {} ({} approved, {} pending)\n\
         Excursions: {} ({} approved, {} pending)\n\
         Travelers with bookings: {}\n\
         Requests: {}",
        s.guides_total,
        s.guides_approved,
        s.guides_pending,
        s.excursions_total,
        s.excursions_approved,
        s.excursions_pending,
        s.travelers_total,
        s.requests_total
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExcursionId, UserId};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn greeting_boundaries() {
        assert_eq!(greeting(dt("2026-01-01 04:59")), "Good night");
        assert_eq!(greeting(dt("2026-01-01 05:00")), "Good morning");
        assert_eq!(greeting(dt("2026-01-01 12:00")), "Good afternoon");
        assert_eq!(greeting(dt("2026-01-01 17:00")), "Good evening");
        assert_eq!(greeting(dt("2026-01-01 23:00")), "Good night");
    }

    #[test]
    fn stars_fill_up_to_rating() {
        assert_eq!(stars(Rating::new(3).unwrap()), "★★★☆☆");
    }

    #[test]
    fn card_lists_only_upcoming_dates_and_escapes() {
        let e = Excursion {
            id: ExcursionId(7),
            guide_id: UserId(3),
            title: "Bars & <b>roofs</b>".to_string(),
            city: "Kazan".to_string(),
            theme: "food".to_string(),
            description: String::new(),
            price: 900,
            dates: vec![dt("2026-01-10 10:00"), dt("2026-03-01 12:00")],
            keywords: vec![],
            start: None,
            approved: true,
        };
        let card = excursion_card(&e, None, dt("2026-02-01 00:00"));
        assert!(card.contains("Bars &amp; &lt;b&gt;roofs&lt;/b&gt;"));
        assert!(card.contains("2026-03-01 12:00"));
        assert!(!card.contains("2026-01-10"));

        let past = excursion_card(&e, None, dt("2027-01-01 00:00"));
        assert!(past.contains("no upcoming dates"));
    }

    #[test]
    fn long_descriptions_are_cut() {
        let long = "a".repeat(MAX_DESCRIPTION_CHARS + 10);
        let cut = truncate(&long, MAX_DESCRIPTION_CHARS);
        assert_eq!(cut.chars().count(), MAX_DESCRIPTION_CHARS + 1);
        assert!(cut.ends_with('…'));
    }
}
