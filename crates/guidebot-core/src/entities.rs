//! Typed records for everything the store persists.
//!
//! Rows are decoded into these once, in `store`; nothing above the store
//! touches column names.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::domain::{BookingId, ExcursionId, NotificationId, UserId};

/// Storage/display format for excursion dates (local time, minute precision).
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Clone, Debug, PartialEq)]
pub struct Guide {
    pub id: UserId,
    pub name: String,
    pub city: String,
    pub description: String,
    pub experience: u32,
    pub approved: bool,
    pub rating: f64,
    pub review_count: u32,
}

#[derive(Clone, Debug)]
pub struct NewGuide {
    pub id: UserId,
    pub name: String,
    pub city: String,
    pub description: String,
    pub experience: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Excursion {
    pub id: ExcursionId,
    pub guide_id: UserId,
    pub title: String,
    pub city: String,
    pub theme: String,
    pub description: String,
    pub price: i64,
    pub dates: Vec<NaiveDateTime>,
    pub keywords: Vec<String>,
    pub start: Option<Coordinates>,
    pub approved: bool,
}

impl Excursion {
    /// Nearest date strictly after `now`. Past dates never count as upcoming.
    pub fn next_date_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.dates.iter().copied().filter(|d| *d > now).min()
    }

    pub fn upcoming_dates(&self, now: NaiveDateTime) -> Vec<NaiveDateTime> {
        let mut out: Vec<_> = self.dates.iter().copied().filter(|d| *d > now).collect();
        out.sort();
        out
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewExcursion {
    pub guide_id: UserId,
    pub title: String,
    pub city: String,
    pub theme: String,
    pub description: String,
    pub price: i64,
    pub dates: Vec<NaiveDateTime>,
    pub keywords: Vec<String>,
    pub start: Option<Coordinates>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub excursion_id: ExcursionId,
    pub created_at: DateTime<Utc>,
    pub status: BookingStatus,
}

/// Review rating, always within 1..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TravelRequest {
    pub id: i64,
    pub user_id: UserId,
    pub city: String,
    pub keywords: String,
    pub created_at: DateTime<Utc>,
}

/// Alert subscription. At least one criterion is always set.
#[derive(Clone, Debug, PartialEq)]
pub struct Subscriber {
    pub user_id: UserId,
    criteria: SubscriptionCriteria,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriptionCriteria {
    pub guide_id: Option<UserId>,
    pub city: Option<String>,
    pub keywords: Vec<String>,
}

impl Subscriber {
    /// Returns `None` when no criterion is set.
    pub fn new(user_id: UserId, criteria: SubscriptionCriteria) -> Option<Self> {
        let city_set = criteria
            .city
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false);
        if criteria.guide_id.is_none() && !city_set && criteria.keywords.is_empty() {
            return None;
        }
        Some(Self { user_id, criteria })
    }

    pub fn criteria(&self) -> &SubscriptionCriteria {
        &self.criteria
    }

    /// Same guide, same city (case-insensitive), or any shared keyword.
    pub fn matches(&self, excursion: &Excursion) -> bool {
        if self.criteria.guide_id == Some(excursion.guide_id) {
            return true;
        }
        if let Some(city) = &self.criteria.city {
            if city.trim().to_lowercase() == excursion.city.trim().to_lowercase() {
                return true;
            }
        }
        self.criteria
            .keywords
            .iter()
            .any(|k| excursion.keywords.iter().any(|e| e == k))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub body: String,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub guides_total: i64,
    pub guides_approved: i64,
    pub guides_pending: i64,
    pub excursions_total: i64,
    pub excursions_approved: i64,
    pub excursions_pending: i64,
    pub travelers_total: i64,
    pub requests_total: i64,
}

/// Lowercased, trimmed, de-duplicated keyword list from free text
/// ("History, nature  ,food" -> ["history", "nature", "food"]).
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for k in raw.split(',').map(|s| s.trim().to_lowercase()) {
        if !k.is_empty() && !out.contains(&k) {
            out.push(k);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn excursion(guide: i64, city: &str, keywords: &[&str]) -> Excursion {
        Excursion {
            id: ExcursionId(1),
            guide_id: UserId(guide),
            title: "Old town".to_string(),
            city: city.to_string(),
            theme: "history".to_string(),
            description: String::new(),
            price: 1500,
            dates: vec![dt("2026-01-10 10:00"), dt("2026-03-01 12:00")],
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            start: None,
            approved: true,
        }
    }

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_none());
        assert_eq!(Rating::new(1).map(Rating::get), Some(1));
        assert_eq!(Rating::new(5).map(Rating::get), Some(5));
        assert!(Rating::new(6).is_none());
    }

    #[test]
    fn next_date_skips_past_dates() {
        let e = excursion(3, "Kazan", &[]);
        assert_eq!(
            e.next_date_after(dt("2026-02-01 00:00")),
            Some(dt("2026-03-01 12:00"))
        );
        assert_eq!(e.next_date_after(dt("2026-04-01 00:00")), None);
    }

    #[test]
    fn subscriber_needs_a_criterion() {
        assert!(Subscriber::new(UserId(1), SubscriptionCriteria::default()).is_none());
        let blank_city = SubscriptionCriteria {
            city: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(Subscriber::new(UserId(1), blank_city).is_none());
    }

    #[test]
    fn subscriber_matching() {
        let e = excursion(3, "Kazan", &["history", "food"]);

        let by_guide = SubscriptionCriteria {
            guide_id: Some(UserId(3)),
            ..Default::default()
        };
        let by_city = SubscriptionCriteria {
            city: Some("kazan".to_string()),
            ..Default::default()
        };
        let by_keyword = SubscriptionCriteria {
            keywords: vec!["food".to_string()],
            ..Default::default()
        };
        let other = SubscriptionCriteria {
            city: Some("Sochi".to_string()),
            keywords: vec!["sea".to_string()],
            ..Default::default()
        };

        for c in [by_guide, by_city, by_keyword] {
            assert!(Subscriber::new(UserId(9), c).unwrap().matches(&e));
        }
        assert!(!Subscriber::new(UserId(9), other).unwrap().matches(&e));
    }

    #[test]
    fn keywords_are_normalized() {
        assert_eq!(
            parse_keywords("History, nature  ,, food,history"),
            vec!["history", "nature", "food"]
        );
    }
}
