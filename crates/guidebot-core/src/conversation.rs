//! Multi-step conversations (guide registration, reviews, requests,
//! excursion publishing, messages to admins).
//!
//! The per-user state is an explicit value carrying whatever partial input
//! was already collected. [`advance`] is a pure transition function: it
//! either moves to the next state, finishes the flow, or rejects the input
//! with an [`Invalid`] reason and leaves the state alone. [`Conversations`]
//! wraps it with the keyed state store and performs the terminal writes.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    alerts,
    domain::{ExcursionId, UserId},
    entities::{parse_keywords, Coordinates, NewExcursion, NewGuide, Rating, DATE_FORMAT},
    errors::Error,
    formatting::{escape_html, stars},
    store::{bookings, excursions, guides, notifications, requests, reviews, Store},
    Result,
};

/// Label of the reply-keyboard button that abandons any flow.
pub const BACK: &str = "⬅️ Back";

pub const MAX_EXPERIENCE_YEARS: u32 = 50;

pub fn is_cancel(text: &str) -> bool {
    let t = text.trim();
    t == BACK || t.eq_ignore_ascii_case("/cancel")
}

/// Excursion fields collected so far. Filled in order, one per message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExcursionDraft {
    pub title: String,
    pub city: String,
    pub theme: String,
    pub description: String,
    pub price: i64,
    pub dates: Vec<NaiveDateTime>,
    pub keywords: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExcursionStep {
    Title,
    City,
    Theme,
    Description,
    Price,
    Dates,
    Keywords,
    Location,
}

impl ExcursionStep {
    fn next(self) -> Option<Self> {
        use ExcursionStep::*;
        match self {
            Title => Some(City),
            City => Some(Theme),
            Theme => Some(Description),
            Description => Some(Price),
            Price => Some(Dates),
            Dates => Some(Keywords),
            Keywords => Some(Location),
            Location => None,
        }
    }
}

/// Where a user is inside a flow. Idle users have no entry at all.
#[derive(Clone, Debug, PartialEq)]
pub enum FlowState {
    AwaitingName,
    AwaitingExperience { name: String },
    AwaitingRating { guide_id: UserId },
    AwaitingComment { guide_id: UserId, rating: Rating },
    AwaitingCity,
    AwaitingKeywords { city: String },
    AwaitingAdminMessage,
    AwaitingExcursion {
        step: ExcursionStep,
        draft: ExcursionDraft,
    },
}

impl FlowState {
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::AwaitingName => "What is your full name?",
            Self::AwaitingExperience { .. } => "How many years of guiding experience do you have? (0-50)",
            Self::AwaitingRating { .. } => "Rate your guide from 1 to 5:",
            Self::AwaitingComment { .. } => "Write a short comment for your review:",
            Self::AwaitingCity => "Which city are you looking for a tour in?",
            Self::AwaitingKeywords { .. } => {
                "What are you interested in? (e.g. history, nature, food)"
            }
            Self::AwaitingAdminMessage => "Write your message for the administrators:",
            Self::AwaitingExcursion { step, .. } => match step {
                ExcursionStep::Title => "Excursion title:",
                ExcursionStep::City => "City:",
                ExcursionStep::Theme => "Theme (e.g. history, food, architecture):",
                ExcursionStep::Description => "Short description:",
                ExcursionStep::Price => "Price per person, in roubles:",
                ExcursionStep::Dates => {
                    "Dates, comma separated, as YYYY-MM-DD HH:MM (e.g. 2026-06-01 10:00, 2026-06-08 10:00):"
                }
                ExcursionStep::Keywords => "Keywords, comma separated:",
                ExcursionStep::Location => {
                    "Meeting point as `lat, lon` (e.g. 55.7539, 37.6208), or `-` to skip:"
                }
            },
        }
    }
}

/// Why an input was rejected. The state machine stays where it was.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Invalid {
    #[error("This can't be empty.")]
    Empty,
    #[error("Please send a whole number.")]
    NotANumber,
    #[error("Experience must be between 0 and 50 years.")]
    ExperienceOutOfRange,
    #[error("The rating must be from 1 to 5.")]
    RatingOutOfRange,
    #[error("The price can't be negative.")]
    NegativePrice,
    #[error("Can't read the date {0:?}, use YYYY-MM-DD HH:MM.")]
    BadDate(String),
    #[error("At least one date must be in the future.")]
    NoFutureDate,
    #[error("Send the meeting point as `lat, lon`, or `-` to skip.")]
    BadLocation,
}

/// Result of a completed flow, ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub enum Completed {
    Guide {
        name: String,
        experience: u32,
    },
    Review {
        guide_id: UserId,
        rating: Rating,
        comment: String,
    },
    Request {
        city: String,
        keywords: Vec<String>,
    },
    AdminMessage {
        text: String,
    },
    Excursion {
        draft: ExcursionDraft,
        start: Option<Coordinates>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    Next(FlowState),
    Done(Completed),
}

/// Interpret `input` in `state`. `now` is the local wall clock, used to
/// reject excursion schedules with no future date.
pub fn advance(
    state: &FlowState,
    input: &str,
    now: NaiveDateTime,
) -> std::result::Result<Transition, Invalid> {
    use Transition::{Done, Next};

    Ok(match state {
        FlowState::AwaitingName => Next(FlowState::AwaitingExperience {
            name: non_empty(input)?,
        }),
        FlowState::AwaitingExperience { name } => Done(Completed::Guide {
            name: name.clone(),
            experience: parse_experience(input)?,
        }),
        FlowState::AwaitingRating { guide_id } => Next(FlowState::AwaitingComment {
            guide_id: *guide_id,
            rating: parse_rating(input)?,
        }),
        FlowState::AwaitingComment { guide_id, rating } => Done(Completed::Review {
            guide_id: *guide_id,
            rating: *rating,
            comment: non_empty(input)?,
        }),
        FlowState::AwaitingCity => Next(FlowState::AwaitingKeywords {
            city: non_empty(input)?,
        }),
        FlowState::AwaitingKeywords { city } => {
            let keywords = parse_keywords(input);
            if keywords.is_empty() {
                return Err(Invalid::Empty);
            }
            Done(Completed::Request {
                city: city.clone(),
                keywords,
            })
        }
        FlowState::AwaitingAdminMessage => Done(Completed::AdminMessage {
            text: non_empty(input)?,
        }),
        FlowState::AwaitingExcursion { step, draft } => {
            let mut draft = draft.clone();
            let mut start = None;
            match step {
                ExcursionStep::Title => draft.title = non_empty(input)?,
                ExcursionStep::City => draft.city = non_empty(input)?,
                ExcursionStep::Theme => draft.theme = non_empty(input)?,
                ExcursionStep::Description => draft.description = non_empty(input)?,
                ExcursionStep::Price => draft.price = parse_price(input)?,
                ExcursionStep::Dates => draft.dates = parse_dates(input, now)?,
                ExcursionStep::Keywords => {
                    draft.keywords = parse_keywords(input);
                    if draft.keywords.is_empty() {
                        return Err(Invalid::Empty);
                    }
                }
                ExcursionStep::Location => start = parse_location(input)?,
            }
            match step.next() {
                Some(step) => Next(FlowState::AwaitingExcursion { step, draft }),
                None => Done(Completed::Excursion { draft, start }),
            }
        }
    })
}

fn non_empty(input: &str) -> std::result::Result<String, Invalid> {
    let t = input.trim();
    if t.is_empty() {
        Err(Invalid::Empty)
    } else {
        Ok(t.to_string())
    }
}

fn parse_int(input: &str) -> std::result::Result<i64, Invalid> {
    input.trim().parse::<i64>().map_err(|_| Invalid::NotANumber)
}

pub fn parse_experience(input: &str) -> std::result::Result<u32, Invalid> {
    let years = parse_int(input)?;
    if (0..=MAX_EXPERIENCE_YEARS as i64).contains(&years) {
        Ok(years as u32)
    } else {
        Err(Invalid::ExperienceOutOfRange)
    }
}

pub fn parse_rating(input: &str) -> std::result::Result<Rating, Invalid> {
    Rating::new(parse_int(input)?).ok_or(Invalid::RatingOutOfRange)
}

pub fn parse_price(input: &str) -> std::result::Result<i64, Invalid> {
    let price = parse_int(input)?;
    if price < 0 {
        return Err(Invalid::NegativePrice);
    }
    Ok(price)
}

/// Sorted, de-duplicated schedule. Past dates are kept but at least one
/// must lie after `now`.
pub fn parse_dates(input: &str, now: NaiveDateTime) -> std::result::Result<Vec<NaiveDateTime>, Invalid> {
    let mut dates = Vec::new();
    for raw in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let d = NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
            .map_err(|_| Invalid::BadDate(raw.to_string()))?;
        dates.push(d);
    }
    if dates.is_empty() {
        return Err(Invalid::Empty);
    }
    dates.sort();
    dates.dedup();
    if !dates.iter().any(|d| *d > now) {
        return Err(Invalid::NoFutureDate);
    }
    Ok(dates)
}

/// `-` means "no meeting point".
pub fn parse_location(input: &str) -> std::result::Result<Option<Coordinates>, Invalid> {
    let t = input.trim();
    if t == "-" {
        return Ok(None);
    }
    let (lat, lon) = t.split_once(',').ok_or(Invalid::BadLocation)?;
    let lat: f64 = lat.trim().parse().map_err(|_| Invalid::BadLocation)?;
    let lon: f64 = lon.trim().parse().map_err(|_| Invalid::BadLocation)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(Invalid::BadLocation);
    }
    Ok(Some(Coordinates { lat, lon }))
}

/// Keyed per-user flow state.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, user: UserId) -> Option<FlowState>;
    async fn set(&self, user: UserId, state: FlowState);
    /// Returns `true` if the user was inside a flow.
    async fn clear(&self, user: UserId) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemoryConversations {
    inner: Mutex<HashMap<UserId, FlowState>>,
}

#[async_trait]
impl ConversationStore for InMemoryConversations {
    async fn get(&self, user: UserId) -> Option<FlowState> {
        self.inner.lock().await.get(&user).cloned()
    }

    async fn set(&self, user: UserId, state: FlowState) {
        self.inner.lock().await.insert(user, state);
    }

    async fn clear(&self, user: UserId) -> bool {
        self.inner.lock().await.remove(&user).is_some()
    }
}

/// What to tell the user after a step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// The flow continues; ask for the next (or the same) input.
    Prompt(String),
    /// The flow is over (finished, cancelled or refused); show the main menu.
    Done(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Self::Prompt(t) | Self::Done(t) => t,
        }
    }
}

pub struct Conversations {
    store: Store,
    states: Arc<dyn ConversationStore>,
    admins: Vec<UserId>,
}

impl Conversations {
    pub fn new(store: Store, states: Arc<dyn ConversationStore>, admins: Vec<UserId>) -> Self {
        Self {
            store,
            states,
            admins,
        }
    }

    /// `None` means idle.
    pub async fn state(&self, user: UserId) -> Option<FlowState> {
        self.states.get(user).await
    }

    async fn enter(&self, user: UserId, state: FlowState) -> Reply {
        let prompt = state.prompt().to_string();
        self.states.set(user, state).await;
        Reply::Prompt(prompt)
    }

    pub async fn begin_registration(&self, user: UserId) -> Result<Reply> {
        let existing = {
            let conn = self.store.conn()?;
            guides::get(&conn, user)?
        };
        if existing.is_some() {
            return Ok(Reply::Done("You are already registered as a guide.".to_string()));
        }
        Ok(self.enter(user, FlowState::AwaitingName).await)
    }

    /// Reviews go to the guide of the user's most recent booking.
    pub async fn begin_review(&self, user: UserId) -> Result<Reply> {
        let guide = {
            let conn = self.store.conn()?;
            match bookings::by_user(&conn, user)?.first() {
                Some(b) => Some(
                    excursions::get(&conn, b.excursion_id)?
                        .ok_or_else(|| Error::not_found("excursion", b.excursion_id.0))?
                        .guide_id,
                ),
                None => None,
            }
        };
        let Some(guide_id) = guide else {
            return Ok(Reply::Done(
                "You have no bookings to leave a review for yet.".to_string(),
            ));
        };
        Ok(self.enter(user, FlowState::AwaitingRating { guide_id }).await)
    }

    pub async fn begin_request(&self, user: UserId) -> Reply {
        self.enter(user, FlowState::AwaitingCity).await
    }

    pub async fn begin_admin_message(&self, user: UserId) -> Reply {
        self.enter(user, FlowState::AwaitingAdminMessage).await
    }

    /// Only registered guides may publish; approval is not required yet.
    pub async fn begin_excursion(&self, user: UserId) -> Result<Reply> {
        let guide = {
            let conn = self.store.conn()?;
            guides::get(&conn, user)?
        };
        if guide.is_none() {
            return Ok(Reply::Done(
                "Register as a guide first (/register).".to_string(),
            ));
        }
        Ok(self
            .enter(
                user,
                FlowState::AwaitingExcursion {
                    step: ExcursionStep::Title,
                    draft: ExcursionDraft::default(),
                },
            )
            .await)
    }

    /// Drop whatever flow the user is in.
    pub async fn cancel(&self, user: UserId) -> Reply {
        if self.states.clear(user).await {
            tracing::debug!(user = %user, "conversation cancelled");
        }
        Reply::Done("Back to the main menu.".to_string())
    }

    /// Feed one message into the user's flow. `None` if the user is idle
    /// and the text is not ours to interpret.
    pub async fn handle_input(&self, user: UserId, text: &str) -> Result<Option<Reply>> {
        if is_cancel(text) {
            return Ok(Some(self.cancel(user).await));
        }
        let Some(state) = self.states.get(user).await else {
            return Ok(None);
        };

        let now = Local::now().naive_local();
        match advance(&state, text, now) {
            Err(invalid) => Ok(Some(Reply::Prompt(format!("{invalid}\n{}", state.prompt())))),
            Ok(Transition::Next(next)) => Ok(Some(self.enter(user, next).await)),
            Ok(Transition::Done(done)) => {
                // On a failed write the user stays on the last step and can resend.
                let reply = self.complete(user, done)?;
                self.states.clear(user).await;
                Ok(Some(Reply::Done(reply)))
            }
        }
    }

    fn complete(&self, user: UserId, done: Completed) -> Result<String> {
        let now = Utc::now();
        match done {
            Completed::Guide { name, experience } => {
                let registered = self.store.transaction(|tx| {
                    if guides::get(tx, user)?.is_some() {
                        return Ok(false);
                    }
                    guides::insert(
                        tx,
                        &NewGuide {
                            id: user,
                            name: name.clone(),
                            city: String::new(),
                            description: String::new(),
                            experience,
                        },
                    )?;
                    let body = format!(
                        "🧳 New guide awaiting approval: <b>{}</b> ({experience} yrs), id <code>{user}</code>.\n/approve_guide {user}",
                        escape_html(&name)
                    );
                    alerts::notify_admins(tx, &self.admins, &body, now)?;
                    Ok(true)
                })?;
                if !registered {
                    return Ok("You are already registered as a guide.".to_string());
                }
                tracing::info!(user = %user, "guide registered");
                Ok(format!(
                    "Thanks, {}! Your guide profile is waiting for an administrator's approval.",
                    escape_html(&name)
                ))
            }
            Completed::Review {
                guide_id,
                rating,
                comment,
            } => {
                self.store.transaction(|tx| {
                    reviews::insert(tx, user, guide_id, rating, &comment, now)?;
                    let body = format!("⭐ New review {}\n{}", stars(rating), escape_html(&comment));
                    notifications::insert(tx, guide_id, &body, now)?;
                    Ok(())
                })?;
                tracing::info!(user = %user, guide = %guide_id, rating = rating.get(), "review saved");
                Ok("Thank you for your review!".to_string())
            }
            Completed::Request { city, keywords } => {
                let keywords = keywords.join(", ");
                self.store.transaction(|tx| {
                    requests::insert(tx, user, &city, &keywords, now)?;
                    let body = format!(
                        "📩 New travel request from <code>{user}</code>\nCity: {}\nInterests: {}",
                        escape_html(&city),
                        escape_html(&keywords)
                    );
                    alerts::notify_admins(tx, &self.admins, &body, now)
                })?;
                tracing::info!(user = %user, "travel request saved");
                Ok("Your request is saved. We'll let you know when something fits!".to_string())
            }
            Completed::AdminMessage { text } => {
                if self.admins.is_empty() {
                    tracing::warn!(user = %user, "message to admins dropped: no ADMIN_IDS configured");
                    return Ok("Sorry, no administrators are available right now.".to_string());
                }
                self.store.transaction(|tx| {
                    let body = format!(
                        "✉️ Message from user <code>{user}</code>:\n{}",
                        escape_html(&text)
                    );
                    alerts::notify_admins(tx, &self.admins, &body, now)
                })?;
                Ok("Your message was sent to the administrators.".to_string())
            }
            Completed::Excursion { draft, start } => {
                let title = draft.title.clone();
                let id: ExcursionId = self.store.transaction(|tx| {
                    let id = excursions::insert(
                        tx,
                        &NewExcursion {
                            guide_id: user,
                            title: draft.title,
                            city: draft.city,
                            theme: draft.theme,
                            description: draft.description,
                            price: draft.price,
                            dates: draft.dates,
                            keywords: draft.keywords,
                            start,
                        },
                    )?;
                    let body = format!(
                        "🗺️ New excursion awaiting approval: <b>{}</b> (#{id}) by guide <code>{user}</code>.\n/approve_excursion {id}",
                        escape_html(&title)
                    );
                    alerts::notify_admins(tx, &self.admins, &body, now)?;
                    Ok(id)
                })?;
                tracing::info!(user = %user, excursion = %id, "excursion submitted");
                Ok(format!(
                    "Excursion <b>{}</b> (#{id}) was submitted for moderation.",
                    escape_html(&title)
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        booking::BookingService,
        outbox::NotificationQueue,
        store::test_support,
    };

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn engine(store: &Store) -> Conversations {
        Conversations::new(
            store.clone(),
            Arc::new(InMemoryConversations::default()),
            vec![UserId(1)],
        )
    }

    async fn say(c: &Conversations, user: i64, text: &str) -> Reply {
        c.handle_input(UserId(user), text).await.unwrap().unwrap()
    }

    #[test]
    fn rating_outside_range_keeps_state() {
        let state = FlowState::AwaitingRating { guide_id: UserId(3) };
        let now = dt("2026-01-01 00:00");
        assert_eq!(advance(&state, "0", now), Err(Invalid::RatingOutOfRange));
        assert_eq!(advance(&state, "6", now), Err(Invalid::RatingOutOfRange));
        assert_eq!(advance(&state, "five", now), Err(Invalid::NotANumber));
        assert!(matches!(
            advance(&state, " 4 ", now),
            Ok(Transition::Next(FlowState::AwaitingComment { .. }))
        ));
    }

    #[test]
    fn experience_validation() {
        assert_eq!(parse_experience("5"), Ok(5));
        assert_eq!(parse_experience("0"), Ok(0));
        assert_eq!(parse_experience("51"), Err(Invalid::ExperienceOutOfRange));
        assert_eq!(parse_experience("-1"), Err(Invalid::ExperienceOutOfRange));
        assert_eq!(parse_experience("many"), Err(Invalid::NotANumber));
    }

    #[test]
    fn dates_need_one_future_entry() {
        let now = dt("2026-05-01 12:00");
        assert_eq!(
            parse_dates("2026-06-01 10:00, 2026-04-01 10:00, 2026-06-01 10:00", now),
            Ok(vec![dt("2026-04-01 10:00"), dt("2026-06-01 10:00")])
        );
        assert_eq!(
            parse_dates("2026-04-01 10:00", now),
            Err(Invalid::NoFutureDate)
        );
        assert_eq!(
            parse_dates("tomorrow", now),
            Err(Invalid::BadDate("tomorrow".to_string()))
        );
        assert_eq!(parse_dates(" , ", now), Err(Invalid::Empty));
    }

    #[test]
    fn location_parsing() {
        assert_eq!(parse_location("-"), Ok(None));
        assert_eq!(
            parse_location("55.75, 37.62"),
            Ok(Some(Coordinates {
                lat: 55.75,
                lon: 37.62
            }))
        );
        assert_eq!(parse_location("95, 10"), Err(Invalid::BadLocation));
        assert_eq!(parse_location("here"), Err(Invalid::BadLocation));
    }

    #[tokio::test]
    async fn registration_creates_unapproved_guide_and_alerts_admins() {
        let store = test_support::store();
        let c = engine(&store);

        assert!(c.state(UserId(3)).await.is_none());
        assert!(matches!(
            c.begin_registration(UserId(3)).await.unwrap(),
            Reply::Prompt(_)
        ));
        assert!(matches!(say(&c, 3, "Anna").await, Reply::Prompt(_)));

        // Bad experience re-prompts and keeps the collected name.
        let reply = say(&c, 3, "a lot").await;
        assert!(reply.text().contains("whole number"));
        assert_eq!(
            c.state(UserId(3)).await,
            Some(FlowState::AwaitingExperience {
                name: "Anna".to_string()
            })
        );

        assert!(matches!(say(&c, 3, "5").await, Reply::Done(_)));
        assert!(c.state(UserId(3)).await.is_none());

        {
            let conn = store.conn().unwrap();
            let g = guides::get(&conn, UserId(3)).unwrap().unwrap();
            assert_eq!(g.name, "Anna");
            assert_eq!(g.experience, 5);
            assert!(!g.approved);
        }

        let pending = store.drain_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recipient, UserId(1));

        assert!(matches!(
            c.begin_registration(UserId(3)).await.unwrap(),
            Reply::Done(_)
        ));
        assert!(c.state(UserId(3)).await.is_none());
    }

    #[tokio::test]
    async fn back_resets_to_idle_from_any_step() {
        let store = test_support::store();
        let c = engine(&store);

        c.begin_request(UserId(5)).await;
        say(&c, 5, "Kazan").await;
        assert!(c.state(UserId(5)).await.is_some());

        assert!(matches!(say(&c, 5, BACK).await, Reply::Done(_)));
        assert!(c.state(UserId(5)).await.is_none());
        assert_eq!(c.handle_input(UserId(5), "food").await.unwrap(), None);

        c.begin_admin_message(UserId(5)).await;
        say(&c, 5, "/cancel").await;
        assert!(c.state(UserId(5)).await.is_none());
        assert!(store.drain_pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn review_goes_to_guide_of_latest_booking() {
        let store = test_support::store();
        test_support::add_guide(&store, 3, true);
        test_support::add_guide(&store, 4, true);
        let older = test_support::add_excursion(&store, 3, true);
        let newer = test_support::add_excursion(&store, 4, true);
        let c = engine(&store);

        assert!(matches!(
            c.begin_review(UserId(10)).await.unwrap(),
            Reply::Done(_)
        ));

        let bookings = BookingService::new(store.clone());
        bookings.book(UserId(10), older).unwrap();
        bookings.book(UserId(10), newer).unwrap();
        store.drain_pending().unwrap().iter().for_each(|n| {
            store.mark_sent(n.id).unwrap();
        });

        c.begin_review(UserId(10)).await.unwrap();
        let reply = say(&c, 10, "9").await;
        assert!(reply.text().contains("1 to 5"));
        assert!(matches!(
            c.state(UserId(10)).await,
            Some(FlowState::AwaitingRating { guide_id: UserId(4) })
        ));
        say(&c, 10, "4").await;
        say(&c, 10, "Loved it").await;

        let conn = store.conn().unwrap();
        let g = guides::get(&conn, UserId(4)).unwrap().unwrap();
        assert_eq!(g.review_count, 1);
        assert!((g.rating - 4.0).abs() < f64::EPSILON);
        drop(conn);

        let pending = store.drain_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recipient, UserId(4));
    }

    #[tokio::test]
    async fn request_flow_saves_and_alerts_admins() {
        let store = test_support::store();
        let c = engine(&store);

        c.begin_request(UserId(10)).await;
        say(&c, 10, "Kazan").await;
        assert_eq!(say(&c, 10, " , ").await.text().lines().next(), Some("This can't be empty."));
        assert!(matches!(say(&c, 10, "History, food").await, Reply::Done(_)));

        let conn = store.conn().unwrap();
        let all = requests::all(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].city, "Kazan");
        assert_eq!(all[0].keywords, "history, food");
        drop(conn);

        assert_eq!(store.drain_pending().unwrap()[0].recipient, UserId(1));
    }

    #[tokio::test]
    async fn failed_final_write_keeps_collected_answers() {
        let store = test_support::store();
        let c = engine(&store);

        c.begin_request(UserId(10)).await;
        say(&c, 10, "Kazan").await;

        store
            .conn()
            .unwrap()
            .execute_batch("ALTER TABLE requests RENAME TO requests_off;")
            .unwrap();
        assert!(c.handle_input(UserId(10), "history").await.is_err());
        assert_eq!(
            c.state(UserId(10)).await,
            Some(FlowState::AwaitingKeywords {
                city: "Kazan".to_string()
            })
        );

        store
            .conn()
            .unwrap()
            .execute_batch("ALTER TABLE requests_off RENAME TO requests;")
            .unwrap();
        assert!(matches!(say(&c, 10, "history").await, Reply::Done(_)));
        assert!(c.state(UserId(10)).await.is_none());
        assert_eq!(requests::all(&store.conn().unwrap()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn excursion_flow_requires_guide_and_writes_unapproved_row() {
        let store = test_support::store();
        let c = engine(&store);

        assert!(matches!(
            c.begin_excursion(UserId(3)).await.unwrap(),
            Reply::Done(_)
        ));

        test_support::add_guide(&store, 3, false);
        c.begin_excursion(UserId(3)).await.unwrap();
        for input in [
            "Night Kazan",
            "Kazan",
            "history",
            "Evening walk",
            "-5",
            "1200",
            "2099-07-01 20:00",
            "Night, Lights",
            "55.79, 49.10",
        ] {
            say(&c, 3, input).await;
        }
        assert!(c.state(UserId(3)).await.is_none());

        let conn = store.conn().unwrap();
        let mine = excursions::by_guide(&conn, UserId(3)).unwrap();
        assert_eq!(mine.len(), 1);
        let e = &mine[0];
        assert_eq!(e.title, "Night Kazan");
        assert_eq!(e.price, 1200);
        assert_eq!(e.keywords, vec!["night", "lights"]);
        assert_eq!(e.start, Some(Coordinates { lat: 55.79, lon: 49.10 }));
        assert!(!e.approved);
    }
}
