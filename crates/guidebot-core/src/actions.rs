//! Everything a user can trigger: slash commands, main-menu buttons and
//! inline-button callbacks, decoded into typed actions.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    conversation::BACK,
    domain::{BookingId, ExcursionId, UserId},
    messaging::types::{InlineButton, ReplyMenu},
};

pub const BROWSE: &str = "🗺️ Excursions";
pub const MY_BOOKINGS: &str = "📅 My bookings";
pub const LEAVE_REVIEW: &str = "✍️ Leave a review";
pub const LEAVE_REQUEST: &str = "📩 Leave a request";
pub const BECOME_GUIDE: &str = "🧳 Become a guide";
pub const ADD_EXCURSION: &str = "➕ Add excursion";
pub const MY_EXCURSIONS: &str = "📋 My excursions";
pub const CONTACT_ADMIN: &str = "📞 Contact admin";
pub const ADMIN_PANEL: &str = "🔧 Admin panel";
pub const HELP: &str = "📚 Help";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
    // Traveler
    Browse,
    Book(ExcursionId),
    MyBookings,
    Review,
    Request,
    Subscribe(String),
    Unsubscribe,
    Contact,
    // Guide
    Register,
    NewExcursion,
    MyExcursions,
    // Admin
    AdminPanel,
    Pending,
    ApproveGuide(Option<UserId>),
    ApproveExcursion(Option<ExcursionId>),
    Guides,
    Stats,
    Requests,
}

impl Command {
    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Self::AdminPanel
                | Self::Pending
                | Self::ApproveGuide(_)
                | Self::ApproveExcursion(_)
                | Self::Guides
                | Self::Stats
                | Self::Requests
        )
    }

    /// Decode a slash command or a main-menu label. `None` for free text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(cmd) = Self::from_menu_label(text) {
            return Some(cmd);
        }
        if let Some(id) = parse_book_link(text) {
            return Some(Self::Book(id));
        }

        let rest = text.strip_prefix('/')?;
        let (head, args) = rest
            .split_once(char::is_whitespace)
            .map(|(h, a)| (h, a.trim()))
            .unwrap_or((rest, ""));
        // `/cmd@SomeBot` in group chats.
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        Some(match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "cancel" => Self::Cancel,
            "excursions" => Self::Browse,
            "bookings" => Self::MyBookings,
            "review" => Self::Review,
            "request" => Self::Request,
            "subscribe" => Self::Subscribe(args.to_string()),
            "unsubscribe" => Self::Unsubscribe,
            "contact" => Self::Contact,
            "register" => Self::Register,
            "new_excursion" => Self::NewExcursion,
            "my_excursions" => Self::MyExcursions,
            "admin" => Self::AdminPanel,
            "pending" => Self::Pending,
            "approve_guide" => Self::ApproveGuide(args.parse().ok().map(UserId)),
            "approve_excursion" => Self::ApproveExcursion(args.parse().ok().map(ExcursionId)),
            "guides" => Self::Guides,
            "stats" => Self::Stats,
            "requests" => Self::Requests,
            _ => return None,
        })
    }

    fn from_menu_label(text: &str) -> Option<Self> {
        Some(match text {
            BROWSE => Self::Browse,
            MY_BOOKINGS => Self::MyBookings,
            LEAVE_REVIEW => Self::Review,
            LEAVE_REQUEST => Self::Request,
            BECOME_GUIDE => Self::Register,
            ADD_EXCURSION => Self::NewExcursion,
            MY_EXCURSIONS => Self::MyExcursions,
            CONTACT_ADMIN => Self::Contact,
            ADMIN_PANEL => Self::AdminPanel,
            HELP => Self::Help,
            BACK => Self::Cancel,
            _ => return None,
        })
    }
}

/// `/book_<id>` deep link, as sent in new-excursion alerts.
pub fn parse_book_link(text: &str) -> Option<ExcursionId> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^/book_(\d+)(?:@\w+)?$").expect("valid regex"));
    let caps = re.captures(text.trim())?;
    caps.get(1)?.as_str().parse().ok().map(ExcursionId)
}

/// Main reply keyboard. Guide and admin rows only for those roles.
pub fn main_menu(is_guide: bool, is_admin: bool) -> ReplyMenu {
    let s = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let mut rows = vec![
        s(&[BROWSE, MY_BOOKINGS]),
        s(&[LEAVE_REVIEW, LEAVE_REQUEST]),
    ];
    if is_guide {
        rows.push(s(&[ADD_EXCURSION, MY_EXCURSIONS]));
    } else {
        rows.push(s(&[BECOME_GUIDE]));
    }
    rows.push(s(&[CONTACT_ADMIN, HELP]));
    if is_admin {
        rows.push(s(&[ADMIN_PANEL]));
    }
    ReplyMenu::new(rows)
}

/// Keyboard shown while a flow is waiting for input.
pub fn back_menu() -> ReplyMenu {
    ReplyMenu::new(vec![vec![BACK.to_string()]])
}

/// Inline-button payloads. Encoded as `kind:id`, well under Telegram's 64 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Book(ExcursionId),
    CancelBooking(BookingId),
    Taxi(BookingId),
    ApproveGuide(UserId),
    ApproveExcursion(ExcursionId),
}

impl CallbackAction {
    pub fn encode(self) -> String {
        match self {
            Self::Book(id) => format!("book:{id}"),
            Self::CancelBooking(id) => format!("cancel:{id}"),
            Self::Taxi(id) => format!("taxi:{id}"),
            Self::ApproveGuide(id) => format!("approve_guide:{id}"),
            Self::ApproveExcursion(id) => format!("approve_exc:{id}"),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (kind, id) = data.split_once(':')?;
        let id: i64 = id.parse().ok()?;
        Some(match kind {
            "book" => Self::Book(ExcursionId(id)),
            "cancel" => Self::CancelBooking(BookingId(id)),
            "taxi" => Self::Taxi(BookingId(id)),
            "approve_guide" => Self::ApproveGuide(UserId(id)),
            "approve_exc" => Self::ApproveExcursion(ExcursionId(id)),
            _ => return None,
        })
    }

    pub fn button(self, label: impl Into<String>) -> InlineButton {
        InlineButton::new(label, self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_menu_labels() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/stats@GuideBot"), Some(Command::Stats));
        assert_eq!(Command::parse(BROWSE), Some(Command::Browse));
        assert_eq!(Command::parse(BACK), Some(Command::Cancel));
        assert_eq!(
            Command::parse("/approve_guide 42"),
            Some(Command::ApproveGuide(Some(UserId(42))))
        );
        assert_eq!(
            Command::parse("/approve_excursion"),
            Some(Command::ApproveExcursion(None))
        );
        assert_eq!(
            Command::parse("/subscribe city Kazan"),
            Some(Command::Subscribe("city Kazan".to_string()))
        );
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("Kazan"), None);
    }

    #[test]
    fn book_deep_link() {
        assert_eq!(parse_book_link("/book_7"), Some(ExcursionId(7)));
        assert_eq!(parse_book_link("/book_7@GuideBot"), Some(ExcursionId(7)));
        assert_eq!(parse_book_link("/book_x"), None);
        assert_eq!(Command::parse("/book_12"), Some(Command::Book(ExcursionId(12))));
    }

    #[test]
    fn callback_data() {
        for action in [
            CallbackAction::Book(ExcursionId(7)),
            CallbackAction::CancelBooking(BookingId(3)),
            CallbackAction::ApproveExcursion(ExcursionId(9)),
        ] {
            assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
        }
        assert_eq!(CallbackAction::parse("askuser:1:2"), None);
        assert_eq!(CallbackAction::parse("book:seven"), None);
    }

    #[test]
    fn admin_row_only_for_admins() {
        let has_admin = |m: &ReplyMenu| m.rows.iter().flatten().any(|b| b == ADMIN_PANEL);
        assert!(!has_admin(&main_menu(false, false)));
        assert!(has_admin(&main_menu(false, true)));
        assert!(main_menu(true, false)
            .rows
            .iter()
            .flatten()
            .any(|b| b == ADD_EXCURSION));
    }
}
