use chrono::Local;

use guidebot_core::{
    actions::{CallbackAction, Command},
    alerts::parse_subscription,
    domain::{ChatId, UserId},
    entities::{BookingStatus, Subscriber},
    errors::Error,
    formatting::{
        booking_line, escape_html, excursion_card, excursion_summary, greeting, guide_summary,
        request_line, stats_report,
    },
    messaging::types::InlineKeyboard,
    store::{excursions, guides, requests, stats},
    Result,
};

use crate::router::AppState;

use super::{approve_excursion, approve_guide, book, main_menu_for, send_html_split, send_reply};

/// Keeps one `/excursions` call from turning into a flood.
const MAX_CARDS: usize = 20;

const HELP_TEXT: &str = "<b>How it works</b>\n\
🗺️ /excursions: browse approved excursions and book one\n\
📅 /bookings: your bookings, with cancel and taxi buttons\n\
✍️ /review: rate the guide of your latest booking\n\
📩 /request: tell us where you'd like to go\n\
🔔 /subscribe city &lt;name&gt; | guide &lt;id&gt; | keywords &lt;a, b&gt;\n\
🔕 /unsubscribe\n\
📞 /contact: write to the administrators\n\
🧳 /register, /new_excursion, /my_excursions: for guides\n\
⬅️ /cancel: leave the current dialog";

const ADMIN_TEXT: &str = "<b>Admin panel</b>\n\
/pending: guides and excursions awaiting approval\n\
/approve_guide &lt;id&gt;\n\
/approve_excursion &lt;id&gt;\n\
/guides: all guides\n\
/stats: totals\n\
/requests: travel requests";

const SUBSCRIBE_USAGE: &str = "Usage: /subscribe city &lt;name&gt; | guide &lt;id&gt; | keywords &lt;a, b&gt;";

pub(super) async fn handle_command(state: &AppState, user: UserId, chat: ChatId, cmd: Command) -> Result<()> {
    if cmd.is_admin_only() && !state.cfg.is_admin(user) {
        return Err(Error::Forbidden(format!("{cmd:?} by {user}")));
    }
    tracing::debug!(user = %user, command = ?cmd, "command");

    match cmd {
        Command::Start => {
            state.conversations.cancel(user).await;
            let text = format!(
                "{}! 👋 I help you find excursions with local guides.\nPick an option below.",
                greeting(Local::now().naive_local())
            );
            let menu = main_menu_for(state, user)?;
            state.messenger.send_menu(chat, &text, menu).await?;
        }
        Command::Help => {
            let menu = main_menu_for(state, user)?;
            state.messenger.send_menu(chat, HELP_TEXT, menu).await?;
        }
        Command::Cancel => {
            let reply = state.conversations.cancel(user).await;
            send_reply(state, user, chat, reply).await?;
        }

        Command::Browse => browse(state, chat).await?,
        Command::Book(excursion) => book(state, user, chat, excursion).await?,
        Command::MyBookings => my_bookings(state, user, chat).await?,
        Command::Review => {
            let reply = state.conversations.begin_review(user).await?;
            send_reply(state, user, chat, reply).await?;
        }
        Command::Request => {
            let reply = state.conversations.begin_request(user).await;
            send_reply(state, user, chat, reply).await?;
        }
        Command::Contact => {
            let reply = state.conversations.begin_admin_message(user).await;
            send_reply(state, user, chat, reply).await?;
        }
        Command::Subscribe(args) => {
            let subscriber = parse_subscription(&args).and_then(|c| Subscriber::new(user, c));
            let text = match subscriber {
                Some(s) => {
                    state.moderation.subscribe(&s)?;
                    "🔔 Subscribed. You'll hear about matching excursions as soon as they're approved."
                }
                None => SUBSCRIBE_USAGE,
            };
            state.messenger.send_html(chat, text).await?;
        }
        Command::Unsubscribe => {
            let text = if state.moderation.unsubscribe(user)? {
                "🔕 Subscription removed."
            } else {
                "You have no active subscription."
            };
            state.messenger.send_html(chat, text).await?;
        }

        Command::Register => {
            let reply = state.conversations.begin_registration(user).await?;
            send_reply(state, user, chat, reply).await?;
        }
        Command::NewExcursion => {
            let reply = state.conversations.begin_excursion(user).await?;
            send_reply(state, user, chat, reply).await?;
        }
        Command::MyExcursions => my_excursions(state, user, chat).await?,

        Command::AdminPanel => {
            state.messenger.send_html(chat, ADMIN_TEXT).await?;
        }
        Command::Pending => pending(state, chat).await?,
        Command::ApproveGuide(Some(id)) => approve_guide(state, chat, id).await?,
        Command::ApproveExcursion(Some(id)) => approve_excursion(state, chat, id).await?,
        Command::ApproveGuide(None) => {
            state
                .messenger
                .send_html(chat, "Usage: /approve_guide &lt;user id&gt;")
                .await?;
        }
        Command::ApproveExcursion(None) => {
            state
                .messenger
                .send_html(chat, "Usage: /approve_excursion &lt;excursion id&gt;")
                .await?;
        }
        Command::Guides => {
            let all = {
                let conn = state.store.conn()?;
                guides::all(&conn)?
            };
            let text = if all.is_empty() {
                "No guides registered yet.".to_string()
            } else {
                let lines: Vec<String> = all.iter().map(guide_summary).collect();
                format!("🧳 <b>Guides</b>\n{}", lines.join("\n"))
            };
            send_html_split(state, chat, &text).await?;
        }
        Command::Stats => {
            let s = {
                let conn = state.store.conn()?;
                stats::collect(&conn)?
            };
            state.messenger.send_html(chat, &stats_report(&s)).await?;
        }
        Command::Requests => {
            let all = {
                let conn = state.store.conn()?;
                requests::all(&conn)?
            };
            let text = if all.is_empty() {
                "No travel requests yet.".to_string()
            } else {
                let lines: Vec<String> = all.iter().map(request_line).collect();
                format!("📩 <b>Travel requests</b>\n{}", lines.join("\n"))
            };
            send_html_split(state, chat, &text).await?;
        }
    }
    Ok(())
}

async fn browse(state: &AppState, chat: ChatId) -> Result<()> {
    let cards = {
        let conn = state.store.conn()?;
        let mut cards = Vec::new();
        for e in excursions::approved(&conn)?.into_iter().take(MAX_CARDS) {
            let guide = guides::get(&conn, e.guide_id)?;
            cards.push((e, guide));
        }
        cards
    };

    if cards.is_empty() {
        state
            .messenger
            .send_html(chat, "No excursions are available yet. Check back soon!")
            .await?;
        return Ok(());
    }

    let now = Local::now().naive_local();
    for (e, guide) in &cards {
        let keyboard = InlineKeyboard::new(vec![vec![
            CallbackAction::Book(e.id).button("📝 Book")
        ]]);
        state
            .messenger
            .send_inline_keyboard(chat, &excursion_card(e, guide.as_ref(), now), keyboard)
            .await?;
    }
    if cards.len() == MAX_CARDS {
        state
            .messenger
            .send_html(chat, "Showing the first excursions only. Use /subscribe to hear about new ones.")
            .await?;
    }
    Ok(())
}

async fn my_bookings(state: &AppState, user: UserId, chat: ChatId) -> Result<()> {
    let list = state.bookings.for_user(user)?;
    if list.is_empty() {
        state
            .messenger
            .send_html(chat, "You have no bookings yet. Browse with /excursions.")
            .await?;
        return Ok(());
    }

    for (b, excursion) in &list {
        let line = booking_line(b, excursion.as_ref());
        if b.status == BookingStatus::Confirmed {
            let keyboard = InlineKeyboard::new(vec![vec![
                CallbackAction::CancelBooking(b.id).button("❌ Cancel"),
                CallbackAction::Taxi(b.id).button("🚕 Taxi"),
            ]]);
            state.messenger.send_inline_keyboard(chat, &line, keyboard).await?;
        } else {
            state.messenger.send_html(chat, &line).await?;
        }
    }
    Ok(())
}

async fn my_excursions(state: &AppState, user: UserId, chat: ChatId) -> Result<()> {
    let (guide, list) = {
        let conn = state.store.conn()?;
        (guides::get(&conn, user)?, excursions::by_guide(&conn, user)?)
    };
    let text = match guide {
        None => "Register as a guide first (/register).".to_string(),
        Some(_) if list.is_empty() => "You have no excursions yet. Add one with /new_excursion.".to_string(),
        Some(g) => {
            let lines: Vec<String> = list.iter().map(excursion_summary).collect();
            let status = if g.approved {
                String::new()
            } else {
                "\n\n⏳ Your guide profile still awaits approval.".to_string()
            };
            format!("📋 <b>{}</b>, your excursions:\n{}{status}", escape_html(&g.name), lines.join("\n"))
        }
    };
    send_html_split(state, chat, &text).await
}

async fn pending(state: &AppState, chat: ChatId) -> Result<()> {
    let (pending_guides, pending_excursions) = {
        let conn = state.store.conn()?;
        (guides::pending(&conn)?, excursions::pending(&conn)?)
    };

    if pending_guides.is_empty() && pending_excursions.is_empty() {
        state.messenger.send_html(chat, "Nothing awaits moderation.").await?;
        return Ok(());
    }

    for g in &pending_guides {
        let keyboard = InlineKeyboard::new(vec![vec![
            CallbackAction::ApproveGuide(g.id).button("✅ Approve guide")
        ]]);
        state
            .messenger
            .send_inline_keyboard(chat, &guide_summary(g), keyboard)
            .await?;
    }
    for e in &pending_excursions {
        let keyboard = InlineKeyboard::new(vec![vec![
            CallbackAction::ApproveExcursion(e.id).button("✅ Approve excursion")
        ]]);
        state
            .messenger
            .send_inline_keyboard(chat, &excursion_summary(e), keyboard)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_lists_every_traveler_command() {
        for cmd in ["/excursions", "/bookings", "/review", "/request", "/subscribe", "/contact"] {
            assert!(HELP_TEXT.contains(cmd), "{cmd} missing from help");
            assert!(Command::parse(cmd).is_some());
        }
    }

    #[test]
    fn admin_panel_commands_are_admin_only() {
        for line in ADMIN_TEXT.lines().skip(1) {
            let cmd = line.split([':', ' ']).next().unwrap_or_default();
            let parsed = Command::parse(cmd).expect("admin command parses");
            assert!(parsed.is_admin_only(), "{cmd} should be admin-only");
        }
    }
}
