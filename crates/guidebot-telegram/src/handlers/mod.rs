//! Telegram update handlers.
//!
//! Each handler is a small adapter that:
//! - applies the per-user rate limit
//! - decodes the update into a core action (command, flow input, callback)
//! - calls into the `guidebot-core` workflows
//!
//! Errors never escape a handler: they are logged and turned into a short
//! message for the user who triggered them.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use guidebot_core::{
    actions::{self, CallbackAction, Command},
    conversation::Reply,
    domain::{ChatId, ExcursionId, UserId},
    errors::Error,
    messaging::types::{InlineKeyboard, ReplyMenu},
    store::guides,
    Result,
};

use crate::router::AppState;
mod callback;
mod commands;
mod text;

/// Telegram caps a message at 4096 characters; stay clear of it.
const SAFE_MESSAGE_LEN: usize = 3900;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let user = UserId(from.id.0 as i64);
    let chat = ChatId(msg.chat.id.0);

    if !allow(&state, user, chat).await {
        return Ok(());
    }

    let result = match msg.text() {
        Some(text) => match Command::parse(text) {
            Some(cmd) => commands::handle_command(&state, user, chat, cmd).await,
            None => text::handle_text(&state, user, chat, text).await,
        },
        None => {
            state
                .messenger
                .send_html(chat, "I only understand text messages. Use the menu below.")
                .await
                .map(|_| ())
        }
    };

    if let Err(e) = result {
        report_error(&state, user, chat, &e).await;
    }
    Ok(())
}

/// Rate-limit gate. Tells the user how long to wait when over the limit.
async fn allow(state: &AppState, user: UserId, chat: ChatId) -> bool {
    let verdict = state.rate_limiter.lock().await.check(user);
    let Err(retry_after) = verdict else {
        return true;
    };
    tracing::warn!(user = %user, retry_after = ?retry_after, "rate limited");
    let text = format!(
        "⏳ Too many requests. Please wait {:.0}s.",
        retry_after.as_secs_f64().ceil()
    );
    if let Err(e) = state.messenger.send_html(chat, &text).await {
        tracing::warn!(user = %user, error = %e, "failed to deliver rate-limit notice");
    }
    false
}

/// Handler error boundary: log with context, answer with something human.
pub(crate) async fn report_error(state: &AppState, user: UserId, chat: ChatId, err: &Error) {
    let text = match err {
        Error::NotFound { .. } => {
            tracing::warn!(user = %user, error = %err, "requested item not found");
            "😔 Sorry, that item was not found or is no longer available."
        }
        Error::Forbidden(_) => {
            tracing::warn!(user = %user, error = %err, "forbidden");
            "⛔ This action is only available to administrators."
        }
        _ => {
            tracing::error!(user = %user, error = %err, "handler failed");
            "⚠️ Something went wrong. Please try again later."
        }
    };
    if let Err(e) = state.messenger.send_html(chat, text).await {
        tracing::warn!(user = %user, error = %e, "failed to deliver error message");
    }
}

pub(crate) fn main_menu_for(state: &AppState, user: UserId) -> Result<ReplyMenu> {
    let is_guide = {
        let conn = state.store.conn()?;
        guides::get(&conn, user)?.is_some()
    };
    Ok(actions::main_menu(is_guide, state.cfg.is_admin(user)))
}

/// Prompts keep the back button up; finished flows bring the main menu back.
pub(crate) async fn send_reply(state: &AppState, user: UserId, chat: ChatId, reply: Reply) -> Result<()> {
    let menu = match &reply {
        Reply::Prompt(_) => actions::back_menu(),
        Reply::Done(_) => main_menu_for(state, user)?,
    };
    state.messenger.send_menu(chat, reply.text(), menu).await?;
    Ok(())
}

/// Deliver freshly queued notifications now instead of on the next tick.
pub(crate) fn kick_dispatcher(state: &AppState) {
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        match dispatcher.flush().await {
            Ok(report) if !report.is_empty() => {
                tracing::debug!(
                    delivered = report.delivered,
                    failed = report.failed,
                    "immediate flush"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "immediate flush failed"),
        }
    });
}

/// Book, queue the reminder, confirm with cancel/taxi buttons.
pub(crate) async fn book(state: &AppState, user: UserId, chat: ChatId, excursion: ExcursionId) -> Result<()> {
    let booking = state.bookings.book(user, excursion)?;

    // The booking stands even if the reminder cannot be composed.
    if let Err(e) = state.reminders.schedule(user, booking).await {
        tracing::error!(user = %user, booking = %booking, error = %e, "reminder not queued");
    }

    let keyboard = InlineKeyboard::new(vec![vec![
        CallbackAction::CancelBooking(booking).button("❌ Cancel booking"),
        CallbackAction::Taxi(booking).button("🚕 Taxi"),
    ]]);
    state
        .messenger
        .send_inline_keyboard(
            chat,
            &format!("✅ Booked! Your booking number is #{booking}. A reminder with the details follows."),
            keyboard,
        )
        .await?;
    kick_dispatcher(state);
    Ok(())
}

pub(crate) async fn approve_guide(state: &AppState, chat: ChatId, guide: UserId) -> Result<()> {
    let text = if state.moderation.approve_guide(guide)? {
        kick_dispatcher(state);
        format!("✅ Guide <code>{guide}</code> approved.")
    } else {
        format!("Guide <code>{guide}</code> was already approved.")
    };
    state.messenger.send_html(chat, &text).await?;
    Ok(())
}

pub(crate) async fn approve_excursion(state: &AppState, chat: ChatId, excursion: ExcursionId) -> Result<()> {
    let text = match state.moderation.approve_excursion(excursion)? {
        Some(alerted) => {
            kick_dispatcher(state);
            format!("✅ Excursion #{excursion} approved. Subscribers alerted: {alerted}.")
        }
        None => format!("Excursion #{excursion} was already approved."),
    };
    state.messenger.send_html(chat, &text).await?;
    Ok(())
}

/// Send a long listing as several messages, breaking between lines.
pub(crate) async fn send_html_split(state: &AppState, chat: ChatId, html: &str) -> Result<()> {
    for chunk in split_chunks(html, SAFE_MESSAGE_LEN) {
        state.messenger.send_html(chat, &chunk).await?;
    }
    Ok(())
}

fn split_chunks(text: &str, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut chunk = String::new();
    for line in text.lines().flat_map(|l| hard_wrap(l, limit)) {
        if !chunk.is_empty() && chunk.chars().count() + line.chars().count() + 1 > limit {
            out.push(std::mem::take(&mut chunk));
        }
        if !chunk.is_empty() {
            chunk.push('\n');
        }
        chunk.push_str(line);
    }
    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}

/// Cut a line longer than `limit` characters on char boundaries.
fn hard_wrap(line: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = line;
    while rest.chars().count() > limit {
        let cut = rest.char_indices().nth(limit).map_or(rest.len(), |(i, _)| i);
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_chunks("a\nb", 100), vec!["a\nb".to_string()]);
        assert!(split_chunks("", 100).is_empty());
    }

    #[test]
    fn breaks_only_between_lines() {
        let text = ["aaaa", "bbbb", "cccc"].join("\n");
        let chunks = split_chunks(&text, 9);
        assert_eq!(chunks, vec!["aaaa\nbbbb".to_string(), "cccc".to_string()]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 9));
    }

    #[test]
    fn overlong_line_is_cut_to_the_limit() {
        let name = "Ж".repeat(25);
        let text = format!("head\n{name}");
        let chunks = split_chunks(&text, 10);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), format!("head{name}"));
        assert_eq!(chunks.len(), 4);
    }
}
