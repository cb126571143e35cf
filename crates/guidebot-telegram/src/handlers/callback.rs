use std::sync::Arc;

use teloxide::prelude::*;

use guidebot_core::{
    actions::CallbackAction,
    booking::CancelOutcome,
    domain::{ChatId, UserId},
    errors::Error,
    Result,
};

use crate::router::AppState;

use super::{allow, approve_excursion, approve_guide, book, kick_dispatcher, report_error};

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let user = UserId(q.from.id.0 as i64);
    let chat = q
        .message
        .as_ref()
        .map(|m| ChatId(m.chat.id.0))
        .unwrap_or_else(|| user.chat());
    let action = q.data.as_deref().and_then(CallbackAction::parse);

    // Always answer first: the taxi lookup can outlast Telegram's patience.
    let toast = match action {
        Some(_) => None,
        None => Some("This button has expired."),
    };
    if let Err(e) = state.messenger.answer_callback_query(&q.id, toast).await {
        tracing::warn!(user = %user, error = %e, "answer_callback_query failed");
    }

    let Some(action) = action else {
        tracing::debug!(user = %user, data = ?q.data, "unknown callback data");
        return Ok(());
    };
    if !allow(&state, user, chat).await {
        return Ok(());
    }

    if let Err(e) = dispatch(&state, user, chat, action).await {
        report_error(&state, user, chat, &e).await;
    }
    Ok(())
}

async fn dispatch(state: &AppState, user: UserId, chat: ChatId, action: CallbackAction) -> Result<()> {
    tracing::debug!(user = %user, action = ?action, "callback");
    match action {
        CallbackAction::Book(excursion) => book(state, user, chat, excursion).await,
        CallbackAction::CancelBooking(booking) => {
            let text = match state.bookings.cancel(user, booking)? {
                CancelOutcome::Cancelled => {
                    kick_dispatcher(state);
                    format!("Booking #{booking} cancelled.")
                }
                CancelOutcome::AlreadyCancelled => format!("Booking #{booking} was already cancelled."),
            };
            state.messenger.send_html(chat, &text).await?;
            Ok(())
        }
        CallbackAction::Taxi(booking) => {
            let text = state.reminders.taxi(user, booking).await?;
            state.messenger.send_html(chat, &text).await?;
            Ok(())
        }
        CallbackAction::ApproveGuide(_) | CallbackAction::ApproveExcursion(_)
            if !state.cfg.is_admin(user) =>
        {
            Err(Error::Forbidden(format!("{action:?} by {user}")))
        }
        CallbackAction::ApproveGuide(guide) => approve_guide(state, chat, guide).await,
        CallbackAction::ApproveExcursion(excursion) => approve_excursion(state, chat, excursion).await,
    }
}
