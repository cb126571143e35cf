use guidebot_core::{
    domain::{ChatId, UserId},
    Result,
};

use crate::router::AppState;

use guidebot_core::conversation::Reply;

use super::{kick_dispatcher, main_menu_for, send_reply};

/// Free text: either the next answer in the user's dialog or noise.
pub(super) async fn handle_text(state: &AppState, user: UserId, chat: ChatId, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Ok(());
    }

    match state.conversations.handle_input(user, text).await? {
        Some(reply) => {
            // Finished flows usually leave notifications for admins or a guide.
            let finished = matches!(reply, Reply::Done(_));
            send_reply(state, user, chat, reply).await?;
            if finished {
                kick_dispatcher(state);
            }
            Ok(())
        }
        None => {
            let menu = main_menu_for(state, user)?;
            state
                .messenger
                .send_menu(chat, "I didn't understand that. Please use the menu below.", menu)
                .await?;
            Ok(())
        }
    }
}
