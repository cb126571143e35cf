use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{InlineKeyboard, ReplyMenu},
    Result,
};

/// Outbound side of the messaging channel.
///
/// The core only ever sends; inbound updates are decoded by the adapter and
/// handed to the workflows as plain values.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// Send a message and replace the persistent reply keyboard.
    async fn send_menu(&self, chat_id: ChatId, html: &str, menu: ReplyMenu) -> Result<MessageRef>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
