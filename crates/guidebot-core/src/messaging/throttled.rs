//! Outbound pacing for the messaging port.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, ReplyMenu},
    },
    Result,
};

/// Chats idle past their slot are forgotten once the table grows this big.
const PRUNE_ABOVE: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Gap between any two outbound calls (Telegram allows about 30/s).
    pub overall: Duration,
    /// Gap between two calls to the same chat (about 1/s).
    pub per_chat: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            overall: Duration::from_millis(40),
            per_chat: Duration::from_millis(1050),
        }
    }
}

/// Earliest free send time, overall and per chat.
#[derive(Debug)]
struct Slots {
    overall: Instant,
    chats: HashMap<ChatId, Instant>,
}

impl Slots {
    fn new(now: Instant) -> Self {
        Self {
            overall: now,
            chats: HashMap::new(),
        }
    }

    /// Claim the next slot and return how long the caller must wait for it.
    /// `None` stands for calls with no chat, which only count against the
    /// overall gap.
    fn claim(&mut self, cfg: &ThrottleConfig, chat: Option<ChatId>, now: Instant) -> Duration {
        let overall_at = self.overall.max(now);
        self.overall = overall_at + cfg.overall;

        let chat_at = match chat {
            Some(chat) => {
                let free = self.chats.get(&chat).copied().unwrap_or(now).max(now);
                self.chats.insert(chat, free + cfg.per_chat);
                free
            }
            None => now,
        };

        if self.chats.len() > PRUNE_ABOVE {
            self.chats.retain(|_, free| *free > now);
        }
        overall_at.max(chat_at) - now
    }
}

/// MessagingPort decorator that spaces out outbound calls.
///
/// A dispatcher sweep can push a burst of notifications (an excursion
/// approval fans out to every matching subscriber); this keeps that burst
/// under the platform's flood limits instead of collecting 429s.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    slots: Mutex<Slots>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            slots: Mutex::new(Slots::new(Instant::now())),
        }
    }

    async fn pace(&self, chat: Option<ChatId>) {
        let wait = self.slots.lock().await.claim(&self.cfg, chat, Instant::now());
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn send_menu(&self, chat_id: ChatId, html: &str, menu: ReplyMenu) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner.send_menu(chat_id, html, menu).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner.send_inline_keyboard(chat_id, html, keyboard).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.pace(None).await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: ThrottleConfig = ThrottleConfig {
        overall: Duration::from_millis(40),
        per_chat: Duration::from_millis(1000),
    };

    #[test]
    fn same_chat_waits_for_its_gap() {
        let t0 = Instant::now();
        let mut slots = Slots::new(t0);
        let chat = Some(ChatId(7));

        assert_eq!(slots.claim(&CFG, chat, t0), Duration::ZERO);
        assert_eq!(slots.claim(&CFG, chat, t0), Duration::from_millis(1000));
        // Third call is queued behind the second.
        let later = t0 + Duration::from_millis(1500);
        assert_eq!(slots.claim(&CFG, chat, later), Duration::from_millis(500));
    }

    #[test]
    fn other_chats_only_pay_the_overall_gap() {
        let t0 = Instant::now();
        let mut slots = Slots::new(t0);

        assert_eq!(slots.claim(&CFG, Some(ChatId(1)), t0), Duration::ZERO);
        assert_eq!(slots.claim(&CFG, Some(ChatId(2)), t0), Duration::from_millis(40));
        assert_eq!(slots.claim(&CFG, None, t0), Duration::from_millis(80));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_to_one_chat_is_spread_out() {
        let fake = Arc::new(crate::dispatcher::tests::FakeMessenger::default());
        let throttled = ThrottledMessenger::new(fake.clone(), CFG);

        let start = Instant::now();
        for text in ["a", "b", "c"] {
            throttled.send_html(ChatId(7), text).await.unwrap();
        }
        assert_eq!(fake.sent().len(), 3);
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[test]
    fn idle_chats_are_pruned() {
        let t0 = Instant::now();
        let mut slots = Slots::new(t0);
        for id in 0..=PRUNE_ABOVE as i64 {
            slots.claim(&CFG, Some(ChatId(id)), t0);
        }
        let later = t0 + Duration::from_secs(3600);
        slots.claim(&CFG, Some(ChatId(-1)), later);
        assert_eq!(slots.chats.len(), 1);
    }
}
