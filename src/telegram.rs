//! Outbound messaging client. The dispatcher only sees the [`Messenger`]
//! trait; [`TelegramMessenger`] is the teloxide-backed implementation.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::fmt;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver `text` to `chat_id`. Errors are reported as-is; no retry.
    async fn send(&self, chat_id: i64, text: &str, parse_mode: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl fmt::Debug for TelegramMessenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramMessenger").finish_non_exhaustive()
    }
}

impl TelegramMessenger {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, chat_id: i64, text: &str, parse_mode: &str) -> Result<()> {
        let mut request = self.bot.send_message(ChatId(chat_id), text.to_string());
        if let Some(mode) = resolve_parse_mode(parse_mode)? {
            request = request.parse_mode(mode);
        }
        request
            .await
            .with_context(|| format!("telegram sendMessage to chat {chat_id} failed"))?;
        Ok(())
    }
}

/// Map a stored parse-mode name onto the Bot API value, ignoring case the
/// way the Bot API does. `None` (or `plain`) sends unformatted text.
#[allow(deprecated)]
pub fn resolve_parse_mode(name: &str) -> Result<Option<ParseMode>> {
    let name = name.trim();
    if name.eq_ignore_ascii_case("MarkdownV2") {
        Ok(Some(ParseMode::MarkdownV2))
    } else if name.eq_ignore_ascii_case("HTML") {
        Ok(Some(ParseMode::Html))
    } else if name.eq_ignore_ascii_case("Markdown") {
        Ok(Some(ParseMode::Markdown))
    } else if name.eq_ignore_ascii_case("none") || name.eq_ignore_ascii_case("plain") {
        Ok(None)
    } else {
        Err(anyhow!("unsupported parse mode: {name}"))
    }
}
