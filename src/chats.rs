//! Chat registry: the set of Telegram chats a broadcast can target.

use crate::db::{repo, Pool};
use crate::model::{Chat, NewChat, MAX_CHAT_KIND_LEN, MAX_CHAT_NOTES_LEN};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat not found: {0}")]
    NotFound(i64),
    #[error("invalid chat: {0}")]
    Invalid(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Known broadcast targets. The dispatcher never writes here; registration
/// goes through [`ChatRegistry::upsert`] and [`ChatRegistry::set_active`].
#[derive(Debug, Clone)]
pub struct ChatRegistry {
    pool: Pool,
}

impl ChatRegistry {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Active chats ordered by chat id.
    pub async fn list_active(&self) -> Result<Vec<Chat>, ChatError> {
        let mut conn = self.pool.acquire().await?;
        Ok(repo::list_active_chats(&mut conn).await?)
    }

    pub async fn get(&self, chat_id: i64) -> Result<Chat, ChatError> {
        let mut conn = self.pool.acquire().await?;
        repo::find_chat(&mut conn, chat_id)
            .await?
            .ok_or(ChatError::NotFound(chat_id))
    }

    #[instrument(skip_all, fields(chat_id = chat.chat_id))]
    pub async fn upsert(&self, chat: &NewChat) -> Result<Chat, ChatError> {
        let kind = chat.kind.trim();
        if kind.is_empty() || kind.chars().count() > MAX_CHAT_KIND_LEN {
            return Err(ChatError::Invalid("type must be 1..=32 characters"));
        }
        if chat
            .notes
            .as_deref()
            .is_some_and(|n| n.chars().count() > MAX_CHAT_NOTES_LEN)
        {
            return Err(ChatError::Invalid("notes must be at most 255 characters"));
        }

        let chat = NewChat {
            kind: kind.to_string(),
            ..chat.clone()
        };
        let mut tx = self.pool.begin().await?;
        let saved = repo::upsert_chat(&mut tx, &chat, Utc::now()).await?;
        tx.commit().await?;
        info!(kind = %saved.kind, "chat registered");
        Ok(saved)
    }

    #[instrument(skip_all, fields(chat_id = chat_id, active = active))]
    pub async fn set_active(&self, chat_id: i64, active: bool) -> Result<Chat, ChatError> {
        let mut tx = self.pool.begin().await?;
        let chat = repo::set_chat_active(&mut tx, chat_id, active)
            .await?
            .ok_or(ChatError::NotFound(chat_id))?;
        tx.commit().await?;
        info!("chat activity changed");
        Ok(chat)
    }
}
