//! Rows and result types shared by the store, registry and dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PARSE_MODE: &str = "MarkdownV2";
pub const DEFAULT_CHAT_KIND: &str = "group";

pub const MAX_TEMPLATE_NAME_LEN: usize = 100;
pub const MAX_CHAT_KIND_LEN: usize = 32;
pub const MAX_CHAT_NOTES_LEN: usize = 255;

/// A reusable broadcast message. `name` is unique; `version` starts at 1 and
/// increases by one on every content update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub version: i64,
    pub text: String,
    pub parse_mode: String,
    pub was_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A broadcast target, keyed by the platform-assigned chat id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Chat {
    pub chat_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl Chat {
    /// Title for display, falling back to the numeric id.
    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.chat_id.to_string())
    }
}

/// Input for registering or updating a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChat {
    pub chat_id: i64,
    pub kind: String,
    pub title: Option<String>,
    pub notes: Option<String>,
}

impl NewChat {
    pub fn group(chat_id: i64) -> Self {
        Self {
            chat_id,
            kind: DEFAULT_CHAT_KIND.to_string(),
            title: None,
            notes: None,
        }
    }
}

/// Outcome of a single dispatch: what was (or would be) sent, and where.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastResult {
    pub template_name: String,
    pub chat_id: i64,
    pub text: String,
    pub dry_run: bool,
}

/// Result of one (template, chat) pair inside an isolated batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairOutcome {
    pub template_id: i64,
    pub template_name: String,
    pub chat_id: i64,
    pub error: Option<String>,
}

impl PairOutcome {
    pub fn is_delivered(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<PairOutcome>,
    /// Templates marked sent because every target chat succeeded.
    pub sent: Vec<Template>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &PairOutcome> {
        self.outcomes.iter().filter(|o| !o.is_delivered())
    }
}
