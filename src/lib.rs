//! Template-based message broadcaster for Telegram group chats.
//!
//! - [`templates`]: versioned message templates with sent-state tracking.
//! - [`chats`]: registry of broadcast targets.
//! - [`broadcast`]: dry-run previews and live sends.
//! - [`telegram`]: the outbound messaging client.

pub mod broadcast;
pub mod chats;
pub mod config;
pub mod db;
pub mod model;
pub mod telegram;
pub mod templates;
