//! Broadcast dispatcher.
//!
//! Resolves templates and target chats into previews or deliveries. Sends
//! are strictly sequential in template-major order; there is no retry and no
//! rate limiting here.

use crate::model::{BatchReport, BroadcastResult, PairOutcome, Template};
use crate::telegram::Messenger;
use crate::templates::{TemplateError, TemplateStore};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("delivery to chat {chat_id} failed")]
    Delivery {
        chat_id: i64,
        #[source]
        source: anyhow::Error,
    },
    #[error("{0} must not be empty")]
    EmptySelection(&'static str),
}

#[derive(Clone)]
pub struct Dispatcher {
    store: TemplateStore,
    messenger: Arc<dyn Messenger>,
}

impl Dispatcher {
    pub fn new(store: TemplateStore, messenger: Arc<dyn Messenger>) -> Self {
        Self { store, messenger }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Preview or send one template to one chat.
    ///
    /// A non-empty `override_text` replaces the body; the template's parse
    /// mode is always kept. Dry runs never touch the messenger.
    #[instrument(skip_all, fields(template = %template_name, chat_id = chat_id, dry_run = dry_run))]
    pub async fn dispatch_one(
        &self,
        template_name: &str,
        chat_id: i64,
        override_text: Option<&str>,
        dry_run: bool,
    ) -> Result<BroadcastResult, BroadcastError> {
        let template = self.store.get(template_name).await?;
        let text = override_text
            .filter(|t| !t.is_empty())
            .unwrap_or(&template.text)
            .to_string();

        if !dry_run {
            self.deliver(&template, chat_id, &text).await?;
        }

        Ok(BroadcastResult {
            template_name: template.name,
            chat_id,
            text,
            dry_run,
        })
    }

    /// Send every template to every chat, then mark all templates sent.
    ///
    /// All-or-nothing: the first delivery failure aborts the batch and nothing
    /// is marked sent, although messages already delivered stay delivered.
    #[instrument(skip_all, fields(templates = template_ids.len(), chats = chat_ids.len()))]
    pub async fn dispatch_many(
        &self,
        template_ids: &[i64],
        chat_ids: &[i64],
    ) -> Result<Vec<Template>, BroadcastError> {
        let templates = self.resolve(template_ids, chat_ids).await?;

        for template in &templates {
            for &chat_id in chat_ids {
                self.deliver(template, chat_id, &template.text).await?;
            }
        }

        let sent = self.store.mark_sent(template_ids).await?;
        info!(sent = sent.len(), "batch delivered");
        Ok(sent)
    }

    /// Like [`Dispatcher::dispatch_many`], but a failed pair does not stop
    /// the loop. Only templates delivered to every chat are marked sent.
    #[instrument(skip_all, fields(templates = template_ids.len(), chats = chat_ids.len()))]
    pub async fn dispatch_many_isolated(
        &self,
        template_ids: &[i64],
        chat_ids: &[i64],
    ) -> Result<BatchReport, BroadcastError> {
        let templates = self.resolve(template_ids, chat_ids).await?;

        let mut outcomes = Vec::with_capacity(templates.len() * chat_ids.len());
        for template in &templates {
            for &chat_id in chat_ids {
                let error = match self.deliver(template, chat_id, &template.text).await {
                    Ok(()) => None,
                    Err(err) => {
                        let reason = match &err {
                            BroadcastError::Delivery { source, .. } => format!("{source:#}"),
                            other => other.to_string(),
                        };
                        warn!(template = %template.name, chat_id, error = %reason, "pair failed");
                        Some(reason)
                    }
                };
                outcomes.push(PairOutcome {
                    template_id: template.id,
                    template_name: template.name.clone(),
                    chat_id,
                    error,
                });
            }
        }

        let failed: HashSet<i64> = outcomes
            .iter()
            .filter(|o| !o.is_delivered())
            .map(|o| o.template_id)
            .collect();
        let delivered: Vec<i64> = templates
            .iter()
            .map(|t| t.id)
            .filter(|id| !failed.contains(id))
            .collect();

        let sent = self.store.mark_sent(&delivered).await?;
        info!(
            sent = sent.len(),
            failed_templates = failed.len(),
            "isolated batch finished"
        );
        Ok(BatchReport { outcomes, sent })
    }

    /// Send an already loaded template. Batches call this directly so a
    /// template changed or removed mid-loop does not affect later pairs.
    async fn deliver(
        &self,
        template: &Template,
        chat_id: i64,
        text: &str,
    ) -> Result<(), BroadcastError> {
        self.messenger
            .send(chat_id, text, &template.parse_mode)
            .await
            .map_err(|source| BroadcastError::Delivery { chat_id, source })?;
        info!(template = %template.name, chat_id, "message delivered");
        Ok(())
    }

    /// Load every requested template up front so a bad id fails before any
    /// message goes out.
    async fn resolve(
        &self,
        template_ids: &[i64],
        chat_ids: &[i64],
    ) -> Result<Vec<Template>, BroadcastError> {
        if template_ids.is_empty() {
            return Err(BroadcastError::EmptySelection("template_ids"));
        }
        if chat_ids.is_empty() {
            return Err(BroadcastError::EmptySelection("chat_ids"));
        }
        let mut templates = Vec::with_capacity(template_ids.len());
        for &id in template_ids {
            templates.push(self.store.get_by_id(id).await?);
        }
        Ok(templates)
    }
}
