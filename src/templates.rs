//! Template store: the only writer of template rows.
//!
//! Every operation runs inside its own transaction. Creating a template whose
//! name already exists is an update: the version goes up by one, content is
//! overwritten and the sent-state is cleared.

use crate::db::{repo, Pool};
use crate::model::{Template, DEFAULT_PARSE_MODE, MAX_TEMPLATE_NAME_LEN};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("version conflict on template {name}: expected {expected}, found {actual}")]
    VersionConflict {
        name: String,
        expected: i64,
        actual: i64,
    },
    #[error("invalid template: {0}")]
    Invalid(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct TemplateStore {
    pool: Pool,
}

impl TemplateStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert a new template at version 1, or update the existing one with the
    /// same name.
    #[instrument(skip_all, fields(name = %name))]
    pub async fn create_or_update(
        &self,
        name: &str,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<Template, TemplateError> {
        let parse_mode = parse_mode.unwrap_or(DEFAULT_PARSE_MODE);
        validate(name, parse_mode)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let template = match repo::find_template_by_name(&mut tx, name).await? {
            Some(existing) => {
                repo::update_template_content(&mut tx, existing.id, text, parse_mode, now).await?
            }
            None => repo::insert_template(&mut tx, name, text, parse_mode, now).await?,
        };
        tx.commit().await?;

        info!(id = template.id, version = template.version, "template saved");
        Ok(template)
    }

    /// Update only if the stored version still equals `expected_version`.
    #[instrument(skip_all, fields(name = %name, expected_version = expected_version))]
    pub async fn update_versioned(
        &self,
        name: &str,
        expected_version: i64,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<Template, TemplateError> {
        let parse_mode = parse_mode.unwrap_or(DEFAULT_PARSE_MODE);
        validate(name, parse_mode)?;

        let mut tx = self.pool.begin().await?;
        let updated = repo::update_template_content_if_version(
            &mut tx,
            name,
            expected_version,
            text,
            parse_mode,
            Utc::now(),
        )
        .await?;
        let Some(template) = updated else {
            return match repo::find_template_by_name(&mut tx, name).await? {
                Some(current) => Err(TemplateError::VersionConflict {
                    name: name.to_string(),
                    expected: expected_version,
                    actual: current.version,
                }),
                None => Err(TemplateError::NotFound(name.to_string())),
            };
        };
        tx.commit().await?;

        info!(id = template.id, version = template.version, "template updated");
        Ok(template)
    }

    pub async fn get(&self, name: &str) -> Result<Template, TemplateError> {
        let mut conn = self.pool.acquire().await?;
        repo::find_template_by_name(&mut conn, name)
            .await?
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Template, TemplateError> {
        let mut conn = self.pool.acquire().await?;
        repo::find_template_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// Most recently touched first; ties broken by ascending id.
    pub async fn list(&self, include_sent: bool) -> Result<Vec<Template>, TemplateError> {
        let mut conn = self.pool.acquire().await?;
        Ok(repo::list_templates(&mut conn, include_sent).await?)
    }

    /// Flag the given templates as sent now. Unknown ids are skipped; an empty
    /// slice performs no writes.
    #[instrument(skip_all, fields(requested = ids.len()))]
    pub async fn mark_sent(&self, ids: &[i64]) -> Result<Vec<Template>, TemplateError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let affected = repo::mark_templates_sent(&mut tx, ids, Utc::now()).await?;
        let templates = repo::templates_by_ids(&mut tx, ids).await?;
        tx.commit().await?;

        info!(affected, "templates marked sent");
        Ok(templates)
    }

    /// Returns how many templates were actually removed.
    #[instrument(skip_all, fields(requested = ids.len()))]
    pub async fn delete(&self, ids: &[i64]) -> Result<u64, TemplateError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let deleted = repo::delete_templates(&mut tx, ids).await?;
        tx.commit().await?;

        info!(deleted, "templates deleted");
        Ok(deleted)
    }

    #[instrument(skip_all, fields(name = %name))]
    pub async fn delete_by_name(&self, name: &str) -> Result<(), TemplateError> {
        let mut tx = self.pool.begin().await?;
        if repo::delete_template_by_name(&mut tx, name).await? == 0 {
            return Err(TemplateError::NotFound(name.to_string()));
        }
        tx.commit().await?;
        info!("template deleted");
        Ok(())
    }
}

fn validate(name: &str, parse_mode: &str) -> Result<(), TemplateError> {
    if name.trim().is_empty() {
        return Err(TemplateError::Invalid("name must be non-empty"));
    }
    if name.chars().count() > MAX_TEMPLATE_NAME_LEN {
        return Err(TemplateError::Invalid("name must be at most 100 characters"));
    }
    if parse_mode.trim().is_empty() {
        return Err(TemplateError::Invalid("parse_mode must be non-empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_names() {
        assert!(matches!(
            validate("", DEFAULT_PARSE_MODE),
            Err(TemplateError::Invalid(msg)) if msg.contains("non-empty")
        ));
        assert!(matches!(
            validate("   ", DEFAULT_PARSE_MODE),
            Err(TemplateError::Invalid(_))
        ));
        let long = "x".repeat(MAX_TEMPLATE_NAME_LEN + 1);
        assert!(matches!(
            validate(&long, DEFAULT_PARSE_MODE),
            Err(TemplateError::Invalid(msg)) if msg.contains("100")
        ));
        let max = "é".repeat(MAX_TEMPLATE_NAME_LEN);
        assert!(validate(&max, DEFAULT_PARSE_MODE).is_ok());
    }

    #[test]
    fn validate_rejects_empty_parse_mode() {
        assert!(matches!(
            validate("welcome", " "),
            Err(TemplateError::Invalid(msg)) if msg.contains("parse_mode")
        ));
    }

    #[test]
    fn not_found_displays_identifier() {
        let err = TemplateError::NotFound("absent-name".into());
        assert_eq!(err.to_string(), "template not found: absent-name");
    }
}
