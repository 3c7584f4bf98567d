use crate::model::{Chat, NewChat, Template};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

const TEMPLATE_COLUMNS: &str =
    "id, name, version, text, parse_mode, was_sent, sent_at, created_at, updated_at";
const CHAT_COLUMNS: &str = "chat_id, type, title, is_active, joined_at, notes";

pub async fn find_template_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Template>, sqlx::Error> {
    let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE name = ?");
    sqlx::query_as::<_, Template>(&sql)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn find_template_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Template>, sqlx::Error> {
    let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?");
    sqlx::query_as::<_, Template>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn insert_template(
    conn: &mut SqliteConnection,
    name: &str,
    text: &str,
    parse_mode: &str,
    now: DateTime<Utc>,
) -> Result<Template, sqlx::Error> {
    let sql = format!(
        "INSERT INTO templates (name, version, text, parse_mode, was_sent, sent_at, created_at, updated_at) \
         VALUES (?, 1, ?, ?, 0, NULL, ?, ?) RETURNING {TEMPLATE_COLUMNS}"
    );
    sqlx::query_as::<_, Template>(&sql)
        .bind(name)
        .bind(text)
        .bind(parse_mode)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
}

/// Overwrite content, bump the version and reset sent-state.
pub async fn update_template_content(
    conn: &mut SqliteConnection,
    id: i64,
    text: &str,
    parse_mode: &str,
    now: DateTime<Utc>,
) -> Result<Template, sqlx::Error> {
    let sql = format!(
        "UPDATE templates SET version = version + 1, text = ?, parse_mode = ?, was_sent = 0, \
         sent_at = NULL, updated_at = ? WHERE id = ? RETURNING {TEMPLATE_COLUMNS}"
    );
    sqlx::query_as::<_, Template>(&sql)
        .bind(text)
        .bind(parse_mode)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *conn)
        .await
}

/// Same as [`update_template_content`] but only applies when the stored
/// version matches. Returns `None` when no row matched.
pub async fn update_template_content_if_version(
    conn: &mut SqliteConnection,
    name: &str,
    expected_version: i64,
    text: &str,
    parse_mode: &str,
    now: DateTime<Utc>,
) -> Result<Option<Template>, sqlx::Error> {
    let sql = format!(
        "UPDATE templates SET version = version + 1, text = ?, parse_mode = ?, was_sent = 0, \
         sent_at = NULL, updated_at = ? WHERE name = ? AND version = ? RETURNING {TEMPLATE_COLUMNS}"
    );
    sqlx::query_as::<_, Template>(&sql)
        .bind(text)
        .bind(parse_mode)
        .bind(now)
        .bind(name)
        .bind(expected_version)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn list_templates(
    conn: &mut SqliteConnection,
    include_sent: bool,
) -> Result<Vec<Template>, sqlx::Error> {
    let filter = if include_sent { "" } else { "WHERE was_sent = 0 " };
    let sql = format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates {filter}ORDER BY updated_at DESC, id ASC"
    );
    sqlx::query_as::<_, Template>(&sql)
        .fetch_all(&mut *conn)
        .await
}

pub async fn templates_by_ids(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<Template>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id IN ("
    ));
    push_id_list(&mut qb, ids);
    qb.push(" ORDER BY id ASC");
    qb.build_query_as::<Template>()
        .fetch_all(&mut *conn)
        .await
}

pub async fn mark_templates_sent(
    conn: &mut SqliteConnection,
    ids: &[i64],
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE templates SET was_sent = 1, sent_at = ");
    qb.push_bind(now);
    qb.push(", updated_at = ");
    qb.push_bind(now);
    qb.push(" WHERE id IN (");
    push_id_list(&mut qb, ids);
    let res = qb.build().execute(&mut *conn).await?;
    Ok(res.rows_affected())
}

pub async fn delete_templates(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM templates WHERE id IN (");
    push_id_list(&mut qb, ids);
    let res = qb.build().execute(&mut *conn).await?;
    Ok(res.rows_affected())
}

pub async fn delete_template_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM templates WHERE name = ?")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}

/// Appends `?, ?, ...)` for each id; the opening parenthesis is the caller's.
fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

pub async fn list_active_chats(conn: &mut SqliteConnection) -> Result<Vec<Chat>, sqlx::Error> {
    let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE is_active = 1 ORDER BY chat_id ASC");
    sqlx::query_as::<_, Chat>(&sql).fetch_all(&mut *conn).await
}

pub async fn find_chat(
    conn: &mut SqliteConnection,
    chat_id: i64,
) -> Result<Option<Chat>, sqlx::Error> {
    let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE chat_id = ?");
    sqlx::query_as::<_, Chat>(&sql)
        .bind(chat_id)
        .fetch_optional(&mut *conn)
        .await
}

/// Insert a chat or refresh its descriptive fields. `joined_at` and
/// `is_active` of an existing row are left alone.
pub async fn upsert_chat(
    conn: &mut SqliteConnection,
    chat: &NewChat,
    now: DateTime<Utc>,
) -> Result<Chat, sqlx::Error> {
    let sql = format!(
        "INSERT INTO chats (chat_id, type, title, is_active, joined_at, notes) VALUES (?, ?, ?, 1, ?, ?) \
         ON CONFLICT(chat_id) DO UPDATE SET type = excluded.type, \
         title = COALESCE(excluded.title, chats.title), notes = COALESCE(excluded.notes, chats.notes) \
         RETURNING {CHAT_COLUMNS}"
    );
    sqlx::query_as::<_, Chat>(&sql)
        .bind(chat.chat_id)
        .bind(&chat.kind)
        .bind(chat.title.as_deref())
        .bind(now)
        .bind(chat.notes.as_deref())
        .fetch_one(&mut *conn)
        .await
}

pub async fn set_chat_active(
    conn: &mut SqliteConnection,
    chat_id: i64,
    active: bool,
) -> Result<Option<Chat>, sqlx::Error> {
    let sql = format!("UPDATE chats SET is_active = ? WHERE chat_id = ? RETURNING {CHAT_COLUMNS}");
    sqlx::query_as::<_, Chat>(&sql)
        .bind(active)
        .bind(chat_id)
        .fetch_optional(&mut *conn)
        .await
}
