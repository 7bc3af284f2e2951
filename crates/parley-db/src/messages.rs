use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub room_id: i64,
    pub username: String,
    pub user_id: Option<i64>,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MessageRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            room_id: row.try_get("room_id")?,
            username: row.try_get("username")?,
            user_id: row.try_get("user_id")?,
            content: row.try_get("content")?,
            message_type: row.try_get("message_type")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, room_id, username, user_id, content, message_type, created_at";

pub async fn create_message(
    pool: &DbPool,
    id: i64,
    room_id: i64,
    username: &str,
    user_id: Option<i64>,
    content: &str,
    message_type: &str,
) -> Result<MessageRow, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "INSERT INTO messages (id, room_id, username, user_id, content, message_type, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(id)
    .bind(room_id)
    .bind(username)
    .bind(user_id)
    .bind(content)
    .bind(message_type)
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Newest first. `before` pages backwards by message id.
pub async fn get_room_messages(
    pool: &DbPool,
    room_id: i64,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = if let Some(before_id) = before {
        sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room_id = $1 AND id < $2
             ORDER BY id DESC
             LIMIT $3"
        ))
        .bind(room_id)
        .bind(before_id)
        .bind(limit)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room_id = $1
             ORDER BY id DESC
             LIMIT $2"
        ))
        .bind(room_id)
        .bind(limit)
        .fetch_all(pool)
        .await?
    };
    Ok(rows)
}

pub async fn count_room_messages(pool: &DbPool, room_id: i64) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE room_id = $1")
        .bind(room_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
