use crate::{bool_from_any_row, datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub is_private: bool,
    pub password_hash: Option<String>,
    pub owner_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for RoomRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            is_private: bool_from_any_row(row, "is_private")?,
            password_hash: row.try_get("password_hash")?,
            owner_id: row.try_get("owner_id")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

const ROOM_COLUMNS: &str = "id, slug, name, is_private, password_hash, owner_id, created_at";

/// A room is private exactly when it carries a password hash.
pub async fn create_room(
    pool: &DbPool,
    id: i64,
    slug: &str,
    name: &str,
    password_hash: Option<&str>,
    owner_id: Option<i64>,
) -> Result<RoomRow, DbError> {
    let is_private: i32 = if password_hash.is_some() { 1 } else { 0 };
    let row = sqlx::query_as::<_, RoomRow>(&format!(
        "INSERT INTO rooms (id, slug, name, is_private, password_hash, owner_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {ROOM_COLUMNS}"
    ))
    .bind(id)
    .bind(slug)
    .bind(name)
    .bind(is_private)
    .bind(password_hash)
    .bind(owner_id)
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_room_by_slug(pool: &DbPool, slug: &str) -> Result<Option<RoomRow>, DbError> {
    let row = sqlx::query_as::<_, RoomRow>(&format!(
        "SELECT {ROOM_COLUMNS} FROM rooms WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_room_by_id(pool: &DbPool, id: i64) -> Result<Option<RoomRow>, DbError> {
    let row = sqlx::query_as::<_, RoomRow>(&format!(
        "SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Plan of the user who owns the room, if the room has a known owner.
pub async fn get_room_owner_plan(pool: &DbPool, room_id: i64) -> Result<Option<String>, DbError> {
    let plan: Option<String> = sqlx::query_scalar(
        "SELECT u.plan FROM rooms r INNER JOIN users u ON u.id = r.owner_id WHERE r.id = $1",
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await?;
    Ok(plan)
}
