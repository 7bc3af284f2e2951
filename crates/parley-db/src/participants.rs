use crate::{datetime_from_db_text, datetime_to_db_text, is_unique_violation, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub id: i64,
    pub room_id: i64,
    pub username: String,
    pub user_id: Option<i64>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ParticipantRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let joined_at_raw: String = row.try_get("joined_at")?;
        let last_seen_raw: String = row.try_get("last_seen")?;
        Ok(Self {
            id: row.try_get("id")?,
            room_id: row.try_get("room_id")?,
            username: row.try_get("username")?,
            user_id: row.try_get("user_id")?,
            role: row.try_get("role")?,
            joined_at: datetime_from_db_text(&joined_at_raw)?,
            last_seen: datetime_from_db_text(&last_seen_raw)?,
        })
    }
}

const PARTICIPANT_COLUMNS: &str = "id, room_id, username, user_id, role, joined_at, last_seen";

#[derive(Debug, Clone)]
pub struct NewParticipant<'a> {
    pub id: i64,
    pub room_id: i64,
    pub username: &'a str,
    pub user_id: Option<i64>,
    pub role: &'a str,
    pub joined_at: DateTime<Utc>,
}

pub async fn get_participant(
    pool: &DbPool,
    room_id: i64,
    username: &str,
) -> Result<Option<ParticipantRow>, DbError> {
    let row = sqlx::query_as::<_, ParticipantRow>(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE room_id = $1 AND username = $2"
    ))
    .bind(room_id)
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// All member rows of a room in join order.
pub async fn list_participants(
    pool: &DbPool,
    room_id: i64,
) -> Result<Vec<ParticipantRow>, DbError> {
    let rows = sqlx::query_as::<_, ParticipantRow>(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM participants
         WHERE room_id = $1
         ORDER BY joined_at, id"
    ))
    .bind(room_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Insert a member row, first deleting `replace_id` when given, in one
/// transaction.
///
/// Returns `Ok(None)` when the name is held by a row other than the one being
/// replaced: either the replaced row has already gone, or the insert lost a
/// race on UNIQUE(room_id, username).
pub async fn insert_participant_replacing(
    pool: &DbPool,
    replace_id: Option<i64>,
    new: &NewParticipant<'_>,
) -> Result<Option<ParticipantRow>, DbError> {
    let mut tx = pool.begin().await?;

    if let Some(old_id) = replace_id {
        let deleted = sqlx::query("DELETE FROM participants WHERE id = $1 AND room_id = $2")
            .bind(old_id)
            .bind(new.room_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
    }

    let joined_at = datetime_to_db_text(new.joined_at);
    let inserted = sqlx::query_as::<_, ParticipantRow>(&format!(
        "INSERT INTO participants (id, room_id, username, user_id, role, joined_at, last_seen)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {PARTICIPANT_COLUMNS}"
    ))
    .bind(new.id)
    .bind(new.room_id)
    .bind(new.username)
    .bind(new.user_id)
    .bind(new.role)
    .bind(joined_at.clone())
    .bind(joined_at)
    .fetch_one(&mut *tx)
    .await;

    match inserted {
        Ok(row) => {
            tx.commit().await?;
            Ok(Some(row))
        }
        Err(err) if is_unique_violation(&err) => {
            tx.rollback().await?;
            Ok(None)
        }
        Err(err) => Err(DbError::Sqlx(err)),
    }
}

pub async fn touch_last_seen(
    pool: &DbPool,
    room_id: i64,
    username: &str,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE participants SET last_seen = $3 WHERE room_id = $1 AND username = $2")
        .bind(room_id)
        .bind(username)
        .bind(datetime_to_db_text(at))
        .execute(pool)
        .await?;
    Ok(())
}
