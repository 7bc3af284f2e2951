use crate::{
    bool_from_any_row, datetime_from_db_text, datetime_to_db_text, optional_datetime, DbError,
    DbPool,
};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct FileShareRow {
    pub id: i64,
    pub share_token: String,
    pub room_id: i64,
    pub owner_username: String,
    pub owner_user_id: Option<i64>,
    pub file_path: Option<String>,
    pub file_name: String,
    pub file_content: String,
    pub file_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for FileShareRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            share_token: row.try_get("share_token")?,
            room_id: row.try_get("room_id")?,
            owner_username: row.try_get("owner_username")?,
            owner_user_id: row.try_get("owner_user_id")?,
            file_path: row.try_get("file_path")?,
            file_name: row.try_get("file_name")?,
            file_content: row.try_get("file_content")?,
            file_type: row.try_get("file_type")?,
            expires_at: optional_datetime(row, "expires_at")?,
            is_active: bool_from_any_row(row, "is_active")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PermissionRow {
    pub id: i64,
    pub share_id: i64,
    pub username: String,
    pub permission_type: String,
    pub status: String,
    pub granted_by: Option<String>,
    pub reason: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for PermissionRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            share_id: row.try_get("share_id")?,
            username: row.try_get("username")?,
            permission_type: row.try_get("permission_type")?,
            status: row.try_get("status")?,
            granted_by: row.try_get("granted_by")?,
            reason: row.try_get("reason")?,
            responded_at: optional_datetime(row, "responded_at")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AccessLogRow {
    pub id: i64,
    pub share_id: i64,
    pub username: String,
    pub action: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for AccessLogRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            share_id: row.try_get("share_id")?,
            username: row.try_get("username")?,
            action: row.try_get("action")?,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

const SHARE_COLUMNS: &str = "id, share_token, room_id, owner_username, owner_user_id, file_path, file_name, file_content, file_type, expires_at, is_active, created_at, updated_at";
const PERMISSION_COLUMNS: &str =
    "id, share_id, username, permission_type, status, granted_by, reason, responded_at, created_at";

#[derive(Debug, Clone)]
pub struct NewFileShare<'a> {
    pub id: i64,
    pub share_token: &'a str,
    pub room_id: i64,
    pub owner_username: &'a str,
    pub owner_user_id: Option<i64>,
    pub file_path: Option<&'a str>,
    pub file_name: &'a str,
    pub file_content: &'a str,
    pub file_type: &'a str,
    pub expires_at: Option<DateTime<Utc>>,
}

/// (permission id, target username)
pub type NewPermission<'a> = (i64, &'a str);

/// Create the share and one pending permission per target in one transaction.
pub async fn create_share_with_permissions(
    pool: &DbPool,
    share: &NewFileShare<'_>,
    permission_type: &str,
    targets: &[NewPermission<'_>],
) -> Result<(FileShareRow, Vec<PermissionRow>), DbError> {
    let now = datetime_to_db_text(Utc::now());
    let mut tx = pool.begin().await?;

    let share_row = sqlx::query_as::<_, FileShareRow>(&format!(
        "INSERT INTO file_shares (id, share_token, room_id, owner_username, owner_user_id, file_path, file_name, file_content, file_type, expires_at, is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 1, $11, $12)
         RETURNING {SHARE_COLUMNS}"
    ))
    .bind(share.id)
    .bind(share.share_token)
    .bind(share.room_id)
    .bind(share.owner_username)
    .bind(share.owner_user_id)
    .bind(share.file_path)
    .bind(share.file_name)
    .bind(share.file_content)
    .bind(share.file_type)
    .bind(share.expires_at.map(datetime_to_db_text))
    .bind(now.clone())
    .bind(now.clone())
    .fetch_one(&mut *tx)
    .await?;

    let mut permissions = Vec::with_capacity(targets.len());
    for (permission_id, username) in targets {
        let row = sqlx::query_as::<_, PermissionRow>(&format!(
            "INSERT INTO file_share_permissions (id, share_id, username, permission_type, status, created_at)
             VALUES ($1, $2, $3, $4, 'pending', $5)
             RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(*permission_id)
        .bind(share_row.id)
        .bind(*username)
        .bind(permission_type)
        .bind(now.clone())
        .fetch_one(&mut *tx)
        .await?;
        permissions.push(row);
    }

    tx.commit().await?;
    Ok((share_row, permissions))
}

pub async fn get_share_by_token(
    pool: &DbPool,
    share_token: &str,
) -> Result<Option<FileShareRow>, DbError> {
    let row = sqlx::query_as::<_, FileShareRow>(&format!(
        "SELECT {SHARE_COLUMNS} FROM file_shares WHERE share_token = $1"
    ))
    .bind(share_token)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_permission(
    pool: &DbPool,
    share_id: i64,
    username: &str,
) -> Result<Option<PermissionRow>, DbError> {
    let row = sqlx::query_as::<_, PermissionRow>(&format!(
        "SELECT {PERMISSION_COLUMNS} FROM file_share_permissions WHERE share_id = $1 AND username = $2"
    ))
    .bind(share_id)
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_permissions(
    pool: &DbPool,
    share_id: i64,
) -> Result<Vec<PermissionRow>, DbError> {
    let rows = sqlx::query_as::<_, PermissionRow>(&format!(
        "SELECT {PERMISSION_COLUMNS} FROM file_share_permissions WHERE share_id = $1 ORDER BY id"
    ))
    .bind(share_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Move a pending permission to its terminal status.
///
/// The `status = 'pending'` guard makes the transition happen at most once:
/// `Ok(None)` means the permission does not exist or was already answered.
pub async fn respond_to_permission(
    pool: &DbPool,
    share_id: i64,
    username: &str,
    status: &str,
    granted_by: &str,
    reason: Option<&str>,
    responded_at: DateTime<Utc>,
) -> Result<Option<PermissionRow>, DbError> {
    let row = sqlx::query_as::<_, PermissionRow>(&format!(
        "UPDATE file_share_permissions
         SET status = $3, granted_by = $4, reason = $5, responded_at = $6
         WHERE share_id = $1 AND username = $2 AND status = 'pending'
         RETURNING {PERMISSION_COLUMNS}"
    ))
    .bind(share_id)
    .bind(username)
    .bind(status)
    .bind(granted_by)
    .bind(reason)
    .bind(datetime_to_db_text(responded_at))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Returns false when the share is no longer active.
pub async fn update_share_content(
    pool: &DbPool,
    share_id: i64,
    content: &str,
    updated_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE file_shares SET file_content = $2, updated_at = $3 WHERE id = $1 AND is_active = 1",
    )
    .bind(share_id)
    .bind(content)
    .bind(datetime_to_db_text(updated_at))
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns false when the share was already inactive.
pub async fn deactivate_share(
    pool: &DbPool,
    share_id: i64,
    at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE file_shares SET is_active = 0, updated_at = $2 WHERE id = $1 AND is_active = 1",
    )
    .bind(share_id)
    .bind(datetime_to_db_text(at))
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Shares in a room that `username` owns or holds a permission on, newest first.
pub async fn list_shares_for_member(
    pool: &DbPool,
    room_id: i64,
    username: &str,
) -> Result<Vec<FileShareRow>, DbError> {
    let rows = sqlx::query_as::<_, FileShareRow>(&format!(
        "SELECT {SHARE_COLUMNS} FROM file_shares fs
         WHERE fs.room_id = $1
           AND (fs.owner_username = $2
                OR EXISTS (SELECT 1 FROM file_share_permissions p
                           WHERE p.share_id = fs.id AND p.username = $2))
         ORDER BY fs.created_at DESC, fs.id DESC"
    ))
    .bind(room_id)
    .bind(username)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn log_access(
    pool: &DbPool,
    id: i64,
    share_id: i64,
    username: &str,
    action: &str,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO file_access_logs (id, share_id, username, action, ip, user_agent, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(share_id)
    .bind(username)
    .bind(action)
    .bind(ip)
    .bind(user_agent)
    .bind(datetime_to_db_text(Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_access_logs(
    pool: &DbPool,
    share_id: i64,
) -> Result<Vec<AccessLogRow>, DbError> {
    let rows = sqlx::query_as::<_, AccessLogRow>(
        "SELECT id, share_id, username, action, ip, user_agent, created_at
         FROM file_access_logs WHERE share_id = $1 ORDER BY created_at, id",
    )
    .bind(share_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
