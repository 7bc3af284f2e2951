use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub plan: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for UserRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            password_hash: row.try_get("password_hash")?,
            role: row.try_get("role")?,
            plan: row.try_get("plan")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

const USER_COLUMNS: &str = "id, username, display_name, password_hash, role, plan, created_at";

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    username: &str,
    display_name: Option<&str>,
    password_hash: &str,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (id, username, display_name, password_hash, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(username)
    .bind(display_name)
    .bind(password_hash)
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_username(
    pool: &DbPool,
    username: &str,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn update_user_plan(pool: &DbPool, id: i64, plan: &str) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE users SET plan = $2 WHERE id = $1")
        .bind(id)
        .bind(plan)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;

    #[tokio::test]
    async fn usernames_are_unique() {
        let pool = memory_pool().await;
        let user = create_user(&pool, 1, "alice", Some("Alice"), "hash")
            .await
            .expect("create");
        assert_eq!(user.role, "user");
        assert_eq!(user.plan, "free");

        let err = create_user(&pool, 2, "alice", None, "hash")
            .await
            .expect_err("duplicate must fail");
        assert!(err.is_unique_violation());

        update_user_plan(&pool, 1, "pro").await.expect("plan");
        let found = get_user_by_username(&pool, "alice")
            .await
            .expect("query")
            .expect("exists");
        assert_eq!(found.plan, "pro");
        assert_eq!(found.display_name.as_deref(), Some("Alice"));
    }
}
