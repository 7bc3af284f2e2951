use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use parley_core::AppState;
use parley_db::users::UserRow;
use parley_util::sanitize::clean_text;
use parley_util::validation::{validate_account_username, validate_password};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;

const MAX_DISPLAY_NAME_LEN: usize = 64;
const INVALID_LOGIN: &str = "Invalid username or password";

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

fn user_json(user: &UserRow) -> Value {
    json!({
        "id": user.id.to_string(),
        "username": user.username,
        "display_name": user.display_name,
        "role": user.role,
        "plan": user.plan,
        "created_at": user.created_at.to_rfc3339(),
    })
}

fn issue_token(state: &AppState, user: &UserRow) -> Result<String, ApiError> {
    parley_core::auth::create_token(
        user.id,
        &user.username,
        &user.role,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = body.username.trim();
    if validate_account_username(username).is_err() {
        return Err(ApiError::BadRequest(
            "Username must be between 2 and 32 letters, digits or underscores".into(),
        ));
    }
    if validate_password(&body.password).is_err() {
        return Err(ApiError::BadRequest(
            "Password must be between 8 and 256 characters".into(),
        ));
    }
    let display_name = body
        .display_name
        .as_deref()
        .map(clean_text)
        .filter(|name| !name.is_empty());
    if display_name
        .as_deref()
        .is_some_and(|name| name.chars().count() > MAX_DISPLAY_NAME_LEN)
    {
        return Err(ApiError::BadRequest(format!(
            "Display name must be at most {MAX_DISPLAY_NAME_LEN} characters"
        )));
    }

    let password_hash = parley_core::auth::hash_password(&body.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    let user = match parley_db::users::create_user(
        &state.db,
        parley_core::next_id(),
        username,
        display_name.as_deref(),
        &password_hash,
    )
    .await
    {
        Ok(user) => user,
        Err(err) if err.is_unique_violation() => {
            return Err(ApiError::Conflict("Username already registered".into()));
        }
        Err(err) => return Err(err.into()),
    };

    let token = issue_token(&state, &user)?;
    tracing::info!(user_id = user.id, username = %user.username, "auth: registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "user": user_json(&user) })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = parley_db::users::get_user_by_username(&state.db, body.username.trim())
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_LOGIN.into()))?;
    let valid = parley_core::auth::verify_password(&body.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    if !valid {
        tracing::debug!(username = %user.username, "auth: bad password");
        return Err(ApiError::Unauthorized(INVALID_LOGIN.into()));
    }

    let token = issue_token(&state, &user)?;
    Ok(Json(json!({ "token": token, "user": user_json(&user) })))
}
