use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use parley_core::room::{find_room, room_summary, slug_error};
use parley_core::AppState;
use parley_db::rooms::RoomRow;
use parley_util::sanitize::clean_text;
use parley_util::validation::{validate_room_name, validate_room_slug};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
pub struct CreateRoomRequest {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<i64>,
    pub before: Option<i64>,
}

pub(crate) async fn room_by_slug(state: &AppState, slug: &str) -> Result<RoomRow, ApiError> {
    let slug = slug.trim();
    validate_room_slug(slug).map_err(slug_error)?;
    Ok(find_room(state, slug).await?)
}

/// Private rooms are readable by their owner and by members joined under
/// the caller's account.
async fn ensure_readable(state: &AppState, room: &RoomRow, auth: &AuthUser) -> Result<(), ApiError> {
    if !room.is_private || room.owner_id == Some(auth.user_id) {
        return Ok(());
    }
    let members = parley_db::participants::list_participants(&state.db, room.id).await?;
    if members.iter().any(|m| m.user_id == Some(auth.user_id)) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Join this room first".into()))
    }
}

pub async fn create_room(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = body.slug.trim();
    validate_room_slug(slug).map_err(slug_error)?;
    let name = clean_text(&body.name);
    if validate_room_name(&name).is_err() {
        return Err(ApiError::BadRequest(
            "Room name must be between 1 and 100 characters".into(),
        ));
    }
    let password_hash = match body.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(
            parley_core::auth::hash_password(password)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?,
        ),
        None => None,
    };

    let room = match parley_db::rooms::create_room(
        &state.db,
        parley_core::next_id(),
        slug,
        &name,
        password_hash.as_deref(),
        Some(auth.user_id),
    )
    .await
    {
        Ok(room) => room,
        Err(err) if err.is_unique_violation() => {
            return Err(ApiError::Conflict("Room slug already in use".into()));
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(room_id = room.id, slug = %room.slug, owner = auth.user_id, "room: created");
    Ok((StatusCode::CREATED, Json(room_summary(&room))))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let room = room_by_slug(&state, &slug).await?;
    Ok(Json(room_summary(&room)))
}

pub async fn list_participants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let room = room_by_slug(&state, &slug).await?;
    ensure_readable(&state, &room, &auth).await?;
    let participants = parley_core::room::list_participants(&state, room.id).await?;
    Ok(Json(json!({ "participants": participants })))
}

pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let room = room_by_slug(&state, &slug).await?;
    ensure_readable(&state, &room, &auth).await?;
    let messages =
        parley_core::message::list_messages(&state, room.id, query.before, query.limit).await?;
    Ok(Json(messages))
}
