use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use parley_core::file_share::{self, member_actor, room_of_share, ShareActor};
use parley_core::AppState;
use parley_models::protocol::RequestFileShare;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::middleware::{access_context, AuthUser};
use crate::routes::rooms::room_by_slug;

#[derive(Deserialize)]
pub struct MemberQuery {
    pub username: String,
}

#[derive(Deserialize)]
pub struct ContentQuery {
    pub username: String,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub username: String,
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateContentRequest {
    pub username: String,
    pub content: String,
}

async fn actor_for_token(
    state: &AppState,
    auth: &AuthUser,
    token: &str,
    username: &str,
) -> Result<ShareActor, ApiError> {
    let room_id = room_of_share(state, token).await?;
    Ok(member_actor(state, room_id, username, auth.user_id).await?)
}

pub async fn create_share(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
    Json(body): Json<RequestFileShare>,
) -> Result<impl IntoResponse, ApiError> {
    let room = room_by_slug(&state, &slug).await?;
    if body
        .room_slug
        .as_deref()
        .is_some_and(|claimed| claimed.trim() != room.slug)
    {
        return Err(ApiError::BadRequest("room_slug does not match the path".into()));
    }
    let username = body
        .username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("username is required".into()))?;
    let actor = member_actor(&state, room.id, username, auth.user_id).await?;

    let created = file_share::request_share(&state, &actor, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "share": created.share, "targets": created.targets })),
    ))
}

pub async fn list_shares(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
    Query(query): Query<MemberQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let room = room_by_slug(&state, &slug).await?;
    let actor = member_actor(&state, room.id, &query.username, auth.user_id).await?;
    let shares = file_share::list_for_member(&state, &actor).await?;
    Ok(Json(json!({ "shares": shares })))
}

pub async fn respond(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(token): Path<String>,
    Json(body): Json<RespondRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_for_token(&state, &auth, &token, &body.username).await?;
    let (decision, notice) = file_share::respond(
        &state,
        &actor,
        token.trim(),
        &body.action,
        body.reason.as_deref(),
    )
    .await?;
    Ok(Json(json!({
        "share_token": notice.share_token,
        "action": decision,
        "notice": notice,
    })))
}

pub async fn get_content(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(token): Path<String>,
    Query(query): Query<ContentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_for_token(&state, &auth, &token, &query.username).await?;
    let content = file_share::access(
        &state,
        &actor,
        token.trim(),
        query.action.as_deref(),
        &access_context(&headers),
    )
    .await?;
    Ok(Json(content))
}

pub async fn update_content(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(token): Path<String>,
    Json(body): Json<UpdateContentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_for_token(&state, &auth, &token, &body.username).await?;
    let update = file_share::update(
        &state,
        &actor,
        token.trim(),
        &body.content,
        &access_context(&headers),
    )
    .await?;
    Ok(Json(update))
}

pub async fn revoke(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(token): Path<String>,
    Query(query): Query<MemberQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_for_token(&state, &auth, &token, &query.username).await?;
    let share =
        file_share::revoke(&state, &actor, token.trim(), &access_context(&headers)).await?;
    Ok(Json(share))
}
