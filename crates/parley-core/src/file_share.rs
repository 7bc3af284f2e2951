//! File-share consent protocol.
//!
//! Every durable write of the protocol goes through this module, for both the
//! gateway and the HTTP routes. Room notifications are published only after
//! the corresponding write has committed.

use crate::error::CoreError;
use crate::room::RoomBinding;
use crate::AppState;
use chrono::{DateTime, Duration, Utc};
use parley_db::file_shares::{FileShareRow, NewFileShare, PermissionRow};
use parley_models::file_share::{
    AccessAction, FileShareDecisionNotice, FileShareInfo, FileShareRequestNotice, PermissionInfo,
    PermissionStatus, PermissionType, ShareDecision, SharedFileContent, SharedFileEntry,
    SharedFileUpdate,
};
use parley_models::protocol::{GatewayEvent, RequestFileShare};
use parley_util::sanitize::clean_text;
use parley_util::token::{generate_share_token, is_well_formed_share_token};
use parley_util::validation::{validate_file_name, validate_file_type, validate_reason};
use std::collections::HashSet;

pub const DEFAULT_FILE_TYPE: &str = "text/plain";
const SHARE_NOT_FOUND: &str = "File share not found";

/// The room member performing a file-share operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareActor {
    pub room_id: i64,
    pub username: String,
    pub user_id: Option<i64>,
}

impl From<&RoomBinding> for ShareActor {
    fn from(binding: &RoomBinding) -> Self {
        Self {
            room_id: binding.room_id,
            username: binding.username.clone(),
            user_id: binding.user_id,
        }
    }
}

/// Where an access came from, recorded in the access log.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedShare {
    pub share: FileShareInfo,
    pub targets: Vec<String>,
}

pub fn share_info(row: &FileShareRow) -> FileShareInfo {
    FileShareInfo {
        share_token: row.share_token.clone(),
        room_id: row.room_id.to_string(),
        owner_username: row.owner_username.clone(),
        file_path: row.file_path.clone(),
        file_name: row.file_name.clone(),
        file_type: row.file_type.clone(),
        expires_at: row.expires_at,
        is_active: row.is_active,
        created_at: row.created_at,
    }
}

fn permission_type_of(row: &PermissionRow) -> Result<PermissionType, CoreError> {
    PermissionType::parse(&row.permission_type)
        .ok_or_else(|| CoreError::Internal(format!("bad permission_type on {}", row.id)))
}

fn permission_status_of(row: &PermissionRow) -> Result<PermissionStatus, CoreError> {
    PermissionStatus::parse(&row.status)
        .ok_or_else(|| CoreError::Internal(format!("bad permission status on {}", row.id)))
}

fn permission_info(row: &PermissionRow) -> Result<PermissionInfo, CoreError> {
    Ok(PermissionInfo {
        username: row.username.clone(),
        permission_type: permission_type_of(row)?,
        status: permission_status_of(row)?,
        granted_by: row.granted_by.clone(),
        reason: row.reason.clone(),
        responded_at: row.responded_at,
    })
}

fn is_expired(row: &FileShareRow, now: DateTime<Utc>) -> bool {
    row.expires_at.is_some_and(|at| now >= at)
}

/// Explicit targets are cleaned, deduplicated in order and never include the owner.
pub fn normalize_targets(raw: &[String], owner: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|name| clean_text(name))
        .filter(|name| !name.is_empty() && name != owner)
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Load a share by token, scoped to the actor's room.
async fn load_share(
    state: &AppState,
    actor: &ShareActor,
    share_token: &str,
) -> Result<FileShareRow, CoreError> {
    let token = share_token.trim();
    if !is_well_formed_share_token(token) {
        return Err(CoreError::not_found(SHARE_NOT_FOUND));
    }
    let row = parley_db::file_shares::get_share_by_token(&state.db, token)
        .await?
        .ok_or_else(|| CoreError::not_found(SHARE_NOT_FOUND))?;
    if row.room_id != actor.room_id {
        return Err(CoreError::not_found(SHARE_NOT_FOUND));
    }
    Ok(row)
}

/// Reject inactive shares, deactivating expired ones in place.
async fn ensure_usable(state: &AppState, row: &mut FileShareRow) -> Result<(), CoreError> {
    if !row.is_active {
        return Err(CoreError::Expired("File share is no longer active".into()));
    }
    let now = Utc::now();
    if is_expired(row, now) {
        parley_db::file_shares::deactivate_share(&state.db, row.id, now).await?;
        row.is_active = false;
        tracing::info!(share_id = row.id, "file share: expired on access");
        return Err(CoreError::Expired("File share has expired".into()));
    }
    Ok(())
}

/// The permission the actor holds on the share. Owners implicitly hold write.
async fn effective_permission(
    state: &AppState,
    actor: &ShareActor,
    row: &FileShareRow,
    required: PermissionType,
) -> Result<PermissionType, CoreError> {
    if actor.username == row.owner_username {
        return Ok(PermissionType::Write);
    }
    let permission = parley_db::file_shares::get_permission(&state.db, row.id, &actor.username)
        .await?
        .ok_or_else(|| CoreError::forbidden("You do not have access to this file"))?;
    if permission_status_of(&permission)? != PermissionStatus::Approved {
        return Err(CoreError::forbidden("File access has not been approved"));
    }
    let granted = permission_type_of(&permission)?;
    if !granted.allows(required) {
        return Err(CoreError::forbidden("Write permission required"));
    }
    Ok(granted)
}

async fn log_access(state: &AppState, share_id: i64, username: &str, action: &str, ctx: &AccessContext) {
    if let Err(err) = parley_db::file_shares::log_access(
        &state.db,
        crate::next_id(),
        share_id,
        username,
        action,
        ctx.ip.as_deref(),
        ctx.user_agent.as_deref(),
    )
    .await
    {
        tracing::warn!(share_id, action, error = %err, "file share: access log write failed");
    }
}

pub async fn request_share(
    state: &AppState,
    actor: &ShareActor,
    request: &RequestFileShare,
) -> Result<CreatedShare, CoreError> {
    let config = &state.config;

    let file_name = clean_text(&request.file_name);
    validate_file_name(&file_name)
        .map_err(|_| CoreError::validation("File name must be between 1 and 255 characters"))?;
    if request.file_content.len() > config.max_content_bytes {
        return Err(CoreError::validation(format!(
            "File content exceeds {} bytes",
            config.max_content_bytes
        )));
    }
    let file_path = request
        .file_path
        .as_deref()
        .map(clean_text)
        .filter(|p| !p.is_empty());
    let file_type = request
        .file_type
        .as_deref()
        .map(clean_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string());
    validate_file_type(&file_type)
        .map_err(|_| CoreError::validation("File type must be at most 100 characters"))?;
    let permission_type = match request.permission_type.as_deref().map(str::trim) {
        None | Some("") => PermissionType::Read,
        Some(raw) => PermissionType::parse(raw)
            .ok_or_else(|| CoreError::validation("Permission type must be 'read' or 'write'"))?,
    };
    let expiry_hours = request.expiry_hours.unwrap_or(config.default_expiry_hours);
    if expiry_hours < 1 || expiry_hours > config.max_expiry_hours {
        return Err(CoreError::validation(format!(
            "Expiry must be between 1 and {} hours",
            config.max_expiry_hours
        )));
    }

    let targets = match &request.target_users {
        Some(explicit) => normalize_targets(explicit, &actor.username),
        None => parley_db::participants::list_participants(&state.db, actor.room_id)
            .await?
            .into_iter()
            .map(|p| p.username)
            .filter(|name| name != &actor.username)
            .collect(),
    };
    if targets.is_empty() {
        return Err(CoreError::validation("No users to share this file with"));
    }

    let share_token = generate_share_token();
    let expires_at = Utc::now() + Duration::hours(i64::from(expiry_hours));
    let new_share = NewFileShare {
        id: crate::next_id(),
        share_token: &share_token,
        room_id: actor.room_id,
        owner_username: &actor.username,
        owner_user_id: actor.user_id,
        file_path: file_path.as_deref(),
        file_name: &file_name,
        file_content: &request.file_content,
        file_type: &file_type,
        expires_at: Some(expires_at),
    };
    let permission_rows: Vec<(i64, &str)> = targets
        .iter()
        .map(|name| (crate::next_id(), name.as_str()))
        .collect();
    let (row, permissions) = parley_db::file_shares::create_share_with_permissions(
        &state.db,
        &new_share,
        permission_type.as_str(),
        &permission_rows,
    )
    .await?;

    for permission in &permissions {
        state.event_bus.to_room(
            row.room_id,
            GatewayEvent::FileShareRequest(FileShareRequestNotice {
                share_token: row.share_token.clone(),
                owner_username: row.owner_username.clone(),
                target_username: permission.username.clone(),
                file_name: row.file_name.clone(),
                file_type: row.file_type.clone(),
                permission_type,
                expires_at: row.expires_at,
            }),
        );
    }
    tracing::info!(
        share_id = row.id,
        room_id = row.room_id,
        targets = permissions.len(),
        "file share: requested"
    );

    Ok(CreatedShare {
        share: share_info(&row),
        targets,
    })
}

pub async fn respond(
    state: &AppState,
    actor: &ShareActor,
    share_token: &str,
    action: &str,
    reason: Option<&str>,
) -> Result<(ShareDecision, FileShareDecisionNotice), CoreError> {
    let decision = ShareDecision::parse(action.trim())
        .ok_or_else(|| CoreError::validation("Action must be 'approve' or 'deny'"))?;
    let mut row = load_share(state, actor, share_token).await?;
    ensure_usable(state, &mut row).await?;

    let existing = parley_db::file_shares::get_permission(&state.db, row.id, &actor.username)
        .await?
        .ok_or_else(|| CoreError::forbidden("You were not asked to review this file"))?;
    if permission_status_of(&existing)? != PermissionStatus::Pending {
        return Err(CoreError::Conflict("This file share was already answered".into()));
    }

    let reason = reason.map(clean_text).filter(|r| !r.is_empty());
    if let Some(reason) = reason.as_deref() {
        validate_reason(reason)
            .map_err(|_| CoreError::validation("Reason must be at most 500 characters"))?;
    }
    let updated = parley_db::file_shares::respond_to_permission(
        &state.db,
        row.id,
        &actor.username,
        decision.resulting_status().as_str(),
        &actor.username,
        reason.as_deref(),
        Utc::now(),
    )
    .await?
    .ok_or_else(|| CoreError::Conflict("This file share was already answered".into()))?;

    let notice = FileShareDecisionNotice {
        share_token: row.share_token.clone(),
        owner_username: row.owner_username.clone(),
        username: updated.username.clone(),
        file_name: row.file_name.clone(),
        reason: updated.reason.clone(),
        responded_at: updated.responded_at.unwrap_or_else(Utc::now),
    };
    let event = match decision {
        ShareDecision::Approve => GatewayEvent::FileShareApproved(notice.clone()),
        ShareDecision::Deny => GatewayEvent::FileShareDenied(notice.clone()),
    };
    state.event_bus.to_room(row.room_id, event);
    tracing::info!(share_id = row.id, username = %actor.username, ?decision, "file share: answered");

    Ok((decision, notice))
}

pub async fn access(
    state: &AppState,
    actor: &ShareActor,
    share_token: &str,
    action: Option<&str>,
    ctx: &AccessContext,
) -> Result<SharedFileContent, CoreError> {
    let action = match action.map(str::trim) {
        None | Some("") => AccessAction::View,
        Some(raw) => AccessAction::parse(raw)
            .ok_or_else(|| CoreError::validation("Action must be 'view' or 'download'"))?,
    };
    let mut row = load_share(state, actor, share_token).await?;
    ensure_usable(state, &mut row).await?;
    let permission_type = effective_permission(state, actor, &row, PermissionType::Read).await?;

    log_access(state, row.id, &actor.username, action.as_str(), ctx).await;

    Ok(SharedFileContent {
        share_token: row.share_token,
        file_name: row.file_name,
        file_type: row.file_type,
        content: row.file_content,
        action,
        permission_type,
    })
}

pub async fn update(
    state: &AppState,
    actor: &ShareActor,
    share_token: &str,
    content: &str,
    ctx: &AccessContext,
) -> Result<SharedFileUpdate, CoreError> {
    if content.len() > state.config.max_content_bytes {
        return Err(CoreError::validation(format!(
            "File content exceeds {} bytes",
            state.config.max_content_bytes
        )));
    }
    let mut row = load_share(state, actor, share_token).await?;
    ensure_usable(state, &mut row).await?;
    effective_permission(state, actor, &row, PermissionType::Write).await?;

    let updated_at = Utc::now();
    if !parley_db::file_shares::update_share_content(&state.db, row.id, content, updated_at).await? {
        return Err(CoreError::Expired("File share is no longer active".into()));
    }
    log_access(state, row.id, &actor.username, "update", ctx).await;

    let update = SharedFileUpdate {
        share_token: row.share_token.clone(),
        file_name: row.file_name.clone(),
        content: content.to_string(),
        updated_by: actor.username.clone(),
        updated_at,
    };
    state
        .event_bus
        .to_room(row.room_id, GatewayEvent::SharedFileUpdated(update.clone()));
    Ok(update)
}

/// Shares in the actor's room that they own or were asked about.
pub async fn list_for_member(
    state: &AppState,
    actor: &ShareActor,
) -> Result<Vec<SharedFileEntry>, CoreError> {
    let rows =
        parley_db::file_shares::list_shares_for_member(&state.db, actor.room_id, &actor.username)
            .await?;
    let now = Utc::now();
    let mut entries = Vec::with_capacity(rows.len());
    for mut row in rows {
        if row.is_active && is_expired(&row, now) {
            parley_db::file_shares::deactivate_share(&state.db, row.id, now).await?;
            row.is_active = false;
        }
        let is_owner = row.owner_username == actor.username;
        let permissions = parley_db::file_shares::list_permissions(&state.db, row.id)
            .await?
            .iter()
            .filter(|p| is_owner || p.username == actor.username)
            .map(permission_info)
            .collect::<Result<Vec<_>, _>>()?;
        entries.push(SharedFileEntry {
            share: share_info(&row),
            is_owner,
            permissions,
        });
    }
    Ok(entries)
}

/// Owner-only. Deactivates the share and tells the room.
pub async fn revoke(
    state: &AppState,
    actor: &ShareActor,
    share_token: &str,
    ctx: &AccessContext,
) -> Result<FileShareInfo, CoreError> {
    let mut row = load_share(state, actor, share_token).await?;
    if row.owner_username != actor.username {
        return Err(CoreError::forbidden("Only the owner can revoke this file share"));
    }
    if !parley_db::file_shares::deactivate_share(&state.db, row.id, Utc::now()).await? {
        return Err(CoreError::Conflict("File share is already inactive".into()));
    }
    row.is_active = false;
    log_access(state, row.id, &actor.username, "revoke", ctx).await;

    state.event_bus.to_room(
        row.room_id,
        GatewayEvent::FileShareRevoked {
            share_token: row.share_token.clone(),
            owner_username: row.owner_username.clone(),
        },
    );
    tracing::info!(share_id = row.id, "file share: revoked");
    Ok(share_info(&row))
}

/// Resolve the acting member for an HTTP caller: the named member row must
/// belong to the authenticated user.
pub async fn member_actor(
    state: &AppState,
    room_id: i64,
    username: &str,
    caller_user_id: i64,
) -> Result<ShareActor, CoreError> {
    let username = username.trim();
    let member = parley_db::participants::get_participant(&state.db, room_id, username)
        .await?
        .ok_or_else(|| CoreError::not_found("Participant not found in this room"))?;
    if member.user_id != Some(caller_user_id) {
        return Err(CoreError::unauthorized(
            "Not authorized to act as this user in this room",
        ));
    }
    Ok(ShareActor {
        room_id,
        username: member.username,
        user_id: member.user_id,
    })
}

/// Room of the share behind `share_token`, for HTTP routes keyed by token.
pub async fn room_of_share(state: &AppState, share_token: &str) -> Result<i64, CoreError> {
    let token = share_token.trim();
    if !is_well_formed_share_token(token) {
        return Err(CoreError::not_found(SHARE_NOT_FOUND));
    }
    parley_db::file_shares::get_share_by_token(&state.db, token)
        .await?
        .map(|row| row.room_id)
        .ok_or_else(|| CoreError::not_found(SHARE_NOT_FOUND))
}
