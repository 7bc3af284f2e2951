//! Room session coordinator: join reconciliation, typing relay, leave.
//!
//! A join is the only place a participant row is created or replaced. The
//! reconcile-and-insert step runs under the room's async lock and inside a
//! transaction against UNIQUE(room_id, username), so two racing joins for the
//! same name can never both win.

use crate::auth;
use crate::error::CoreError;
use crate::events::ConnectionId;
use crate::identity::Identity;
use crate::plan;
use crate::presence::PresenceEntry;
use crate::AppState;
use chrono::{DateTime, Duration, Utc};
use parley_db::participants::{NewParticipant, ParticipantRow};
use parley_db::rooms::RoomRow;
use parley_models::protocol::GatewayEvent;
use parley_models::room::{ParticipantInfo, RoomSummary};
use parley_util::sanitize::clean_text;
use parley_util::validation::{validate_room_slug, validate_room_username, ValidationError};

pub const USERNAME_TAKEN: &str = "Username already taken in this room";
pub const ROOM_FULL: &str = "Room is full";
pub const DEFAULT_PARTICIPANT_ROLE: &str = "member";

/// What a connection is bound to after a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomBinding {
    pub room_id: i64,
    pub room_slug: String,
    pub username: String,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub room_slug: String,
    pub username: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub binding: RoomBinding,
    pub room: RoomSummary,
    pub joined_at: DateTime<Utc>,
    pub participants: Vec<ParticipantInfo>,
    /// First bus sequence number the joining connection should see for this room.
    pub events_from: u64,
}

pub fn room_summary(room: &RoomRow) -> RoomSummary {
    RoomSummary {
        id: room.id.to_string(),
        slug: room.slug.clone(),
        name: room.name.clone(),
        is_private: room.is_private,
    }
}

pub fn slug_error(err: ValidationError) -> CoreError {
    tracing::debug!(error = %err, "room: bad slug");
    CoreError::validation("Room slug may only contain letters, digits, '-' and '_'")
}

/// Validate and clean a display name for use in a room.
pub fn normalize_username(raw: &str) -> Result<String, CoreError> {
    let cleaned = clean_text(raw);
    validate_room_username(&cleaned)
        .map_err(|_| CoreError::validation("Username must be between 1 and 50 characters"))?;
    Ok(cleaned)
}

pub async fn find_room(state: &AppState, slug: &str) -> Result<RoomRow, CoreError> {
    parley_db::rooms::get_room_by_slug(&state.db, slug)
        .await?
        .ok_or_else(|| CoreError::not_found("Room not found"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconcile {
    Insert,
    Replace(i64),
    Taken,
}

/// Decide what happens to an existing row for the requested name.
fn reconcile(
    existing: Option<&ParticipantRow>,
    own_binding: bool,
    identity_user_id: Option<i64>,
    live_conflict: bool,
    stale_before: DateTime<Utc>,
) -> Reconcile {
    let Some(row) = existing else {
        return if live_conflict {
            Reconcile::Taken
        } else {
            Reconcile::Insert
        };
    };
    if own_binding {
        return Reconcile::Replace(row.id);
    }
    if identity_user_id.is_some() && row.user_id == identity_user_id {
        return Reconcile::Replace(row.id);
    }
    if live_conflict {
        return Reconcile::Taken;
    }
    if row.last_seen <= stale_before {
        return Reconcile::Replace(row.id);
    }
    Reconcile::Taken
}

pub async fn join_room(
    state: &AppState,
    connection_id: ConnectionId,
    identity: Option<&Identity>,
    request: JoinRequest,
) -> Result<JoinOutcome, CoreError> {
    let slug = request.room_slug.trim();
    validate_room_slug(slug).map_err(slug_error)?;
    let username = normalize_username(&request.username)?;
    let user_id = identity.map(|i| i.user_id);

    let room = find_room(state, slug).await?;

    if room.is_private {
        let password = request
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| CoreError::unauthorized("Password required for this room"))?;
        let hash = room
            .password_hash
            .as_deref()
            .ok_or_else(|| CoreError::Internal(format!("private room {} has no hash", room.id)))?;
        if !auth::verify_password(password, hash)? {
            tracing::info!(room_id = room.id, %connection_id, "join: wrong room password");
            return Err(CoreError::unauthorized("Invalid room password"));
        }
    }

    let current = state.presence.entry(connection_id);
    let own_binding = current
        .as_ref()
        .is_some_and(|e| e.room_id == room.id && e.username == username);

    let guard = state.room_locks.lock(room.id).await;

    let existing = parley_db::participants::get_participant(&state.db, room.id, &username).await?;
    let others: Vec<_> = state
        .presence
        .holders(room.id, &username)
        .into_iter()
        .filter(|(conn, _)| *conn != connection_id)
        .collect();
    let live_conflict = others
        .iter()
        .any(|(_, holder)| user_id.is_none() || *holder != user_id);
    let stale_before = Utc::now() - Duration::minutes(state.config.stale_after_minutes);

    let replace_id = match reconcile(
        existing.as_ref(),
        own_binding,
        user_id,
        live_conflict,
        stale_before,
    ) {
        Reconcile::Insert => None,
        Reconcile::Replace(id) => Some(id),
        Reconcile::Taken => {
            tracing::info!(room_id = room.id, username = %username, %connection_id, "join: username taken");
            return Err(CoreError::Conflict(USERNAME_TAKEN.into()));
        }
    };

    let mut live = state.presence.live_usernames(room.id);
    live.remove(&username);
    if let Some(entry) = current.as_ref().filter(|e| e.room_id == room.id) {
        // Renaming within the room frees the old name.
        live.remove(&entry.username);
    }
    if !plan::capacity_allows(state, room.id, live.len() + 1).await? {
        tracing::info!(room_id = room.id, live = live.len(), "join: room at capacity");
        return Err(CoreError::Conflict(ROOM_FULL.into()));
    }

    let joined_at = Utc::now();
    let new_row = NewParticipant {
        id: crate::next_id(),
        room_id: room.id,
        username: &username,
        user_id,
        role: DEFAULT_PARTICIPANT_ROLE,
        joined_at,
    };
    let inserted =
        parley_db::participants::insert_participant_replacing(&state.db, replace_id, &new_row)
            .await?;
    if inserted.is_none() {
        tracing::info!(room_id = room.id, username = %username, "join: lost insert race");
        return Err(CoreError::Conflict(USERNAME_TAKEN.into()));
    }

    let already_online = !others.is_empty() || own_binding;
    let events_from = state.event_bus.cursor();
    let previous = state.presence.register(
        connection_id,
        PresenceEntry {
            room_id: room.id,
            username: username.clone(),
            user_id,
        },
    );
    drop(guard);

    if let Some(prev) = previous.filter(|p| !(p.room_id == room.id && p.username == username)) {
        finish_leave(state, connection_id, &prev).await;
    }

    if !already_online {
        state.event_bus.to_room_except(
            room.id,
            connection_id,
            GatewayEvent::UserJoined {
                username: username.clone(),
                joined_at,
            },
        );
    }

    let participants = list_participants(state, room.id).await?;
    tracing::info!(room_id = room.id, username = %username, %connection_id, "join: joined room");

    Ok(JoinOutcome {
        binding: RoomBinding {
            room_id: room.id,
            room_slug: room.slug.clone(),
            username,
            user_id,
        },
        room: room_summary(&room),
        joined_at,
        participants,
        events_from,
    })
}

/// Member rows in join order, each flagged with live presence.
pub async fn list_participants(
    state: &AppState,
    room_id: i64,
) -> Result<Vec<ParticipantInfo>, CoreError> {
    let rows = parley_db::participants::list_participants(&state.db, room_id).await?;
    let online = state.presence.live_usernames(room_id);
    Ok(rows
        .into_iter()
        .map(|row| ParticipantInfo {
            online: online.contains(&row.username),
            username: row.username,
            role: row.role,
            joined_at: row.joined_at,
            last_seen: row.last_seen,
        })
        .collect())
}

/// The claimed room/username must be exactly what this connection joined as.
pub fn authorize_claim<'a>(
    binding: Option<&'a RoomBinding>,
    room_slug: &str,
    username: &str,
) -> Result<&'a RoomBinding, CoreError> {
    let binding = binding.ok_or_else(|| CoreError::unauthorized("Join a room first"))?;
    if binding.room_slug != room_slug || binding.username != username {
        return Err(CoreError::unauthorized(
            "Not authorized to act as this user in this room",
        ));
    }
    Ok(binding)
}

pub fn relay_typing(
    state: &AppState,
    connection_id: ConnectionId,
    binding: &RoomBinding,
    is_typing: bool,
) {
    state.event_bus.to_room_except(
        binding.room_id,
        connection_id,
        GatewayEvent::UserTyping {
            username: binding.username.clone(),
            is_typing,
        },
    );
}

/// Drop the connection's presence. The member row stays; only `last_seen`
/// moves.
pub async fn leave(state: &AppState, connection_id: ConnectionId) -> Option<PresenceEntry> {
    let entry = state.presence.remove(connection_id)?;
    finish_leave(state, connection_id, &entry).await;
    Some(entry)
}

async fn finish_leave(state: &AppState, connection_id: ConnectionId, entry: &PresenceEntry) {
    let left_at = Utc::now();
    if let Err(err) = parley_db::participants::touch_last_seen(
        &state.db,
        entry.room_id,
        &entry.username,
        left_at,
    )
    .await
    {
        tracing::warn!(room_id = entry.room_id, username = %entry.username, error = %err, "leave: failed to stamp last_seen");
    }

    if state.presence.is_online(entry.room_id, &entry.username) {
        return;
    }
    state.event_bus.to_room_except(
        entry.room_id,
        connection_id,
        GatewayEvent::UserLeft {
            username: entry.username.clone(),
            left_at,
        },
    );
    tracing::info!(room_id = entry.room_id, username = %entry.username, %connection_id, "leave: user left");
}
