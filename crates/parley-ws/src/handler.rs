use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parley_core::error::CoreError;
use parley_core::file_share::{self, ShareActor};
use parley_core::room::{self, JoinRequest, RoomBinding};
use parley_core::{identity, message, profile, AppState};
use parley_models::protocol::{ClientCommand, GatewayEvent, CLIENT_EVENTS, EVENT_TYPING};
use serde_json::Value;
use std::num::NonZeroU32;
use tokio::time::Duration;

use crate::session::ConnectionSession;

const WS_PING_INTERVAL_SECS: u64 = 20;
const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded, slow down";

/// Per-connection flood control. A limit of 0 disables the limiter.
pub(crate) struct ConnectionLimits {
    messages: Option<DefaultDirectRateLimiter>,
    typing: Option<DefaultDirectRateLimiter>,
}

impl ConnectionLimits {
    pub(crate) fn new(messages_per_minute: u32, typing_per_minute: u32) -> Self {
        Self {
            messages: NonZeroU32::new(messages_per_minute)
                .map(|n| RateLimiter::direct(Quota::per_minute(n))),
            typing: NonZeroU32::new(typing_per_minute)
                .map(|n| RateLimiter::direct(Quota::per_minute(n))),
        }
    }

    fn allow_message(&self) -> bool {
        self.messages.as_ref().is_none_or(|l| l.check().is_ok())
    }

    fn allow_typing(&self) -> bool {
        self.typing.as_ref().is_none_or(|l| l.check().is_ok())
    }
}

/// Outcome of decoding one inbound text frame.
pub(crate) enum Inbound {
    Command(ClientCommand),
    Rejected(String),
}

pub(crate) fn parse_frame(text: &str) -> Inbound {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return Inbound::Rejected("Invalid message format".into()),
    };
    let Some(name) = value.get("event").and_then(Value::as_str).map(str::to_owned) else {
        return Inbound::Rejected("Missing event name".into());
    };
    if !CLIENT_EVENTS.contains(&name.as_str()) {
        return Inbound::Rejected(format!("Unknown event: {name}"));
    }
    match serde_json::from_value::<ClientCommand>(value) {
        Ok(command) => Inbound::Command(command),
        Err(err) => {
            tracing::debug!(event = %name, error = %err, "gateway: bad payload");
            Inbound::Rejected(format!("Invalid payload for {name}"))
        }
    }
}

fn error_event(err: CoreError, command: &str, session: &ConnectionSession) -> GatewayEvent {
    if err.is_backend() {
        tracing::error!(
            connection = %session.connection_id,
            command,
            error = %err,
            "gateway: command failed"
        );
    } else {
        tracing::debug!(
            connection = %session.connection_id,
            command,
            error = %err,
            "gateway: command rejected"
        );
    }
    GatewayEvent::error(err.client_message())
}

/// Resolve identity before a join: wait on the connect-time attempt, or retry
/// if it already finished empty. Both are bounded by the identity timeout.
async fn ensure_identity(state: &AppState, session: &mut ConnectionSession) {
    if !session.needs_identity() {
        return;
    }
    let timeout = Duration::from_secs(state.config.identity_timeout_secs);
    if let Some(mut task) = session.pending_identity.take() {
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(identity)) => session.identity = identity,
            Ok(Err(err)) => {
                tracing::warn!(connection = %session.connection_id, error = %err, "gateway: identity task failed");
            }
            Err(_) => {
                task.abort();
                tracing::warn!(connection = %session.connection_id, "gateway: identity timed out, joining anonymously");
            }
        }
        return;
    }
    if let Some(credential) = session.credential.clone() {
        session.identity = identity::resolve_with_timeout(state, &credential, timeout).await;
    }
}

fn bound<'a>(session: &'a ConnectionSession, username: &str) -> Result<&'a RoomBinding, CoreError> {
    let binding = session
        .binding
        .as_ref()
        .ok_or_else(|| CoreError::unauthorized("Join a room first"))?;
    if binding.username != username {
        return Err(CoreError::unauthorized(
            "Not authorized to act as this user in this room",
        ));
    }
    Ok(binding)
}

/// Handle one command, returning the replies for this connection only.
/// Room-wide notifications are published on the event bus by the core.
pub(crate) async fn dispatch(
    state: &AppState,
    session: &mut ConnectionSession,
    command: ClientCommand,
) -> Vec<GatewayEvent> {
    let name = command.name();
    match run_command(state, session, command).await {
        Ok(replies) => replies,
        Err(err) => vec![error_event(err, name, session)],
    }
}

async fn run_command(
    state: &AppState,
    session: &mut ConnectionSession,
    command: ClientCommand,
) -> Result<Vec<GatewayEvent>, CoreError> {
    match command {
        ClientCommand::JoinRoom(join) => {
            ensure_identity(state, session).await;
            let outcome = room::join_room(
                state,
                session.connection_id,
                session.identity.as_ref(),
                JoinRequest {
                    room_slug: join.room_slug,
                    username: join.username,
                    password: join.password,
                },
            )
            .await?;
            let username = outcome.binding.username.clone();
            session.bind(outcome.binding, outcome.events_from);
            Ok(vec![
                GatewayEvent::JoinedRoom {
                    room: outcome.room,
                    username,
                },
                GatewayEvent::ParticipantsList {
                    participants: outcome.participants,
                },
            ])
        }
        ClientCommand::SendMessage(send) => {
            let binding =
                room::authorize_claim(session.binding.as_ref(), &send.room_slug, &send.username)?;
            message::send_message(state, binding, &send.content, send.message_type.as_deref())
                .await?;
            Ok(Vec::new())
        }
        ClientCommand::Typing(typing) => {
            let binding =
                room::authorize_claim(session.binding.as_ref(), &typing.room_slug, &typing.username)?;
            room::relay_typing(state, session.connection_id, binding, typing.is_typing);
            Ok(Vec::new())
        }
        ClientCommand::GetProfileUrl(lookup) => {
            let link = profile::profile_url(state, &lookup.username).await?;
            Ok(vec![GatewayEvent::ProfileUrlResponse {
                username: link.username,
                profile_url: link.profile_url,
                exists: link.exists,
            }])
        }
        ClientCommand::RequestFileShare(request) => {
            let binding = session
                .binding
                .as_ref()
                .ok_or_else(|| CoreError::unauthorized("Join a room first"))?;
            if let Some(username) = request.username.as_deref() {
                bound(session, username)?;
            }
            if let Some(slug) = request.room_slug.as_deref() {
                room::authorize_claim(Some(binding), slug, &binding.username)?;
            }
            let created =
                file_share::request_share(state, &ShareActor::from(binding), &request).await?;
            Ok(vec![GatewayEvent::FileShareCreated {
                share: created.share,
                targets: created.targets,
            }])
        }
        ClientCommand::RespondFileShare(respond) => {
            let actor = ShareActor::from(bound(session, &respond.username)?);
            let (decision, notice) = file_share::respond(
                state,
                &actor,
                &respond.share_token,
                &respond.action,
                respond.reason.as_deref(),
            )
            .await?;
            Ok(vec![GatewayEvent::FileShareResponseSent {
                share_token: notice.share_token,
                action: decision,
            }])
        }
        ClientCommand::AccessSharedFile(access) => {
            let actor = ShareActor::from(bound(session, &access.username)?);
            let content = file_share::access(
                state,
                &actor,
                &access.share_token,
                access.action.as_deref(),
                &session.access,
            )
            .await?;
            Ok(vec![GatewayEvent::SharedFileContent(content)])
        }
        ClientCommand::UpdateSharedFile(update) => {
            let actor = ShareActor::from(bound(session, &update.username)?);
            file_share::update(
                state,
                &actor,
                &update.share_token,
                &update.content,
                &session.access,
            )
            .await?;
            Ok(Vec::new())
        }
        ClientCommand::GetSharedFiles(list) => {
            let binding =
                room::authorize_claim(session.binding.as_ref(), &list.room_slug, &list.username)?;
            let shares = file_share::list_for_member(state, &ShareActor::from(binding)).await?;
            Ok(vec![GatewayEvent::SharedFilesList { shares }])
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(event = event.name(), error = %err, "gateway: failed to encode event");
            return Ok(());
        }
    };
    sender.send(Message::Text(payload.into())).await
}

pub async fn handle_connection(socket: WebSocket, state: AppState, mut session: ConnectionSession) {
    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = state.event_bus.subscribe();
    let limits = ConnectionLimits::new(
        state.config.max_messages_per_minute,
        state.config.max_typing_per_minute,
    );

    if let Some(credential) = session.credential.clone() {
        let resolver_state = state.clone();
        session.pending_identity = Some(tokio::spawn(async move {
            identity::resolve(&resolver_state, &credential).await
        }));
    }

    tracing::info!(connection = %session.connection_id, authenticated = session.credential.is_some(), "gateway: connection opened");

    let mut ws_ping_interval = tokio::time::interval(Duration::from_secs(WS_PING_INTERVAL_SECS));
    ws_ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ws_ping_interval.tick().await; // skip immediate first tick

    let disconnect_reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let command = match parse_frame(text.as_str()) {
                            Inbound::Command(command) => command,
                            Inbound::Rejected(reason) => {
                                if send_event(&mut sender, &GatewayEvent::error(reason)).await.is_err() {
                                    break "websocket send error".to_string();
                                }
                                continue;
                            }
                        };
                        if command.name() == EVENT_TYPING {
                            if !limits.allow_typing() {
                                // Silent drop for high-frequency events
                                tracing::debug!(connection = %session.connection_id, "rate limited (silent drop)");
                                continue;
                            }
                        } else if !limits.allow_message() {
                            if send_event(&mut sender, &GatewayEvent::error(RATE_LIMITED_MESSAGE)).await.is_err() {
                                break "websocket send error".to_string();
                            }
                            continue;
                        }
                        let replies = dispatch(&state, &mut session, command).await;
                        let mut send_failed = false;
                        for reply in &replies {
                            if send_event(&mut sender, reply).await.is_err() {
                                send_failed = true;
                                break;
                            }
                        }
                        if send_failed {
                            break "websocket send error".to_string();
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break if let Some(frame) = frame {
                            format!("client close frame (code={}, reason={})", frame.code, frame.reason)
                        } else {
                            "client close frame (no code/reason)".to_string()
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        break format!("websocket receive error: {err}");
                    }
                    None => {
                        break "websocket stream ended".to_string();
                    }
                }
            }
            resolved = async {
                match session.pending_identity.as_mut() {
                    Some(task) => task.await,
                    None => std::future::pending().await,
                }
            }, if session.pending_identity.is_some() => {
                session.pending_identity = None;
                match resolved {
                    Ok(identity) => {
                        tracing::debug!(connection = %session.connection_id, resolved = identity.is_some(), "gateway: identity settled");
                        session.identity = identity;
                    }
                    Err(err) => {
                        tracing::warn!(connection = %session.connection_id, error = %err, "gateway: identity task failed");
                    }
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !session.should_receive_event(&event) {
                            continue;
                        }
                        if send_event(&mut sender, &event.event).await.is_err() {
                            break "websocket send error".to_string();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(connection = %session.connection_id, skipped, "gateway: event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break "event stream closed".to_string();
                    }
                }
            }
            _ = ws_ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error".to_string();
                }
            }
        }
    };

    let left = room::leave(&state, session.connection_id).await;
    tracing::info!(
        connection = %session.connection_id,
        room_id = left.as_ref().map(|e| e.room_id),
        reason = %disconnect_reason,
        "gateway: connection closed"
    );
}
