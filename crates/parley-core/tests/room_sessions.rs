use chrono::{Duration, Utc};
use parley_core::error::CoreError;
use parley_core::events::{ConnectionId, ServerEvent};
use parley_core::identity::Identity;
use parley_core::room::{self, JoinRequest, USERNAME_TAKEN};
use parley_core::{auth, message, AppConfig, AppState};
use parley_models::message::MessageType;
use parley_models::protocol::GatewayEvent;
use tokio::sync::broadcast;

async fn state_with(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = parley_db::create_pool("sqlite::memory:", 1).await?;
    parley_db::run_migrations(&pool).await?;
    Ok(AppState::new(pool, config))
}

async fn state_with_room() -> anyhow::Result<AppState> {
    let state = state_with(AppConfig::default()).await?;
    parley_db::rooms::create_room(&state.db, 1, "general", "General", None, None).await?;
    Ok(state)
}

fn join(slug: &str, username: &str) -> JoinRequest {
    JoinRequest {
        room_slug: slug.to_string(),
        username: username.to_string(),
        password: None,
    }
}

fn identity(user_id: i64, username: &str) -> Identity {
    Identity {
        user_id,
        username: username.to_string(),
        display_name: None,
        role: "user".to_string(),
    }
}

fn drain(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn same_identity_rejoins_without_duplicate_rows() -> anyhow::Result<()> {
    let state = state_with_room().await?;
    let alice = identity(7, "alice");
    let tab_a = ConnectionId::next();
    let tab_b = ConnectionId::next();

    room::join_room(&state, tab_a, Some(&alice), join("general", "alice")).await?;
    let second = room::join_room(&state, tab_b, Some(&alice), join("general", "alice")).await?;

    assert_eq!(second.participants.len(), 1);
    assert!(second.participants[0].online);
    assert_eq!(state.presence.holders(1, "alice").len(), 2);
    let rows = parley_db::participants::list_participants(&state.db, 1).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, Some(7));
    Ok(())
}

#[tokio::test]
async fn same_connection_can_join_twice() -> anyhow::Result<()> {
    let state = state_with_room().await?;
    let conn = ConnectionId::next();
    room::join_room(&state, conn, None, join("general", "guest")).await?;
    room::join_room(&state, conn, None, join("general", "guest")).await?;
    assert_eq!(state.presence.holders(1, "guest").len(), 1);
    Ok(())
}

#[tokio::test]
async fn live_name_is_taken_for_other_identities() -> anyhow::Result<()> {
    let state = state_with_room().await?;
    room::join_room(&state, ConnectionId::next(), None, join("general", "alice")).await?;

    let err = room::join_room(&state, ConnectionId::next(), None, join("general", "alice"))
        .await
        .expect_err("anonymous duplicate");
    assert!(matches!(&err, CoreError::Conflict(msg) if msg == USERNAME_TAKEN));

    let err = room::join_room(
        &state,
        ConnectionId::next(),
        Some(&identity(8, "mallory")),
        join("general", "alice"),
    )
    .await
    .expect_err("different identity");
    assert!(matches!(err, CoreError::Conflict(_)));
    Ok(())
}

#[tokio::test]
async fn stale_name_is_reclaimed_after_thirty_minutes() -> anyhow::Result<()> {
    let state = state_with_room().await?;
    let first = ConnectionId::next();
    room::join_room(&state, first, None, join("general", "alice")).await?;
    room::leave(&state, first).await;

    parley_db::participants::touch_last_seen(
        &state.db,
        1,
        "alice",
        Utc::now() - Duration::minutes(29),
    )
    .await?;
    let err = room::join_room(&state, ConnectionId::next(), None, join("general", "alice"))
        .await
        .expect_err("still fresh");
    assert!(matches!(err, CoreError::Conflict(_)));

    parley_db::participants::touch_last_seen(
        &state.db,
        1,
        "alice",
        Utc::now() - Duration::minutes(31),
    )
    .await?;
    let reclaimed =
        room::join_room(&state, ConnectionId::next(), None, join("general", "alice")).await?;
    assert_eq!(reclaimed.binding.username, "alice");
    assert_eq!(parley_db::participants::list_participants(&state.db, 1).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn private_rooms_check_the_password() -> anyhow::Result<()> {
    let state = state_with(AppConfig::default()).await?;
    let hash = auth::hash_password("hunter22")?;
    parley_db::rooms::create_room(&state.db, 2, "vault", "Vault", Some(&hash), None).await?;

    let missing = room::join_room(&state, ConnectionId::next(), None, join("vault", "a")).await;
    assert!(matches!(missing, Err(CoreError::Unauthorized(_))));

    let mut wrong = join("vault", "a");
    wrong.password = Some("nope".into());
    let wrong = room::join_room(&state, ConnectionId::next(), None, wrong).await;
    assert!(matches!(wrong, Err(CoreError::Unauthorized(_))));

    let mut right = join("vault", "a");
    right.password = Some("hunter22".into());
    let joined = room::join_room(&state, ConnectionId::next(), None, right).await?;
    assert!(joined.room.is_private);
    Ok(())
}

#[tokio::test]
async fn join_validates_slug_username_and_room() -> anyhow::Result<()> {
    let state = state_with_room().await?;
    let bad_slug = room::join_room(&state, ConnectionId::next(), None, join("gen eral", "a")).await;
    assert!(matches!(bad_slug, Err(CoreError::Validation(_))));

    let too_long = "x".repeat(51);
    let bad_name = room::join_room(&state, ConnectionId::next(), None, join("general", &too_long)).await;
    assert!(matches!(bad_name, Err(CoreError::Validation(_))));

    let missing = room::join_room(&state, ConnectionId::next(), None, join("nowhere", "a")).await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));

    let cleaned = room::join_room(&state, ConnectionId::next(), None, join("general", " <i>José</i> ")).await?;
    assert_eq!(cleaned.binding.username, "José");
    Ok(())
}

#[tokio::test]
async fn join_and_leave_notify_the_rest_of_the_room() -> anyhow::Result<()> {
    let state = state_with_room().await?;
    let mut rx = state.event_bus.subscribe();
    let alice = ConnectionId::next();
    let bob = ConnectionId::next();

    room::join_room(&state, alice, None, join("general", "alice")).await?;
    let outcome = room::join_room(&state, bob, None, join("general", "bob")).await?;
    let names: Vec<&str> = outcome.participants.iter().map(|p| p.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);

    let joined: Vec<ServerEvent> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(&*e.event, GatewayEvent::UserJoined { username, .. } if username == "bob"))
        .collect();
    assert_eq!(joined.len(), 1);
    assert!(joined[0].is_for(alice, Some(1)));
    assert!(!joined[0].is_for(bob, Some(1)));

    room::leave(&state, bob).await;
    let left = drain(&mut rx);
    assert_eq!(left.len(), 1);
    assert!(matches!(&*left[0].event, GatewayEvent::UserLeft { username, .. } if username == "bob"));

    let rows = parley_db::participants::list_participants(&state.db, 1).await?;
    assert_eq!(rows.len(), 2, "rows survive disconnect");
    Ok(())
}

#[tokio::test]
async fn user_left_waits_for_the_last_connection() -> anyhow::Result<()> {
    let state = state_with_room().await?;
    let alice = identity(7, "alice");
    let tab_a = ConnectionId::next();
    let tab_b = ConnectionId::next();
    room::join_room(&state, tab_a, Some(&alice), join("general", "alice")).await?;
    room::join_room(&state, tab_b, Some(&alice), join("general", "alice")).await?;

    let mut rx = state.event_bus.subscribe();
    room::leave(&state, tab_a).await;
    assert!(drain(&mut rx).is_empty());
    room::leave(&state, tab_b).await;
    assert_eq!(drain(&mut rx).len(), 1);
    Ok(())
}

#[tokio::test]
async fn capacity_admits_n_and_rejects_n_plus_one() -> anyhow::Result<()> {
    let config = AppConfig {
        default_max_participants: 2,
        ..AppConfig::default()
    };
    let state = state_with(config).await?;
    parley_db::users::create_user(&state.db, 10, "owner", None, "x").await?;
    parley_db::rooms::create_room(&state.db, 1, "small", "Small", None, Some(10)).await?;

    room::join_room(&state, ConnectionId::next(), None, join("small", "alice")).await?;
    let bob = ConnectionId::next();
    room::join_room(&state, bob, None, join("small", "bob")).await?;

    let full = room::join_room(&state, ConnectionId::next(), None, join("small", "carol")).await;
    assert!(matches!(full, Err(CoreError::Conflict(ref msg)) if msg == room::ROOM_FULL));

    room::leave(&state, bob).await;
    room::join_room(&state, ConnectionId::next(), None, join("small", "carol")).await?;
    Ok(())
}

#[tokio::test]
async fn messages_are_sanitized_persisted_and_broadcast_to_sender() -> anyhow::Result<()> {
    let state = state_with_room().await?;
    let conn = ConnectionId::next();
    let outcome = room::join_room(&state, conn, None, join("general", "alice")).await?;
    let mut rx = state.event_bus.subscribe();

    let before = Utc::now();
    let sent = message::send_message(
        &state,
        &outcome.binding,
        "  hello <script>alert(1)</script><b>world</b>  ",
        Some("code"),
    )
    .await?;
    assert_eq!(sent.content, "hello world");
    assert_eq!(sent.message_type, MessageType::Code);
    assert!(sent.created_at >= before - Duration::seconds(1));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_for(conn, Some(1)));
    assert!(matches!(&*events[0].event, GatewayEvent::NewMessage(m) if m.id == sent.id));

    let history = message::list_messages(&state, 1, None, None).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hello world");
    Ok(())
}

#[tokio::test]
async fn invalid_messages_are_neither_stored_nor_broadcast() -> anyhow::Result<()> {
    let state = state_with_room().await?;
    let outcome =
        room::join_room(&state, ConnectionId::next(), None, join("general", "alice")).await?;
    let mut rx = state.event_bus.subscribe();

    let empty = message::send_message(&state, &outcome.binding, "<p></p>", None).await;
    assert!(matches!(empty, Err(CoreError::Validation(_))));
    let long = "a".repeat(10_001);
    let too_long = message::send_message(&state, &outcome.binding, &long, None).await;
    assert!(matches!(too_long, Err(CoreError::Validation(_))));
    let bad_type = message::send_message(&state, &outcome.binding, "hi", Some("gif")).await;
    assert!(matches!(bad_type, Err(CoreError::Validation(_))));

    assert!(drain(&mut rx).is_empty());
    assert_eq!(parley_db::messages::count_room_messages(&state.db, 1).await?, 0);
    Ok(())
}
