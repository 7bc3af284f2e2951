use anyhow::Context;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use parley_core::events::ConnectionId;
use parley_core::identity::Identity;
use parley_core::room::{self, JoinRequest, RoomBinding};
use parley_core::{AppConfig, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestContext {
    app: Router,
    state: AppState,
}

struct Account {
    token: String,
    identity: Identity,
}

impl TestContext {
    async fn new() -> anyhow::Result<Self> {
        let db = parley_db::create_pool("sqlite::memory:", 1).await?;
        parley_db::run_migrations(&db).await?;
        let config = AppConfig {
            jwt_secret: "integration-test-secret".to_string(),
            jwt_expiry_seconds: 3600,
            ..AppConfig::default()
        };
        let state = AppState::new(db, config);
        let app = parley_api::build_router().with_state(state.clone());
        Ok(Self { app, state })
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = if let Some(payload) = body {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(payload.to_string()))?
        } else {
            builder.body(Body::empty())?
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let payload = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&body_bytes) }))
        };

        Ok((status, payload))
    }

    async fn register(&self, username: &str) -> anyhow::Result<Account> {
        let (status, payload) = self
            .request_json(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({ "username": username, "password": "correct horse battery" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "{payload}");
        let user_id: i64 = payload["user"]["id"]
            .as_str()
            .context("user id should be a string")?
            .parse()?;
        Ok(Account {
            token: payload["token"]
                .as_str()
                .context("token should be a string")?
                .to_string(),
            identity: Identity {
                user_id,
                username: username.to_string(),
                display_name: None,
                role: "user".to_string(),
            },
        })
    }

    async fn create_room(&self, account: &Account, slug: &str) -> anyhow::Result<Value> {
        let (status, payload) = self
            .request_json(
                Method::POST,
                "/api/v1/rooms",
                Some(&account.token),
                Some(json!({ "slug": slug, "name": "Pairing" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "{payload}");
        Ok(payload)
    }

    async fn join(&self, account: &Account, slug: &str) -> anyhow::Result<RoomBinding> {
        let outcome = room::join_room(
            &self.state,
            ConnectionId::next(),
            Some(&account.identity),
            JoinRequest {
                room_slug: slug.to_string(),
                username: account.identity.username.clone(),
                password: None,
            },
        )
        .await?;
        Ok(outcome.binding)
    }
}

async fn share_between(ctx: &TestContext, alice: &Account, permission: &str) -> anyhow::Result<String> {
    let (status, payload) = ctx
        .request_json(
            Method::POST,
            "/api/v1/rooms/pairing/file-shares",
            Some(&alice.token),
            Some(json!({
                "username": "alice",
                "file_name": "notes.md",
                "file_content": "# plan",
                "permission_type": permission,
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{payload}");
    assert_eq!(payload["targets"], json!(["bob"]));
    Ok(payload["share"]["share_token"]
        .as_str()
        .context("share token should be a string")?
        .to_string())
}

#[tokio::test]
async fn health_reports_ok() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (status, payload) = ctx.request_json(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn register_then_login_issues_tokens() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let account = ctx.register("alice").await?;
    assert!(!account.token.is_empty());

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "another password" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, payload) = ctx
        .request_json(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "bob", "password": "short" })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"], payload["message"]);

    let (status, payload) = ctx
        .request_json(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "correct horse battery" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["user"]["username"], "alice");
    assert!(payload["user"].get("password_hash").is_none());

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong password" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn rooms_require_auth_to_create_and_hide_password_hashes() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/rooms",
            None,
            Some(json!({ "slug": "pairing", "name": "Pairing" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let alice = ctx.register("alice").await?;
    let (status, payload) = ctx
        .request_json(
            Method::POST,
            "/api/v1/rooms",
            Some(&alice.token),
            Some(json!({ "slug": "secret", "name": "Secret", "password": "hunter22" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payload["is_private"], true);
    assert!(payload.get("password_hash").is_none());

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/rooms",
            Some(&alice.token),
            Some(json!({ "slug": "secret", "name": "Again" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/rooms",
            Some(&alice.token),
            Some(json!({ "slug": "no spaces", "name": "Bad" })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, payload) = ctx
        .request_json(Method::GET, "/api/v1/rooms/secret", None, None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["name"], "Secret");

    let (status, _) = ctx
        .request_json(Method::GET, "/api/v1/rooms/missing", None, None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn history_is_newest_first_and_private_rooms_need_membership() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice").await?;
    let bob = ctx.register("bob").await?;
    ctx.create_room(&alice, "pairing").await?;
    let binding = ctx.join(&alice, "pairing").await?;
    for text in ["one", "two", "three"] {
        parley_core::message::send_message(&ctx.state, &binding, text, None).await?;
    }

    let (status, payload) = ctx
        .request_json(
            Method::GET,
            "/api/v1/rooms/pairing/messages?limit=2",
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = payload
        .as_array()
        .context("messages should be an array")?
        .iter()
        .filter_map(|m| m["content"].as_str())
        .collect();
    assert_eq!(contents, vec!["three", "two"]);

    let (status, payload) = ctx
        .request_json(
            Method::GET,
            "/api/v1/rooms/pairing/participants",
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["participants"][0]["username"], "alice");
    assert_eq!(payload["participants"][0]["online"], true);

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/rooms",
            Some(&alice.token),
            Some(json!({ "slug": "secret", "name": "Secret", "password": "hunter22" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = ctx
        .request_json(
            Method::GET,
            "/api/v1/rooms/secret/messages",
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx
        .request_json(
            Method::GET,
            "/api/v1/rooms/secret/messages",
            Some(&alice.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn file_share_consent_over_http() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice").await?;
    let bob = ctx.register("bob").await?;
    ctx.create_room(&alice, "pairing").await?;
    ctx.join(&alice, "pairing").await?;
    ctx.join(&bob, "pairing").await?;

    let token = share_between(&ctx, &alice, "read").await?;
    let content_path = format!("/api/v1/file-shares/{token}/content?username=bob");

    let (status, _) = ctx
        .request_json(Method::GET, &content_path, Some(&bob.token), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let respond_path = format!("/api/v1/file-shares/{token}/respond");
    let (status, payload) = ctx
        .request_json(
            Method::POST,
            &respond_path,
            Some(&bob.token),
            Some(json!({ "username": "bob", "action": "approve" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{payload}");
    assert_eq!(payload["action"], "approve");

    let (status, _) = ctx
        .request_json(
            Method::POST,
            &respond_path,
            Some(&bob.token),
            Some(json!({ "username": "bob", "action": "deny" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, payload) = ctx
        .request_json(Method::GET, &content_path, Some(&bob.token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["content"], "# plan");
    assert_eq!(payload["permission_type"], "read");

    let (status, _) = ctx
        .request_json(
            Method::PUT,
            &format!("/api/v1/file-shares/{token}/content"),
            Some(&bob.token),
            Some(json!({ "username": "bob", "content": "# edited" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let share_path = format!("/api/v1/file-shares/{token}");
    let (status, _) = ctx
        .request_json(
            Method::DELETE,
            &format!("{share_path}?username=bob"),
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, payload) = ctx
        .request_json(
            Method::DELETE,
            &format!("{share_path}?username=alice"),
            Some(&alice.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["is_active"], false);

    let (status, _) = ctx
        .request_json(Method::GET, &content_path, Some(&bob.token), None)
        .await?;
    assert_eq!(status, StatusCode::GONE);
    Ok(())
}

#[tokio::test]
async fn write_shares_accept_updates_from_approved_members() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice").await?;
    let bob = ctx.register("bob").await?;
    ctx.create_room(&alice, "pairing").await?;
    ctx.join(&alice, "pairing").await?;
    ctx.join(&bob, "pairing").await?;

    let token = share_between(&ctx, &alice, "write").await?;
    let (status, _) = ctx
        .request_json(
            Method::POST,
            &format!("/api/v1/file-shares/{token}/respond"),
            Some(&bob.token),
            Some(json!({ "username": "bob", "action": "approve" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, payload) = ctx
        .request_json(
            Method::PUT,
            &format!("/api/v1/file-shares/{token}/content"),
            Some(&bob.token),
            Some(json!({ "username": "bob", "content": "# edited" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["updated_by"], "bob");

    let (status, payload) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/file-shares/{token}/content?username=alice&action=download"),
            Some(&alice.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["content"], "# edited");
    assert_eq!(payload["action"], "download");

    let (status, payload) = ctx
        .request_json(
            Method::GET,
            "/api/v1/rooms/pairing/file-shares?username=bob",
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["shares"][0]["is_owner"], false);
    assert_eq!(payload["shares"][0]["permissions"][0]["status"], "approved");
    Ok(())
}

#[tokio::test]
async fn callers_cannot_act_as_other_members() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice").await?;
    let bob = ctx.register("bob").await?;
    ctx.create_room(&alice, "pairing").await?;
    ctx.join(&alice, "pairing").await?;
    ctx.join(&bob, "pairing").await?;

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/rooms/pairing/file-shares",
            Some(&bob.token),
            Some(json!({
                "username": "alice",
                "file_name": "forged.txt",
                "file_content": "nope",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = share_between(&ctx, &alice, "read").await?;
    let (status, _) = ctx
        .request_json(
            Method::POST,
            &format!("/api/v1/file-shares/{token}/respond"),
            Some(&alice.token),
            Some(json!({ "username": "bob", "action": "approve" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unknown = "0".repeat(64);
    let (status, _) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/file-shares/{unknown}/content?username=bob"),
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
