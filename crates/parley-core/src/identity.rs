//! Credential -> identity resolution for gateway connections.

use crate::auth;
use crate::AppState;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub role: String,
}

/// Resolve a bearer credential. Never fails: an invalid credential is simply
/// no identity, and a failed display-name lookup keeps the verified identity.
pub async fn resolve(state: &AppState, credential: &str) -> Option<Identity> {
    let claims = match auth::validate_token(credential, &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!(error = %err, "identity: credential rejected");
            return None;
        }
    };

    let display_name = match parley_db::users::get_user_by_id(&state.db, claims.sub).await {
        Ok(Some(user)) => user.display_name,
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(user_id = claims.sub, error = %err, "identity: enrichment failed");
            None
        }
    };

    Some(Identity {
        user_id: claims.sub,
        username: claims.username,
        display_name,
        role: claims.role,
    })
}

/// [`resolve`] bounded by `timeout`; a timeout counts as no identity.
pub async fn resolve_with_timeout(
    state: &AppState,
    credential: &str,
    timeout: Duration,
) -> Option<Identity> {
    match tokio::time::timeout(timeout, resolve(state, credential)).await {
        Ok(identity) => identity,
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "identity: resolution timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppConfig;

    async fn state() -> AppState {
        let pool = parley_db::create_pool("sqlite::memory:", 1).await.expect("pool");
        parley_db::run_migrations(&pool).await.expect("migrations");
        AppState::new(pool, AppConfig::default())
    }

    #[tokio::test]
    async fn valid_token_resolves_with_display_name() {
        let state = state().await;
        parley_db::users::create_user(&state.db, 5, "alice", Some("Alice A."), "x")
            .await
            .expect("user");
        let token = auth::create_token(5, "alice", "user", &state.config.jwt_secret, 60)
            .expect("token");

        let identity = resolve(&state, &token).await.expect("identity");
        assert_eq!(identity.user_id, 5);
        assert_eq!(identity.display_name.as_deref(), Some("Alice A."));
    }

    #[tokio::test]
    async fn unknown_user_keeps_verified_identity() {
        let state = state().await;
        let token = auth::create_token(99, "external", "user", &state.config.jwt_secret, 60)
            .expect("token");
        let identity = resolve(&state, &token).await.expect("identity");
        assert_eq!(identity.username, "external");
        assert!(identity.display_name.is_none());
    }

    #[tokio::test]
    async fn garbage_credential_is_anonymous() {
        let state = state().await;
        assert!(resolve(&state, "not-a-jwt").await.is_none());
        assert!(
            resolve_with_timeout(&state, "not-a-jwt", Duration::from_secs(1))
                .await
                .is_none()
        );
    }
}
