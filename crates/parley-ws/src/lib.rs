mod handler;
mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Router,
};
use parley_core::file_share::AccessContext;
use parley_core::AppState;
use serde::Deserialize;

pub use session::ConnectionSession;

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

#[derive(Debug, Default, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Bearer header first, then the `token` query parameter.
fn credential_from(headers: &HeaderMap, query: GatewayQuery) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .or_else(|| query.token.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty()))
}

fn access_context(headers: &HeaderMap) -> AccessContext {
    let header_text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    AccessContext {
        ip: header_text("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_owned()))
            .filter(|ip| !ip.is_empty()),
        user_agent: header_text(header::USER_AGENT.as_str()),
    }
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GatewayQuery>,
) -> impl IntoResponse {
    let session = ConnectionSession::new(credential_from(&headers, query), access_context(&headers));
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_credential_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        let query = GatewayQuery {
            token: Some("xyz".into()),
        };
        assert_eq!(credential_from(&headers, query).as_deref(), Some("abc"));

        let query = GatewayQuery {
            token: Some("xyz".into()),
        };
        assert_eq!(credential_from(&HeaderMap::new(), query).as_deref(), Some("xyz"));
        assert!(credential_from(&HeaderMap::new(), GatewayQuery::default()).is_none());
    }

    #[test]
    fn access_context_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("parley-cli/1.0"));
        let ctx = access_context(&headers);
        assert_eq!(ctx.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(ctx.user_agent.as_deref(), Some("parley-cli/1.0"));
    }
}
