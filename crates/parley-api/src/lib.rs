use axum::{
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parley_core::AppState;
use serde_json::json;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod middleware;
pub mod routes;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        // Auth
        .route("/api/v1/auth/register", post(routes::auth::register))
        .route("/api/v1/auth/login", post(routes::auth::login))
        // Rooms
        .route("/api/v1/rooms", post(routes::rooms::create_room))
        .route("/api/v1/rooms/{slug}", get(routes::rooms::get_room))
        .route(
            "/api/v1/rooms/{slug}/participants",
            get(routes::rooms::list_participants),
        )
        .route(
            "/api/v1/rooms/{slug}/messages",
            get(routes::rooms::list_messages),
        )
        // File shares
        .route(
            "/api/v1/rooms/{slug}/file-shares",
            get(routes::file_shares::list_shares).post(routes::file_shares::create_share),
        )
        .route(
            "/api/v1/file-shares/{token}",
            axum::routing::delete(routes::file_shares::revoke),
        )
        .route(
            "/api/v1/file-shares/{token}/respond",
            post(routes::file_shares::respond),
        )
        .route(
            "/api/v1/file-shares/{token}/content",
            get(routes::file_shares::get_content).put(routes::file_shares::update_content),
        )
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "parley" })),
    )
}
