use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use hub::{Hub, HubOptions};
use shared::{error::ErrorBody, protocol::SocketTokenResponse};
use tracing::{error, info};

mod app_state;
mod config;
mod session;
mod ws;

use app_state::AppState;
use auth::TokenConfig;
use config::load_settings;
use session::HeaderSessionAuth;
use ws::HeartbeatConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let state = AppState {
        tokens: TokenConfig {
            secret: settings.token_secret.clone(),
            ttl_seconds: settings.token_ttl_seconds,
        },
        hub: Arc::new(Hub::with_options(HubOptions {
            include_sender: settings.include_sender,
        })),
        session_auth: Arc::new(HeaderSessionAuth::new(settings.subject_header.clone())),
        heartbeat: HeartbeatConfig {
            interval: Duration::from_secs(settings.heartbeat_interval_seconds),
            idle_timeout: Duration::from_secs(settings.idle_timeout_seconds),
        },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/socket-token", get(socket_token))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn socket_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SocketTokenResponse>, (StatusCode, Json<ErrorBody>)> {
    let Some(subject) = state.session_auth.authenticated_subject(&headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new("Not authenticated")),
        ));
    };

    match auth::mint_session_token(&state.tokens, &subject) {
        Ok(token) => Ok(Json(SocketTokenResponse { token })),
        Err(error) => {
            error!(%subject, %error, "failed to mint socket token");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("Failed to generate token")),
            ))
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
