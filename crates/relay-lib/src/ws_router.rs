// ============================
// relay-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
//!
//! The HTTP surface is the realtime endpoint (`/ws`) plus a read-only
//! management pair (`/health`, `/metrics`) behind the rate limiter.
//! Authentication happens here, before the upgrade completes: a refused
//! credential never creates a session and never moves the connection gauge.

use crate::auth::Identity;
use crate::error::RelayError;
use crate::middleware::rate_limit;
use crate::session::ConnectionSession;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bugtrail_common::Frame;
use chrono::{SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the relay router
pub fn create_router(state: Arc<AppState>) -> Router {
    let management = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_snapshot))
        .route_layer(from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/ws", get(ws_handler))
        .merge(management)
        .layer(cors_layer(&state.settings.client_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured client origin, credentials allowed.
fn cors_layer(client_origin: &str) -> CorsLayer {
    let origin = client_origin.parse::<HeaderValue>().unwrap_or_else(|_| {
        tracing::warn!(client_origin, "invalid client origin, falling back to localhost");
        HeaderValue::from_static("http://localhost:3000")
    });

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true)
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

/// Handler for WebSocket connections
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, RelayError> {
    // Refuse before the upgrade: a bad credential never reaches session logic
    let identity = state.verifier.verify(params.token.as_deref())?;
    tracing::info!(
        user = %identity.email,
        subject = %identity.subject_id,
        "user authenticated"
    );

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, identity)))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound channel: the registry writes here, one task forwards to the wire
    let (outbound, mut outbound_rx) = mpsc::channel::<Frame>(32);

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = ConnectionSession::new(
        identity,
        outbound,
        state.registry.clone(),
        state.router.clone(),
        state.metrics.clone(),
    );

    // Membership is resolved once, before any frame is read
    session.join_initial_rooms(state.memberships.as_ref()).await;

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<Frame>(&text) {
                Ok(frame) => session.dispatch(frame),
                Err(err) => {
                    // Not a frame at all; drop it, the connection survives
                    tracing::warn!(user = %session.identity().email, "malformed frame: {err}");
                },
            },
            Message::Close(_) => break,
            _ => {},
        }
    }

    session.terminate();
    send_task.abort();
}

/// `GET /health`
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// `GET /metrics`, Prometheus exposition text
async fn metrics_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
}
