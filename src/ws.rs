//! HTTP surface: WebSocket upgrade, health, and stats.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lexhub_core::AppError;
use lexhub_core::config::RealtimeConfig;
use lexhub_core::error::ErrorKind;
use lexhub_core::traits::KeyValueStore;
use lexhub_core::types::UserId;
use lexhub_realtime::RealtimeEngine;
use lexhub_realtime::connection::{ChannelTransport, WsAuthenticator};

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub engine: RealtimeEngine,
    pub authenticator: WsAuthenticator,
    pub store: Arc<dyn KeyValueStore>,
    pub realtime: RealtimeConfig,
}

/// Query parameters of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(err: AppError) -> Response {
    let status = match err.kind {
        ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ServiceUnavailable | ErrorKind::Cache => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "error": err.kind.to_string(), "message": err.message })),
    )
        .into_response()
}

/// GET /ws?token={jwt}
async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
) -> Response {
    match state.authenticator.authenticate(query.token.as_deref()).await {
        Ok(user_id) => ws.on_upgrade(move |socket| handle_socket(state, user_id, socket)),
        Err(e) => {
            warn!(error = %e, "Rejected WebSocket upgrade");
            error_response(e)
        }
    }
}

/// Bridge one socket to the registry through a [`ChannelTransport`].
async fn handle_socket(state: AppState, user_id: UserId, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (transport, mut peer) = ChannelTransport::pair(
        state.realtime.send_buffer_size,
        state.realtime.write_timeout(),
    );

    let registry = state.engine.registry.clone();
    let connection = match registry.connect(transport, &user_id, None, None).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Connection registration failed");
            return;
        }
    };
    let conn_id = connection.id.clone();
    drop(connection);

    let outbound = tokio::spawn(async move {
        while let Some(text) = peer.outbound.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => registry.handle_message(&conn_id, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    registry.disconnect(&conn_id).await;
    outbound.abort();
    info!(conn_id = %conn_id, user_id = %user_id, "WebSocket closed");
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Response {
    let store_ok = state.store.health_check().await.unwrap_or(false);
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if store_ok { "ok" } else { "degraded" },
            "store": store_ok,
            "node_id": state.engine.broadcaster.node_id(),
        })),
    )
        .into_response()
}

/// GET /stats
async fn stats_handler(State(state): State<AppState>) -> Response {
    Json(state.engine.stats().await).into_response()
}
