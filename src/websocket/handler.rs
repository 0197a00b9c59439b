//! WebSocket Handler
//!
//! Checks the Origin of upgrade requests and hands upgraded sockets to the hub.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use std::sync::Arc;

use super::hub::ConnectionHub;
use crate::api::AppState;

/// WebSocket upgrade handler
///
/// Requests from an Origin outside the allow-list get `403`. Requests with no
/// Origin header (non-browser clients) are accepted.
pub async fn websocket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    if !origin_allowed(origin, &state.config.server.allowed_origins) {
        tracing::warn!(origin = origin.unwrap_or_default(), "WebSocket origin rejected");
        return StatusCode::FORBIDDEN.into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Not a WebSocket upgrade request");
            return rejection.into_response();
        }
    };

    let hub = Arc::clone(&state.hub);
    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Register an upgraded socket and start its read and write activities
pub async fn handle_socket(socket: WebSocket, hub: Arc<ConnectionHub>) {
    let (sink, stream) = socket.split();
    let (conn, outbound) = hub.new_connection();

    if let Err(e) = hub.register(Arc::clone(&conn)).await {
        // Dropping the socket halves closes the transport
        tracing::warn!(connection_id = %conn.id(), error = %e, "WebSocket registration refused");
        return;
    }

    hub.attach(conn, outbound, sink, stream);
}

/// Check an Origin header value against the allow-list
///
/// A `*` entry allows every origin.
pub fn origin_allowed(origin: Option<&str>, allowed: &[String]) -> bool {
    let Some(origin) = origin.filter(|o| !o.is_empty()) else {
        return true;
    };

    allowed
        .iter()
        .map(|entry| entry.trim())
        .any(|entry| entry == "*" || entry == origin)
}
