//! Realtime socket. A client connects with its JWT and is placed in the
//! rooms its claims entitle it to; from then on it only ever receives
//! envelopes addressed to one of those rooms. There is no join/leave
//! protocol and nothing the client sends is interpreted except close.

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    events::Room,
    middleware::auth::decode_token,
    notify::{NotificationHub, rooms_for_user},
    state::AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct WsParams {
    /// JWT, passed as a query parameter since browsers cannot set headers
    /// on websocket handshakes.
    pub token: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(ws_upgrade))
}

#[utoipa::path(
    get,
    path = "/api/ws",
    params(("token" = String, Query, description = "Bearer token")),
    responses(
        (status = 101, description = "Switching Protocols"),
        (status = 401, description = "Invalid token"),
    ),
    tag = "Events"
)]
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user = decode_token(&params.token)?;
    let rooms = rooms_for_user(&state.pool, &user).await?;
    tracing::debug!(user_id = %user.user_id, role = %user.role, "websocket connected");
    Ok(ws.on_upgrade(move |socket| relay(socket, state.hub.clone(), rooms)))
}

async fn relay(socket: WebSocket, hub: NotificationHub, rooms: Vec<Room>) {
    let mut rx = hub.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(envelope) => {
                    if !envelope.addressed_to_any(&rooms) {
                        continue;
                    }
                    let frame = match serde_json::to_string(&envelope) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::warn!(error = %err, "dropping unencodable envelope");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // The client catches up through GET /api/events.
                    tracing::debug!(skipped, "websocket receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Pings are answered by axum; anything else is ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("websocket disconnected");
}
