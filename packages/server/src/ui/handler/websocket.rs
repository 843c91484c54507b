//! WebSocket connection handlers.
//!
//! Admission runs before the upgrade so a rejected connection gets a plain
//! HTTP status. After the upgrade a socket is only a pump between the wire
//! and its owning actor.

use std::sync::Arc;

use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::{
    actor::{ActorGone, Outbound, OutboundReceiver},
    domain::{Identity, RoomKey},
    ui::state::{AppState, ConnectQuery},
    usecase::{AdmissionError, ConnectRequest},
};

/// `GET /api/ws/room/{room_id}`
pub async fn room_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let key = RoomKey::new(room_id).map_err(|e| {
        tracing::warn!(error = %e, "invalid room key");
        StatusCode::BAD_REQUEST
    })?;
    let request = query.into_request().ok_or(StatusCode::BAD_REQUEST)?;
    let identity = admit(&state, &request, Some(&key)).await?;

    Ok(ws.on_upgrade(move |socket| async move {
        let (tx, rx) = mpsc::unbounded_channel();
        let joined = state
            .rooms
            .join(&key, identity, request.session_id, tx)
            .await;
        let (room, connection) = match joined {
            Ok(joined) => joined,
            Err(e) => {
                tracing::error!(room = %key, error = %e, "failed to join room");
                return;
            }
        };
        let inbound = room.clone();
        pump(socket, rx, move |text| inbound.inbound(connection, text)).await;
        room.leave(connection);
    }))
}

/// `GET /api/ws/presence`
pub async fn presence_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let request = query.into_request().ok_or(StatusCode::BAD_REQUEST)?;
    let identity = admit(&state, &request, None).await?;

    Ok(ws.on_upgrade(move |socket| async move {
        let (tx, rx) = mpsc::unbounded_channel();
        let presence = state.presence.clone();
        let connection = match presence.join(identity, request.session_id, tx).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(error = %e, "failed to join presence");
                return;
            }
        };
        let inbound = presence.clone();
        pump(socket, rx, move |text| inbound.inbound(connection, text)).await;
        presence.leave(connection);
    }))
}

async fn admit(
    state: &AppState,
    request: &ConnectRequest,
    room: Option<&RoomKey>,
) -> Result<Identity, StatusCode> {
    state
        .admission
        .execute(request, room)
        .await
        .map_err(|e| {
            tracing::warn!(user = %request.user_id, error = %e, "connection rejected");
            match e {
                AdmissionError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                AdmissionError::Forbidden(_) => StatusCode::FORBIDDEN,
                AdmissionError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            }
        })
}

/// Move frames between `socket` and an actor until either side stops.
async fn pump<F>(socket: WebSocket, mut rx: OutboundReceiver, mut on_text: F)
where
    F: FnMut(String) -> Result<(), ActorGone> + Send + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    // Actor -> client
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Text(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = sender.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    // Client -> actor
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!(error = %e, "websocket read failed");
                    break;
                }
            };
            match msg {
                Message::Text(text) => {
                    if on_text(text.as_str().to_owned()).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };
}
