// HTTP API handlers

use axum::{
    extract::{ws::WebSocket, Path, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::{Intent, IntentKind};
use crate::types::{ClientMessage, ServerMessage};
use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "trading-game",
        "sessions": state.registry.session_count().await,
        "timestamp": Utc::now()
    }))
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| websocket_connection(socket, session_id, state))
}

async fn websocket_connection(socket: WebSocket, session_id: String, state: AppState) {
    let conn = Uuid::new_v4();
    info!("WebSocket connection {} joined session path {}", conn, session_id);

    let handle = state.registry.get_or_create(&session_id).await;
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut events_rx = handle.events.subscribe();

    // First thing every connection gets is the current snapshot.
    if handle
        .intents
        .send(Intent {
            conn,
            reply: Some(reply_tx.clone()),
            kind: IntentKind::Connected,
        })
        .is_err()
    {
        warn!("Session {} is no longer running", session_id);
        return;
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Push broadcast snapshots and requester-scoped replies to the client.
    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(message) => message,
                    None => break,
                },
                event = events_rx.recv() => match event {
                    Ok(message) => message,
                    // Snapshots are full state; after a lag the next one
                    // catches the client up.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Connection lagged {} broadcasts", skipped);
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            };

            let json_message = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize server message: {}", e);
                    continue;
                }
            };

            if ws_sender
                .send(axum::extract::ws::Message::Text(json_message))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Parse client frames into intents for the session mailbox.
    let intents = handle.intents.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(axum::extract::ws::Message::Text(text)) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => {
                            if intents
                                .send(Intent {
                                    conn,
                                    reply: Some(reply_tx.clone()),
                                    kind: IntentKind::Client(message),
                                })
                                .is_err()
                            {
                                // The session actor has stopped; this id no
                                // longer resolves to a live game.
                                let _ = reply_tx.send(ServerMessage::Error {
                                    kind: "UnknownSession".to_string(),
                                    message: "session is no longer running".to_string(),
                                });
                                break;
                            }
                        }
                        Err(e) => {
                            debug!("Rejecting malformed frame on {}: {}", conn, e);
                            let _ = reply_tx.send(ServerMessage::Error {
                                kind: "InvalidMessage".to_string(),
                                message: format!("could not parse message: {}", e),
                            });
                        }
                    }
                }
                Ok(axum::extract::ws::Message::Close(_)) => break,
                Err(e) => {
                    debug!("WebSocket error on {}: {}", conn, e);
                    break;
                }
                _ => {}
            }
        }

        // Transport loss is not an error: flag the participant offline and
        // keep their state for reconnection.
        let _ = intents.send(Intent {
            conn,
            reply: None,
            kind: IntentKind::ConnectionClosed,
        });
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    info!("WebSocket connection {} closed", conn);
}
