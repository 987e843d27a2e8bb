//! Socket transport for the chat service.
//!
//! Each upgraded connection registers an outbound queue with the hub, then
//! multiplexes two directions in one task: frames from the client are parsed
//! into [`ClientEvent`]s and handed to the service; events the hub queued for
//! this connection are serialized and written back.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
    dtos::eventdtos::{ClientEvent, ServerEvent},
    service::chat_session::{ChatSession, SessionControl},
    AppState,
};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(app_state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let service = &app_state.chat_service;
    let (connection_id, mut outbound) = service.hub().connect().await;
    let mut session = ChatSession::new(connection_id);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    tracing::debug!(%connection_id, "socket connected");

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                if send_event(&mut ws_sender, &event).await.is_err() {
                    break;
                }
            }

            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => event,
                            Err(err) => {
                                tracing::warn!(%connection_id, error = %err, "ignoring malformed socket frame");
                                continue;
                            }
                        };

                        if service.handle_event(&mut session, event).await == SessionControl::Disconnect {
                            flush(&mut ws_sender, &mut outbound).await;
                            let _ = ws_sender.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(%connection_id, error = %err, "socket receive error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    service.disconnect(&session).await;
}

async fn send_event<S>(ws_sender: &mut S, event: &ServerEvent) -> Result<(), axum::Error>
where
    S: SinkExt<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(json) => ws_sender.send(Message::Text(json)).await,
        Err(err) => {
            tracing::warn!(event = event.name(), error = %err, "failed to serialize server event");
            Ok(())
        }
    }
}

/// Writes whatever is already queued, so a closing reply such as
/// `auth_error` reaches the client before the close frame.
async fn flush<S>(ws_sender: &mut S, outbound: &mut mpsc::Receiver<ServerEvent>)
where
    S: SinkExt<Message, Error = axum::Error> + Unpin,
{
    while let Ok(event) = outbound.try_recv() {
        if send_event(ws_sender, &event).await.is_err() {
            return;
        }
    }
}
