use std::time::{Duration, SystemTime};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ErrorNotice, InboundMessage, OutboundMessage},
    error::ServiceError,
    state::SharedState,
};

const DISCONNECT_ATTEMPTS: u32 = 3;
const DISCONNECT_BACKOFF: Duration = Duration::from_millis(200);

/// The writer half of the socket is gone.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Drive one player socket from connect to disconnect.
///
/// Every socket gets a fresh connection identity; it is the only identity a
/// player has, so a reconnecting client joins as a new player.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection_id = Uuid::new_v4().simple().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    state
        .connections()
        .register(connection_id.clone(), outbound_tx.clone());
    info!(connection_id, "player connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let received = SystemTime::now();
                debug!(connection_id, payload = %text, "received player message");
                if handle_text(&state, &connection_id, &outbound_tx, text.as_str(), received)
                    .await
                    .is_err()
                {
                    info!(connection_id, "connection closed while replying, terminating");
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(connection_id, "player closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!(connection_id, "ignoring binary frame");
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.connections().unregister(&connection_id);
    disconnect_with_retry(&state, &connection_id).await;
    info!(connection_id, "player disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Route one text frame to the game service, answering failures on the socket.
async fn handle_text(
    state: &SharedState,
    connection_id: &str,
    tx: &mpsc::UnboundedSender<Message>,
    text: &str,
    received: SystemTime,
) -> Result<(), ConnectionClosed> {
    let outcome = match InboundMessage::from_json_str(text) {
        Ok(message) => dispatch_message(state, connection_id, message, received).await,
        Err(err) => Err(err.into()),
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(connection_id, error = %err, "failed to handle player message");
            send_message_to_websocket(
                tx,
                &OutboundMessage::Error(ErrorNotice {
                    message: err.to_string(),
                }),
            )
        }
    }
}

async fn dispatch_message(
    state: &SharedState,
    connection_id: &str,
    message: InboundMessage,
    received: SystemTime,
) -> Result<(), ServiceError> {
    let service = state.game_service().await?;
    match message {
        InboundMessage::NewPlayer(new_player) => service.join(connection_id, new_player).await,
        InboundMessage::PlayerResponse(answer) => {
            service
                .record_response(connection_id, answer.response, received)
                .await
        }
    }
}

/// Tell the game service the socket is gone, retrying transient failures.
async fn disconnect_with_retry(state: &SharedState, connection_id: &str) {
    let mut backoff = DISCONNECT_BACKOFF;
    for attempt in 1..=DISCONNECT_ATTEMPTS {
        let result = match state.game_service().await {
            Ok(service) => service.disconnect(connection_id).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => return,
            Err(err) if attempt < DISCONNECT_ATTEMPTS => {
                debug!(connection_id, attempt, error = %err, "disconnect failed; retrying");
                sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => {
                warn!(
                    connection_id,
                    error = %err,
                    "giving up on disconnect; the player record will expire"
                );
            }
        }
    }
}

fn send_message_to_websocket(
    tx: &mpsc::UnboundedSender<Message>,
    value: &OutboundMessage,
) -> Result<(), ConnectionClosed> {
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, kind = value.kind(), "failed to serialize message");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
