use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::app_state::AppState;
use crate::registry::Outbox;
use crate::signal::{ClientMessage, ServerMessage};

const STATUS_TEXT: &str = "WebRTC signaling server is running.";

// How long the writer gets to flush queued frames and the close reply
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// Browser clients open the socket on `/`, plain GETs just get a status line
pub async fn root_handler(ws: Option<WebSocketUpgrade>, State(state): State<AppState>) -> Response {
    match ws {
        Some(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state)),
        None => STATUS_TEXT.into_response(),
    }
}

/// Drives one client connection from upgrade until close.
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let relay = state.relay.clone();
    let client_id = relay.connect(Outbox::new(tx)).await;

    // Writer: everything addressed to this client goes through the queue
    let writer_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("failed to encode frame for {}: {}", writer_id, e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                debug!("write to {} failed: {}", writer_id, e);
                return;
            }
        }
        // queue closed: finish the close handshake
        if let Err(e) = sender.close().await {
            debug!("closing socket of {} failed: {}", writer_id, e);
        }
    });

    // Reader: frames from one client are routed strictly in arrival order
    let reader_relay = relay.clone();
    let reader_id = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => reader_relay.dispatch(&reader_id, &text).await,
                Ok(Message::Binary(bytes)) => match ClientMessage::parse_binary(&bytes) {
                    Ok(msg) => reader_relay.handle(&reader_id, msg).await,
                    Err(e) => warn!("dropping malformed message from {}: {}", reader_id, e),
                },
                Ok(Message::Close(_)) => break,
                // control frames are answered by the transport
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    debug!("read from {} failed: {}", reader_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            relay.disconnect(&client_id).await;
        }
        _ = &mut recv_task => {
            // dropping the registry entry releases the queue, so the writer
            // drains what is left and closes the sink
            relay.disconnect(&client_id).await;
            if timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
                debug!("writer of {} did not finish in time", client_id);
                send_task.abort();
            }
        }
    }
}
