//! Live log streaming over WebSocket
//!
//! Each connection registers with the broadcast hub and runs two tasks: a
//! write pump draining the subscriber queue (with periodic pings) and a read
//! pump enforcing a liveness deadline. Either pump ending tears the
//! connection down and unregisters the subscriber.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::handlers::AppState;
use crate::hub::Hub;

/// Time allowed to write a frame to the peer.
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between inbound frames before the peer is considered dead.
const PONG_WAIT: Duration = Duration::from_secs(60);

/// Ping interval. Must be less than PONG_WAIT.
const PING_PERIOD: Duration = Duration::from_secs(54);

/// GET /api/ws
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

async fn handle_socket(socket: WebSocket, hub: Hub) {
    let subscription = hub.subscribe();
    let id = subscription.id;
    let (sink, stream) = socket.split();

    let mut write_task = tokio::spawn(write_pump(sink, subscription.receiver));
    let mut read_task = tokio::spawn(read_pump(stream));

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    hub.unsubscribe(id);
}

/// Pump broadcast payloads from the hub to the socket, pinging on idle.
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut receiver: mpsc::Receiver<Arc<str>>,
) {
    let mut ping = tokio::time::interval(PING_PERIOD);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Consume the immediate first tick so the first ping waits a full period
    ping.tick().await;

    loop {
        tokio::select! {
            payload = receiver.recv() => match payload {
                Some(payload) => {
                    if send_with_deadline(&mut sink, Message::Text(payload.to_string()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                None => {
                    // Hub dropped this subscriber (eviction or shutdown)
                    let _ = send_with_deadline(&mut sink, Message::Close(None)).await;
                    return;
                }
            },
            _ = ping.tick() => {
                if send_with_deadline(&mut sink, Message::Ping(Vec::new()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

async fn send_with_deadline(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
) -> Result<(), ()> {
    match timeout(WRITE_WAIT, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "websocket write failed");
            Err(())
        }
        Err(_) => {
            tracing::debug!("websocket write deadline exceeded");
            Err(())
        }
    }
}

/// Drain inbound frames to keep control handling alive; any frame refreshes
/// the read deadline.
async fn read_pump(mut stream: SplitStream<WebSocket>) {
    loop {
        match timeout(PONG_WAIT, stream.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "websocket read failed");
                return;
            }
            Err(_) => {
                tracing::debug!("websocket read deadline exceeded");
                return;
            }
        }
    }
}
