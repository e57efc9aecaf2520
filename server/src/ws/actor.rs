use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::{outbound_channel, protocol, Connection, ConnectionReceiver};

/// Run the actor-per-connection pattern for one relay WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from the outbound queue
/// - Reader task: decodes incoming frames and dispatches them into the engine
///
/// The engine reaches this client through the queue's sender, which the
/// registry holds once the client has sent INIT. When the writer stops (send
/// failure or close signal) the reader stops too and the socket is dropped.
pub async fn run_connection(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = outbound_channel(state.settings.outbound_buffer);

    let mut session = state.relay.open_session(tx.clone());
    let connection_id = session.connection().id();

    tracing::info!(
        connection_id,
        peer = %peer,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards queued messages to the WebSocket sink
    let close_signal = session.connection().close_signal();
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx, close_signal));
    drop(tx);

    // Track pong reception
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();

    // Server-initiated keep-alive; disabled when the interval is zero
    let ping_handle = (!state.settings.ping_interval.is_zero()).then(|| {
        tokio::spawn(keepalive_task(
            session.connection().clone(),
            pong_rx,
            state.settings.ping_interval,
            state.settings.pong_timeout,
        ))
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            _ = &mut writer_handle => {
                tracing::info!(connection_id, "Writer finished, dropping connection");
                break;
            }
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &mut session, &state.relay)
                        .await;
                }
                Message::Binary(_) => {
                    protocol::handle_binary_message(&session, &state.relay);
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(_) => {
                    // axum queues the pong reply itself
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id,
                        identity = session.identity().unwrap_or("<anonymous>"),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended, client disconnected
                tracing::info!(connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and keep-alive tasks. Dropping the writer's
    // receiver marks the channel closed for any concurrent sweep.
    writer_handle.abort();
    if let Some(handle) = ping_handle {
        handle.abort();
    }

    state.relay.handle_disconnect(&session).await;

    tracing::info!(
        connection_id,
        identity = session.identity().unwrap_or("<anonymous>"),
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from the outbound queue and forwards them to the WebSocket sink.
/// A close signal jumps the queue: its frame is written directly and the task ends.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: ConnectionReceiver,
    mut close_signal: watch::Receiver<Option<CloseFrame>>,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                if ws_sender.send(msg).await.is_err() {
                    // WebSocket send failed, connection is broken
                    break;
                }
            }
            Ok(()) = close_signal.changed() => {
                let frame = close_signal.borrow_and_update().clone();
                if let Some(frame) = frame {
                    tracing::debug!(code = frame.code, "Closing connection on request");
                    let _ = ws_sender.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    }
}

/// Keep-alive task: sends periodic pings and closes the connection when a
/// pong does not arrive in time.
async fn keepalive_task(
    conn: Connection,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let mut ping_timer = interval(ping_interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        let ping = Message::Ping(vec![1, 2, 3, 4].into());
        let answered = match conn.send("<keepalive>", ping, pong_timeout).await {
            Ok(()) => matches!(timeout(pong_timeout, pong_rx.recv()).await, Ok(Some(()))),
            Err(e) if e.is_transport_fault() && conn.is_closed() => {
                // Writer task has died
                break;
            }
            Err(_) => false,
        };

        if !answered {
            tracing::warn!(connection_id = conn.id(), "Pong timeout, closing connection");
            conn.close(1001, "Pong timeout");
            break;
        }
    }
}
