//! WebSocket glue between axum and the relay state machine.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt, future};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::relay::{Connection, Inbound, Outbound, PeerHandle, TransportError};
use crate::server::AppState;

/// `GET /ws` -- upgrade and hand the socket to the relay.
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

/// Run one signaling connection until it closes.
pub async fn serve_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    let (handle, rx) = PeerHandle::channel(state.config.peer_queue_capacity);
    let writer = tokio::spawn(write_frames(sink, rx));

    let inbound = stream
        .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| future::ready(inbound_frame(frame)))
        .boxed();

    let exit = Connection::new(
        state.registry,
        state.config.hello_timeout(),
        inbound,
        handle,
    )
    .run()
    .await;
    debug!(?exit, "Connection finished");

    if let Err(e) = writer.await {
        warn!(error = %e, "WebSocket writer task failed");
    }
}

/// Translate a transport frame; `None` for frames the relay never sees.
fn inbound_frame(frame: Result<Message, axum::Error>) -> Option<Inbound> {
    match frame {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        // Invalid UTF-8 becomes an empty frame, which the relay rejects as
        // non-JSON instead of forwarding an altered payload.
        Ok(Message::Binary(bytes)) => {
            Some(Ok(String::from_utf8(bytes.to_vec()).unwrap_or_default()))
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_)) => None,
        Err(e) => Some(Err(TransportError(e.to_string()))),
    }
}

/// Drain a connection's outbound queue into its socket.
async fn write_frames(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(frame) = rx.recv().await {
        let message = match frame {
            Outbound::Server(msg) => match msg.to_json() {
                Ok(text) => Message::Text(text.into()),
                Err(e) => {
                    warn!(error = %e, "Failed to encode server message");
                    continue;
                }
            },
            Outbound::Relayed(text) => Message::Text(text.into()),
            Outbound::Close => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(error = %e, "Close frame not delivered");
                }
                break;
            }
        };
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "WebSocket write failed");
            break;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "WebSocket close failed");
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    #[test]
    fn text_frames_pass_through() {
        let frame = inbound_frame(Ok(Message::Text(r#"{"type":"offer"}"#.into())));
        assert_eq!(frame, Some(Ok(r#"{"type":"offer"}"#.to_string())));
    }

    #[test]
    fn valid_binary_frames_are_decoded_verbatim() {
        let payload = "{\"sdp\":\"caf\u{e9}\"}";
        let bytes = Bytes::from(payload.as_bytes().to_vec());
        let frame = inbound_frame(Ok(Message::Binary(bytes)));
        assert_eq!(frame, Some(Ok(payload.to_string())));
    }

    #[test]
    fn invalid_utf8_binary_is_never_rewritten() {
        let bytes = Bytes::from_static(b"{\"k\":\"\xff\xfe\"}");
        let frame = inbound_frame(Ok(Message::Binary(bytes))).unwrap().unwrap();
        assert!(!frame.contains('\u{fffd}'));
        assert!(serde_json::from_str::<serde_json::Value>(&frame).is_err());
    }

    #[test]
    fn control_frames_are_hidden() {
        assert_eq!(inbound_frame(Ok(Message::Ping(Bytes::new()))), None);
        assert_eq!(inbound_frame(Ok(Message::Pong(Bytes::new()))), None);
    }
}
