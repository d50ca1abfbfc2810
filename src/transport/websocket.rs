//! WebSocket transport
//!
//! A minimal WebSocket server that turns `submit` frames into ingress
//! gateway calls. Responsibilities:
//! - Accept TCP/WebSocket connections
//! - Parse each text frame and hand the payload to the `IngressGateway`
//! - Answer every frame with an `accepted` or `rejected` frame carrying the
//!   status code of the outcome
//!
//! Frames on one connection are handled one at a time. When the dispatcher
//! blocks admission, the connection stops reading, which pushes backpressure
//! onto the client.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::ingress::IngressGateway;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::{RelayError, SubmissionError, ValidationError};

/// Pause after a failed `accept`. Errors such as EMFILE repeat on every call
/// until a descriptor is released.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Binds the ingress address. Done before the relay starts so an unusable
/// address fails fast.
pub async fn bind(addr: &str) -> Result<TcpListener, RelayError> {
    let listener = TcpListener::bind(addr).await?;
    Ok(listener)
}

/// Accepts connections on an already bound listener until the task is
/// dropped.
pub async fn serve(listener: TcpListener, gateway: IngressGateway) {
    if let Ok(addr) = listener.local_addr() {
        info!("WebSocket ingress listening on ws://{addr}");
    }

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) if is_connection_error(&e) => {
                debug!(error = %e, "Connection dropped before accept");
                continue;
            }
            Err(e) => {
                warn!(error = %e, backoff_ms = ACCEPT_BACKOFF.as_millis() as u64, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let gateway = gateway.clone();
        tokio::spawn(handle_connection(stream, peer, gateway));
    }
}

/// Errors that concern a single incoming connection rather than the listener.
pub(crate) fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, gateway: IngressGateway) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "WebSocket handshake error");
            return;
        }
    };

    let client_id = format!("client-{}", Uuid::new_v4());
    debug!(%peer, client = %client_id, "Client connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(client = %client_id, error = %e, "Connection error");
                break;
            }
        };

        let reply = match frame {
            WsMessage::Text(text) => handle_frame(&gateway, text.as_str()).await,
            WsMessage::Binary(_) => ServerMessage::Rejected {
                request_id: None,
                status: 400,
                error: "binary frames are not supported".to_string(),
            },
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let text = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(e) => {
                warn!(client = %client_id, error = %e, "Failed to serialize reply");
                break;
            }
        };
        if let Err(e) = ws_sender.send(WsMessage::text(text)).await {
            warn!(client = %client_id, error = %e, "Failed to send reply");
            break;
        }
    }

    debug!(client = %client_id, "Client disconnected");
}

/// Handles one text frame and builds the reply for it.
pub async fn handle_frame(gateway: &IngressGateway, text: &str) -> ServerMessage {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => request,
        Err(e) => {
            warn!(
                error = %e,
                frame = %text.chars().take(100).collect::<String>(),
                "Invalid client message"
            );
            let err = SubmissionError::from(ValidationError::Malformed(e.to_string()));
            return ServerMessage::Rejected {
                request_id: None,
                status: err.status_code(),
                error: err.to_string(),
            };
        }
    };

    match request {
        ClientMessage::Submit {
            request_id,
            message,
        } => match gateway.submit_json(&message).await {
            Ok(id) => ServerMessage::Accepted {
                request_id,
                submission_id: id.to_string(),
            },
            Err(e) => ServerMessage::Rejected {
                request_id,
                status: e.status_code(),
                error: e.to_string(),
            },
        },
    }
}
