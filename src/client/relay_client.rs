use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;

use crate::dispatcher::Message;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::ClientError;

/// A WebSocket connection to a relay's ingress.
///
/// Requests are answered in order, so `submit` waits for the reply to its
/// own frame before returning.
pub struct RelayClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_request: u64,
}

impl RelayClient {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _response) = connect_async(url).await?;
        debug!(%url, "Connected to relay");
        Ok(Self { ws, next_request: 0 })
    }

    pub async fn submit(&mut self, message: &Message) -> Result<ServerMessage, ClientError> {
        let body = serde_json::to_value(message)?;
        self.submit_raw(body).await
    }

    /// Submits an arbitrary JSON body; the server validates it.
    pub async fn submit_raw(&mut self, body: Value) -> Result<ServerMessage, ClientError> {
        self.next_request += 1;
        let frame = ClientMessage::Submit {
            request_id: Some(format!("req-{}", self.next_request)),
            message: body,
        };
        self.ws
            .send(WsMessage::text(serde_json::to_string(&frame)?))
            .await?;

        loop {
            match self.ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(serde_json::from_str(text.as_str())?),
                Some(Ok(WsMessage::Close(_))) | None => return Err(ClientError::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }
}
