//! WebSocket client plumbing shared by the listener and operator commands.

use anyhow::{Context, Result};
use clicktrack_types::{ClientMessage, ServerMessage};
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub async fn connect(url: &str) -> Result<WsStream> {
    let (ws, _resp) = connect_async(url)
        .await
        .with_context(|| format!("connect {url}"))?;
    Ok(ws)
}

pub async fn send(ws: &mut WsStream, msg: &ClientMessage) -> Result<()> {
    let text = serde_json::to_string(msg).context("encode frame")?;
    ws.send(Message::Text(text)).await.context("send frame")
}

/// Parse a hub text frame. Malformed frames are logged and dropped.
pub fn decode_text(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str(text) {
        Ok(msg) => Some(msg),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring malformed frame");
            None
        }
    }
}
