use super::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;

/// Trait for opening one WebSocket session
///
/// The resilient connection calls `connect` once per attempt and owns the
/// returned stream exclusively until that session ends. Implementations
/// must be reusable across attempts and behave identically on every call.
#[async_trait]
pub trait WsTransport: Send + Sync + 'static {
    /// Byte stream the WebSocket runs over
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Perform every handshake needed to reach an upgraded WebSocket
    ///
    /// # Returns
    /// * `Ok(stream)` - Upgrade completed, the session is open
    /// * `Err(PinSocketError)` - Any failure, pinning rejections included
    async fn connect(&self, endpoint: &str) -> Result<WebSocketStream<Self::Stream>>;
}
