//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the connection configuration for a single
//! ComfyUI instance.  Call [`ComfyUIClient::connect`] to establish a
//! live [`ComfyUISession`] over WebSocket.

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Raw WebSocket stream type used for ComfyUI sessions.
pub type ComfyUIStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI instance.
///
/// Stores the WebSocket and HTTP API URLs plus the client ID the
/// process presents to ComfyUI. Create a [`ComfyUISession`] by calling
/// [`connect`](Self::connect).
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    client_id: String,
    ws_url: String,
    api_url: String,
}

/// A live WebSocket session with a ComfyUI instance.
///
/// ComfyUI routes execution events for prompts submitted with
/// `client_id` to this socket.
pub struct ComfyUISession {
    /// Client ID sent during the WebSocket handshake.
    pub client_id: String,
    /// Base HTTP API URL (e.g. `http://host:8188`).
    pub api_url: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: ComfyUIStream,
}

impl ComfyUIClient {
    /// Create a new client targeting a specific ComfyUI instance.
    ///
    /// * `client_id` - process-scoped identifier presented on every handshake.
    /// * `ws_url`    - WebSocket base URL, e.g. `ws://host:8188`.
    /// * `api_url`   - HTTP base URL, e.g. `http://host:8188`.
    pub fn new(client_id: String, ws_url: String, api_url: String) -> Self {
        Self {
            client_id,
            ws_url,
            api_url,
        }
    }

    /// Build both URLs from a host and port.
    pub fn for_address(client_id: String, host: &str, port: u16) -> Self {
        Self::new(
            client_id,
            format!("ws://{host}:{port}"),
            format!("http://{host}:{port}"),
        )
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// HTTP API base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Full session endpoint, `<ws_url>/ws?clientId=<client_id>`.
    pub fn session_url(&self) -> String {
        format!("{}/ws?clientId={}", self.ws_url, self.client_id)
    }

    /// Connect to the ComfyUI WebSocket endpoint.
    pub async fn connect(&self) -> Result<ComfyUISession, ComfyUIClientError> {
        let url = self.session_url();

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %self.client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyUISession {
            client_id: self.client_id.clone(),
            api_url: self.api_url.clone(),
            ws_stream,
        })
    }
}

impl ComfyUISession {
    /// Send a close frame and flush it.
    pub async fn close(mut self) -> Result<(), ComfyUIClientError> {
        self.ws_stream
            .send(Message::Close(None))
            .await
            .map_err(|e| ComfyUIClientError::Protocol(e.to_string()))?;
        tracing::debug!(client_id = %self.client_id, "ComfyUI session closed");
        Ok(())
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_url_carries_client_id() {
        let client = ComfyUIClient::for_address("abc-123".into(), "127.0.0.1", 8188);
        assert_eq!(client.ws_url(), "ws://127.0.0.1:8188");
        assert_eq!(client.api_url(), "http://127.0.0.1:8188");
        assert_eq!(
            client.session_url(),
            "ws://127.0.0.1:8188/ws?clientId=abc-123"
        );
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let client = ComfyUIClient::for_address("abc".into(), "127.0.0.1", 9);
        let err = client.connect().await.err().unwrap();
        assert!(matches!(err, ComfyUIClientError::Connection(_)));
    }
}
