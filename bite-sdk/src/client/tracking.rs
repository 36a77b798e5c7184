//! WebSocket subscriber for a request's tracking stream.

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::ClientError;
use crate::objects::TrackingSampleResponse;
use crate::objects::ws::TrackingWsMessage;
use crate::signature::{IDENTITY_HEADER, SIGNATURE_HEADER};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// An open tracking subscription.
///
/// Yields samples until the server tears the topic down or the connection
/// drops.
pub struct TrackingStream {
    socket: Socket,
}

impl TrackingStream {
    pub(super) async fn connect(
        url: Url,
        identity: &str,
        signature: &str,
    ) -> Result<Self, ClientError> {
        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            IDENTITY_HEADER,
            HeaderValue::from_str(identity).map_err(|_| ClientError::InvalidHeader)?,
        );
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(signature).map_err(|_| ClientError::InvalidHeader)?,
        );
        let (socket, _) = connect_async(request).await?;
        Ok(Self { socket })
    }

    /// Wait for the next sample.
    ///
    /// Returns `Ok(None)` once the stream has ended.
    pub async fn next_sample(&mut self) -> Result<Option<TrackingSampleResponse>, ClientError> {
        while let Some(frame) = self.socket.next().await {
            match frame? {
                Message::Text(text) => match serde_json::from_str(&text)? {
                    TrackingWsMessage::Sample { sample } => return Ok(Some(sample)),
                    TrackingWsMessage::Closed => return Ok(None),
                    TrackingWsMessage::Error { .. } => return Ok(None),
                },
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }
}
