use async_trait::async_trait;
use futures_util::StreamExt;
use kiln_common::BuildId;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;
use url::Url;

use super::{FrameStream, LogTransport};
use crate::api::BUILD_STREAM_PATH;
use crate::errors::StreamTransportError;

/// Derive the live log address for a build from the REST base URL:
/// `http` becomes `ws`, `https` becomes `wss`, and the build id travels as
/// the `buildId` query parameter.
pub fn stream_url(base_url: &str, build_id: &BuildId) -> Result<Url, StreamTransportError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| StreamTransportError::InvalidAddress(format!("{}: {}", base_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(StreamTransportError::InvalidAddress(format!(
                "unsupported scheme '{}' in {}",
                other, base_url
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| StreamTransportError::InvalidAddress(base_url.to_string()))?;

    let path = format!("{}/{}", url.path().trim_end_matches('/'), BUILD_STREAM_PATH);
    url.set_path(&path);
    url.set_query(None);
    url.query_pairs_mut().append_pair("buildId", build_id.as_str());
    Ok(url)
}

/// Websocket implementation of [`LogTransport`].
#[derive(Clone)]
pub struct WsLogTransport {
    base_url: String,
    token: Option<String>,
}

impl WsLogTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
        }
    }
}

/// Map one websocket message onto a frame body. Control frames are dropped.
fn frame_body(msg: Result<Message, WsError>) -> Option<Result<String, StreamTransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_)) => None,
        // Clean shutdown after the close handshake.
        Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => None,
        Err(e) => Some(Err(StreamTransportError::Protocol(e.to_string()))),
    }
}

#[async_trait]
impl LogTransport for WsLogTransport {
    async fn connect(&self, build_id: &BuildId) -> Result<FrameStream, StreamTransportError> {
        let url = stream_url(&self.base_url, build_id)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| StreamTransportError::InvalidAddress(e.to_string()))?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| StreamTransportError::Connect(format!("invalid credential: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        debug!(build_id = %build_id, url = %url, "opening live log stream");
        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| StreamTransportError::Connect(e.to_string()))?;

        Ok(socket
            .filter_map(|msg| futures_util::future::ready(frame_body(msg)))
            .boxed())
    }
}
