//! WebSocket connect helper for exchange streams.

use std::collections::HashMap;

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Error;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Open a (TLS if `wss://`) WebSocket connection with optional extra handshake headers.
pub async fn connect_ws(url: &str, extra_headers: &HashMap<String, String>) -> Result<WsStream, Error> {
    let mut request = url.into_client_request()?;
    for (key, value) in extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| Error::HttpFormat(e.into()))?;
        let value = HeaderValue::from_str(value).map_err(|e| Error::HttpFormat(e.into()))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[tokio::test]
    async fn connects_with_extra_headers() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut seen = None;
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                seen = req.headers().get("x-test").map(|v| v.to_str().unwrap_or_default().to_string());
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
            .await
            .unwrap();
            ws.send(Message::Text("hello".into())).await.unwrap();
            seen
        });

        let headers = HashMap::from([("X-Test".to_string(), "abc".to_string())]);
        let mut ws = connect_ws(&format!("ws://{addr}/ws"), &headers).await.unwrap();
        let msg = ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "hello");
        ws.close(None).await.ok();

        assert_eq!(server.await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn invalid_url_is_an_error() {
        assert!(connect_ws("not a url", &HashMap::new()).await.is_err());
    }
}
