//! WebSocket Transport
//!
//! [`Transport`] implementation over `tokio-tungstenite`, with optional
//! tunnelling through an HTTP CONNECT proxy. TLS is negotiated end to end
//! with the exchange, inside the tunnel when a proxy is configured.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{Connection, InboundFrame, OutboundFrame, Transport, TransportError};
use crate::infrastructure::config::ProxySettings;

/// Default time allowed for TCP, proxy, TLS, and WebSocket handshakes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_PROXY_RESPONSE: usize = 8 * 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Transport
// =============================================================================

/// Opens WebSocket connections, directly or through a proxy.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    proxy: Option<ProxySettings>,
    connect_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(None, DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WebSocketTransport {
    /// Create a transport.
    #[must_use]
    pub const fn new(proxy: Option<ProxySettings>, connect_timeout: Duration) -> Self {
        Self {
            proxy,
            connect_timeout,
        }
    }

    async fn open(&self, endpoint: &str) -> Result<WsStream, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };

        match &self.proxy {
            None => {
                let (stream, _response) = tokio_tungstenite::connect_async(endpoint)
                    .await
                    .map_err(|e| connect_error(e.to_string()))?;
                Ok(stream)
            }
            Some(proxy) => {
                let request = endpoint
                    .into_client_request()
                    .map_err(|e| connect_error(e.to_string()))?;
                let uri = request.uri();
                let host = uri
                    .host()
                    .ok_or_else(|| connect_error("endpoint has no host".to_string()))?
                    .to_string();
                let port = uri
                    .port_u16()
                    .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

                let tunnel = open_tunnel(proxy, &host, port).await?;
                let (stream, _response) = tokio_tungstenite::client_async_tls(request, tunnel)
                    .await
                    .map_err(|e| connect_error(e.to_string()))?;
                Ok(stream)
            }
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError> {
        let stream = tokio::time::timeout(self.connect_timeout, self.open(endpoint))
            .await
            .map_err(|_| TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: format!("timed out after {:?}", self.connect_timeout),
            })??;

        Ok(Box::new(WebSocketConnection { stream }))
    }
}

/// Establish an HTTP CONNECT tunnel to `host:port` through `proxy`.
async fn open_tunnel(
    proxy: &ProxySettings,
    host: &str,
    port: u16,
) -> Result<TcpStream, TransportError> {
    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .map_err(|e| TransportError::Proxy(format!("connect to {proxy} failed: {e}")))?;

    let request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| TransportError::Proxy(e.to_string()))?;

    let mut response = Vec::with_capacity(256);
    let mut chunk = [0_u8; 512];
    while !response.windows(4).any(|w| w == b"\r\n\r\n") {
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|e| TransportError::Proxy(e.to_string()))?;
        if read == 0 {
            return Err(TransportError::Proxy(
                "proxy closed the connection during CONNECT".to_string(),
            ));
        }
        response.extend_from_slice(&chunk[..read]);
        if response.len() > MAX_PROXY_RESPONSE {
            return Err(TransportError::Proxy("oversized CONNECT response".to_string()));
        }
    }

    let head = String::from_utf8_lossy(&response);
    let status_line = head.lines().next().unwrap_or_default();
    match status_line.split_whitespace().nth(1) {
        Some("200") => {
            tracing::debug!(proxy = %proxy, host, port, "Proxy tunnel established");
            Ok(stream)
        }
        _ => Err(TransportError::Proxy(format!(
            "CONNECT {host}:{port} rejected: {status_line}"
        ))),
    }
}

// =============================================================================
// Connection
// =============================================================================

struct WebSocketConnection {
    stream: WsStream,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        let message = match frame {
            OutboundFrame::Text(text) => Message::Text(text.into()),
            OutboundFrame::Ping => Message::Ping(Vec::new().into()),
            // tungstenite queues pongs for inbound pings on its own
            OutboundFrame::Pong(_) => return Ok(()),
        };
        self.stream
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Result<InboundFrame, TransportError> {
        loop {
            let message = match self.stream.next().await {
                None => return Err(TransportError::Closed(None)),
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
                Some(Ok(message)) => message,
            };

            return Ok(match message {
                Message::Text(text) => InboundFrame::Text(text.as_str().to_owned()),
                Message::Binary(bytes) => InboundFrame::Binary(bytes.to_vec()),
                Message::Ping(payload) => InboundFrame::Ping(payload.to_vec()),
                Message::Pong(_) => InboundFrame::Pong,
                Message::Close(frame) => {
                    return Err(TransportError::Closed(
                        frame.map(|f| format!("{} {}", u16::from(f.code), f.reason)),
                    ));
                }
                Message::Frame(_) => continue,
            });
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(())
            | Err(
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                | tokio_tungstenite::tungstenite::Error::AlreadyClosed,
            ) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_proxy(reply: &'static [u8]) -> (ProxySettings, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0_u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(reply).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (
            ProxySettings {
                host: "127.0.0.1".to_string(),
                port,
            },
            handle,
        )
    }

    #[tokio::test]
    async fn tunnel_sends_connect_and_accepts_200() {
        let (proxy, handle) =
            fake_proxy(b"HTTP/1.1 200 Connection established\r\n\r\n").await;
        let tunnel = open_tunnel(&proxy, "ws.okx.com", 8443).await;
        assert!(tunnel.is_ok());

        let request = handle.await.unwrap();
        assert!(request.starts_with("CONNECT ws.okx.com:8443 HTTP/1.1\r\n"));
        assert!(request.contains("Host: ws.okx.com:8443\r\n"));
    }

    #[tokio::test]
    async fn tunnel_rejects_non_200() {
        let (proxy, _handle) =
            fake_proxy(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;
        let err = open_tunnel(&proxy, "fstream.binance.com", 443)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Proxy(ref msg) if msg.contains("407")));
    }
}
