//! WebSocket channel transport.
//!
//! One WebSocket per terminal session, addressed by the session id. The
//! socket carries only text frames (base64 payloads); binary frames are
//! tolerated when their bytes happen to be valid UTF-8, since some
//! gateways reframe text as binary.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use cterm_core::error::{CtermError, CtermResult};
use cterm_core::transport::{BoxFuture, TransportPair, TransportSink, TransportStream};

use crate::auth::Credentials;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Open a credentialed WebSocket to `url` and return the transport pair.
pub async fn connect(url: &str, credentials: &Credentials) -> CtermResult<TransportPair> {
    let mut request = url
        .into_client_request()
        .map_err(|e| CtermError::Transport(format!("invalid channel URL {url}: {e}")))?;
    credentials.apply_handshake(&mut request);

    let (ws, _response) = connect_async(request)
        .await
        .map_err(|e| CtermError::Transport(format!("WebSocket connect error: {e}")))?;

    tracing::info!(url = %url, "WebSocket channel connected");

    let (sink, stream) = ws.split();
    let sink = Arc::new(Mutex::new(sink));

    let tx: Box<dyn TransportSink> = Box::new(WebSocketSender { sink: sink.clone() });
    let rx: Box<dyn TransportStream> = Box::new(WebSocketReceiver { stream, sink });
    Ok((tx, rx))
}

/// Outbound half: shares the split sink with the receiver (pong replies).
struct WebSocketSender {
    sink: Arc<Mutex<WsSink>>,
}

impl TransportSink for WebSocketSender {
    fn send<'a>(&'a mut self, text: &'a str) -> BoxFuture<'a, CtermResult<()>> {
        Box::pin(async move {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(text.to_string()))
                .await
                .map_err(|e| CtermError::Transport(format!("WebSocket send error: {e}")))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, CtermResult<()>> {
        Box::pin(async move {
            // Best effort: the peer may already be gone.
            let mut sink = self.sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
            Ok(())
        })
    }
}

/// Inbound half of the WebSocket transport.
struct WebSocketReceiver {
    stream: WsStream,
    sink: Arc<Mutex<WsSink>>,
}

impl TransportStream for WebSocketReceiver {
    fn next(&mut self) -> BoxFuture<'_, Option<CtermResult<String>>> {
        Box::pin(async move {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                    Some(Ok(Message::Binary(bytes))) => {
                        return Some(String::from_utf8(bytes).map_err(|e| {
                            CtermError::Decode(format!("non-text binary frame: {e}"))
                        }));
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let mut sink = self.sink.lock().await;
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!("WebSocket close frame received");
                        return None;
                    }
                    Some(Ok(_)) => {} // pongs, raw frames
                    Some(Err(e)) => {
                        return Some(Err(CtermError::Transport(format!(
                            "WebSocket error: {e}"
                        ))));
                    }
                    None => return None,
                }
            }
        })
    }
}
