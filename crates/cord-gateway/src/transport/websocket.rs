//! Production transport over tokio-tungstenite.

use super::{CloseFrame, Transport, TransportError};
use crate::protocol::CloseCode;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Buffer between the reader task and `recv` callers.
const INBOUND_BUFFER: usize = 64;

/// Websocket transport bound to a fixed URL.
///
/// Dialing splits the socket: writes go through the stored sink, reads are
/// pumped by a background task into an internal channel so `recv` can apply
/// the configured read deadline.
pub struct WebsocketTransport {
    url: String,
    sink: Mutex<Option<WsSink>>,
    inbound: Mutex<Option<mpsc::Receiver<Result<Vec<u8>, TransportError>>>>,
    read_timeout: Arc<RwLock<Option<Duration>>>,
}

impl WebsocketTransport {
    /// Create an undialed transport bound to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sink: Mutex::new(None),
            inbound: Mutex::new(None),
            read_timeout: Arc::new(RwLock::new(None)),
        }
    }

    /// The URL this transport dials.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn spawn_reader(
        &self,
        mut stream: WsStream,
    ) -> mpsc::Receiver<Result<Vec<u8>, TransportError>> {
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let read_timeout = Arc::clone(&self.read_timeout);

        tokio::spawn(async move {
            loop {
                let deadline = *read_timeout.read().await;
                let message = match deadline {
                    Some(deadline) => match tokio::time::timeout(deadline, stream.next()).await {
                        Ok(message) => message,
                        Err(_) => {
                            tracing::warn!(
                                deadline_ms = deadline.as_millis() as u64,
                                "websocket read deadline elapsed"
                            );
                            let _ = tx.send(Err(TransportError::ReadTimeout)).await;
                            return;
                        }
                    },
                    None => stream.next().await,
                };

                match message {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(Ok(text.into_bytes())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if tx.send(Ok(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, mut reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1000, String::new()));
                        if reason.is_empty() {
                            if let Some(known) = CloseCode::from_u16(code) {
                                reason = known.description().to_string();
                            }
                        }
                        tracing::debug!(code, reason = %reason, "websocket closed by peer");
                        let _ = tx.send(Err(TransportError::Closed { code, reason })).await;
                        return;
                    }
                    // Pings are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = tx
                            .send(Err(TransportError::Receive(Box::new(err))))
                            .await;
                        return;
                    }
                    None => {
                        tracing::debug!("websocket stream ended");
                        let _ = tx.send(Err(TransportError::StreamEnded)).await;
                        return;
                    }
                }
            }
        });

        rx
    }
}

#[async_trait]
impl Transport for WebsocketTransport {
    async fn dial(&self) -> Result<(), TransportError> {
        let (socket, _response) = connect_async(&self.url)
            .await
            .map_err(|err| TransportError::Dial(Box::new(err)))?;

        tracing::debug!(url = %self.url, "websocket dialed");

        let (sink, stream) = socket.split();
        *self.sink.lock().await = Some(sink);
        *self.inbound.lock().await = Some(self.spawn_reader(stream));

        Ok(())
    }

    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let text = String::from_utf8(frame).map_err(|err| TransportError::Send(Box::new(err)))?;

        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(TransportError::NotConnected)?;

        sink.send(Message::Text(text))
            .await
            .map_err(|err| TransportError::Send(Box::new(err)))
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut inbound = self.inbound.lock().await;
        let inbound = inbound.as_mut().ok_or(TransportError::NotConnected)?;

        inbound.recv().await.unwrap_or(Err(TransportError::StreamEnded))
    }

    async fn close(&self, frame: Option<CloseFrame>) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        let Some(mut sink) = sink.take() else {
            // Already closed; nothing to do.
            return Ok(());
        };

        if let Some(frame) = frame {
            let close = WsCloseFrame {
                code: frame.code.into(),
                reason: frame.reason.into(),
            };
            // The peer may already be gone; closing is best-effort.
            let _ = sink.send(Message::Close(Some(close))).await;
        }
        let _ = sink.close().await;

        self.inbound.lock().await.take();

        tracing::debug!("websocket closed");
        Ok(())
    }

    async fn set_read_timeout(&self, timeout: Option<Duration>) {
        *self.read_timeout.write().await = timeout;
    }
}
