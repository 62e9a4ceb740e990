//! WebSocket transport for a single relay or multiplexer link

use crate::error::{ClientError, Result};
use crate::transport::{SocketStatus, Transport};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

/// Transport connection configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Capacity of the inbound frame fan-out
    pub frame_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            frame_buffer: 1024,
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// State shared with the receive loop.
struct LinkState {
    url: String,
    status: watch::Sender<SocketStatus>,
    error: RwLock<Option<String>>,
    frames: broadcast::Sender<Value>,
    sink: Mutex<Option<WsSink>>,
}

impl LinkState {
    fn fail(&self, error: String) {
        warn!("relay {} errored: {}", self.url, error);
        *self.error.write() = Some(error);
        self.status.send_replace(SocketStatus::Error);
    }
}

/// WebSocket transport
pub struct WebSocketTransport {
    config: RelayConfig,
    state: Arc<LinkState>,
    connect_lock: Mutex<()>,
    recv_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Create a new transport (does not connect yet)
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, RelayConfig::default())
    }

    /// Create a new transport with custom config
    pub fn with_config(url: &str, config: RelayConfig) -> Result<Self> {
        let parsed = Url::parse(url)?;

        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed.scheme()
            )));
        }

        let (status, _) = watch::channel(SocketStatus::Pending);
        let (frames, _) = broadcast::channel(config.frame_buffer.max(1));

        Ok(Self {
            config,
            state: Arc::new(LinkState {
                url: url.to_string(),
                status,
                error: RwLock::new(None),
                frames,
                sink: Mutex::new(None),
            }),
            connect_lock: Mutex::new(()),
            recv_task: parking_lot::Mutex::new(None),
        })
    }

    fn start_recv_loop(&self, mut stream: SplitStream<WsStream>) {
        let state = Arc::clone(&self.state);

        let handle = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(text.as_str()) {
                        // No receivers is fine, frames are only kept while someone listens
                        Ok(frame) => {
                            let _ = state.frames.send(frame);
                        }
                        Err(e) => debug!("unparseable frame from {}: {}", state.url, e),
                    },
                    Ok(Message::Ping(data)) => {
                        let mut sink = state.sink.lock().await;
                        if let Some(sink) = sink.as_mut() {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Relay {} closed connection", state.url);
                        state.fail("connection closed by relay".to_string());
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        state.fail(e.to_string());
                        break;
                    }
                }
            }

            if *state.status.borrow() == SocketStatus::Ready {
                state.fail("stream ended".to_string());
            }
            state.sink.lock().await.take();
        });

        if let Some(previous) = self.recv_task.lock().replace(handle) {
            previous.abort();
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn url(&self) -> &str {
        &self.state.url
    }

    fn status(&self) -> SocketStatus {
        *self.state.status.borrow()
    }

    fn error(&self) -> Option<String> {
        self.state.error.read().clone()
    }

    fn watch_status(&self) -> watch::Receiver<SocketStatus> {
        self.state.status.subscribe()
    }

    fn frames(&self) -> broadcast::Receiver<Value> {
        self.state.frames.subscribe()
    }

    async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.status() == SocketStatus::Ready {
            return Ok(());
        }
        self.state.status.send_replace(SocketStatus::Pending);

        info!("Connecting to relay: {}", self.state.url);
        let connect_start = Instant::now();

        let ws_stream = match timeout(self.config.connect_timeout, connect_async(self.state.url.as_str())).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                self.state.fail(e.to_string());
                return Err(ClientError::WebSocket(e.to_string()));
            }
            Err(_) => {
                let message = format!("Connection timeout after {:?}", self.config.connect_timeout);
                self.state.fail(message.clone());
                return Err(ClientError::Timeout(message));
            }
        };

        let (sink, stream) = ws_stream.split();
        *self.state.sink.lock().await = Some(sink);
        *self.state.error.write() = None;
        self.start_recv_loop(stream);
        self.state.status.send_replace(SocketStatus::Ready);

        info!(
            "Connected to relay: {} (took {:?})",
            self.state.url,
            connect_start.elapsed()
        );
        Ok(())
    }

    async fn send(&self, frame: Value) -> Result<()> {
        if self.status() != SocketStatus::Ready {
            self.connect().await?;
        }

        let mut guard = self.state.sink.lock().await;
        let sink = guard.as_mut().ok_or(ClientError::NotConnected)?;
        if let Err(e) = sink.send(Message::Text(frame.to_string().into())).await {
            guard.take();
            drop(guard);
            self.state.fail(e.to_string());
            return Err(ClientError::WebSocket(e.to_string()));
        }
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.recv_task.lock().take() {
            handle.abort();
        }
    }
}
