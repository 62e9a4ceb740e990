//! Transport abstraction over a single socket
//!
//! A transport is one link to a relay or to a multiplexing proxy. It reports
//! its status through a watch channel and fans every decoded inbound frame
//! out to any number of readers.

use crate::error::Result;
use crate::relay::{RelayConfig, WebSocketTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Connection status of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    /// Not connected yet, or connecting
    Pending,
    /// Connected and able to send
    Ready,
    /// The last connection attempt failed or the socket dropped
    Error,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Normalized URL of the link.
    fn url(&self) -> &str;

    /// Current status.
    fn status(&self) -> SocketStatus;

    /// Last error observed on the link, if any.
    fn error(&self) -> Option<String>;

    /// Watch status transitions.
    fn watch_status(&self) -> watch::Receiver<SocketStatus>;

    /// Subscribe to inbound frames. Frames received before this call are not replayed.
    fn frames(&self) -> broadcast::Receiver<Value>;

    /// Open the link. Succeeds immediately when already connected.
    async fn connect(&self) -> Result<()>;

    /// Send one frame, connecting first if needed.
    async fn send(&self, frame: Value) -> Result<()>;
}

/// Creates transports for URLs. The pool calls this once per URL.
pub trait TransportFactory: Send + Sync {
    fn create(&self, url: &str) -> Result<Arc<dyn Transport>>;
}

/// Factory producing real WebSocket transports.
#[derive(Debug, Clone, Default)]
pub struct WebSocketFactory {
    config: RelayConfig,
}

impl WebSocketFactory {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for WebSocketFactory {
    fn create(&self, url: &str) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(WebSocketTransport::with_config(
            url,
            self.config.clone(),
        )?))
    }
}
