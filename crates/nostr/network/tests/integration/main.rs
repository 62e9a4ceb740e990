//! Integration tests for the relay network engine
//!
//! Most tests drive the engine against in-memory transports with paused time.
//! `websocket` runs it against a small relay over real sockets.

pub mod count;
pub mod planner;
pub mod subscribe;
pub mod websocket;

use mock::MockFactory;
use nostr::{Event, EventTemplate, finalize_event, generate_secret_key};
use nostr_network::{Network, NetworkConfig, NetworkEvent, TransportFactory};
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;
use tokio::sync::broadcast;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Network over mock transports.
pub fn mock_network(factory: &Arc<MockFactory>, config: NetworkConfig) -> Network {
    init_tracing();
    let factory: Arc<dyn TransportFactory> = factory.clone();
    Network::builder(config).transport_factory(factory).build()
}

pub fn signed_event(kind: u16, content: &str, created_at: u64) -> Event {
    let template = EventTemplate {
        created_at,
        kind,
        tags: vec![],
        content: content.to_string(),
    };
    finalize_event(&template, &generate_secret_key()).unwrap()
}

pub fn relays(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|url| url.to_string()).collect()
}

/// Receive bus events until `done` returns true or a second of (virtual) time passes.
pub async fn bus_until(
    rx: &mut broadcast::Receiver<NetworkEvent>,
    mut done: impl FnMut(&NetworkEvent) -> bool,
) -> Vec<NetworkEvent> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        while let Ok(event) = rx.recv().await {
            let stop = done(&event);
            seen.push(event);
            if stop {
                break;
            }
        }
    })
    .await;
    seen
}

/// Let spawned tasks run without advancing time.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
