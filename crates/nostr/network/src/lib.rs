//! Relay network engine for Nostr clients.
//!
//! This crate provides:
//! - Sessions over pooled relay transports, direct or through a multiplexer
//! - NIP-42 authentication with a boot gate for relays that require it
//! - Publish coordination with per-relay outcomes and a timeout
//! - Subscriptions with cross-relay deduplication, verification and EOSE tracking
//! - NIP-45 counts
//! - A filter routing planner deciding which relays receive which filters
//! - A broadcast bus reporting network activity
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr::Filter;
//! use nostr_network::{Network, NetworkConfig, NetworkEvent, SubscribeRequest};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let network = Network::new(NetworkConfig::default());
//!     let mut bus = network.bus().subscribe();
//!
//!     let subscription = network.subscribe(
//!         SubscribeRequest::new(
//!             vec!["wss://relay.damus.io".to_string(), "wss://nos.lol".to_string()],
//!             [Filter::new().kinds(vec![1]).limit(10)],
//!         )
//!         .timeout(Duration::from_secs(5))
//!         .on_event(|event| println!("Received event: {}", event.id)),
//!     );
//!
//!     while let Ok(event) = bus.recv().await {
//!         if let NetworkEvent::SubClose { id, .. } = event
//!             && id == subscription.id()
//!         {
//!             break;
//!         }
//!     }
//! }
//! ```

mod auth;
mod bus;
mod config;
mod count;
mod error;
mod gate;
mod graph;
mod hints;
mod message;
mod network;
mod pool;
mod publish;
mod relay;
mod relay_info;
mod router;
mod scope;
mod session;
mod subscribe;
mod transport;
mod url;
mod verify;

// Re-export main types
pub use auth::{AuthHandler, KeyAuthHandler};
pub use bus::{EventBus, NetworkEvent, RelayErrorKind};
pub use config::{NetworkConfig, load_config};
pub use error::{ClientError, Result};
pub use gate::{BootGate, GateState};
pub use graph::{FollowGraph, SocialGraph};
pub use hints::{OutboxConfig, OutboxHints, RoutingHints};
pub use message::{ClientMessage, MessageError, RelayMessage, unwrap_multiplexed, wrap_multiplexed};
pub use network::{Network, NetworkBuilder};
pub use pool::{ConnectionPool, PoolEntry};
pub use publish::{ProgressCallback, PublishProgress, PublishRequest, PublishVerb};
pub use relay::{RelayConfig, WebSocketTransport};
pub use relay_info::{RelayCapabilities, RelayInfoCache, RelayInfoProvider};
pub use router::{RelayFilters, RouterOptions, RoutingContext, add_repost_filters, get_filter_selections};
pub use scope::{DynamicFilter, FilterScope, MAX_SCOPE_AUTHORS, compile_filters};
pub use subscribe::{EoseCallback, EventCallback, SubscribeRequest, Subscription, generate_subscription_id};
pub use transport::{SocketStatus, Transport, TransportFactory, WebSocketFactory};
pub use url::{normalize_relay_url, normalize_relay_urls};
pub use verify::{EventVerifier, SignatureVerifier};
