//! Network context
//!
//! [`Network`] owns everything the coordinators share: configuration, the
//! connection pool, the event bus and the pluggable collaborators. It is
//! created once at startup and cloned cheaply wherever it is needed.

use crate::auth::AuthHandler;
use crate::bus::EventBus;
use crate::config::NetworkConfig;
use crate::count;
use crate::graph::{FollowGraph, SocialGraph};
use crate::hints::{OutboxConfig, OutboxHints, RoutingHints};
use crate::pool::ConnectionPool;
use crate::publish::{self, PublishProgress, PublishRequest};
use crate::relay::RelayConfig;
use crate::relay_info::{RelayInfoCache, RelayInfoProvider};
use crate::router::{RelayFilters, RouterOptions, RoutingContext, add_repost_filters, get_filter_selections};
use crate::scope::{DynamicFilter, compile_filters};
use crate::subscribe::{self, SubscribeRequest, Subscription};
use crate::transport::{TransportFactory, WebSocketFactory};
use crate::verify::{EventVerifier, SignatureVerifier};
use nostr::{Event, Filter};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) struct NetworkContext {
    pub(crate) config: NetworkConfig,
    pub(crate) pool: Arc<ConnectionPool>,
    pub(crate) bus: EventBus,
    pub(crate) auth: RwLock<Option<Arc<dyn AuthHandler>>>,
    pub(crate) verifier: Arc<dyn EventVerifier>,
    pub(crate) relay_info: Arc<dyn RelayInfoProvider>,
    pub(crate) ingest: Option<mpsc::UnboundedSender<Event>>,
    pub(crate) hints: Arc<dyn RoutingHints>,
    pub(crate) graph: Arc<dyn SocialGraph>,
}

/// Builder for [`Network`]. Unset collaborators get their default implementation.
pub struct NetworkBuilder {
    config: NetworkConfig,
    factory: Option<Arc<dyn TransportFactory>>,
    auth: Option<Arc<dyn AuthHandler>>,
    verifier: Option<Arc<dyn EventVerifier>>,
    relay_info: Option<Arc<dyn RelayInfoProvider>>,
    ingest: Option<mpsc::UnboundedSender<Event>>,
    hints: Option<Arc<dyn RoutingHints>>,
    graph: Option<Arc<dyn SocialGraph>>,
}

impl NetworkBuilder {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            factory: None,
            auth: None,
            verifier: None,
            relay_info: None,
            ingest: None,
            hints: None,
            graph: None,
        }
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn auth_handler(mut self, handler: Arc<dyn AuthHandler>) -> Self {
        self.auth = Some(handler);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn EventVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn relay_info(mut self, provider: Arc<dyn RelayInfoProvider>) -> Self {
        self.relay_info = Some(provider);
        self
    }

    /// Queue receiving every accepted event of subscriptions that process events.
    pub fn ingest(mut self, queue: mpsc::UnboundedSender<Event>) -> Self {
        self.ingest = Some(queue);
        self
    }

    pub fn routing_hints(mut self, hints: Arc<dyn RoutingHints>) -> Self {
        self.hints = Some(hints);
        self
    }

    pub fn social_graph(mut self, graph: Arc<dyn SocialGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn build(self) -> Network {
        let config = self.config;

        let factory = self.factory.unwrap_or_else(|| {
            Arc::new(WebSocketFactory::new(RelayConfig {
                connect_timeout: config.connect_timeout(),
                ..Default::default()
            }))
        });

        let hints = self.hints.unwrap_or_else(|| {
            Arc::new(OutboxHints::new(OutboxConfig {
                search_relays: config.search_relays.clone(),
                read_relays: config.read_relays.clone(),
                fallback_relays: config.fallback_relays.clone(),
                ..Default::default()
            }))
        });

        Network {
            ctx: Arc::new(NetworkContext {
                pool: Arc::new(ConnectionPool::new(factory)),
                bus: EventBus::default(),
                auth: RwLock::new(self.auth),
                verifier: self.verifier.unwrap_or_else(|| Arc::new(SignatureVerifier)),
                relay_info: self.relay_info.unwrap_or_else(|| Arc::new(RelayInfoCache::new())),
                ingest: self.ingest,
                hints,
                graph: self.graph.unwrap_or_else(|| Arc::new(FollowGraph::new())),
                config,
            }),
        }
    }
}

/// Relay network engine
#[derive(Clone)]
pub struct Network {
    ctx: Arc<NetworkContext>,
}

impl Network {
    /// Network over real WebSockets with default collaborators.
    pub fn new(config: NetworkConfig) -> Self {
        NetworkBuilder::new(config).build()
    }

    pub fn builder(config: NetworkConfig) -> NetworkBuilder {
        NetworkBuilder::new(config)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.ctx.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.ctx.pool
    }

    /// Replace the handler answering AUTH challenges; `None` leaves them unanswered.
    pub fn set_auth_handler(&self, handler: Option<Arc<dyn AuthHandler>>) {
        *self.ctx.auth.write() = handler;
    }

    /// Whether the pooled transport for `url` is in error.
    pub fn relay_has_error(&self, url: &str) -> bool {
        self.ctx.pool.relay_has_error(url)
    }

    /// Publish an event. Always resolves, with per-relay outcomes.
    pub async fn publish(&self, request: PublishRequest) -> PublishProgress {
        publish::publish(&self.ctx, request).await
    }

    /// Open a subscription. Must be called within a tokio runtime.
    pub fn subscribe(&self, request: SubscribeRequest) -> Subscription {
        subscribe::subscribe(&self.ctx, request)
    }

    /// Count events on the configured count relays; 0 when nobody answers in time.
    pub async fn count(&self, filters: Vec<Filter>) -> u64 {
        count::count(&self.ctx, filters).await
    }

    /// Plan which relays receive which filters.
    pub fn filter_selections(&self, filters: Vec<DynamicFilter>, options: RouterOptions) -> Vec<RelayFilters> {
        let compiled = compile_filters(filters, self.ctx.graph.as_ref(), &self.ctx.config.default_follows);
        let expanded = add_repost_filters(compiled);

        get_filter_selections(
            expanded,
            &RoutingContext {
                hints: self.ctx.hints.as_ref(),
                relay_limit: self.ctx.config.relay_limit,
                relay_redundancy: self.ctx.config.relay_redundancy,
                options,
            },
        )
    }
}
