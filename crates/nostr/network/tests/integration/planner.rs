//! Filter routing through the network: scopes, outbox hints and folding

use super::*;
use nostr::{CONTACT_LIST_KIND, Filter, RELAY_LIST_METADATA_KIND};
use nostr_network::{DynamicFilter, FilterScope, FollowGraph, OutboxConfig, OutboxHints, RelayFilters, RouterOptions};
use std::collections::BTreeSet;

fn pk(c: char) -> String {
    c.to_string().repeat(64)
}

fn follows(owner: &str, pubkeys: &[String]) -> Event {
    Event {
        pubkey: owner.to_string(),
        kind: CONTACT_LIST_KIND,
        created_at: 1,
        tags: pubkeys.iter().map(|p| vec!["p".to_string(), p.clone()]).collect(),
        ..Default::default()
    }
}

fn relay_list(owner: &str, urls: &[&str]) -> Event {
    Event {
        pubkey: owner.to_string(),
        kind: RELAY_LIST_METADATA_KIND,
        created_at: 1,
        tags: urls.iter().map(|url| vec!["r".to_string(), url.to_string()]).collect(),
        ..Default::default()
    }
}

struct Fixture {
    graph: Arc<FollowGraph>,
    hints: Arc<OutboxHints>,
}

impl Fixture {
    fn new(config: &NetworkConfig) -> Self {
        Self {
            graph: Arc::new(FollowGraph::with_user(pk('e'))),
            hints: Arc::new(OutboxHints::new(OutboxConfig {
                search_relays: config.search_relays.clone(),
                read_relays: config.read_relays.clone(),
                fallback_relays: config.fallback_relays.clone(),
                ..Default::default()
            })),
        }
    }

    fn network(&self, config: NetworkConfig) -> Network {
        init_tracing();
        Network::builder(config)
            .transport_factory(MockFactory::silent())
            .social_graph(self.graph.clone())
            .routing_hints(self.hints.clone())
            .build()
    }
}

fn authors_on(selections: &[RelayFilters], relay: &str) -> BTreeSet<String> {
    selections
        .iter()
        .filter(|s| s.relay == relay)
        .flat_map(|s| s.filters.iter())
        .flat_map(|f| f.authors.clone().unwrap_or_default())
        .collect()
}

#[test]
fn test_follows_routed_to_their_outboxes() {
    let config = NetworkConfig::default();
    let fixture = Fixture::new(&config);
    fixture.graph.update(follows(&pk('e'), &[pk('a'), pk('b')])).unwrap();
    fixture.hints.update_relay_list(&relay_list(&pk('a'), &["wss://r1.com"])).unwrap();
    fixture.hints.update_relay_list(&relay_list(&pk('b'), &["wss://r2.com"])).unwrap();
    let network = fixture.network(config);

    let selections = network.filter_selections(
        vec![DynamicFilter::scoped(Filter::new().kinds(vec![1]), FilterScope::Follows)],
        RouterOptions::default(),
    );

    assert_eq!(selections.len(), 2);
    assert_eq!(authors_on(&selections, "wss://r1.com"), [pk('a')].into_iter().collect());
    assert_eq!(authors_on(&selections, "wss://r2.com"), [pk('b')].into_iter().collect());

    // Every relay also gets the repost variant
    for selection in &selections {
        let kinds: Vec<Vec<u16>> = selection
            .filters
            .iter()
            .map(|f| f.kinds.clone().unwrap_or_default())
            .collect();
        assert_eq!(kinds, vec![vec![1], vec![6]]);
    }
}

#[test]
fn test_follows_and_self_includes_user() {
    let config = NetworkConfig::default();
    let fixture = Fixture::new(&config);
    fixture.graph.update(follows(&pk('e'), &[pk('a')])).unwrap();
    fixture.hints.update_relay_list(&relay_list(&pk('a'), &["wss://r1.com"])).unwrap();
    fixture.hints.update_relay_list(&relay_list(&pk('e'), &["wss://mine.com"])).unwrap();
    let network = fixture.network(config);

    let selections = network.filter_selections(
        vec![DynamicFilter::scoped(Filter::new().kinds(vec![1]), FilterScope::FollowsAndSelf)],
        RouterOptions::default(),
    );

    assert_eq!(authors_on(&selections, "wss://mine.com"), [pk('e')].into_iter().collect());
    assert_eq!(authors_on(&selections, "wss://r1.com"), [pk('a')].into_iter().collect());
}

#[test]
fn test_network_scope_reaches_follows_of_follows() {
    let config = NetworkConfig::default();
    let fixture = Fixture::new(&config);
    fixture.graph.update(follows(&pk('e'), &[pk('a')])).unwrap();
    fixture.graph.update(follows(&pk('a'), &[pk('c'), pk('e')])).unwrap();
    fixture.hints.update_relay_list(&relay_list(&pk('a'), &["wss://r1.com"])).unwrap();
    fixture.hints.update_relay_list(&relay_list(&pk('c'), &["wss://r3.com"])).unwrap();
    let network = fixture.network(config);

    let selections = network.filter_selections(
        vec![DynamicFilter::scoped(Filter::new().kinds(vec![1]), FilterScope::Network)],
        RouterOptions::default(),
    );

    let relays: Vec<&str> = selections.iter().map(|s| s.relay.as_str()).collect();
    assert_eq!(relays, vec!["wss://r3.com"]);
}

#[test]
fn test_search_and_context_filters() {
    let config = NetworkConfig {
        search_relays: relays(&["wss://search.com"]),
        read_relays: relays(&["wss://read.com"]),
        ..Default::default()
    };
    let fixture = Fixture::new(&config);
    let community = format!("34550:{}:rust", pk('a'));
    fixture
        .hints
        .set_context_relays(community.clone(), relays(&["wss://community.com"]));
    let network = fixture.network(config);

    let selections = network.filter_selections(
        vec![
            DynamicFilter::new(Filter::new().kinds(vec![30023]).search("relays")),
            DynamicFilter::new(Filter::new().kinds(vec![1111]).tag("a", vec![community.clone()])),
            DynamicFilter::new(Filter::new().kinds(vec![0])),
        ],
        RouterOptions::default(),
    );

    let relays: BTreeSet<&str> = selections.iter().map(|s| s.relay.as_str()).collect();
    assert_eq!(
        relays,
        ["wss://search.com", "wss://community.com", "wss://read.com"]
            .into_iter()
            .collect()
    );

    let community_filters = &selections
        .iter()
        .find(|s| s.relay == "wss://community.com")
        .unwrap()
        .filters;
    assert!(
        community_filters
            .iter()
            .all(|f| f.tag_values("a") == Some(&vec![community.clone()]))
    );
}

#[test]
fn test_long_tail_folded_into_top_relays() {
    let config = NetworkConfig {
        relay_limit: 2,
        relay_redundancy: 1,
        ..Default::default()
    };
    let fixture = Fixture::new(&config);
    fixture
        .graph
        .update(follows(&pk('e'), &[pk('a'), pk('b'), pk('c'), pk('d')]))
        .unwrap();
    for (author, urls) in [
        ('a', vec!["wss://r1.com", "wss://r2.com", "wss://r3.com"]),
        ('b', vec!["wss://r1.com", "wss://r2.com"]),
        ('c', vec!["wss://r1.com"]),
        ('d', vec!["wss://r4.com"]),
    ] {
        fixture.hints.update_relay_list(&relay_list(&pk(author), &urls)).unwrap();
    }
    let network = fixture.network(config);

    let selections = network.filter_selections(
        vec![DynamicFilter::scoped(Filter::new().kinds(vec![1]), FilterScope::Follows)],
        RouterOptions::default(),
    );

    let relays: Vec<&str> = selections.iter().map(|s| s.relay.as_str()).collect();
    assert_eq!(relays, vec!["wss://r1.com", "wss://r2.com"]);

    // r1 absorbed the authors and kinds of the dropped relays
    let top = &selections[0];
    assert_eq!(top.filters.len(), 1);
    assert_eq!(
        top.filters[0].authors.iter().flatten().cloned().collect::<BTreeSet<_>>(),
        [pk('a'), pk('b'), pk('c'), pk('d')].into_iter().collect()
    );
    assert_eq!(
        top.filters[0].kinds.iter().flatten().copied().collect::<BTreeSet<_>>(),
        [1, 6].into_iter().collect()
    );

    // r2 is outside the redundancy window and keeps its own filters
    assert_eq!(selections[1].filters.len(), 2);
}

#[test]
fn test_router_limit_option() {
    let config = NetworkConfig {
        read_relays: relays(&["wss://x.com", "wss://y.com", "wss://z.com"]),
        ..Default::default()
    };
    let fixture = Fixture::new(&config);
    let network = fixture.network(config);

    let selections = network.filter_selections(
        vec![DynamicFilter::new(Filter::new().kinds(vec![1]))],
        RouterOptions {
            limit: Some(1),
            redundancy: None,
        },
    );

    assert_eq!(selections.len(), 1);
    assert_eq!(selections[0].relay, "wss://x.com");
}
