//! Subscription coordinator tests

use super::*;
use crate::mock::{Responder, store_responder};
use nostr::Filter;
use nostr_network::{SubscribeRequest, TransportFactory};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

fn notes() -> Filter {
    Filter::new().kinds(vec![1])
}

fn collector() -> (Arc<Mutex<Vec<Event>>>, impl FnMut(Event) + Send + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event| sink.lock().push(event))
}

/// Relay that answers REQ with `frames` (subscription id filled in) and no EOSE.
fn scripted(frames: Vec<Value>) -> Responder {
    Arc::new(move |_url: &str, frame: &Value| {
        if frame[0] != "REQ" {
            return vec![];
        }
        frames
            .iter()
            .map(|f| {
                let mut f = f.clone();
                f[1] = frame[1].clone();
                f
            })
            .collect()
    })
}

#[tokio::test(start_paused = true)]
async fn test_events_deduplicated_across_relays() {
    for order in [["wss://a.com", "wss://b.com"], ["wss://b.com", "wss://a.com"]] {
        let event = signed_event(1, "everywhere", 1_700_000_000);
        let factory = MockFactory::with_responder(store_responder(vec![event.clone()]));
        let network = mock_network(&factory, NetworkConfig::default());
        let mut bus = network.bus().subscribe();
        let (received, on_event) = collector();

        let sub = network.subscribe(SubscribeRequest::new(relays(&order), [notes()]).on_event(on_event));

        let mut eose = 0;
        let seen = bus_until(&mut bus, |e| {
            if matches!(e, NetworkEvent::Eose { .. }) {
                eose += 1;
            }
            eose == 2
        })
        .await;

        // The bus credits the relay that delivered first; the other one follows it
        let credited: Vec<&str> = seen
            .iter()
            .filter_map(|e| match e {
                NetworkEvent::Event { url, .. } => Some(url.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(credited.len(), 1);
        let first = credited[0];
        let second = if first == order[0] { order[1] } else { order[0] };
        let expected = relays(&[first, second]);

        let received = received.lock().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, event.id);
        assert_eq!(received[0].seen_on.to_vec(), expected);
        assert_eq!(sub.seen_on(&event.id), Some(expected.clone()));

        sub.close();
        sub.closed().await;
        assert!(sub.seen_on(&event.id).is_none());
        assert_eq!(received[0].seen_on.to_vec(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_ingested_event_lists_every_delivering_relay() {
    let event = signed_event(1, "queued twice", 1_700_000_000);
    let factory = MockFactory::with_responder(store_responder(vec![event.clone()]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let factory_dyn: Arc<dyn TransportFactory> = factory.clone();
    let network = Network::builder(NetworkConfig::default())
        .transport_factory(factory_dyn)
        .ingest(tx)
        .build();

    let sub = network.subscribe(
        SubscribeRequest::new(relays(&["wss://a.com", "wss://b.com"]), [notes()])
            .timeout(Duration::from_secs(2)),
    );
    sub.closed().await;

    let ingested = rx.try_recv().unwrap();
    assert_eq!(ingested.id, event.id);
    assert_eq!(ingested.seen_on.len(), 2);
    assert!(ingested.seen_on.contains("wss://a.com"));
    assert!(ingested.seen_on.contains("wss://b.com"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_means_no_timeout() {
    let event = signed_event(1, "hi", 1_700_000_000);
    let factory = MockFactory::with_responder(store_responder(vec![event.clone()]));
    let network = mock_network(&factory, NetworkConfig::default());
    let mut bus = network.bus().subscribe();

    let sub = network.subscribe(
        SubscribeRequest::new(relays(&["wss://a.com"]), [notes()]).timeout(Duration::ZERO),
    );

    // Neither the zero deadline nor the EOSE closes it
    let seen = bus_until(&mut bus, |e| matches!(e, NetworkEvent::SubClose { .. })).await;
    assert!(seen.iter().any(|e| matches!(e, NetworkEvent::Eose { .. })));
    assert!(!seen.iter().any(|e| matches!(e, NetworkEvent::SubClose { .. })));
    assert!(!sub.is_closed());

    sub.close();
    sub.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_bad_signature_dropped() {
    let mut forged = signed_event(1, "original", 1_700_000_000);
    forged.content = "tampered".to_string();
    let good = signed_event(1, "fine", 1_700_000_001);

    let factory = MockFactory::with_responder(store_responder(vec![forged, good.clone()]));
    let network = mock_network(&factory, NetworkConfig::default());
    let mut bus = network.bus().subscribe();
    let (received, on_event) = collector();

    network.subscribe(SubscribeRequest::new(relays(&["wss://a.com"]), [notes()]).on_event(on_event));

    let seen = bus_until(&mut bus, |e| matches!(e, NetworkEvent::Eose { .. })).await;

    let ids: Vec<String> = received.lock().iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec![good.id.clone()]);

    let bus_events = seen
        .iter()
        .filter(|e| matches!(e, NetworkEvent::Event { .. }))
        .count();
    assert_eq!(bus_events, 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_matching_events_dropped() {
    let reaction = signed_event(7, "+", 1_700_000_000);
    let note = signed_event(1, "hi", 1_700_000_000);
    let factory = MockFactory::with_responder(scripted(vec![
        json!(["EVENT", "", reaction]),
        json!(["EVENT", "", note]),
        json!(["EOSE", ""]),
    ]));
    let network = mock_network(&factory, NetworkConfig::default());
    let mut bus = network.bus().subscribe();
    let (received, on_event) = collector();

    network.subscribe(SubscribeRequest::new(relays(&["wss://a.com"]), [notes()]).on_event(on_event));
    bus_until(&mut bus, |e| matches!(e, NetworkEvent::Eose { .. })).await;

    let kinds: Vec<u16> = received.lock().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_other_subscription_ids_ignored() {
    let note = signed_event(1, "hi", 1_700_000_000);
    let factory = MockFactory::with_responder(Arc::new(move |_url: &str, frame: &Value| {
        if frame[0] != "REQ" {
            return vec![];
        }
        vec![json!(["EVENT", "not-ours", note]), json!(["EOSE", frame[1]])]
    }));
    let network = mock_network(&factory, NetworkConfig::default());
    let mut bus = network.bus().subscribe();
    let (received, on_event) = collector();

    network.subscribe(SubscribeRequest::new(relays(&["wss://a.com"]), [notes()]).on_event(on_event));
    bus_until(&mut bus, |e| matches!(e, NetworkEvent::Eose { .. })).await;

    assert!(received.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_closes_subscription() {
    let factory = MockFactory::silent();
    let network = mock_network(&factory, NetworkConfig::default());
    let mut bus = network.bus().subscribe();
    let started = Instant::now();

    let sub = network.subscribe(
        SubscribeRequest::new(relays(&["wss://a.com"]), [notes()]).timeout(Duration::from_secs(5)),
    );
    sub.closed().await;

    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert!(sub.is_closed());
    settle().await;
    assert_eq!(factory.transport("wss://a.com").sent_verbs(), vec!["REQ", "CLOSE"]);

    let opened = bus.recv().await.unwrap();
    assert!(matches!(opened, NetworkEvent::SubOpen { ref id, ref urls } if id == sub.id() && urls == &relays(&["wss://a.com"])));
    let closed = bus.recv().await.unwrap();
    assert!(matches!(closed, NetworkEvent::SubClose { ref id, .. } if id == sub.id()));
}

#[tokio::test(start_paused = true)]
async fn test_closes_early_once_every_relay_finished() {
    let factory = MockFactory::with_responder(store_responder(vec![]));
    let network = mock_network(&factory, NetworkConfig::default());
    let started = Instant::now();

    let sub = network.subscribe(
        SubscribeRequest::new(relays(&["wss://a.com", "wss://b.com"]), [notes()])
            .timeout(Duration::from_secs(30)),
    );
    sub.closed().await;

    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_stays_open_after_eose_without_timeout() {
    let factory = MockFactory::with_responder(store_responder(vec![]));
    let network = mock_network(&factory, NetworkConfig::default());
    let mut bus = network.bus().subscribe();

    let sub = network.subscribe(SubscribeRequest::new(relays(&["wss://a.com"]), [notes()]));
    bus_until(&mut bus, |e| matches!(e, NetworkEvent::Eose { .. })).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!sub.is_closed());

    // Live events still arrive after EOSE
    let live = signed_event(1, "live", 1_700_000_100);
    factory
        .transport("wss://a.com")
        .emit(json!(["EVENT", sub.id(), live]));
    let seen = bus_until(&mut bus, |e| matches!(e, NetworkEvent::Event { .. })).await;
    assert!(matches!(seen.last(), Some(NetworkEvent::Event { event, .. }) if event.id == live.id));

    sub.close();
    sub.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let factory = MockFactory::silent();
    let network = mock_network(&factory, NetworkConfig::default());
    let mut bus = network.bus().subscribe();

    let sub = network.subscribe(SubscribeRequest::new(relays(&["wss://a.com"]), [notes()]));
    settle().await;
    sub.close();
    sub.close();
    sub.closed().await;
    sub.close();
    settle().await;

    let closes = bus_until(&mut bus, |_| false)
        .await
        .into_iter()
        .filter(|e| matches!(e, NetworkEvent::SubClose { .. }))
        .count();
    assert_eq!(closes, 1);

    let verbs = factory.transport("wss://a.com").sent_verbs();
    assert_eq!(verbs.iter().filter(|v| *v == "CLOSE").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_eose_reported_per_relay() {
    let factory = MockFactory::with_responder(store_responder(vec![]));
    let network = mock_network(&factory, NetworkConfig::default());
    let mut bus = network.bus().subscribe();

    let eose_urls = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&eose_urls);

    network.subscribe(
        SubscribeRequest::new(relays(&["wss://a.com", "wss://b.com"]), [notes()])
            .on_eose(move |url| sink.lock().push(url.to_string())),
    );

    let mut count = 0;
    let seen = bus_until(&mut bus, |e| {
        if matches!(e, NetworkEvent::Eose { .. }) {
            count += 1;
        }
        count == 2
    })
    .await;

    let mut bus_urls: Vec<String> = seen
        .into_iter()
        .filter_map(|e| match e {
            NetworkEvent::Eose { url, .. } => Some(url),
            _ => None,
        })
        .collect();
    bus_urls.sort();
    assert_eq!(bus_urls, relays(&["wss://a.com", "wss://b.com"]));

    let mut callback_urls = eose_urls.lock().clone();
    callback_urls.sort();
    assert_eq!(callback_urls, bus_urls);
}

#[tokio::test(start_paused = true)]
async fn test_ingest_queue_respects_should_process() {
    let event = signed_event(1, "queued", 1_700_000_000);
    let factory = MockFactory::with_responder(store_responder(vec![event.clone()]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let factory_dyn: Arc<dyn TransportFactory> = factory.clone();
    let network = Network::builder(NetworkConfig::default())
        .transport_factory(factory_dyn)
        .ingest(tx)
        .build();

    let first = network.subscribe(
        SubscribeRequest::new(relays(&["wss://a.com"]), [notes()]).timeout(Duration::from_secs(1)),
    );
    first.closed().await;
    assert_eq!(rx.try_recv().unwrap().id, event.id);

    let second = network.subscribe(
        SubscribeRequest::new(relays(&["wss://a.com"]), [notes()])
            .timeout(Duration::from_secs(1))
            .should_process(false),
    );
    second.closed().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_relay_does_not_block_others() {
    let event = signed_event(1, "hi", 1_700_000_000);
    let factory = MockFactory::with_responder(store_responder(vec![event.clone()]));
    factory.fail("wss://down.com");
    let network = mock_network(&factory, NetworkConfig::default());
    let (received, on_event) = collector();

    let sub = network.subscribe(
        SubscribeRequest::new(relays(&["wss://up.com", "wss://down.com"]), [notes()])
            .timeout(Duration::from_secs(2))
            .on_event(on_event),
    );
    sub.closed().await;

    assert_eq!(received.lock().len(), 1);
    assert!(network.relay_has_error("wss://down.com"));
}
