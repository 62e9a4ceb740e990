//! Count coordinator tests

use super::*;
use crate::mock::store_responder;
use nostr::Filter;
use serde_json::{Value, json};
use tokio::time::Instant;

fn count_config(urls: &[&str]) -> NetworkConfig {
    NetworkConfig {
        count_relays: relays(urls),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_count_returns_first_answer() {
    let events = vec![
        signed_event(1, "a", 1),
        signed_event(1, "b", 2),
        signed_event(7, "+", 3),
    ];
    let factory = MockFactory::with_responder(store_responder(events));
    let network = mock_network(&factory, count_config(&["wss://count.com"]));

    let count = network.count(vec![Filter::new().kinds(vec![1])]).await;
    assert_eq!(count, 2);

    settle().await;
    let verbs = factory.transport("wss://count.com").sent_verbs();
    assert_eq!(verbs, vec!["COUNT", "CLOSE"]);
}

#[tokio::test(start_paused = true)]
async fn test_count_without_answer_is_zero() {
    let factory = MockFactory::silent();
    let network = mock_network(&factory, count_config(&["wss://count.com"]));
    let started = Instant::now();

    let count = network.count(vec![Filter::new().kinds(vec![1])]).await;

    assert_eq!(count, 0);
    assert_eq!(started.elapsed(), Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_count_without_relays_is_zero() {
    let factory = MockFactory::silent();
    let network = mock_network(&factory, NetworkConfig::default());
    let started = Instant::now();

    assert_eq!(network.count(vec![Filter::new()]).await, 0);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(factory.created().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_count_ignores_answers_for_other_requests() {
    let factory = MockFactory::with_responder(Arc::new(|url: &str, frame: &Value| {
        if frame[0] != "COUNT" {
            return vec![];
        }
        if url == "wss://stale.com" {
            vec![json!(["COUNT", "old-request", { "count": 99 }])]
        } else {
            vec![json!(["COUNT", frame[1], { "count": 7 }])]
        }
    }));
    let network = mock_network(&factory, count_config(&["wss://stale.com", "wss://fresh.com"]));

    assert_eq!(network.count(vec![Filter::new()]).await, 7);
}
