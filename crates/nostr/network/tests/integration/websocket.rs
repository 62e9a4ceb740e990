//! End-to-end over real sockets against a minimal in-process relay

use super::*;
use futures::{SinkExt, StreamExt};
use nostr::Filter;
use nostr_network::{PublishRequest, SubscribeRequest};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Start a relay that stores published events and serves them to REQs.
async fn start_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };

                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else {
                        continue;
                    };
                    let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };

                    let replies = match frame[0].as_str() {
                        Some("EVENT") => {
                            let event: Event = serde_json::from_value(frame[1].clone()).unwrap();
                            let id = event.id.clone();
                            store.lock().push(event);
                            vec![json!(["OK", id, true, ""])]
                        }
                        Some("REQ") => {
                            let filters: Vec<Filter> = frame.as_array().unwrap()[2..]
                                .iter()
                                .filter_map(|f| serde_json::from_value(f.clone()).ok())
                                .collect();
                            let mut replies: Vec<Value> = store
                                .lock()
                                .iter()
                                .filter(|event| nostr::matches_any(&filters, event))
                                .map(|event| json!(["EVENT", frame[1], event]))
                                .collect();
                            replies.push(json!(["EOSE", frame[1]]));
                            replies
                        }
                        _ => vec![],
                    };

                    for reply in replies {
                        if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    format!("ws://{}", addr)
}

#[tokio::test]
async fn test_publish_then_subscribe() {
    init_tracing();
    let url = start_relay().await;
    let network = Network::new(NetworkConfig::default());

    let event = signed_event(1, "over the wire", 1_700_000_000);
    let progress = network
        .publish(PublishRequest::new(vec![url.clone()], event.clone()))
        .await;
    assert!(progress.succeeded.contains(&url), "{:?}", progress);

    let received = Arc::new(Mutex::new(Vec::<Event>::new()));
    let sink = Arc::clone(&received);
    let sub = network.subscribe(
        SubscribeRequest::new(vec![url.clone()], [Filter::new().kinds(vec![1])])
            .timeout(Duration::from_secs(5))
            .on_event(move |event| sink.lock().push(event)),
    );
    sub.closed().await;

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, event.id);
    assert_eq!(received[0].seen_on.to_vec(), vec![url.clone()]);
    assert_eq!(network.pool().len(), 1);
}

#[tokio::test]
async fn test_unreachable_relay_fails_publish() {
    init_tracing();
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let network = Network::new(NetworkConfig::default());
    let progress = network
        .publish(PublishRequest::new(vec![url.clone()], signed_event(1, "lost", 1)))
        .await;

    assert!(progress.failed.contains(&url), "{:?}", progress);
    assert!(network.relay_has_error(&url));
}
