//! NIP-42: Authentication of clients to relays
//!
//! A relay sends `["AUTH", <challenge>]`; the client answers with
//! `["AUTH", <signed kind 22242 event>]` carrying `relay` and `challenge` tags.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/42.md>

use crate::nip01::{Event, EventTemplate};

/// Event kind for client authentication
pub const KIND_CLIENT_AUTH: u16 = 22242;

/// Build the unsigned authentication event for `relay_url` / `challenge`.
pub fn create_auth_template(relay_url: &str, challenge: &str, created_at: u64) -> EventTemplate {
    EventTemplate {
        created_at,
        kind: KIND_CLIENT_AUTH,
        tags: vec![
            vec!["relay".to_string(), relay_url.to_string()],
            vec!["challenge".to_string(), challenge.to_string()],
        ],
        content: String::new(),
    }
}

/// The challenge an authentication event answers, if it is one.
pub fn get_challenge(event: &Event) -> Option<&str> {
    if event.kind != KIND_CLIENT_AUTH {
        return None;
    }
    event.tag_values("challenge").next()
}

/// The relay an authentication event is addressed to, if it is one.
pub fn get_relay_url(event: &Event) -> Option<&str> {
    if event.kind != KIND_CLIENT_AUTH {
        return None;
    }
    event.tag_values("relay").next()
}
