//! NIP-42 authentication handlers

use async_trait::async_trait;
use nostr::{Event, create_auth_template, finalize_event};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Answers relay AUTH challenges.
///
/// Returning `None` leaves the challenge unanswered; the relay stays marked as
/// unauthorized.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    async fn handle_challenge(&self, relay_url: &str, challenge: &str) -> Option<Event>;
}

/// Signs kind 22242 auth events with a local secret key.
pub struct KeyAuthHandler {
    secret_key: [u8; 32],
}

impl KeyAuthHandler {
    pub fn new(secret_key: [u8; 32]) -> Self {
        Self { secret_key }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl AuthHandler for KeyAuthHandler {
    async fn handle_challenge(&self, relay_url: &str, challenge: &str) -> Option<Event> {
        let template = create_auth_template(relay_url, challenge, unix_now());
        match finalize_event(&template, &self.secret_key) {
            Ok(event) => {
                debug!("signed auth event {} for {}", event.id, relay_url);
                Some(event)
            }
            Err(e) => {
                warn!("failed to sign auth event for {}: {}", relay_url, e);
                None
            }
        }
    }
}
