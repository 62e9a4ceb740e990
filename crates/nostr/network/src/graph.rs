//! Social graph used to resolve filter scopes

use nostr::{ContactList, Event, Nip02Error};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The current user's view of who they follow.
pub trait SocialGraph: Send + Sync {
    fn user_pubkey(&self) -> Option<String>;

    /// Accounts the user follows.
    fn followed_pubkeys(&self) -> Vec<String>;

    /// Accounts followed by the user's follows, excluding the user and
    /// their direct follows.
    fn network_pubkeys(&self) -> Vec<String>;
}

struct StoredList {
    created_at: u64,
    pubkeys: Vec<String>,
}

/// Social graph built from NIP-02 contact lists.
#[derive(Default)]
pub struct FollowGraph {
    user: RwLock<Option<String>>,
    lists: RwLock<HashMap<String, StoredList>>,
}

impl FollowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(pubkey: impl Into<String>) -> Self {
        let graph = Self::new();
        graph.set_user(Some(pubkey.into()));
        graph
    }

    pub fn set_user(&self, pubkey: Option<String>) {
        *self.user.write() = pubkey;
    }

    /// Store a kind 3 contact list. Older lists than the one stored are ignored.
    ///
    /// Returns whether the stored list changed.
    pub fn update(&self, event: Event) -> Result<bool, Nip02Error> {
        let list = ContactList::from_event_lossy(event)?;
        let owner = list.owner().to_string();
        let created_at = list.event.created_at;

        let mut lists = self.lists.write();
        if let Some(existing) = lists.get(&owner)
            && existing.created_at >= created_at
        {
            return Ok(false);
        }

        debug!("follow list for {} has {} entries", owner, list.len());
        lists.insert(
            owner,
            StoredList {
                created_at,
                pubkeys: list.get_pubkeys(),
            },
        );
        Ok(true)
    }

    /// Accounts `pubkey` follows, in list order.
    pub fn follows_of(&self, pubkey: &str) -> Vec<String> {
        self.lists
            .read()
            .get(pubkey)
            .map(|list| list.pubkeys.clone())
            .unwrap_or_default()
    }
}

impl SocialGraph for FollowGraph {
    fn user_pubkey(&self) -> Option<String> {
        self.user.read().clone()
    }

    fn followed_pubkeys(&self) -> Vec<String> {
        match self.user_pubkey() {
            Some(user) => self.follows_of(&user),
            None => Vec::new(),
        }
    }

    fn network_pubkeys(&self) -> Vec<String> {
        let Some(user) = self.user_pubkey() else {
            return Vec::new();
        };

        let follows = self.follows_of(&user);
        let mut excluded: HashSet<String> = follows.iter().cloned().collect();
        excluded.insert(user);

        let mut network = Vec::new();
        for follow in &follows {
            for pubkey in self.follows_of(follow) {
                if excluded.insert(pubkey.clone()) {
                    network.push(pubkey);
                }
            }
        }
        network
    }
}
