//! Dynamic author scopes
//!
//! A scoped filter leaves its author list open until query time, when it is
//! filled in from the current user's social graph.

use crate::graph::SocialGraph;
use nostr::Filter;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on authors a scope may expand to.
pub const MAX_SCOPE_AUTHORS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterScope {
    Follows,
    Network,
    FollowsAndNetwork,
    FollowsAndSelf,
    Custom,
    Global,
}

/// A filter that may still carry a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicFilter {
    pub filter: Filter,
    pub scope: Option<FilterScope>,
}

impl DynamicFilter {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            scope: None,
        }
    }

    pub fn scoped(filter: Filter, scope: FilterScope) -> Self {
        Self {
            filter,
            scope: Some(scope),
        }
    }
}

impl From<Filter> for DynamicFilter {
    fn from(filter: Filter) -> Self {
        Self::new(filter)
    }
}

fn shuffled(mut pubkeys: Vec<String>) -> Vec<String> {
    pubkeys.shuffle(&mut rand::rng());
    pubkeys
}

/// Resolve scopes into concrete author lists.
///
/// Filters with explicit authors, no scope, or a `custom`/`global` scope pass
/// through unchanged. An empty resolution falls back to `default_follows`.
pub fn compile_filters(
    filters: Vec<DynamicFilter>,
    graph: &dyn SocialGraph,
    default_follows: &[String],
) -> Vec<Filter> {
    filters
        .into_iter()
        .map(|DynamicFilter { filter, scope }| {
            let scope = match scope {
                Some(scope) if filter.authors.is_none() => scope,
                _ => return filter,
            };

            let mut pubkeys = match scope {
                FilterScope::Custom | FilterScope::Global => return filter,
                FilterScope::Follows => shuffled(graph.followed_pubkeys()),
                FilterScope::Network => shuffled(graph.network_pubkeys()),
                FilterScope::FollowsAndNetwork => {
                    let mut pubkeys = graph.followed_pubkeys();
                    pubkeys.extend(graph.network_pubkeys());
                    shuffled(pubkeys)
                }
                FilterScope::FollowsAndSelf => {
                    let mut pubkeys = shuffled(graph.followed_pubkeys());
                    if let Some(user) = graph.user_pubkey() {
                        pubkeys.push(user);
                    }
                    pubkeys
                }
            };

            if pubkeys.is_empty() {
                debug!("{:?} scope is empty, using default follows", scope);
                pubkeys = default_follows.to_vec();
            }
            pubkeys.truncate(MAX_SCOPE_AUTHORS);

            filter.authors(pubkeys)
        })
        .collect()
}
