//! Filter routing planner
//!
//! Decides which relays receive which filters. Filters are expanded with
//! repost variants, assigned to relays through routing hints, grouped per
//! relay and ranked, and finally the long tail of relays is folded into a
//! small redundant core so a query never fans out to more than
//! `relay_limit` relays.

use crate::hints::RoutingHints;
use crate::url::normalize_relay_url;
use nostr::{
    Filter, KIND_GENERIC_REPOST, KIND_REPOST, KIND_SHORT_TEXT_NOTE, is_context_address,
    merge_filters,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Filters to send to one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFilters {
    pub relay: String,
    pub filters: Vec<Filter>,
}

/// Options for merging per-filter relay assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterOptions {
    /// Keep at most this many relays, preferring those carrying the most filters
    pub limit: Option<usize>,
    /// Send each filter to at most this many relays, preferring popular ones
    pub redundancy: Option<usize>,
}

/// Everything the planner needs besides the filters.
pub struct RoutingContext<'a> {
    pub hints: &'a dyn RoutingHints,
    pub relay_limit: usize,
    pub relay_redundancy: usize,
    pub options: RouterOptions,
}

/// Add the repost variants a feed needs to also show reposted content.
///
/// Each filter is followed by: `{kinds:[6,16]}` when it has no kinds, a
/// kind 6 variant when it asks for notes, and a kind 16 variant tagged with
/// `#k` for every other kind.
pub fn add_repost_filters(filters: Vec<Filter>) -> Vec<Filter> {
    filters
        .into_iter()
        .flat_map(|original| {
            let mut chunk = vec![original.clone()];

            match &original.kinds {
                None => {
                    chunk.push(
                        original
                            .clone()
                            .kinds(vec![KIND_REPOST, KIND_GENERIC_REPOST]),
                    );
                }
                Some(kinds) => {
                    if kinds.contains(&KIND_SHORT_TEXT_NOTE) {
                        chunk.push(original.clone().kinds(vec![KIND_REPOST]));
                    }

                    let other_kinds: Vec<String> = kinds
                        .iter()
                        .filter(|kind| **kind != KIND_SHORT_TEXT_NOTE)
                        .map(u16::to_string)
                        .collect();

                    if !other_kinds.is_empty() {
                        chunk.push(
                            original
                                .clone()
                                .kinds(vec![KIND_GENERIC_REPOST])
                                .tag("k", other_kinds),
                        );
                    }
                }
            }

            chunk
        })
        .collect()
}

/// Relay assignments for one filter id.
struct Scenario {
    filter_id: String,
    relays: Vec<String>,
}

/// Group `values` by the relays `relays_for` assigns them, in first-seen order.
fn group_by_relay(
    values: &[String],
    relays_for: impl Fn(&str) -> Vec<String>,
) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for value in values {
        for relay in relays_for(value) {
            let slot = *index.entry(relay.clone()).or_insert_with(|| {
                groups.push((relay, Vec::new()));
                groups.len() - 1
            });
            let members = &mut groups[slot].1;
            if !members.contains(value) {
                members.push(value.clone());
            }
        }
    }

    groups
}

/// Merge scenarios into relay -> filter ids, honoring the router options.
fn merge_scenarios(scenarios: Vec<Scenario>, options: RouterOptions) -> Vec<(String, Vec<String>)> {
    let mut selections: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for scenario in &scenarios {
        for raw in &scenario.relays {
            let relay = match normalize_relay_url(raw) {
                Ok(relay) => relay,
                Err(e) => {
                    warn!("skipping relay hint {:?}: {}", raw, e);
                    continue;
                }
            };
            let slot = *index.entry(relay.clone()).or_insert_with(|| {
                selections.push((relay, Vec::new()));
                selections.len() - 1
            });
            let ids = &mut selections[slot].1;
            if !ids.contains(&scenario.filter_id) {
                ids.push(scenario.filter_id.clone());
            }
        }
    }

    if let Some(redundancy) = options.redundancy {
        let popularity: Vec<usize> = selections.iter().map(|(_, ids)| ids.len()).collect();
        let mut keep: Vec<Vec<String>> = vec![Vec::new(); selections.len()];

        for scenario in &scenarios {
            let mut carriers: Vec<usize> = (0..selections.len())
                .filter(|&i| selections[i].1.contains(&scenario.filter_id))
                .collect();
            carriers.sort_by_key(|&i| std::cmp::Reverse(popularity[i]));

            for i in carriers.into_iter().take(redundancy) {
                if !keep[i].contains(&scenario.filter_id) {
                    keep[i].push(scenario.filter_id.clone());
                }
            }
        }

        selections = selections
            .into_iter()
            .zip(keep)
            .filter(|(_, kept)| !kept.is_empty())
            .map(|((relay, ids), kept)| {
                let ids = ids.into_iter().filter(|id| kept.contains(id)).collect();
                (relay, ids)
            })
            .collect();
    }

    if let Some(limit) = options.limit {
        selections.sort_by_key(|(_, ids)| std::cmp::Reverse(ids.len()));
        selections.truncate(limit);
    }

    selections
}

/// Compute which relays receive which filters.
///
/// Filters with a search term go to the search relays; filters referencing
/// community or group addresses go to those contexts' relays; filters with
/// authors go to each author's relays; everything else goes to the read
/// relays. Context and author routing never fall back to other relays, so a
/// filter nobody has hints for is omitted.
pub fn get_filter_selections(filters: Vec<Filter>, ctx: &RoutingContext<'_>) -> Vec<RelayFilters> {
    let mut scenarios: Vec<Scenario> = Vec::new();
    let mut filters_by_id: HashMap<String, Filter> = HashMap::new();

    let mut add = |filter: Filter, relays: Vec<String>| {
        let filter_id = filter.id();
        filters_by_id.insert(filter_id.clone(), filter);
        scenarios.push(Scenario { filter_id, relays });
    };

    for filter in filters {
        if filter.search.is_some() {
            add(filter, ctx.hints.search_relays());
            continue;
        }

        let contexts: Vec<String> = filter
            .tag_values("a")
            .map(|values| {
                values
                    .iter()
                    .filter(|address| is_context_address(address))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !contexts.is_empty() {
            for (relay, values) in group_by_relay(&contexts, |address| ctx.hints.context_relays(address)) {
                add(filter.clone().tag("a", values), vec![relay]);
            }
        } else if let Some(authors) = filter.authors.clone() {
            for (relay, values) in group_by_relay(&authors, |pubkey| ctx.hints.pubkey_relays(pubkey)) {
                add(filter.clone().authors(values), vec![relay]);
            }
        } else {
            let relays = ctx.hints.read_relays();
            add(filter, relays);
        }
    }

    let mut selections: Vec<RelayFilters> = merge_scenarios(scenarios, ctx.options)
        .into_iter()
        .map(|(relay, ids)| RelayFilters {
            relay,
            filters: ids
                .iter()
                .filter_map(|id| filters_by_id.get(id).cloned())
                .collect(),
        })
        .collect();

    // Relays backing the biggest author sets are the most valuable; stable so ties keep hint order
    selections.sort_by_key(|selection| {
        std::cmp::Reverse(selection.filters.first().map_or(0, Filter::author_count))
    });

    if selections.len() <= ctx.relay_limit {
        return selections;
    }

    let discard = selections.split_off(ctx.relay_limit);
    debug!(
        "folding {} long-tail relays into the top {}",
        discard.len(),
        ctx.relay_redundancy.min(selections.len())
    );

    let discarded: Vec<Filter> = discard.into_iter().flat_map(|s| s.filters).collect();
    for target in selections.iter_mut().take(ctx.relay_redundancy) {
        let combined = discarded
            .iter()
            .cloned()
            .chain(std::mem::take(&mut target.filters));
        target.filters = merge_filters(combined);
    }

    selections
}
