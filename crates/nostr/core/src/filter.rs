//! Subscription filters (NIP-01, with NIP-50 search).
//!
//! A [`Filter`] describes which events a subscription wants. Filters are
//! serialized as-is into `REQ` and `COUNT` messages and are also used on the
//! client to re-check what relays send back.

use crate::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filter for subscription requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Event IDs (prefix match)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Authors (pubkeys, prefix match)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Event kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Events since timestamp (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Events until timestamp (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    /// Maximum number of events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Full-text search term (NIP-50), evaluated by the relay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,

    /// Generic tag queries, keyed by `#<letter>`
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    /// Create a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Add a tag filter. The key is the tag letter without `#` (e.g. "e", "p").
    pub fn tag(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.tags.insert(format!("#{}", key.into()), values);
        self
    }

    /// Values of the `#<key>` tag filter, if present.
    pub fn tag_values(&self, key: &str) -> Option<&Vec<String>> {
        self.tags.get(&format!("#{}", key))
    }

    /// Number of authors, zero when the filter has no author restriction.
    pub fn author_count(&self) -> usize {
        self.authors.as_ref().map_or(0, Vec::len)
    }

    /// Check whether an event satisfies this filter.
    ///
    /// `search` is not evaluated locally; relays that support it already
    /// applied it.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref ids) = self.ids
            && !ids.iter().any(|id| event.id.starts_with(id.as_str()))
        {
            return false;
        }

        if let Some(ref authors) = self.authors
            && !authors
                .iter()
                .any(|author| event.pubkey.starts_with(author.as_str()))
        {
            return false;
        }

        if let Some(ref kinds) = self.kinds
            && !kinds.contains(&event.kind)
        {
            return false;
        }

        if let Some(since) = self.since
            && event.created_at < since
        {
            return false;
        }

        if let Some(until) = self.until
            && event.created_at > until
        {
            return false;
        }

        for (tag_name, tag_values) in &self.tags {
            let tag_key = tag_name.trim_start_matches('#');
            let has_matching_tag = event
                .tag_values(tag_key)
                .any(|value| tag_values.iter().any(|wanted| wanted == value));

            if !has_matching_tag {
                return false;
            }
        }

        true
    }

    /// Stable identity used to refer to a filter while routing.
    pub fn id(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn group_key(&self) -> GroupKey {
        let mut lists = Vec::new();
        if self.ids.is_some() {
            lists.push("ids".to_string());
        }
        if self.authors.is_some() {
            lists.push("authors".to_string());
        }
        if self.kinds.is_some() {
            lists.push("kinds".to_string());
        }
        lists.extend(self.tags.keys().cloned());

        GroupKey {
            since: self.since,
            until: self.until,
            limit: self.limit,
            search: self.search.clone(),
            lists,
        }
    }

    fn absorb(&mut self, other: Filter) {
        union_into(&mut self.ids, other.ids);
        union_into(&mut self.authors, other.authors);
        union_into(&mut self.kinds, other.kinds);
        for (key, values) in other.tags {
            let mut target = self.tags.remove(&key);
            union_into(&mut target, Some(values));
            if let Some(target) = target {
                self.tags.insert(key, target);
            }
        }
    }
}

/// Filters that may be merged share every scalar field and the same set of
/// list fields.
#[derive(Debug, PartialEq, Eq)]
struct GroupKey {
    since: Option<u64>,
    until: Option<u64>,
    limit: Option<u64>,
    search: Option<String>,
    lists: Vec<String>,
}

fn union_into<T: PartialEq>(target: &mut Option<Vec<T>>, source: Option<Vec<T>>) {
    let Some(source) = source else {
        return;
    };
    let target = target.get_or_insert_with(Vec::new);
    for item in source {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Check whether an event satisfies at least one filter.
pub fn matches_any(filters: &[Filter], event: &Event) -> bool {
    filters.iter().any(|filter| filter.matches(event))
}

/// Collapse filters that differ only in their list values into one filter
/// per group, unioning the lists. Group order follows first appearance.
pub fn merge_filters(filters: impl IntoIterator<Item = Filter>) -> Vec<Filter> {
    let mut groups: Vec<(GroupKey, Filter)> = Vec::new();

    for filter in filters {
        let key = filter.group_key();
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, merged)) => merged.absorb(filter),
            None => groups.push((key, filter)),
        }
    }

    groups.into_iter().map(|(_, filter)| filter).collect()
}
