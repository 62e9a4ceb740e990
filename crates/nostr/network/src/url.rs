//! Relay URL normalization

use crate::error::{ClientError, Result};
use std::collections::HashSet;
use tracing::{error, warn};
use url::Url;

/// Normalize a relay URL.
///
/// Adds `wss://` when no scheme is given, rejects anything that is not a
/// WebSocket URL, and strips the fragment and a bare trailing slash so the
/// same relay always maps to the same key.
pub fn normalize_relay_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidUrl("empty relay url".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("wss://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme)?;
    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(ClientError::InvalidUrl(format!(
            "URL must use ws:// or wss:// scheme, got: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(ClientError::InvalidUrl(format!("missing host: {}", raw)));
    }

    url.set_fragment(None);

    let mut normalized = url.to_string();
    if url.path() == "/" && url.query().is_none() {
        normalized.pop();
    }
    Ok(normalized)
}

/// Normalize a list of relay URLs, dropping invalid entries and duplicates.
///
/// The first occurrence of each relay keeps its position.
pub fn normalize_relay_urls(urls: &[String]) -> Vec<String> {
    if urls.is_empty() {
        error!("no relay urls were provided");
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(urls.len());
    for raw in urls {
        match normalize_relay_url(raw) {
            Ok(url) => {
                if seen.insert(url.clone()) {
                    out.push(url);
                } else {
                    warn!("duplicate relay url dropped: {}", raw);
                }
            }
            Err(e) => warn!("invalid relay url {:?} dropped: {}", raw, e),
        }
    }
    out
}
