//! NIP-11: Relay Information Document
//!
//! Relays describe themselves with a JSON document served over HTTP with
//! `Accept: application/nostr+json`. Clients read the `limitation` block to
//! learn whether a relay wants payment or authentication before serving.

use serde::{Deserialize, Serialize};

/// NIP-11 Relay Information Document.
///
/// Every field is optional on the client side: relays in the wild omit most
/// of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Administrative contact pubkey (hex)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,

    /// Administrative contact (URI: mailto:, https:, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,

    /// List of supported NIP numbers
    pub supported_nips: Vec<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Server limitations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limitation: Option<Limitation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payments_url: Option<String>,
}

impl RelayInformation {
    /// Parse a relay information document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether the relay advertises NIP `nip`.
    pub fn supports(&self, nip: u16) -> bool {
        self.supported_nips.contains(&nip)
    }

    pub fn auth_required(&self) -> bool {
        self.limitation
            .as_ref()
            .and_then(|l| l.auth_required)
            .unwrap_or(false)
    }

    pub fn payment_required(&self) -> bool {
        self.limitation
            .as_ref()
            .and_then(|l| l.payment_required)
            .unwrap_or(false)
    }
}

/// Server limitations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limitation {
    /// Maximum message length in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_length: Option<usize>,

    /// Maximum active subscriptions per connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_subscriptions: Option<usize>,

    /// Maximum subscription ID length
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_subid_length: Option<usize>,

    /// Maximum limit value in filters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_limit: Option<usize>,

    /// Authentication required (NIP-42)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_required: Option<bool>,

    /// Payment required
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_required: Option<bool>,

    /// Restricted writes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restricted_writes: Option<bool>,
}
