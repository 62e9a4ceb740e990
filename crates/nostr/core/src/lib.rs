//! Nostr protocol types for the relay network engine.
//!
//! This crate provides:
//! - NIP-01: Events, signing and verification, plus subscription filters
//! - NIP-02: Follow lists
//! - NIP-11: Relay information documents
//! - NIP-18: Repost kinds
//! - NIP-33: Addressable event coordinates and context addresses
//! - NIP-42: Client authentication events
//! - NIP-65: Relay list metadata
//!
//! # Features
//!
//! - `full` (default): key generation, signing and signature verification
//! - without `full`: event and filter types only

mod filter;
pub mod nip01;
mod nip02;
mod nip11;
mod nip18;
mod nip33;
mod nip42;
mod nip65;


pub use filter::{Filter, matches_any, merge_filters};

pub use nip01::{
    Event, EventTemplate, KIND_CONTACTS, KIND_METADATA, KIND_REACTION, KIND_SHORT_TEXT_NOTE,
    Nip01Error, SeenOn, UnsignedEvent, serialize_event, validate_event, validate_unsigned_event,
};

#[cfg(feature = "full")]
pub use nip01::{
    finalize_event, generate_secret_key, get_event_hash, get_public_key, get_public_key_hex,
    verify_event,
};

pub use nip02::{CONTACT_LIST_KIND, Contact, ContactList, Nip02Error};

pub use nip11::{Limitation, RelayInformation};

pub use nip18::{KIND_GENERIC_REPOST, KIND_REPOST, is_repost_kind};

pub use nip33::{
    ADDRESSABLE_KIND_MAX, ADDRESSABLE_KIND_MIN, Address, KIND_COMMUNITY, KIND_GROUP, Nip33Error,
    is_addressable_kind, is_context_address,
};

pub use nip42::{KIND_CLIENT_AUTH, create_auth_template, get_challenge, get_relay_url};

pub use nip65::{
    Nip65Error, RELAY_LIST_METADATA_KIND, RELAY_TAG, RelayEntry, RelayListMetadata, RelayMarker,
    get_relay_entries,
};
