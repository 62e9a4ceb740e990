//! NIP-18: Reposts
//!
//! Kind 6 reposts a text note; kind 16 reposts any other kind and carries the
//! reposted kind in a `k` tag.

/// Repost of a kind 1 text note
pub const KIND_REPOST: u16 = 6;

/// Repost of any other kind
pub const KIND_GENERIC_REPOST: u16 = 16;

/// Whether `kind` is one of the repost kinds.
pub fn is_repost_kind(kind: u16) -> bool {
    kind == KIND_REPOST || kind == KIND_GENERIC_REPOST
}
