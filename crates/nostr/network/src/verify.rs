//! Event signature verification boundary

use nostr::{Event, Nip01Error, verify_event};

/// Checks that an event's id and signature are authentic.
pub trait EventVerifier: Send + Sync {
    fn verify(&self, event: &Event) -> Result<bool, Nip01Error>;
}

/// Schnorr verification of the NIP-01 id and signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier;

impl EventVerifier for SignatureVerifier {
    fn verify(&self, event: &Event) -> Result<bool, Nip01Error> {
        verify_event(event)
    }
}
