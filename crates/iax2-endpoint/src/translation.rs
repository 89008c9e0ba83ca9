//! Token translation table.

use dashmap::DashMap;
use tracing::{debug, trace};

use riax_iax2_wire::ConnectionToken;

/// Best-effort cache mapping a token a frame arrived under to the token
/// its connection was registered with.
///
/// The usual case: a locally originated call is registered under a
/// synthesized outgoing token, but the peer's replies derive their token
/// from the peer's address and call number. The first such reply is
/// resolved by call-number scan and its token pair cached here, so later
/// frames skip the scan.
///
/// Entries are hints, not truth. A hit is always re-validated against the
/// registry, entries are never expired, and a stale entry costs one
/// wasted lookup at most. Losing the whole table would only slow routing
/// down.
#[derive(Debug, Default)]
pub struct TokenTranslationTable {
    entries: DashMap<ConnectionToken, ConnectionToken>,
}

impl TokenTranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical token cached for `observed`, if any.
    pub fn translate(&self, observed: &ConnectionToken) -> Option<ConnectionToken> {
        let canonical = self.entries.get(observed).map(|entry| entry.value().clone());
        if let Some(canonical) = &canonical {
            trace!(observed = %observed, canonical = %canonical, "token translation hit");
        }
        canonical
    }

    /// Cache a pairing. Re-inserting an observed token overwrites the old
    /// pairing; the newest information wins.
    pub fn insert(&self, observed: ConnectionToken, canonical: ConnectionToken) {
        debug!(observed = %observed, canonical = %canonical, "token translation added");
        self.entries.insert(observed, canonical);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trace-dump every cached pairing.
    pub fn report(&self) {
        trace!(count = self.entries.len(), "stored token translations");
        for entry in self.entries.iter() {
            trace!(observed = %entry.key(), canonical = %entry.value(), "stored translation");
        }
    }
}
