//! Connection tokens.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Opaque key identifying one connection for routing purposes.
///
/// Every inbound frame carries a token derived from the sender's address
/// and source call number, and every live connection is registered under
/// exactly one token. Tokens are stable for the lifetime of a call and
/// unique among concurrently active calls; equality on the token is the
/// primary routing test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionToken(pub String);

impl ConnectionToken {
    /// Token for an inbound frame, derived from the sender's transport
    /// address and the call number the sender stamped as its source.
    ///
    /// Frames from the same peer carrying the same source call number all
    /// map to the same token, so the first NEW of a call and every later
    /// frame of that call agree on the key.
    pub fn from_remote(addr: SocketAddr, source_call_number: u16) -> Self {
        Self(format!(
            "iax2:{}:{}:{}",
            addr.ip(),
            addr.port(),
            source_call_number
        ))
    }

    /// Token for a locally originated call.
    ///
    /// `sequence` comes from the endpoint's outgoing-call counter, so
    /// outbound tokens never collide with each other. The `out` marker
    /// keeps them out of the inbound derivation's namespace.
    pub fn for_outgoing(ip: IpAddr, sequence: u64) -> Self {
        Self(format!("iax2:{}:out:{}", ip, sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConnectionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
