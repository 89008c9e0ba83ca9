//! Endpoint event surface.
//!
//! Events are advisory notifications to the embedding application. They
//! are emitted with `try_send` so a slow or absent consumer can never
//! stall routing or teardown; losing one under backpressure is accepted.

use serde::{Deserialize, Serialize};

use riax_iax2_wire::ConnectionToken;

/// State changes of one registration relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationEvent {
    /// First successful REGREQ exchange for the pair.
    Registered { host: String, username: String },
    /// A periodic refresh failed; the relationship stays active and the
    /// next refresh is attempted on schedule.
    RefreshFailed {
        host: String,
        username: String,
        reason: String,
    },
    /// The relationship was removed and the final unregister sent.
    Unregistered { host: String, username: String },
}

/// Events emitted by [`Iax2Endpoint`](crate::endpoint::Iax2Endpoint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointEvent {
    /// An inbound NEW request created a connection.
    IncomingCall {
        token: ConnectionToken,
        remote_party: String,
        calling_name: Option<String>,
    },
    /// A connection (either direction) entered the registry.
    ConnectionRegistered { token: ConnectionToken },
    /// A connection left the registry.
    ConnectionRemoved { token: ConnectionToken },
    /// Registration lifecycle notification.
    Registration(RegistrationEvent),
    /// Teardown finished; no further events follow.
    ShutdownComplete,
}
