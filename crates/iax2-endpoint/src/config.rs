//! Endpoint configuration.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Well-known UDP port for IAX2 signalling and media.
pub const DEFAULT_PORT: u16 = riax_iax2_wire::DEFAULT_PORT;

/// Configuration for one endpoint instance.
///
/// All fields have usable defaults; the builder methods exist so callers
/// can override only what they care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Identity presented to peers when no registration supplies one.
    pub local_user_name: String,
    /// Number presented as the calling party on outbound calls.
    pub local_number: String,
    /// Address to bind the endpoint's own UDP socket to. `None` runs the
    /// endpoint socketless, with frames injected by the embedding stack.
    pub bind_addr: Option<SocketAddr>,
    /// Capacity of the endpoint event channel.
    pub event_capacity: usize,
    /// Seed the call-number counter randomly instead of starting at 1.
    /// Randomized numbers make stale frames from a previous run less
    /// likely to alias a live call.
    pub randomize_call_numbers: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            local_user_name: "riax".to_string(),
            local_number: "1234".to_string(),
            bind_addr: None,
            event_capacity: 64,
            randomize_call_numbers: true,
        }
    }
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_user_name(mut self, name: impl Into<String>) -> Self {
        self.local_user_name = name.into();
        self
    }

    pub fn with_local_number(mut self, number: impl Into<String>) -> Self {
        self.local_number = number.into();
        self
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Start call numbers at 1 instead of a random seed. Useful for
    /// reproducible runs.
    pub fn with_fixed_call_numbers(mut self) -> Self {
        self.randomize_call_numbers = false;
        self
    }
}
