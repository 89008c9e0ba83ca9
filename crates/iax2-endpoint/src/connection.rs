//! Connections and the calls that own them.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

use riax_iax2_wire::{ConnectionToken, Frame, Remote};

/// Opaque per-connection data supplied by the embedding application.
pub type UserData = Box<dyn Any + Send + Sync>;

/// Identifier for one logical call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallId(pub String);

impl CallId {
    pub fn new() -> Self {
        Self(format!("call-{}", Uuid::new_v4()))
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical call grouping one or two connections.
///
/// The engine only needs call identity and which party initiated: the
/// first connection attached is the A-party and drives synchronous call
/// setup; any later connection is set up from the A-party's context.
#[derive(Debug)]
pub struct Call {
    id: CallId,
    parties: Mutex<Vec<ConnectionToken>>,
}

impl Call {
    pub fn new() -> Self {
        Self {
            id: CallId::new(),
            parties: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn add_party(&self, token: ConnectionToken) {
        self.parties.lock().push(token);
    }

    /// Detach a party whose connection could not be registered.
    pub fn remove_party(&self, token: &ConnectionToken) {
        self.parties.lock().retain(|party| party != token);
    }

    /// Whether `token` is the first connection attached to this call.
    pub fn is_first_party(&self, token: &ConnectionToken) -> bool {
        self.parties.lock().first() == Some(token)
    }

    pub fn party_count(&self) -> usize {
        self.parties.lock().len()
    }
}

impl Default for Call {
    fn default() -> Self {
        Self::new()
    }
}

/// Which way a connection came into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// One IAX2 connection: the engine-side record of a call leg.
///
/// The engine creates connections and routes frames into them; the
/// call-control layer drains the inbound stream, drives the signalling
/// state machine, and removes the connection from the endpoint when the
/// call ends.
pub struct Connection {
    token: ConnectionToken,
    call: Arc<Call>,
    direction: CallDirection,
    remote: RwLock<Remote>,
    remote_party: String,
    remote_party_name: String,
    username: Mutex<Option<String>>,
    password: Mutex<Option<String>>,
    user_data: Mutex<Option<UserData>>,
    inbound_tx: mpsc::UnboundedSender<Frame>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
}

impl Connection {
    pub fn new(
        call: Arc<Call>,
        token: ConnectionToken,
        direction: CallDirection,
        remote: Remote,
        remote_party: impl Into<String>,
        remote_party_name: impl Into<String>,
    ) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        call.add_party(token.clone());
        Arc::new(Self {
            token,
            call,
            direction,
            remote: RwLock::new(remote),
            remote_party: remote_party.into(),
            remote_party_name: remote_party_name.into(),
            username: Mutex::new(None),
            password: Mutex::new(None),
            user_data: Mutex::new(None),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        })
    }

    pub fn token(&self) -> &ConnectionToken {
        &self.token
    }

    pub fn call(&self) -> &Arc<Call> {
        &self.call
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    /// Call-number view of the far end. `source_call_number` here is this
    /// endpoint's own number for the call.
    pub fn remote(&self) -> Remote {
        *self.remote.read()
    }

    /// Record the peer's call number once it is learned from the peer's
    /// first reply.
    pub fn set_dest_call_number(&self, dest_call_number: u16) {
        self.remote.write().dest_call_number = dest_call_number;
    }

    /// Canonical URL form of the far end.
    pub fn remote_party(&self) -> &str {
        &self.remote_party
    }

    /// Display name of the far end, empty when the peer sent none.
    pub fn remote_party_name(&self) -> &str {
        &self.remote_party_name
    }

    pub fn username(&self) -> Option<String> {
        self.username.lock().clone()
    }

    pub fn password(&self) -> Option<String> {
        self.password.lock().clone()
    }

    /// Adopt credentials, typically borrowed from a registration
    /// relationship with the same host.
    pub fn set_credentials(&self, username: impl Into<String>, password: impl Into<String>) {
        *self.username.lock() = Some(username.into());
        *self.password.lock() = Some(password.into());
    }

    pub fn set_user_data(&self, data: UserData) {
        *self.user_data.lock() = Some(data);
    }

    pub fn take_user_data(&self) -> Option<UserData> {
        self.user_data.lock().take()
    }

    /// Queue an inbound frame for the call-control layer.
    ///
    /// Returns `false` when the consumer has dropped its receiver, which
    /// means the call is already being torn down.
    pub fn deliver(&self, frame: Frame) -> bool {
        self.inbound_tx.send(frame).is_ok()
    }

    /// Take the inbound frame stream. Yields `None` after the first call;
    /// there is exactly one consumer per connection.
    pub fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<Frame>> {
        self.inbound_rx.lock().take()
    }

    /// Whether this connection is the call's initiating (A) party.
    pub fn is_initiating_party(&self) -> bool {
        self.call.is_first_party(&self.token)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("token", &self.token)
            .field("call", self.call.id())
            .field("direction", &self.direction)
            .field("remote", &self.remote())
            .field("remote_party", &self.remote_party)
            .finish()
    }
}
