//! Live connection registry.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use riax_iax2_wire::ConnectionToken;

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Single source of truth for which connections are alive.
///
/// Every lookup that matters consults this map; the translation table
/// only accelerates the way here and is never trusted on its own. One
/// token maps to at most one connection at any moment.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionToken, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its token.
    ///
    /// Fails when the slot is occupied; the caller decides whether that
    /// means a duplicate NEW or an allocator bug.
    pub fn insert_new(&self, connection: Arc<Connection>) -> Result<()> {
        match self.connections.entry(connection.token().clone()) {
            Entry::Occupied(_) => Err(Error::connection_creation_failure(
                connection.token().as_str(),
            )),
            Entry::Vacant(slot) => {
                debug!(token = %connection.token(), "connection registered");
                slot.insert(connection);
                Ok(())
            }
        }
    }

    pub fn get(&self, token: &ConnectionToken) -> Option<Arc<Connection>> {
        self.connections.get(token).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, token: &ConnectionToken) -> bool {
        self.connections.contains_key(token)
    }

    pub fn remove(&self, token: &ConnectionToken) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(token).map(|(_, connection)| connection);
        if removed.is_some() {
            debug!(token = %token, "connection removed");
        }
        removed
    }

    /// Scan for the connection whose own call number is `call_number`.
    ///
    /// This is the fallback for frames whose token matched nothing: the
    /// frame's destination call number names our side of the call. Linear
    /// in the number of live connections, which is why hits are cached in
    /// the translation table.
    pub fn find_by_source_call_number(&self, call_number: u16) -> Option<Arc<Connection>> {
        self.connections
            .iter()
            .find(|entry| entry.value().remote().source_call_number == call_number)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn tokens(&self) -> Vec<ConnectionToken> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Trace-dump every live connection.
    pub fn report(&self) {
        trace!(count = self.connections.len(), "stored connections");
        for entry in self.connections.iter() {
            trace!(token = %entry.key(), call = %entry.value().call().id(), "stored connection");
        }
    }
}
