//! Call numbering as seen from one side of a call.

use std::net::SocketAddr;

/// Call-number pair plus the peer's transport address.
///
/// Perspective matters. On a frame, `source_call_number` is the sender's
/// number for the call and `dest_call_number` is the number the sender
/// believes the recipient allocated. On a connection, `source_call_number`
/// is this endpoint's own number and `dest_call_number` the peer's. A
/// frame that matched nothing by token therefore belongs to a connection
/// when the frame's destination equals the connection's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remote {
    /// Call number allocated by the sending side.
    pub source_call_number: u16,
    /// Call number allocated by the receiving side, zero while unknown.
    pub dest_call_number: u16,
    /// Transport address of the far end.
    pub addr: SocketAddr,
}

impl Remote {
    pub fn new(source_call_number: u16, dest_call_number: u16, addr: SocketAddr) -> Self {
        Self {
            source_call_number,
            dest_call_number,
            addr,
        }
    }

    /// The same pair as the far end sees it: source and destination
    /// swapped, address unchanged.
    pub fn reversed(&self) -> Self {
        Self {
            source_call_number: self.dest_call_number,
            dest_call_number: self.source_call_number,
            addr: self.addr,
        }
    }
}
