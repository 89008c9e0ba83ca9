//! Collaborator seams.
//!
//! The engine routes frames and supervises lifecycles. Everything that
//! touches wire bytes, retransmission state, registration dialogs or call
//! control is somebody else's job, reached through the traits here. The
//! provided implementations cover tests and the simplest embeddings.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use riax_iax2_wire::Frame;

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Outbound half of the transport.
///
/// Owns send sequencing and the pending-retransmission list for reliable
/// full frames. The engine calls it for status replies and to forward
/// late ACKs; connections use it for everything they send.
#[async_trait]
pub trait FrameTransmitter: Send + Sync {
    async fn send_frame(&self, frame: Frame) -> Result<()>;

    /// Offer a late ACK that matched no live connection. It may still
    /// acknowledge a full frame a just-closed call has queued for
    /// retransmission; the transmitter purges any match.
    async fn purge_matching_acks(&self, ack: &Frame);

    /// Stop accepting work. Called once during endpoint teardown, before
    /// the receiver stops.
    async fn terminate(&self);
}

/// Byte-level frame parsing and encoding.
///
/// Kept outside the engine so the routing logic never sees datagrams.
/// `decode` derives the frame's token from `peer` and the call-number
/// words; see [`riax_iax2_wire::ConnectionToken::from_remote`].
pub trait FrameCodec: Send + Sync {
    fn decode(&self, datagram: &[u8], peer: SocketAddr) -> Result<Frame>;
    fn encode(&self, frame: &Frame) -> Result<Bytes>;
}

/// Network half of one registration relationship.
///
/// `register` performs one REGREQ exchange and is called again on every
/// refresh; `unregister` sends the final REGREL.
#[async_trait]
pub trait RegistrationExchange: Send + Sync {
    async fn register(
        &self,
        host: &str,
        username: &str,
        password: &str,
        refresh: Duration,
    ) -> Result<()>;

    async fn unregister(&self, host: &str, username: &str) -> Result<()>;
}

/// Call-control attach points.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Drive call setup for the initiating party of an outbound call.
    /// Runs on the caller's task, synchronously within `make_connection`.
    async fn set_up_connection(&self, connection: &Arc<Connection>) -> Result<()>;

    /// An inbound NEW created `connection`. Runs on the dispatch task,
    /// after the connection is registered and before the NEW frame is
    /// delivered to it, so implementations should return promptly.
    async fn on_incoming_call(&self, connection: &Arc<Connection>);
}

/// Hooks for embedders that drive connections purely through their
/// inbound frame streams.
#[derive(Debug, Default)]
pub struct NoopSessionHooks;

#[async_trait]
impl SessionHooks for NoopSessionHooks {
    async fn set_up_connection(&self, connection: &Arc<Connection>) -> Result<()> {
        debug!(token = %connection.token(), "no session hooks; skipping call setup");
        Ok(())
    }

    async fn on_incoming_call(&self, connection: &Arc<Connection>) {
        debug!(token = %connection.token(), "no session hooks; incoming call unhandled");
    }
}

/// Registration exchange that performs no network operations.
///
/// Keeps the registration manager's bookkeeping observable in embeddings
/// that have no registrar, and in tests.
#[derive(Debug, Default)]
pub struct NoopRegistrationExchange;

#[async_trait]
impl RegistrationExchange for NoopRegistrationExchange {
    async fn register(
        &self,
        host: &str,
        username: &str,
        _password: &str,
        _refresh: Duration,
    ) -> Result<()> {
        debug!(host, username, "no registration exchange; register is a no-op");
        Ok(())
    }

    async fn unregister(&self, host: &str, username: &str) -> Result<()> {
        debug!(host, username, "no registration exchange; unregister is a no-op");
        Ok(())
    }
}

/// What the engine asked of a [`ChannelTransmitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitRequest {
    Send(Frame),
    PurgeAcks(Frame),
    Terminated,
}

/// Transmitter that forwards every request to a channel.
///
/// The default until a real transmit engine is attached; the consumer of
/// the channel decides what reaches the wire.
#[derive(Debug)]
pub struct ChannelTransmitter {
    requests: mpsc::UnboundedSender<TransmitRequest>,
    closed: AtomicBool,
}

impl ChannelTransmitter {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransmitRequest>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                requests,
                closed: AtomicBool::new(false),
            }),
            rx,
        )
    }
}

#[async_trait]
impl FrameTransmitter for ChannelTransmitter {
    async fn send_frame(&self, frame: Frame) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Terminated);
        }
        self.requests
            .send(TransmitRequest::Send(frame))
            .map_err(|_| Error::transport("transmit channel closed"))
    }

    async fn purge_matching_acks(&self, ack: &Frame) {
        let _ = self.requests.send(TransmitRequest::PurgeAcks(ack.clone()));
    }

    async fn terminate(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.requests.send(TransmitRequest::Terminated);
        }
    }
}
