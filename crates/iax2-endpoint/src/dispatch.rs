//! Frame distribution.
//!
//! A single task owns all routing. On every wake it drains the ingest
//! queue completely, walking each frame down the resolution ladder:
//! registry by token, translation table, call-number scan, and finally
//! reclassification of call-establishing and stateless frames. Frames
//! that survive the whole ladder unclaimed are dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use riax_iax2_wire::{Frame, Remote, RemoteParty};

use crate::allocator::CallNumberAllocator;
use crate::connection::{Call, CallDirection, Connection};
use crate::events::EndpointEvent;
use crate::queue::FrameQueue;
use crate::registration::RegistrationManager;
use crate::registry::ConnectionRegistry;
use crate::status::StatusQueryHandler;
use crate::traits::{FrameTransmitter, SessionHooks};
use crate::translation::TokenTranslationTable;

pub(crate) struct Dispatcher {
    pub queue: Arc<FrameQueue>,
    pub registry: Arc<ConnectionRegistry>,
    pub translations: Arc<TokenTranslationTable>,
    pub registrations: Arc<RegistrationManager>,
    pub allocator: Arc<CallNumberAllocator>,
    pub transmitter: Arc<dyn FrameTransmitter>,
    pub status: Arc<dyn StatusQueryHandler>,
    pub hooks: Arc<dyn SessionHooks>,
    pub events: mpsc::Sender<EndpointEvent>,
}

impl Dispatcher {
    /// Worker loop. Exits when the queue is terminated; anything still
    /// queued at that point is discarded.
    pub(crate) async fn run(self) {
        debug!("dispatch task started");
        'live: loop {
            self.queue.notified().await;
            loop {
                if !self.queue.is_running() {
                    break 'live;
                }
                let Some(frame) = self.queue.pop() else { break };
                self.route_frame(frame).await;
            }
        }
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(count = dropped, "discarded queued frames at shutdown");
        }
        debug!("dispatch task stopped");
    }

    /// Resolution ladder for one frame.
    async fn route_frame(&self, frame: Frame) {
        trace!(token = %frame.token, "routing frame");

        // A NEW whose token is already live is a retransmission and must
        // not reach the connection as payload; the first one won.
        if frame.is_new_request() && self.registry.contains(&frame.token) {
            debug!(token = %frame.token, "duplicate NEW request dropped");
            return;
        }

        let Some(frame) = self.deliver_to_matching(frame) else {
            return;
        };
        let Some(frame) = self.deliver_by_call_number(frame) else {
            return;
        };

        // Unclaimed: reclassify before giving up.
        if self.status.is_status_query(&frame) {
            debug!(token = %frame.token, "forwarding status query");
            self.status.handle(frame).await;
            return;
        }
        if !frame.is_full() {
            debug!(token = %frame.token, "mini frame for unknown call dropped");
            return;
        }
        if frame.is_ack() {
            // The call may have just closed with full frames still queued
            // for retransmission; let the transmitter purge them.
            debug!(token = %frame.token, "late ACK offered to transmitter purge");
            self.transmitter.purge_matching_acks(&frame).await;
            return;
        }
        if frame.is_new_request() {
            self.new_inbound_connection(frame).await;
            return;
        }
        debug!(token = %frame.token, "no route for frame; dropped");
    }

    /// Registry hit, directly or via a validated translation entry.
    /// Returns the frame back when no live connection claims it.
    fn deliver_to_matching(&self, frame: Frame) -> Option<Frame> {
        if let Some(connection) = self.registry.get(&frame.token) {
            self.deliver(&connection, frame);
            return None;
        }
        if let Some(canonical) = self.translations.translate(&frame.token) {
            // The entry is only a hint; the registry decides.
            if let Some(connection) = self.registry.get(&canonical) {
                self.deliver(&connection, frame);
                return None;
            }
            trace!(observed = %frame.token, canonical = %canonical, "stale translation ignored");
        }
        Some(frame)
    }

    /// Call-number fallback: a full frame whose destination call number
    /// names one of our connections belongs to it, under whatever token
    /// the frame arrived with. Cache the pairing, then deliver; a miss
    /// hands the frame back for reclassification.
    fn deliver_by_call_number(&self, frame: Frame) -> Option<Frame> {
        if !frame.is_full() {
            return Some(frame);
        }
        // Only the call-number words are trusted here: everything past
        // them may be encrypted. Zero never matches because connections
        // are numbered starting at one.
        let dest = frame.remote.dest_call_number;
        let Some(connection) = self.registry.find_by_source_call_number(dest) else {
            return Some(frame);
        };
        self.translations
            .insert(frame.token.clone(), connection.token().clone());
        self.deliver(&connection, frame);
        None
    }

    fn deliver(&self, connection: &Arc<Connection>, frame: Frame) {
        trace!(token = %connection.token(), "frame delivered");
        if !connection.deliver(frame) {
            debug!(token = %connection.token(), "connection no longer accepting frames");
        }
    }

    /// A NEW request that matched nothing establishes a call.
    async fn new_inbound_connection(&self, frame: Frame) {
        let host = frame.remote.addr.ip().to_string();
        let username = self
            .registrations
            .username_for_host(&host)
            .unwrap_or_default();
        let ies = frame.as_full().map(|full| full.ies.clone()).unwrap_or_default();
        let remote_party = RemoteParty::build_url(
            &host,
            &username,
            ies.calling_number.as_deref().unwrap_or(""),
            "",
            "",
        );
        let calling_name = ies.calling_name.clone().unwrap_or_default();
        info!(token = %frame.token, remote_party = %remote_party, "incoming call");

        // Our own number for the call; the peer's is the frame's source.
        let local_view = Remote::new(
            self.allocator.next(),
            frame.remote.source_call_number,
            frame.remote.addr,
        );
        let connection = Connection::new(
            Arc::new(Call::new()),
            frame.token.clone(),
            CallDirection::Incoming,
            local_view,
            remote_party.clone(),
            calling_name,
        );
        if let Err(e) = self.registry.insert_new(connection.clone()) {
            // Nothing escapes: the frame and the half-built connection
            // both end here.
            warn!(token = %frame.token, error = %e, "could not create inbound connection");
            return;
        }
        let _ = self.events.try_send(EndpointEvent::IncomingCall {
            token: frame.token.clone(),
            remote_party,
            calling_name: ies.calling_name,
        });
        self.hooks.on_incoming_call(&connection).await;
        self.deliver(&connection, frame);
    }
}
