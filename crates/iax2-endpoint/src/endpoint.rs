//! Endpoint composition and lifecycle.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use riax_iax2_wire::{ConnectionToken, Frame, Remote, RemoteParty, DEFAULT_PORT};

use crate::allocator::{CallNumberAllocator, StatusQuerySequence};
use crate::config::EndpointConfig;
use crate::connection::{Call, CallDirection, Connection, UserData};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::events::EndpointEvent;
use crate::queue::FrameQueue;
use crate::registration::RegistrationManager;
use crate::registry::ConnectionRegistry;
use crate::status::{StatusProcessor, StatusQueryHandler};
use crate::traits::{
    ChannelTransmitter, FrameCodec, FrameTransmitter, NoopRegistrationExchange, NoopSessionHooks,
    RegistrationExchange, SessionHooks, TransmitRequest,
};
use crate::translation::TokenTranslationTable;

/// One IAX2 endpoint: frame routing, connection lifecycle, registrations.
///
/// Constructed through [`Iax2EndpointBuilder`]. All state is owned here
/// rather than in globals, so several endpoints can coexist in one
/// process. Dropping the endpoint without calling [`shutdown`] leaves its
/// tasks running until the runtime itself stops.
///
/// [`shutdown`]: Iax2Endpoint::shutdown
pub struct Iax2Endpoint {
    config: EndpointConfig,
    queue: Arc<FrameQueue>,
    registry: Arc<ConnectionRegistry>,
    translations: Arc<TokenTranslationTable>,
    allocator: Arc<CallNumberAllocator>,
    status_sequence: Arc<StatusQuerySequence>,
    registrations: Arc<RegistrationManager>,
    transmitter: Arc<dyn FrameTransmitter>,
    status: Arc<dyn StatusQueryHandler>,
    hooks: Arc<dyn SessionHooks>,
    events: mpsc::Sender<EndpointEvent>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    receiver_task: Mutex<Option<JoinHandle<()>>>,
    receiver_stop: watch::Sender<bool>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    outbound_requests: Mutex<Option<mpsc::UnboundedReceiver<TransmitRequest>>>,
    outgoing_calls: AtomicU64,
    terminated: AtomicBool,
}

impl Iax2Endpoint {
    pub fn builder() -> Iax2EndpointBuilder {
        Iax2EndpointBuilder::new()
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Address of the endpoint's own socket, when it has one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket
            .lock()
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
    }

    /// Take ownership of a decoded frame from the embedding receiver.
    ///
    /// Never blocks: the frame is queued and the dispatch task woken.
    /// Frames arriving after shutdown are dropped.
    pub fn on_frame_arrived(&self, frame: Frame) {
        let token = frame.token.clone();
        if !self.queue.push(frame) {
            debug!(token = %token, "frame arrived after shutdown; dropped");
        }
    }

    /// Start an outbound call to `destination`, written as
    /// `[iax2:][user@][transport$]host[/extension[+context]]`.
    ///
    /// On success the connection is registered and returned; for the
    /// call's initiating party, call setup has already been driven on
    /// this task. On failure no state is left behind.
    pub async fn make_connection(
        &self,
        call: Arc<Call>,
        destination: &str,
        user_data: Option<UserData>,
    ) -> Result<Arc<Connection>> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(Error::Terminated);
        }
        info!(%destination, "making outbound connection");

        let party = RemoteParty::parse(destination);
        let Some(addr) = resolve_host(&party.host).await else {
            warn!(host = %party.host, "destination did not resolve");
            return Err(Error::UnresolvedDestination { host: party.host });
        };

        let sequence = self.outgoing_calls.fetch_add(1, Ordering::AcqRel) + 1;
        let token = ConnectionToken::for_outgoing(addr.ip(), sequence);
        // The peer's call number is unknown until its first reply.
        let remote = Remote::new(self.allocator.next(), 0, addr);
        let remote_party_name = destination.strip_prefix("iax2:").unwrap_or(destination);

        let connection = Connection::new(
            call,
            token.clone(),
            CallDirection::Outgoing,
            remote,
            party.to_url(),
            remote_party_name,
        );
        if let Some(data) = user_data {
            connection.set_user_data(data);
        }
        if let Some((username, password)) = self.registrations.credentials_for_host(&party.host) {
            debug!(token = %token, username = %username, "borrowing registration credentials");
            connection.set_credentials(username, password);
        }

        if let Err(e) = self.registry.insert_new(connection.clone()) {
            // The call keeps no party for a connection that never
            // registered.
            connection.call().remove_party(&token);
            return Err(e);
        }
        let _ = self.events.try_send(EndpointEvent::ConnectionRegistered {
            token: token.clone(),
        });

        // Only the initiating party sets up synchronously; a second leg
        // of the same call is driven from the first leg's context.
        if connection.is_initiating_party() {
            debug!(token = %token, "driving call setup");
            if let Err(e) = self.hooks.set_up_connection(&connection).await {
                warn!(token = %token, error = %e, "call setup failed");
            }
        }
        Ok(connection)
    }

    /// Create a registration relationship with `host` and start
    /// refreshing it every `refresh_secs` seconds. Duplicates are
    /// permitted; each call adds an independent relationship.
    pub fn register(
        &self,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        refresh_secs: u32,
    ) {
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        self.registrations.register(
            host,
            username,
            password,
            Duration::from_secs(u64::from(refresh_secs)),
        );
    }

    /// Remove the first registration relationship matching the pair and
    /// send its final unregister. Unknown pairs are ignored.
    pub async fn unregister(&self, host: &str, username: &str) {
        self.registrations.unregister(host, username).await;
    }

    pub fn is_registered(&self, host: &str, username: &str) -> bool {
        self.registrations.is_registered(host, username)
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.count()
    }

    /// Allocate the next source call number.
    pub fn next_call_number(&self) -> u16 {
        self.allocator.next()
    }

    /// Allocate the next out-sequence number for a status-query exchange.
    pub fn next_status_query_number(&self) -> u8 {
        self.status_sequence.next()
    }

    pub fn active_connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn connection_tokens(&self) -> Vec<ConnectionToken> {
        self.registry.tokens()
    }

    pub fn find_connection(&self, token: &ConnectionToken) -> Option<Arc<Connection>> {
        self.registry.get(token)
    }

    /// Whether a frame carrying `token` would still reach a live
    /// connection, directly or through a translation entry. The transmit
    /// engine consults this to decide if retransmission is worthwhile.
    pub fn is_connection_alive(&self, token: &ConnectionToken) -> bool {
        if self.registry.contains(token) {
            return true;
        }
        match self.translations.translate(token) {
            Some(canonical) => self.registry.contains(&canonical),
            None => false,
        }
    }

    /// Drop a connection from the registry once its call has ended.
    /// Translation entries pointing at it go stale and are ignored by
    /// later lookups; they are never cleaned eagerly.
    pub fn remove_connection(&self, token: &ConnectionToken) -> Option<Arc<Connection>> {
        let removed = self.registry.remove(token);
        if removed.is_some() {
            let _ = self.events.try_send(EndpointEvent::ConnectionRemoved {
                token: token.clone(),
            });
        }
        removed
    }

    pub fn translation_count(&self) -> usize {
        self.translations.len()
    }

    /// Trace-dump the connection registry and the translation table.
    pub fn report_stored_connections(&self) {
        self.registry.report();
        self.translations.report();
    }

    /// Requests the default transmitter has captured. `None` when a
    /// custom transmitter was installed, and after the first take.
    pub fn take_outbound_requests(&self) -> Option<mpsc::UnboundedReceiver<TransmitRequest>> {
        self.outbound_requests.lock().take()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Tear the endpoint down. Idempotent; the order is load-bearing:
    ///
    /// 1. registrations drain, sending their final unregisters while the
    ///    transmitter still works;
    /// 2. the dispatch task stops and queued frames are discarded;
    /// 3. the transmitter terminates, then the receiver;
    /// 4. the status handler terminates;
    /// 5. the socket is released.
    pub async fn shutdown(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("endpoint shutting down");

        self.registrations.shutdown().await;

        self.queue.terminate();
        let dispatch = self.dispatch_task.lock().take();
        if let Some(task) = dispatch {
            let _ = task.await;
        }

        self.transmitter.terminate().await;
        let _ = self.receiver_stop.send(true);
        let receiver = self.receiver_task.lock().take();
        if let Some(task) = receiver {
            let _ = task.await;
        }

        self.status.terminate().await;

        *self.socket.lock() = None;

        let _ = self.events.try_send(EndpointEvent::ShutdownComplete);
        info!("endpoint shutdown complete");
    }
}

/// Resolve a host from the address grammar, defaulting the IAX2 port.
async fn resolve_host(host: &str) -> Option<SocketAddr> {
    if host.is_empty() {
        return None;
    }
    let target = if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, DEFAULT_PORT)
    };
    match tokio::net::lookup_host(target).await {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            debug!(host, error = %e, "lookup failed");
            None
        }
    }
}

/// Builder for [`Iax2Endpoint`].
///
/// ```no_run
/// use riax_iax2_endpoint::config::EndpointConfig;
/// use riax_iax2_endpoint::endpoint::Iax2Endpoint;
///
/// # async fn build() -> riax_iax2_endpoint::error::Result<()> {
/// let (endpoint, mut events) = Iax2Endpoint::builder()
///     .config(EndpointConfig::new().with_local_user_name("alice"))
///     .build()
///     .await?;
/// # let _ = (endpoint, events);
/// # Ok(())
/// # }
/// ```
pub struct Iax2EndpointBuilder {
    config: EndpointConfig,
    transmitter: Option<Arc<dyn FrameTransmitter>>,
    codec: Option<Arc<dyn FrameCodec>>,
    exchange: Option<Arc<dyn RegistrationExchange>>,
    hooks: Option<Arc<dyn SessionHooks>>,
    status: Option<Arc<dyn StatusQueryHandler>>,
}

impl Iax2EndpointBuilder {
    pub fn new() -> Self {
        Self {
            config: EndpointConfig::default(),
            transmitter: None,
            codec: None,
            exchange: None,
            hooks: None,
            status: None,
        }
    }

    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the transmit engine. Without one, a [`ChannelTransmitter`]
    /// is used and its request stream is available from
    /// [`Iax2Endpoint::take_outbound_requests`].
    pub fn transmitter(mut self, transmitter: Arc<dyn FrameTransmitter>) -> Self {
        self.transmitter = Some(transmitter);
        self
    }

    /// Install the datagram codec. Required when the endpoint binds its
    /// own socket.
    pub fn codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn registration_exchange(mut self, exchange: Arc<dyn RegistrationExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn session_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn status_handler(mut self, status: Arc<dyn StatusQueryHandler>) -> Self {
        self.status = Some(status);
        self
    }

    /// Assemble the endpoint and start its tasks.
    ///
    /// Returns the endpoint and its event stream. Binding the socket (if
    /// configured) happens here, so address-in-use surfaces immediately.
    pub async fn build(self) -> Result<(Arc<Iax2Endpoint>, mpsc::Receiver<EndpointEvent>)> {
        if self.config.bind_addr.is_some() && self.codec.is_none() {
            return Err(Error::config("binding a socket requires a frame codec"));
        }

        let (events_tx, events_rx) = mpsc::channel(self.config.event_capacity.max(1));

        let mut outbound_requests = None;
        let transmitter: Arc<dyn FrameTransmitter> = match self.transmitter {
            Some(transmitter) => transmitter,
            None => {
                let (transmitter, requests) = ChannelTransmitter::new();
                outbound_requests = Some(requests);
                transmitter
            }
        };
        let exchange = self
            .exchange
            .unwrap_or_else(|| Arc::new(NoopRegistrationExchange));
        let hooks = self.hooks.unwrap_or_else(|| Arc::new(NoopSessionHooks));

        let allocator = Arc::new(if self.config.randomize_call_numbers {
            CallNumberAllocator::starting_at(rand::thread_rng().gen_range(1..32000))
        } else {
            CallNumberAllocator::new()
        });
        let status_sequence = Arc::new(StatusQuerySequence::new());
        let status: Arc<dyn StatusQueryHandler> = match self.status {
            Some(status) => status,
            None => StatusProcessor::spawn(transmitter.clone(), status_sequence.clone()),
        };

        let queue = Arc::new(FrameQueue::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let translations = Arc::new(TokenTranslationTable::new());
        let registrations = Arc::new(RegistrationManager::new(exchange, events_tx.clone()));

        // Bind before spawning anything so a bad address fails cleanly.
        let socket = match self.config.bind_addr {
            Some(addr) => {
                let socket = UdpSocket::bind(addr)
                    .await
                    .map_err(|e| Error::transport(format!("bind {} failed: {}", addr, e)))?;
                info!(addr = %addr, "endpoint socket bound");
                Some(Arc::new(socket))
            }
            None => None,
        };

        let dispatcher = Dispatcher {
            queue: queue.clone(),
            registry: registry.clone(),
            translations: translations.clone(),
            registrations: registrations.clone(),
            allocator: allocator.clone(),
            transmitter: transmitter.clone(),
            status: status.clone(),
            hooks: hooks.clone(),
            events: events_tx.clone(),
        };
        let dispatch_task = tokio::spawn(dispatcher.run());

        let (receiver_stop, stop_rx) = watch::channel(false);
        let receiver_task = match (&socket, &self.codec) {
            (Some(socket), Some(codec)) => Some(tokio::spawn(receive_loop(
                socket.clone(),
                codec.clone(),
                queue.clone(),
                stop_rx,
            ))),
            _ => None,
        };

        let endpoint = Arc::new(Iax2Endpoint {
            config: self.config,
            queue,
            registry,
            translations,
            allocator,
            status_sequence,
            registrations,
            transmitter,
            status,
            hooks,
            events: events_tx,
            dispatch_task: Mutex::new(Some(dispatch_task)),
            receiver_task: Mutex::new(receiver_task),
            receiver_stop,
            socket: Mutex::new(socket),
            outbound_requests: Mutex::new(outbound_requests),
            outgoing_calls: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
        });
        Ok((endpoint, events_rx))
    }
}

impl Default for Iax2EndpointBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Socket read loop: decode datagrams and queue the frames. Undecodable
/// datagrams are logged and skipped; receive errors do not stop the loop.
async fn receive_loop(
    socket: Arc<UdpSocket>,
    codec: Arc<dyn FrameCodec>,
    queue: Arc<FrameQueue>,
    mut stop: watch::Receiver<bool>,
) {
    debug!("receive loop started");
    let mut buf = vec![0u8; 65535];
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, peer)) => match codec.decode(&buf[..len], peer) {
                    Ok(frame) => {
                        if !queue.push(frame) {
                            break;
                        }
                    }
                    Err(e) => warn!(peer = %peer, error = %e, "undecodable datagram"),
                },
                Err(e) => error!(error = %e, "socket receive failed"),
            },
        }
    }
    debug!("receive loop stopped");
}
