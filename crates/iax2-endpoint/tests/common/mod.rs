//! Shared helpers for endpoint integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use riax_iax2_endpoint::prelude::*;

pub const PEER: &str = "192.0.2.7:4569";

pub fn peer_addr() -> SocketAddr {
    PEER.parse().unwrap()
}

/// Endpoint with deterministic call numbers and all default collaborators.
pub async fn fixed_endpoint() -> (Arc<Iax2Endpoint>, mpsc::Receiver<EndpointEvent>) {
    Iax2Endpoint::builder()
        .config(EndpointConfig::new().with_fixed_call_numbers())
        .build()
        .await
        .expect("endpoint build")
}

/// Protocol-type full frame with its token derived the way a receiver
/// would derive it: from the peer's address and source call number.
pub fn full_frame(
    addr: SocketAddr,
    source: u16,
    dest: u16,
    subclass: ProtocolSubclass,
) -> Frame {
    Frame::full(
        ConnectionToken::from_remote(addr, source),
        Remote::new(source, dest, addr),
        FullFrame::protocol(subclass),
    )
}

/// Voice-type full frame, for traffic that is not a protocol command.
pub fn voice_frame(addr: SocketAddr, source: u16, dest: u16, timestamp: u32) -> Frame {
    let full = FullFrame {
        frame_type: FullFrameType::Voice,
        subclass: 0x02,
        timestamp,
        out_seq: 0,
        in_seq: 0,
        ies: IeData::default(),
        payload: Bytes::from_static(b"\x00\x01"),
    };
    Frame::full(
        ConnectionToken::from_remote(addr, source),
        Remote::new(source, dest, addr),
        full,
    )
}

pub fn mini_frame(addr: SocketAddr, source: u16, timestamp: u16) -> Frame {
    Frame::mini(
        ConnectionToken::from_remote(addr, source),
        Remote::new(source, 0, addr),
        MiniFrame {
            timestamp,
            payload: Bytes::new(),
        },
    )
}

/// Call-establishing NEW request carrying caller identification.
pub fn new_request(addr: SocketAddr, source: u16, calling_number: &str, calling_name: &str) -> Frame {
    let ies = IeData {
        calling_number: (!calling_number.is_empty()).then(|| calling_number.to_string()),
        calling_name: (!calling_name.is_empty()).then(|| calling_name.to_string()),
        ..IeData::default()
    };
    Frame::full(
        ConnectionToken::from_remote(addr, source),
        Remote::new(source, 0, addr),
        FullFrame::protocol(ProtocolSubclass::New).with_ies(ies),
    )
}

pub async fn next_event(events: &mut mpsc::Receiver<EndpointEvent>) -> EndpointEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for endpoint event")
        .expect("event channel closed")
}

pub async fn next_frame(inbound: &mut mpsc::UnboundedReceiver<Frame>) -> Frame {
    tokio::time::timeout(Duration::from_secs(2), inbound.recv())
        .await
        .expect("timed out waiting for frame delivery")
        .expect("inbound channel closed")
}

pub async fn next_request(requests: &mut mpsc::UnboundedReceiver<TransmitRequest>) -> TransmitRequest {
    tokio::time::timeout(Duration::from_secs(2), requests.recv())
        .await
        .expect("timed out waiting for transmit request")
        .expect("transmit channel closed")
}

/// Registration exchange that records every network operation.
#[derive(Debug, Default)]
pub struct RecordingExchange {
    registers: Mutex<Vec<(String, String)>>,
    unregisters: Mutex<Vec<(String, String)>>,
}

impl RecordingExchange {
    pub fn registers(&self) -> Vec<(String, String)> {
        self.registers.lock().clone()
    }

    pub fn unregisters(&self) -> Vec<(String, String)> {
        self.unregisters.lock().clone()
    }
}

#[async_trait]
impl RegistrationExchange for RecordingExchange {
    async fn register(
        &self,
        host: &str,
        username: &str,
        _password: &str,
        _refresh: Duration,
    ) -> Result<()> {
        self.registers
            .lock()
            .push((host.to_string(), username.to_string()));
        Ok(())
    }

    async fn unregister(&self, host: &str, username: &str) -> Result<()> {
        self.unregisters
            .lock()
            .push((host.to_string(), username.to_string()));
        Ok(())
    }
}

/// Registration exchange whose registrar is permanently unreachable.
#[derive(Debug, Default)]
pub struct FailingExchange;

#[async_trait]
impl RegistrationExchange for FailingExchange {
    async fn register(
        &self,
        _host: &str,
        _username: &str,
        _password: &str,
        _refresh: Duration,
    ) -> Result<()> {
        Err(Error::transport("registrar unreachable"))
    }

    async fn unregister(&self, _host: &str, _username: &str) -> Result<()> {
        Err(Error::transport("registrar unreachable"))
    }
}

/// Session hooks that record which connections they were handed.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    set_up: Mutex<Vec<ConnectionToken>>,
    incoming: Mutex<Vec<ConnectionToken>>,
}

impl RecordingHooks {
    pub fn set_up_tokens(&self) -> Vec<ConnectionToken> {
        self.set_up.lock().clone()
    }

    pub fn incoming_tokens(&self) -> Vec<ConnectionToken> {
        self.incoming.lock().clone()
    }
}

#[async_trait]
impl SessionHooks for RecordingHooks {
    async fn set_up_connection(&self, connection: &Arc<Connection>) -> Result<()> {
        self.set_up.lock().push(connection.token().clone());
        Ok(())
    }

    async fn on_incoming_call(&self, connection: &Arc<Connection>) {
        self.incoming.lock().push(connection.token().clone());
    }
}

/// Minimal datagram layout for loopback tests: one subclass byte, then
/// big-endian source and destination call numbers.
#[derive(Debug, Default)]
pub struct TestCodec;

impl FrameCodec for TestCodec {
    fn decode(&self, datagram: &[u8], peer: SocketAddr) -> Result<Frame> {
        if datagram.len() < 5 {
            return Err(Error::codec("short datagram"));
        }
        let subclass = ProtocolSubclass::from_raw(datagram[0])
            .ok_or_else(|| Error::codec("unknown subclass"))?;
        let source = u16::from_be_bytes([datagram[1], datagram[2]]);
        let dest = u16::from_be_bytes([datagram[3], datagram[4]]);
        Ok(full_frame(peer, source, dest, subclass))
    }

    fn encode(&self, frame: &Frame) -> Result<Bytes> {
        let full = frame
            .as_full()
            .ok_or_else(|| Error::codec("mini frames not supported"))?;
        let mut out = vec![full.subclass];
        out.extend_from_slice(&frame.remote.source_call_number.to_be_bytes());
        out.extend_from_slice(&frame.remote.dest_call_number.to_be_bytes());
        Ok(Bytes::from(out))
    }
}
