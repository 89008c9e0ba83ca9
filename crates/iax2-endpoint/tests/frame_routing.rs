//! Integration tests for the frame resolution ladder.
//!
//! Covers direct token routing, translation-table population and reuse,
//! inbound NEW handling, stateless status replies, late-ACK purging and
//! the drop path for unroutable frames.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use common::*;
use riax_iax2_endpoint::prelude::*;

fn loopback_peer() -> SocketAddr {
    "127.0.0.1:4569".parse().unwrap()
}

/// An inbound NEW creates a connection; later frames with the same token
/// route directly and never touch the translation table.
#[tokio::test]
async fn registered_tokens_route_directly() {
    let (endpoint, mut events) = fixed_endpoint().await;
    let peer = peer_addr();

    endpoint.on_frame_arrived(new_request(peer, 301, "2345", "Bob"));
    let event = next_event(&mut events).await;
    let token = match event {
        EndpointEvent::IncomingCall { token, .. } => token,
        other => panic!("expected IncomingCall, got {:?}", other),
    };
    assert_eq!(token, ConnectionToken::from_remote(peer, 301));

    let connection = endpoint.find_connection(&token).expect("connection registered");
    let mut inbound = connection.take_inbound().expect("inbound stream");
    assert!(next_frame(&mut inbound).await.is_new_request());

    endpoint.on_frame_arrived(voice_frame(peer, 301, connection.remote().source_call_number, 10));
    let delivered = next_frame(&mut inbound).await;
    assert_eq!(delivered.as_full().unwrap().timestamp, 10);

    // Direct hits must not populate the accelerator.
    assert_eq!(endpoint.translation_count(), 0);
    assert_eq!(endpoint.active_connection_count(), 1);

    endpoint.shutdown().await;
}

/// A retransmitted NEW for a live token is dropped without disturbing
/// the existing connection.
#[tokio::test]
async fn duplicate_new_requests_are_dropped() {
    let (endpoint, mut events) = fixed_endpoint().await;
    let peer = peer_addr();

    endpoint.on_frame_arrived(new_request(peer, 301, "2345", ""));
    endpoint.on_frame_arrived(new_request(peer, 301, "2345", ""));
    endpoint.on_frame_arrived(voice_frame(peer, 301, 0, 42));

    let token = match next_event(&mut events).await {
        EndpointEvent::IncomingCall { token, .. } => token,
        other => panic!("expected IncomingCall, got {:?}", other),
    };
    let connection = endpoint.find_connection(&token).unwrap();
    let mut inbound = connection.take_inbound().unwrap();

    // FIFO guarantees the voice frame arrives only after the duplicate
    // NEW was processed (and dropped).
    assert!(next_frame(&mut inbound).await.is_new_request());
    let third = next_frame(&mut inbound).await;
    assert_eq!(third.as_full().unwrap().timestamp, 42);
    assert!(inbound.try_recv().is_err());

    assert_eq!(endpoint.active_connection_count(), 1);
    assert!(events.try_recv().is_err());

    endpoint.shutdown().await;
}

/// Duplicate suppression only shields live connections: once the call is
/// removed, a fresh NEW from the same peer establishes it again.
#[tokio::test]
async fn new_requests_reestablish_a_removed_call() {
    let (endpoint, mut events) = fixed_endpoint().await;
    let peer = peer_addr();

    endpoint.on_frame_arrived(new_request(peer, 301, "2345", ""));
    let token = match next_event(&mut events).await {
        EndpointEvent::IncomingCall { token, .. } => token,
        other => panic!("expected IncomingCall, got {:?}", other),
    };
    assert!(endpoint.remove_connection(&token).is_some());
    assert!(matches!(
        next_event(&mut events).await,
        EndpointEvent::ConnectionRemoved { .. }
    ));

    endpoint.on_frame_arrived(new_request(peer, 301, "2345", ""));
    assert!(matches!(
        next_event(&mut events).await,
        EndpointEvent::IncomingCall { .. }
    ));
    assert_eq!(endpoint.active_connection_count(), 1);

    endpoint.shutdown().await;
}

/// The first reply to an outbound call arrives under a token derived
/// from the peer's numbering. The call-number fallback finds the
/// connection, caches the pairing, and later frames reuse it.
#[tokio::test]
async fn replies_to_outbound_calls_learn_a_translation() {
    let (endpoint, _events) = fixed_endpoint().await;
    let peer = loopback_peer();

    let call = Arc::new(Call::new());
    let connection = endpoint
        .make_connection(call, "iax2:127.0.0.1", None)
        .await
        .expect("outbound connection");
    assert_eq!(connection.token().as_str(), "iax2:127.0.0.1:out:1");
    let our_number = connection.remote().source_call_number;
    let mut inbound = connection.take_inbound().unwrap();

    // Peer picked call number 77 and addresses our number.
    endpoint.on_frame_arrived(full_frame(peer, 77, our_number, ProtocolSubclass::Accept));
    let first = next_frame(&mut inbound).await;
    assert_eq!(
        first.as_full().unwrap().protocol_subclass(),
        Some(ProtocolSubclass::Accept)
    );
    assert_eq!(endpoint.translation_count(), 1);

    // Same observed token again: routed through the cached pairing, no
    // second entry.
    endpoint.on_frame_arrived(full_frame(peer, 77, our_number, ProtocolSubclass::AuthReq));
    let second = next_frame(&mut inbound).await;
    assert_eq!(
        second.as_full().unwrap().protocol_subclass(),
        Some(ProtocolSubclass::AuthReq)
    );
    assert_eq!(endpoint.translation_count(), 1);
    endpoint.report_stored_connections();

    // Liveness is visible under both the canonical and the learned token.
    let observed = ConnectionToken::from_remote(peer, 77);
    assert!(endpoint.is_connection_alive(connection.token()));
    assert!(endpoint.is_connection_alive(&observed));
    endpoint.remove_connection(connection.token());
    assert!(!endpoint.is_connection_alive(&observed));

    endpoint.shutdown().await;
}

/// Mini frames carry no destination call number; once the translation
/// entry exists they still reach the connection, in arrival order.
#[tokio::test]
async fn bursts_are_delivered_in_arrival_order() {
    let (endpoint, _events) = fixed_endpoint().await;
    let peer = loopback_peer();

    let connection = endpoint
        .make_connection(Arc::new(Call::new()), "iax2:127.0.0.1", None)
        .await
        .unwrap();
    let our_number = connection.remote().source_call_number;
    let mut inbound = connection.take_inbound().unwrap();

    endpoint.on_frame_arrived(full_frame(peer, 77, our_number, ProtocolSubclass::Accept));
    endpoint.on_frame_arrived(mini_frame(peer, 77, 11));
    endpoint.on_frame_arrived(mini_frame(peer, 77, 12));

    assert!(next_frame(&mut inbound).await.is_full());
    let first_mini = next_frame(&mut inbound).await;
    assert_eq!(first_mini.as_mini().unwrap().timestamp, 11);
    let second_mini = next_frame(&mut inbound).await;
    assert_eq!(second_mini.as_mini().unwrap().timestamp, 12);

    endpoint.shutdown().await;
}

/// PING, POKE and LAGRQ addressed to no call are answered statelessly:
/// no connection is created and the reply echoes the probe timestamp.
#[tokio::test]
async fn status_queries_are_answered_without_state() {
    let (endpoint, _events) = fixed_endpoint().await;
    let mut requests = endpoint.take_outbound_requests().expect("default transmitter");
    let peer = peer_addr();

    let mut probe = full_frame(peer, 9, 0, ProtocolSubclass::Ping);
    if let FrameBody::Full(full) = &mut probe.body {
        full.timestamp = 777;
    }
    endpoint.on_frame_arrived(probe);

    match next_request(&mut requests).await {
        TransmitRequest::Send(reply) => {
            let full = reply.as_full().unwrap();
            assert_eq!(full.protocol_subclass(), Some(ProtocolSubclass::Pong));
            assert_eq!(full.timestamp, 777);
            assert_eq!(full.out_seq, 1);
            assert_eq!(reply.remote.dest_call_number, 9);
            assert_eq!(reply.remote.source_call_number, 0);
        }
        other => panic!("expected a reply, got {:?}", other),
    }

    endpoint.on_frame_arrived(full_frame(peer, 10, 0, ProtocolSubclass::LagRq));
    match next_request(&mut requests).await {
        TransmitRequest::Send(reply) => {
            assert_eq!(
                reply.as_full().unwrap().protocol_subclass(),
                Some(ProtocolSubclass::LagRp)
            );
            assert_eq!(reply.as_full().unwrap().out_seq, 2);
        }
        other => panic!("expected a reply, got {:?}", other),
    }

    endpoint.on_frame_arrived(full_frame(peer, 11, 0, ProtocolSubclass::Poke));
    match next_request(&mut requests).await {
        TransmitRequest::Send(reply) => {
            assert_eq!(
                reply.as_full().unwrap().protocol_subclass(),
                Some(ProtocolSubclass::Pong)
            );
        }
        other => panic!("expected a reply, got {:?}", other),
    }

    assert_eq!(endpoint.active_connection_count(), 0);
    endpoint.shutdown().await;
}

/// A probe whose destination names a live call belongs to that call, not
/// to the stateless answerer.
#[tokio::test]
async fn probes_addressed_to_a_call_route_to_its_connection() {
    let (endpoint, _events) = fixed_endpoint().await;
    let mut requests = endpoint.take_outbound_requests().unwrap();
    let peer = loopback_peer();

    let connection = endpoint
        .make_connection(Arc::new(Call::new()), "iax2:127.0.0.1", None)
        .await
        .unwrap();
    let our_number = connection.remote().source_call_number;
    let mut inbound = connection.take_inbound().unwrap();

    endpoint.on_frame_arrived(full_frame(peer, 77, our_number, ProtocolSubclass::Ping));
    let delivered = next_frame(&mut inbound).await;
    assert_eq!(
        delivered.as_full().unwrap().protocol_subclass(),
        Some(ProtocolSubclass::Ping)
    );
    // Dispatch has completed by the time the frame was delivered, so an
    // empty request stream proves the probe was not answered statelessly.
    assert!(requests.try_recv().is_err());

    endpoint.shutdown().await;
}

/// A late ACK that matches no live connection is offered to the
/// transmitter so it can purge retransmission state of a closed call.
#[tokio::test]
async fn late_acks_are_forwarded_for_purging() {
    let (endpoint, _events) = fixed_endpoint().await;
    let mut requests = endpoint.take_outbound_requests().unwrap();
    let peer = peer_addr();

    let ack = full_frame(peer, 8, 55, ProtocolSubclass::Ack);
    endpoint.on_frame_arrived(ack.clone());

    assert_eq!(
        next_request(&mut requests).await,
        TransmitRequest::PurgeAcks(ack)
    );
    assert_eq!(endpoint.active_connection_count(), 0);

    endpoint.shutdown().await;
}

/// Frames that match nothing and establish nothing disappear without
/// side effects, and routing keeps working afterwards.
#[tokio::test]
async fn unroutable_frames_are_dropped_silently() {
    let (endpoint, mut events) = fixed_endpoint().await;
    let peer = peer_addr();

    endpoint.on_frame_arrived(voice_frame(peer, 66, 999, 5));
    endpoint.on_frame_arrived(mini_frame(peer, 67, 6));
    endpoint.on_frame_arrived(new_request(peer, 301, "", ""));

    assert!(matches!(
        next_event(&mut events).await,
        EndpointEvent::IncomingCall { .. }
    ));
    assert_eq!(endpoint.active_connection_count(), 1);
    assert_eq!(endpoint.translation_count(), 0);

    endpoint.shutdown().await;
}
