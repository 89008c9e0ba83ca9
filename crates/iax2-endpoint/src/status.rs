//! Stateless status-query handling.
//!
//! PING, POKE and LAGRQ probes address no call: they arrive with a zero
//! destination call number and are answered without creating any
//! connection state.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use riax_iax2_wire::{Frame, FullFrame, ProtocolSubclass, Remote};

use crate::allocator::StatusQuerySequence;
use crate::traits::FrameTransmitter;

/// Handles frames that belong to no call.
#[async_trait]
pub trait StatusQueryHandler: Send + Sync {
    /// Whether `frame` is a probe this handler wants.
    fn is_status_query(&self, frame: &Frame) -> bool;

    /// Take ownership of the probe and answer it.
    async fn handle(&self, frame: Frame);

    /// Stop the handler and wait for it to finish.
    async fn terminate(&self);
}

enum StatusCommand {
    Handle(Frame),
    Terminate,
}

/// Default status handler.
///
/// Answers PING and POKE with PONG and LAGRQ with LAGRP, echoing the
/// probe's timestamp so the peer can measure lag. Replies are sent from a
/// dedicated task; a slow transmitter never stalls the dispatch loop.
pub struct StatusProcessor {
    commands: mpsc::UnboundedSender<StatusCommand>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusProcessor {
    pub fn spawn(
        transmitter: Arc<dyn FrameTransmitter>,
        sequence: Arc<StatusQuerySequence>,
    ) -> Arc<Self> {
        let (commands, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            debug!("status processor started");
            while let Some(command) = rx.recv().await {
                match command {
                    StatusCommand::Handle(probe) => {
                        let Some(reply) = reply_for(&probe, &sequence) else {
                            debug!(token = %probe.token, "probe has no defined reply; dropped");
                            continue;
                        };
                        if let Err(e) = transmitter.send_frame(reply).await {
                            warn!(token = %probe.token, error = %e, "failed to answer status query");
                        }
                    }
                    StatusCommand::Terminate => break,
                }
            }
            debug!("status processor stopped");
        });
        Arc::new(Self {
            commands,
            task: Mutex::new(Some(task)),
        })
    }
}

/// Build the answer to a probe: PONG for PING and POKE, LAGRP for LAGRQ.
fn reply_for(probe: &Frame, sequence: &StatusQuerySequence) -> Option<Frame> {
    let full = probe.as_full()?;
    let answer = match full.protocol_subclass()? {
        ProtocolSubclass::Ping | ProtocolSubclass::Poke => ProtocolSubclass::Pong,
        ProtocolSubclass::LagRq => ProtocolSubclass::LagRp,
        _ => return None,
    };
    let mut reply = FullFrame::protocol(answer).with_timestamp(full.timestamp);
    reply.out_seq = sequence.next();
    // Addressed back at the prober's call number; we still have none.
    let remote = Remote::new(0, probe.remote.source_call_number, probe.remote.addr);
    Some(Frame::full(probe.token.clone(), remote, reply))
}

#[async_trait]
impl StatusQueryHandler for StatusProcessor {
    fn is_status_query(&self, frame: &Frame) -> bool {
        frame.is_status_query()
    }

    async fn handle(&self, frame: Frame) {
        let _ = self.commands.send(StatusCommand::Handle(frame));
    }

    async fn terminate(&self) {
        let _ = self.commands.send(StatusCommand::Terminate);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}
