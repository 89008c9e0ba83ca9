//! Inbound frame buffering between the receiver and the dispatch task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use riax_iax2_wire::Frame;

/// FIFO hand-off point for inbound frames.
///
/// The receiver pushes and never blocks; the single dispatch task drains.
/// Wakes are a coalescing signal, not a count: the worker empties the
/// whole queue on every wake, so several pushes collapsing into one wake
/// lose nothing.
#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
    wake: Notify,
    running: AtomicBool,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            running: AtomicBool::new(true),
        }
    }

    /// Append a frame and wake the dispatch task.
    ///
    /// Returns `false` when the queue has been terminated; the frame is
    /// dropped in that case.
    pub fn push(&self, frame: Frame) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.frames.lock().push_back(frame);
        self.wake.notify_one();
        true
    }

    /// Dequeue the oldest frame, if any. Only the dispatch task calls
    /// this.
    pub fn pop(&self) -> Option<Frame> {
        self.frames.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Cooperative stop: raise the flag, then wake the worker once more
    /// so it observes the flag even when no frames are queued. Frames
    /// still queued when the worker exits are discarded, never routed.
    pub fn terminate(&self) {
        self.running.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    /// Wait for the next wake. A permit stored before this call resolves
    /// it immediately, so a push racing the worker's re-arm is safe.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    /// Drop everything still queued, returning how many frames went.
    pub fn clear(&self) -> usize {
        let mut frames = self.frames.lock();
        let dropped = frames.len();
        frames.clear();
        dropped
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}
