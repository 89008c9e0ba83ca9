//! Per-endpoint counters.

use parking_lot::Mutex;

/// Lowest call number the allocator hands out. Zero is reserved: a zero
/// destination marks a frame as addressed to no call.
pub const FIRST_CALL_NUMBER: u16 = 1;

/// Highest usable call number; 32767 is reserved on the wire.
pub const LAST_CALL_NUMBER: u16 = 32766;

/// Source call numbers for calls this endpoint allocates.
///
/// Returns the current value and advances, wrapping back to
/// [`FIRST_CALL_NUMBER`] past the top. Reuse after a full wrap is not
/// checked against calls still in flight; with 32766 values the window
/// for aliasing is accepted.
#[derive(Debug)]
pub struct CallNumberAllocator {
    next: Mutex<u16>,
}

impl CallNumberAllocator {
    pub fn new() -> Self {
        Self::starting_at(FIRST_CALL_NUMBER)
    }

    /// Start from a specific value, clamped into the usable range.
    /// Endpoints normally seed this randomly so numbers from a previous
    /// process do not line up with a new one.
    pub fn starting_at(start: u16) -> Self {
        Self {
            next: Mutex::new(start.clamp(FIRST_CALL_NUMBER, LAST_CALL_NUMBER)),
        }
    }

    pub fn next(&self) -> u16 {
        let mut next = self.next.lock();
        let number = *next;
        *next += 1;
        if *next > LAST_CALL_NUMBER {
            *next = FIRST_CALL_NUMBER;
        }
        number
    }
}

impl Default for CallNumberAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Out-sequence numbers for status-query exchanges.
///
/// Status queries belong to no call, so they cannot use any connection's
/// sequence space; this endpoint-wide counter covers them. Values run
/// 1..=240 and wrap.
#[derive(Debug)]
pub struct StatusQuerySequence {
    next: Mutex<u8>,
}

const LAST_STATUS_SEQUENCE: u8 = 240;

impl StatusQuerySequence {
    pub fn new() -> Self {
        Self { next: Mutex::new(1) }
    }

    pub fn next(&self) -> u8 {
        let mut next = self.next.lock();
        if *next > LAST_STATUS_SEQUENCE {
            *next = 1;
        }
        let number = *next;
        *next += 1;
        number
    }
}

impl Default for StatusQuerySequence {
    fn default() -> Self {
        Self::new()
    }
}
