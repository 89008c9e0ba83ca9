//! Decoded frame model.
//!
//! These are frames as handed across the receiver/engine boundary, after
//! datagram parsing and before any call-control interpretation. The
//! routing engine only ever reads the token, the call-number words and
//! the full-frame type/subclass; payloads pass through untouched and may
//! still be encrypted.

use bytes::Bytes;

use crate::{ConnectionToken, Remote};

/// The two wire encodings.
///
/// Full frames carry call-numbering, sequencing and type information and
/// are acknowledged; mini frames carry only a short timestamp and payload
/// for an already-established call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Full,
    Mini,
}

/// Full-frame type space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FullFrameType {
    Dtmf = 0x01,
    Voice = 0x02,
    Video = 0x03,
    Control = 0x04,
    Null = 0x05,
    Protocol = 0x06,
    Text = 0x07,
    Image = 0x08,
    Html = 0x09,
    Cng = 0x0a,
}

impl FullFrameType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Dtmf),
            0x02 => Some(Self::Voice),
            0x03 => Some(Self::Video),
            0x04 => Some(Self::Control),
            0x05 => Some(Self::Null),
            0x06 => Some(Self::Protocol),
            0x07 => Some(Self::Text),
            0x08 => Some(Self::Image),
            0x09 => Some(Self::Html),
            0x0a => Some(Self::Cng),
            _ => None,
        }
    }
}

/// Subclass commands of protocol-type full frames.
///
/// Routing branches on a handful of these (NEW, ACK and the status
/// queries); everything else is delivered to the owning connection
/// without interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolSubclass {
    New = 0x01,
    Ping = 0x02,
    Pong = 0x03,
    Ack = 0x04,
    Hangup = 0x05,
    Reject = 0x06,
    Accept = 0x07,
    AuthReq = 0x08,
    AuthRep = 0x09,
    Inval = 0x0a,
    LagRq = 0x0b,
    LagRp = 0x0c,
    RegReq = 0x0d,
    RegAuth = 0x0e,
    RegAck = 0x0f,
    RegRej = 0x10,
    RegRel = 0x11,
    VnaK = 0x12,
    Quelch = 0x1c,
    Unquelch = 0x1d,
    Poke = 0x1e,
}

impl ProtocolSubclass {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::New),
            0x02 => Some(Self::Ping),
            0x03 => Some(Self::Pong),
            0x04 => Some(Self::Ack),
            0x05 => Some(Self::Hangup),
            0x06 => Some(Self::Reject),
            0x07 => Some(Self::Accept),
            0x08 => Some(Self::AuthReq),
            0x09 => Some(Self::AuthRep),
            0x0a => Some(Self::Inval),
            0x0b => Some(Self::LagRq),
            0x0c => Some(Self::LagRp),
            0x0d => Some(Self::RegReq),
            0x0e => Some(Self::RegAuth),
            0x0f => Some(Self::RegAck),
            0x10 => Some(Self::RegRej),
            0x11 => Some(Self::RegRel),
            0x12 => Some(Self::VnaK),
            0x1c => Some(Self::Quelch),
            0x1d => Some(Self::Unquelch),
            0x1e => Some(Self::Poke),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }
}

/// Information elements the engine cares about, already decoded.
///
/// Populated by the codec for protocol frames. The routing engine reads
/// these to describe an incoming caller; it never writes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IeData {
    pub calling_name: Option<String>,
    pub calling_number: Option<String>,
    pub called_number: Option<String>,
    pub called_context: Option<String>,
    pub username: Option<String>,
}

/// A full frame after datagram decoding.
///
/// `subclass` stays raw because its namespace depends on `frame_type`:
/// for voice frames it names a codec, for protocol frames a command.
/// [`FullFrame::protocol_subclass`] gives the typed view when it applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullFrame {
    pub frame_type: FullFrameType,
    pub subclass: u8,
    pub timestamp: u32,
    pub out_seq: u8,
    pub in_seq: u8,
    pub ies: IeData,
    pub payload: Bytes,
}

impl FullFrame {
    /// A protocol-type frame carrying the given command.
    pub fn protocol(subclass: ProtocolSubclass) -> Self {
        Self {
            frame_type: FullFrameType::Protocol,
            subclass: subclass.as_raw(),
            timestamp: 0,
            out_seq: 0,
            in_seq: 0,
            ies: IeData::default(),
            payload: Bytes::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_ies(mut self, ies: IeData) -> Self {
        self.ies = ies;
        self
    }

    /// Typed subclass for protocol frames, `None` for every other type.
    pub fn protocol_subclass(&self) -> Option<ProtocolSubclass> {
        if self.frame_type == FullFrameType::Protocol {
            ProtocolSubclass::from_raw(self.subclass)
        } else {
            None
        }
    }
}

/// A mini frame: 16-bit timestamp and payload, nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiniFrame {
    pub timestamp: u16,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Full(FullFrame),
    Mini(MiniFrame),
}

/// One decoded frame, labelled for routing.
///
/// The token is derived by the receiver before the frame enters the
/// engine; see [`ConnectionToken::from_remote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub token: ConnectionToken,
    pub remote: Remote,
    pub body: FrameBody,
}

impl Frame {
    pub fn full(token: ConnectionToken, remote: Remote, body: FullFrame) -> Self {
        Self {
            token,
            remote,
            body: FrameBody::Full(body),
        }
    }

    pub fn mini(token: ConnectionToken, remote: Remote, body: MiniFrame) -> Self {
        Self {
            token,
            remote,
            body: FrameBody::Mini(body),
        }
    }

    #[inline]
    pub fn kind(&self) -> FrameKind {
        match self.body {
            FrameBody::Full(_) => FrameKind::Full,
            FrameBody::Mini(_) => FrameKind::Mini,
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.kind() == FrameKind::Full
    }

    pub fn as_full(&self) -> Option<&FullFrame> {
        match &self.body {
            FrameBody::Full(full) => Some(full),
            FrameBody::Mini(_) => None,
        }
    }

    pub fn as_mini(&self) -> Option<&MiniFrame> {
        match &self.body {
            FrameBody::Full(_) => None,
            FrameBody::Mini(mini) => Some(mini),
        }
    }

    fn is_protocol(&self, subclass: ProtocolSubclass) -> bool {
        self.as_full()
            .and_then(FullFrame::protocol_subclass)
            .map(|s| s == subclass)
            .unwrap_or(false)
    }

    /// Call-establishing NEW request.
    #[inline]
    pub fn is_new_request(&self) -> bool {
        self.is_protocol(ProtocolSubclass::New)
    }

    /// Acknowledgement of a previously sent full frame.
    #[inline]
    pub fn is_ack(&self) -> bool {
        self.is_protocol(ProtocolSubclass::Ack)
    }

    /// Liveness or lag probe addressed to no call.
    ///
    /// PING, POKE and LAGRQ arrive with a zero destination call number;
    /// they are answered statelessly and never create a connection. The
    /// zero never aliases a real call because call numbers are allocated
    /// starting at one.
    pub fn is_status_query(&self) -> bool {
        if self.remote.dest_call_number != 0 {
            return false;
        }
        self.is_protocol(ProtocolSubclass::Ping)
            || self.is_protocol(ProtocolSubclass::Poke)
            || self.is_protocol(ProtocolSubclass::LagRq)
    }
}
