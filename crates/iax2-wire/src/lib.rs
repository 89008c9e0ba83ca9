//! Frame, token and address model shared by the riax IAX2 stack.
//!
//! This crate defines the vocabulary the endpoint engine routes on:
//! decoded frames with their call-number words, the connection tokens
//! frames and connections are keyed by, and the remote-party address
//! grammar used for outbound calls. Byte-level parsing and encoding of
//! datagrams is deliberately out of scope; it lives behind the codec
//! seam in `riax-iax2-endpoint`.

mod address;
mod frame;
mod remote;
mod token;

pub use address::RemoteParty;
pub use frame::{
    Frame, FrameBody, FrameKind, FullFrame, FullFrameType, IeData, MiniFrame, ProtocolSubclass,
};
pub use remote::Remote;
pub use token::ConnectionToken;

/// Well-known UDP port for IAX2 signalling and media.
pub const DEFAULT_PORT: u16 = 4569;

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::{
        ConnectionToken, Frame, FrameBody, FrameKind, FullFrame, FullFrameType, IeData, MiniFrame,
        ProtocolSubclass, Remote, RemoteParty, DEFAULT_PORT,
    };
}
