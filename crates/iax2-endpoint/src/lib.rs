//! IAX2 endpoint engine for the riax stack.
//!
//! This crate owns the inbound half of an IAX2 endpoint: a FIFO ingest
//! queue drained by a single dispatch task, the connection registry and
//! its token translation accelerator, call-number allocation, stateless
//! status-query answering, and periodic registration relationships.
//! Datagram parsing, retransmission and the call-control state machine
//! live behind the traits in [`traits`].
//!
//! # Quick start
//!
//! ```no_run
//! use riax_iax2_endpoint::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> riax_iax2_endpoint::error::Result<()> {
//! let (endpoint, mut events) = Iax2Endpoint::builder()
//!     .config(EndpointConfig::new().with_local_user_name("alice"))
//!     .build()
//!     .await?;
//!
//! endpoint.register("pbx.example", "alice", "secret", 60);
//!
//! let call = Arc::new(Call::new());
//! let connection = endpoint
//!     .make_connection(call, "iax2:bob@pbx.example/100", None)
//!     .await?;
//! let mut inbound = connection.take_inbound().unwrap();
//! # let _ = (events, inbound);
//! # endpoint.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod logging;
pub mod queue;
pub mod registration;
pub mod registry;
pub mod status;
pub mod traits;
pub mod translation;

mod dispatch;

pub use allocator::{CallNumberAllocator, StatusQuerySequence, FIRST_CALL_NUMBER, LAST_CALL_NUMBER};
pub use config::{EndpointConfig, DEFAULT_PORT};
pub use connection::{Call, CallDirection, CallId, Connection, UserData};
pub use endpoint::{Iax2Endpoint, Iax2EndpointBuilder};
pub use error::{Error, Result};
pub use events::{EndpointEvent, RegistrationEvent};
pub use queue::FrameQueue;
pub use registration::{Registrant, RegistrationManager};
pub use registry::ConnectionRegistry;
pub use status::{StatusProcessor, StatusQueryHandler};
pub use traits::{
    ChannelTransmitter, FrameCodec, FrameTransmitter, NoopRegistrationExchange, NoopSessionHooks,
    RegistrationExchange, SessionHooks, TransmitRequest,
};
pub use translation::TokenTranslationTable;

/// The frame and address model this engine routes.
pub use riax_iax2_wire as wire;

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::config::EndpointConfig;
    pub use crate::connection::{Call, CallDirection, Connection};
    pub use crate::endpoint::{Iax2Endpoint, Iax2EndpointBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::events::{EndpointEvent, RegistrationEvent};
    pub use crate::traits::{
        FrameCodec, FrameTransmitter, RegistrationExchange, SessionHooks, TransmitRequest,
    };
    pub use riax_iax2_wire::prelude::*;
}
