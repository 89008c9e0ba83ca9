//! Error types for the endpoint engine.
//!
//! Most routing failures are absorbed after logging rather than surfaced:
//! a frame that matches nothing is dropped, an unregister for an unknown
//! pair is a no-op. The variants here cover the cases a caller can
//! actually act on.

use thiserror::Error;

/// Result alias used throughout the endpoint crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A NEW request arrived for a token that is already registered.
    #[error("duplicate NEW request for {token}")]
    DuplicateRequest { token: String },

    /// The destination host of an outbound call did not resolve.
    #[error("could not resolve destination host {host}")]
    UnresolvedDestination { host: String },

    /// A frame matched no connection, no translation, and no
    /// call-establishing or stateless handling.
    #[error("no route for frame {token}")]
    UnroutableFrame { token: String },

    /// A connection could not be added to the registry.
    #[error("connection creation failed for {token}")]
    ConnectionCreationFailure { token: String },

    /// No registration relationship exists for the given pair.
    #[error("no registration for {username}@{host}")]
    RegistrationNotFound { host: String, username: String },

    /// The endpoint has been shut down.
    #[error("endpoint is terminated")]
    Terminated,

    /// Transport-level send or receive failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Datagram could not be decoded or a frame could not be encoded.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Invalid endpoint configuration.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn duplicate_request(token: impl Into<String>) -> Self {
        Self::DuplicateRequest {
            token: token.into(),
        }
    }

    pub fn connection_creation_failure(token: impl Into<String>) -> Self {
        Self::ConnectionCreationFailure {
            token: token.into(),
        }
    }
}
