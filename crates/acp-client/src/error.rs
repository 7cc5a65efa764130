//! Error types for the ACP client.
//!
//! The taxonomy separates what went wrong structurally (framing), what the
//! peer reported (protocol and per-property codes), what the caller supplied
//! (validation), and what happened to the connection (transport). Codec
//! errors convert in via `#[from]`; `std::io::Error` is confined to the
//! transport boundary.

use std::time::Duration;

use acp_proto::{FramingError, PropName, ValidationError, message::Command};
use thiserror::Error;

/// Result alias for client operations.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Authentication failures. None of these terminate the connection; the
/// caller may retry with a different password.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A handshake stage arrived without an expected field
    #[error("unexpected auth stage data: missing {0}")]
    UnexpectedStage(&'static str),

    /// Peer announced group parameters other than the pinned 1536-bit group
    #[error("server group parameters do not match the expected modulus")]
    WrongModulus,

    /// Server public key failed the SRP-6a safety check
    #[error("server public key is zero modulo n")]
    BadServerKey,

    /// Server proof (M2) mismatch, i.e. wrong password
    #[error("server proof (m2) mismatch: wrong password")]
    ProofMismatch,
}

/// Connection-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Operation attempted on a session that was never connected or already
    /// closed
    #[error("not connected")]
    NotConnected,

    /// Peer went away; pending and queued work is failed with this
    #[error("connection lost")]
    ConnectionLost,

    /// `receive` could not produce the requested bytes in time
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying socket error, stringified at the I/O boundary
    #[error("socket error: {0}")]
    Socket(String),
}

/// Top-level error surface of the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Malformed frame, header, checksum, or payload
    #[error("framing: {0}")]
    Framing(#[from] FramingError),

    /// Peer answered a command with a non-zero error code
    #[error("device returned error {code} for {command:?}")]
    Protocol {
        /// Command the device was answering
        command: Command,
        /// Device error code
        code: i32,
    },

    /// Peer flagged a single property with an error code
    #[error("device returned error {code} for property {tag}")]
    Property {
        /// Property tag the error is bound to
        tag: PropName,
        /// Device error code
        code: i32,
    },

    /// Catalogue rejected a value at construction
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    /// SRP handshake failure
    #[error("auth: {0}")]
    Auth(#[from] AuthError),

    /// Connection-level failure
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// Encryption was already enabled for this session
    #[error("encryption context already installed")]
    EncryptionState,
}

impl ClientError {
    /// Whether this error ends the connection. Authentication and
    /// per-property failures leave the session usable.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::ConnectionLost | TransportError::Socket(_))
        )
    }
}
