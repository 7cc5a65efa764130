//! Async client for the AirPort control protocol (ACP).
//!
//! The stack, bottom up: `acp-proto` holds the pure codecs (framing,
//! property TLV, CFL binary plists), `acp-crypto` the SRP-6a handshake and
//! session ciphers, and this crate the transport. A [`Session`] owns one
//! TCP connection, serialises request/response exchanges through a fair
//! queue, and demultiplexes unsolicited monitor frames; [`Client`] layers
//! the documented device operations on top.
//!
//! ```no_run
//! use acp_client::Client;
//!
//! # async fn demo() -> Result<(), acp_client::ClientError> {
//! let mut client = Client::new("10.0.1.1", acp_client::DEFAULT_PORT, "admin-password");
//! client.connect().await?;
//! client.authenticate().await?;
//! let props = client.get_properties(&["syNm", "syAP"]).await?;
//! for prop in &props {
//!     tracing::info!(%prop, "device property");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod session;

pub use client::{Client, DEFAULT_PORT};
pub use error::{AuthError, ClientError, TransportError};
pub use session::{MonitorEvent, Session, SessionConfig, SessionHandle};
