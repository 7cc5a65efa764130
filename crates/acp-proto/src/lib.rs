//! Wire codecs for the AirPort control protocol (ACP).
//!
//! Everything in this crate is pure and synchronous: byte-level codecs with
//! no I/O, suitable for exercising against captured traffic. The transport
//! lives in `acp-client`; the SRP handshake and session ciphers live in
//! `acp-crypto`.
//!
//! Layering, leaves first:
//!
//! ```text
//! adler (checksums)   keystream (obfuscation)   catalogue (tag table)
//!        │                  │      │                   │
//!        │                  │      └──────────┐        │
//!        ▼                  ▼                 ▼        ▼
//!     message ◄──────── cflbinary          property ◄──┘
//! (128-byte frames)   (plist payloads)   (12-byte TLV)
//! ```

pub mod adler;
pub mod catalogue;
pub mod cflbinary;
pub mod errors;
pub mod keystream;
pub mod message;
pub mod property;

pub use adler::adler32;
pub use catalogue::{PropInfo, Validator, ValueKind};
pub use cflbinary::CflValue;
pub use errors::{CflError, FramingError, ValidationError};
pub use keystream::generate_header_key;
pub use message::{Command, HEADER_SIZE, Message};
pub use property::{ELEMENT_HEADER_SIZE, ElementHeader, PropName, Property, Value};
