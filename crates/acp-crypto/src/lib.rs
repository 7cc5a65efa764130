//! Cryptographic primitives for the ACP client.
//!
//! Pure building blocks with deterministic outputs: the SRP-6a client math
//! specialised to the AirPort deployment, and the AES-128-CTR session
//! ciphers derived from its shared key. Callers provide all random bytes
//! (private keys, nonces) so every exchange can be replayed under test.
//!
//! # Key lifecycle
//!
//! ```text
//! password ──► SRP-6a exchange ──► shared key K (20 bytes)
//!                                        │
//!                    PBKDF2-HMAC-SHA1 ◄──┴──► PBKDF2-HMAC-SHA1
//!                    (salt0, 5 rounds)        (salt1, 7 rounds)
//!                           │                        │
//!                           ▼                        ▼
//!                  client→server key        server→client key
//!                     AES-128-CTR              AES-128-CTR
//! ```
//!
//! The two directions use distinct salts and iteration counts, so identical
//! nonces can never produce colliding keystreams. Key material is zeroized
//! on drop.

#![forbid(unsafe_code)]

pub mod srp;
pub mod stream;

pub use srp::{SrpClient, SrpError, SrpVerifier, is_expected_group};
pub use stream::{CipherHalf, EncryptionContext};
