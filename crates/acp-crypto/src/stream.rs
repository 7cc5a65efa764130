//! Session stream encryption.
//!
//! After a successful SRP exchange both sides derive two AES-128-CTR
//! keystreams from the shared key K, one per direction. The key derivation
//! is PBKDF2-HMAC-SHA1 with fixed salts and deliberately small, asymmetric
//! iteration counts (5 client, 7 server) so the directions can never collide
//! even for identical IVs. The IVs are the 16-byte nonces exchanged during
//! the handshake: the client-generated one for client-to-server traffic, the
//! server-returned one for the reverse path.
//!
//! Counters advance monotonically for the life of the session and are never
//! reset; every byte on the socket after installation passes through exactly
//! one keystream position. Losing alignment is unrecoverable by design.

use aes::Aes128;
use ctr::{
    Ctr128BE,
    cipher::{KeyIvInit, StreamCipher},
};
use sha1::Sha1;
use zeroize::Zeroizing;

/// Derived key length (AES-128).
pub const SESSION_KEY_SIZE: usize = 16;

/// Nonce length exchanged during authentication.
pub const IV_SIZE: usize = 16;

/// PBKDF2 salt for the client-to-server key.
pub const CLIENT_KEY_SALT: [u8; 16] = [
    0xF0, 0x72, 0xFA, 0x3F, 0x66, 0xB4, 0x10, 0xA1, 0x35, 0xFA, 0xE8, 0xE6, 0xD1, 0xD4, 0x3D, 0x5F,
];

/// PBKDF2 salt for the server-to-client key.
pub const SERVER_KEY_SALT: [u8; 16] = [
    0xBD, 0x06, 0x82, 0xC9, 0xFE, 0x79, 0x32, 0x5B, 0xC7, 0x36, 0x55, 0xF4, 0x17, 0x4B, 0x99, 0x6C,
];

/// PBKDF2 iteration count for the client-to-server key.
pub const CLIENT_KEY_ROUNDS: u32 = 5;

/// PBKDF2 iteration count for the server-to-client key.
pub const SERVER_KEY_ROUNDS: u32 = 7;

type Aes128Ctr = Ctr128BE<Aes128>;

fn derive_key(shared_key: &[u8], salt: &[u8], rounds: u32) -> Zeroizing<[u8; SESSION_KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; SESSION_KEY_SIZE]);
    pbkdf2::pbkdf2_hmac::<Sha1>(shared_key, salt, rounds, &mut *key);
    key
}

/// One direction of the session cipher.
pub struct CipherHalf {
    cipher: Aes128Ctr,
}

impl CipherHalf {
    fn new(key: &[u8; SESSION_KEY_SIZE], iv: &[u8; IV_SIZE]) -> Self {
        Self { cipher: Aes128Ctr::new(key.into(), iv.into()) }
    }

    /// Apply the keystream in place, advancing the counter.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
    }
}

/// Both directions of a session, keyed from the SRP shared key.
pub struct EncryptionContext {
    outbound: CipherHalf,
    inbound: CipherHalf,
}

impl EncryptionContext {
    /// Context for the client role: encrypt with the client key, decrypt
    /// with the server key.
    #[must_use]
    pub fn client(shared_key: &[u8], client_iv: &[u8; IV_SIZE], server_iv: &[u8; IV_SIZE]) -> Self {
        let client_key = derive_key(shared_key, &CLIENT_KEY_SALT, CLIENT_KEY_ROUNDS);
        let server_key = derive_key(shared_key, &SERVER_KEY_SALT, SERVER_KEY_ROUNDS);
        Self {
            outbound: CipherHalf::new(&client_key, client_iv),
            inbound: CipherHalf::new(&server_key, server_iv),
        }
    }

    /// Context for the server role (test doubles and the monitor data path):
    /// the same keys with the directions swapped.
    #[must_use]
    pub fn server(shared_key: &[u8], client_iv: &[u8; IV_SIZE], server_iv: &[u8; IV_SIZE]) -> Self {
        let client_key = derive_key(shared_key, &CLIENT_KEY_SALT, CLIENT_KEY_ROUNDS);
        let server_key = derive_key(shared_key, &SERVER_KEY_SALT, SERVER_KEY_ROUNDS);
        Self {
            outbound: CipherHalf::new(&server_key, server_iv),
            inbound: CipherHalf::new(&client_key, client_iv),
        }
    }

    /// Encrypt outbound bytes in place.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        self.outbound.apply(buf);
    }

    /// Decrypt inbound bytes in place.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        self.inbound.apply(buf);
    }

    /// Split into independent halves so a transport can keep them behind
    /// separate locks.
    #[must_use]
    pub fn split(self) -> (CipherHalf, CipherHalf) {
        (self.outbound, self.inbound)
    }
}
