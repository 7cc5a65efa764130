//! SRP-6a client, specialised to the AirPort deployment.
//!
//! Fixed parameters: the RFC 5054 1536-bit group with generator 2, SHA-1 as
//! the hash, identity `"admin"`, and a 24-byte client private key. The peer
//! sends the group back during the handshake; callers must check it against
//! the pinned constants with [`is_expected_group`] before trusting it.
//!
//! All random material is caller-supplied so the exchange is deterministic
//! under test.
//!
//! ```text
//! client                         base station
//!   │  {state 1, username}  ──────────►  │
//!   │  ◄──────  {salt, B, modulus, g}    │
//!   │  {state 3, A, M1, iv}  ──────────► │
//!   │  ◄──────  {M2, iv}                 │
//!   ▼  verify M2, derive session keys    ▼
//! ```

use num_bigint::BigUint;
use sha1::{Digest, Sha1};
use thiserror::Error;
use zeroize::Zeroize;

/// Byte length of the group modulus (1536 bits).
pub const MODULUS_SIZE: usize = 192;

/// Byte length of the client private key.
pub const PRIVATE_KEY_SIZE: usize = 24;

/// Byte length of SHA-1 proofs and the shared key.
pub const PROOF_SIZE: usize = 20;

/// The username every base station expects.
pub const USERNAME: &str = "admin";

/// RFC 5054 Appendix A, 1536-bit group prime.
pub const MODULUS: [u8; MODULUS_SIZE] = [
    0x9D, 0xEF, 0x3C, 0xAF, 0xB9, 0x39, 0x27, 0x7A, 0xB1, 0xF1, 0x2A, 0x86,
    0x17, 0xA4, 0x7B, 0xBB, 0xDB, 0xA5, 0x1D, 0xF4, 0x99, 0xAC, 0x4C, 0x80,
    0xBE, 0xEE, 0xA9, 0x61, 0x4B, 0x19, 0xCC, 0x4D, 0x5F, 0x4F, 0x5F, 0x55,
    0x6E, 0x27, 0xCB, 0xDE, 0x51, 0xC6, 0xA9, 0x4B, 0xE4, 0x60, 0x7A, 0x29,
    0x15, 0x58, 0x90, 0x3B, 0xA0, 0xD0, 0xF8, 0x43, 0x80, 0xB6, 0x55, 0xBB,
    0x9A, 0x22, 0xE8, 0xDC, 0xDF, 0x02, 0x8A, 0x7C, 0xEC, 0x67, 0xF0, 0xD0,
    0x81, 0x34, 0xB1, 0xC8, 0xB9, 0x79, 0x89, 0x14, 0x9B, 0x60, 0x9E, 0x0B,
    0xE3, 0xBA, 0xB6, 0x3D, 0x47, 0x54, 0x83, 0x81, 0xDB, 0xC5, 0xB1, 0xFC,
    0x76, 0x4E, 0x3F, 0x4B, 0x53, 0xDD, 0x9D, 0xA1, 0x15, 0x8B, 0xFD, 0x3E,
    0x2B, 0x9C, 0x8C, 0xF5, 0x6E, 0xDF, 0x01, 0x95, 0x39, 0x34, 0x96, 0x27,
    0xDB, 0x2F, 0xD5, 0x3D, 0x24, 0xB7, 0xC4, 0x86, 0x65, 0x77, 0x2E, 0x43,
    0x7D, 0x6C, 0x7F, 0x8C, 0xE4, 0x42, 0x73, 0x4A, 0xF7, 0xCC, 0xB7, 0xAE,
    0x83, 0x7C, 0x26, 0x4A, 0xE3, 0xA9, 0xBE, 0xB8, 0x7F, 0x8A, 0x2F, 0xE9,
    0xB8, 0xB5, 0x29, 0x2E, 0x5A, 0x02, 0x1F, 0xFF, 0x5E, 0x91, 0x47, 0x9E,
    0x8C, 0xE7, 0xA2, 0x8C, 0x24, 0x42, 0xC6, 0xF3, 0x15, 0x18, 0x0F, 0x93,
    0x49, 0x9A, 0x23, 0x4D, 0xCF, 0x76, 0xE3, 0xFE, 0xD1, 0x35, 0xF9, 0xBB,
];

/// Group generator.
pub const GENERATOR: u8 = 2;

/// SRP failures. A proof mismatch means a wrong password; it is not a
/// connection-fatal condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SrpError {
    /// Server public key was congruent to zero, which would leak the session
    #[error("server public key is zero modulo n")]
    ZeroServerKey,

    /// Server proof did not match the expected M2
    #[error("server proof (m2) mismatch")]
    ProofMismatch,
}

fn hash(parts: &[&[u8]]) -> [u8; PROOF_SIZE] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Left-pad a group element to the modulus width.
fn pad(value: &BigUint) -> [u8; MODULUS_SIZE] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; MODULUS_SIZE];
    out[MODULUS_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}

fn modulus() -> BigUint {
    BigUint::from_bytes_be(&MODULUS)
}

fn generator() -> BigUint {
    BigUint::from(GENERATOR)
}

/// Whether the peer-announced group matches the pinned constants.
#[must_use]
pub fn is_expected_group(modulus_bytes: &[u8], generator_bytes: &[u8]) -> bool {
    BigUint::from_bytes_be(modulus_bytes) == modulus()
        && BigUint::from_bytes_be(generator_bytes) == generator()
}

/// Client half of the exchange: holds the private key and credentials until
/// the server challenge arrives.
pub struct SrpClient {
    username: String,
    password: String,
    private: BigUint,
    public: BigUint,
}

impl SrpClient {
    /// Create a client from credentials and a caller-supplied private key.
    #[must_use]
    pub fn new(username: &str, password: &str, secret: &[u8; PRIVATE_KEY_SIZE]) -> Self {
        let private = BigUint::from_bytes_be(secret);
        let public = generator().modpow(&private, &modulus());
        Self {
            username: username.to_owned(),
            password: password.to_owned(),
            private,
            public,
        }
    }

    /// A = g^a mod N, padded to the modulus width.
    #[must_use]
    pub fn public_key(&self) -> [u8; MODULUS_SIZE] {
        pad(&self.public)
    }

    /// Consume the server challenge and produce the client proof.
    ///
    /// # Errors
    ///
    /// [`SrpError::ZeroServerKey`] when B mod N == 0 (SRP-6a safety check).
    pub fn process_challenge(
        &self,
        salt: &[u8],
        server_public: &[u8],
    ) -> Result<SrpVerifier, SrpError> {
        let n = modulus();
        let g = generator();
        let b = BigUint::from_bytes_be(server_public) % &n;
        if b.bits() == 0 {
            return Err(SrpError::ZeroServerKey);
        }

        // k = H(N | PAD(g)), u = H(PAD(A) | PAD(B))
        let k = BigUint::from_bytes_be(&hash(&[&MODULUS, &pad(&g)]));
        let u = BigUint::from_bytes_be(&hash(&[&pad(&self.public), &pad(&b)]));

        // x = H(s | H(I ":" P))
        let identity = hash(&[self.username.as_bytes(), b":", self.password.as_bytes()]);
        let x = BigUint::from_bytes_be(&hash(&[salt, &identity]));

        // S = (B - k * g^x) ^ (a + u * x) mod N
        let gx = g.modpow(&x, &n);
        let base = (&b + &n - (k * gx) % &n) % &n;
        let exponent = &self.private + u * x;
        let secret = base.modpow(&exponent, &n);

        // K = H(PAD(S))
        let key = hash(&[&pad(&secret)]);

        // M1 = H((H(N) xor H(PAD(g))) | H(I) | s | PAD(A) | PAD(B) | K)
        let hn = hash(&[&MODULUS]);
        let hg = hash(&[&pad(&g)]);
        let mut group_digest = [0u8; PROOF_SIZE];
        for (slot, (a, b)) in group_digest.iter_mut().zip(hn.iter().zip(hg.iter())) {
            *slot = a ^ b;
        }
        let identity_digest = hash(&[self.username.as_bytes()]);
        let proof = hash(&[
            &group_digest,
            &identity_digest,
            salt,
            &pad(&self.public),
            &pad(&b),
            &key,
        ]);

        // M2 = H(PAD(A) | M1 | K)
        let expected_m2 = hash(&[&pad(&self.public), &proof, &key]);

        Ok(SrpVerifier { proof, expected_m2, key })
    }
}

impl Drop for SrpClient {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Result of processing the challenge: the client proof plus the material
/// needed to check the server's answer.
pub struct SrpVerifier {
    proof: [u8; PROOF_SIZE],
    expected_m2: [u8; PROOF_SIZE],
    key: [u8; PROOF_SIZE],
}

impl SrpVerifier {
    /// Client proof M1, sent in stage 3.
    #[must_use]
    pub fn proof(&self) -> &[u8; PROOF_SIZE] {
        &self.proof
    }

    /// Check the server proof and release the shared key K.
    ///
    /// # Errors
    ///
    /// [`SrpError::ProofMismatch`] on a wrong password (or a tampering
    /// server); the caller should keep the connection and may retry.
    pub fn verify_server(&self, m2: &[u8]) -> Result<[u8; PROOF_SIZE], SrpError> {
        if m2 == self.expected_m2.as_slice() {
            Ok(self.key)
        } else {
            Err(SrpError::ProofMismatch)
        }
    }
}

impl Drop for SrpVerifier {
    fn drop(&mut self) {
        self.key.zeroize();
        self.expected_m2.zeroize();
    }
}
