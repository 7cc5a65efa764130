//! Deterministic obfuscation keystream.
//!
//! The AirPort firmware masks two things with the same byte generator: the
//! 32-byte key field of every message header, and the leading structural
//! bytes of every CFL binary property list blob. The generator is an
//! RC4-style PRG whose starting state is a fixed 256-entry permutation
//! extracted from the vendor implementation; every consumer restarts it from
//! that table, so the stream is identical for each message and each blob.
//!
//! This is obfuscation, not encryption: the stream carries no secret.

/// Size of the header key field masked by the stream.
pub const HEADER_KEY_SIZE: usize = 32;

/// Fixed starting permutation for the byte generator.
static STATIC_TABLE: [u8; 256] = [
    0xc4, 0xa1, 0x9d, 0x12, 0x26, 0x7d, 0x04, 0x1c, 0x10, 0x6c, 0x7b, 0x73, 0xf1, 0x33, 0x93, 0xb0,
    0x66, 0x30, 0xa6, 0xab, 0x16, 0x43, 0xd5, 0x31, 0x27, 0x2e, 0x70, 0xbc, 0xf7, 0xeb, 0x81, 0xa4,
    0x65, 0xfd, 0x4b, 0x7f, 0x8e, 0x5c, 0x4e, 0x40, 0xb3, 0xe8, 0x21, 0x51, 0x3b, 0xe1, 0x95, 0x64,
    0xb6, 0x9c, 0xb4, 0x7c, 0x11, 0x29, 0x72, 0xe6, 0x1e, 0xea, 0x5a, 0xd8, 0x14, 0x2a, 0xb5, 0x15,
    0xc0, 0xe3, 0xd1, 0x91, 0x50, 0xd6, 0x28, 0xfe, 0x7e, 0x9a, 0xf6, 0x89, 0x2c, 0x7a, 0x6b, 0x0e,
    0xf4, 0xb8, 0x6e, 0x45, 0xa2, 0xbd, 0x6d, 0x19, 0xa5, 0xe2, 0xcb, 0x3c, 0x71, 0x02, 0x96, 0x1f,
    0xa9, 0x06, 0x38, 0x36, 0x58, 0xc9, 0x9b, 0xe5, 0x48, 0x5d, 0x67, 0xd7, 0x86, 0xd2, 0x18, 0x47,
    0x1d, 0xcc, 0xaf, 0x35, 0x5e, 0x0f, 0x52, 0xd0, 0xed, 0xd4, 0xf8, 0x1a, 0x25, 0x79, 0x59, 0x88,
    0x61, 0x5f, 0xce, 0x53, 0x0d, 0xee, 0x76, 0xb1, 0xf0, 0x44, 0x74, 0x46, 0xde, 0x80, 0xf2, 0x84,
    0x56, 0xaa, 0xe4, 0x90, 0xc1, 0x42, 0xe7, 0x4f, 0x00, 0xae, 0xca, 0x63, 0x94, 0x4d, 0x0b, 0xec,
    0x8f, 0xfa, 0xda, 0x1b, 0x85, 0x82, 0xba, 0xad, 0x75, 0x03, 0x2d, 0xe0, 0x9f, 0xfc, 0x78, 0x37,
    0x98, 0x39, 0x07, 0xc7, 0xcf, 0x05, 0xc5, 0xc8, 0xdf, 0x3f, 0xe9, 0x9e, 0x08, 0xd9, 0xa7, 0x23,
    0x41, 0x32, 0xf5, 0x69, 0x3a, 0x0a, 0xb7, 0x8c, 0x54, 0xdb, 0x99, 0xf3, 0x6a, 0x62, 0x97, 0x2f,
    0x24, 0x0c, 0x2b, 0x34, 0x55, 0xbf, 0x77, 0xa3, 0x09, 0x17, 0xff, 0xb9, 0xa0, 0xc6, 0xc3, 0x8a,
    0xac, 0x5b, 0xb2, 0xdd, 0x22, 0x57, 0xef, 0x87, 0x3e, 0x4c, 0xbe, 0x8d, 0xfb, 0x20, 0xdc, 0x13,
    0x68, 0x83, 0x92, 0xcd, 0x60, 0xc2, 0x3d, 0xf9, 0x8b, 0xbb, 0x4a, 0x01, 0xd3, 0xa8, 0x49, 0x6f,
];

/// Resettable byte generator over [`STATIC_TABLE`].
///
/// Two indices walk the table; each output byte performs one swap-and-pick
/// state update. Instances are cheap: the table is copied on construction so
/// the static seed is never mutated.
#[derive(Clone)]
pub struct Keystream {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Default for Keystream {
    fn default() -> Self {
        Self::new()
    }
}

impl Keystream {
    /// Start a fresh stream from the fixed permutation.
    #[must_use]
    pub fn new() -> Self {
        Self { state: STATIC_TABLE, i: 0, j: 0 }
    }

    /// Produce the next stream byte.
    pub fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[usize::from(self.i)]);
        self.state.swap(usize::from(self.i), usize::from(self.j));
        let idx = self.state[usize::from(self.i)].wrapping_add(self.state[usize::from(self.j)]);
        self.state[usize::from(idx)]
    }

    /// Fill `out` with successive stream bytes.
    pub fn fill(&mut self, out: &mut [u8]) {
        for byte in out {
            *byte = self.next_byte();
        }
    }
}

/// First `n` bytes of a fresh stream.
#[must_use]
pub fn keystream(n: usize) -> Vec<u8> {
    let mut ks = Keystream::new();
    let mut out = vec![0u8; n];
    ks.fill(&mut out);
    out
}

/// Derive the obfuscated 32-byte header key for `password`.
///
/// The password is XORed byte-wise against the head of a fresh stream,
/// right-padded with NUL to 32 bytes. Passwords longer than 32 bytes are
/// silently truncated; this mirrors the device behaviour and is part of the
/// wire contract, so no length validation happens here.
#[must_use]
pub fn generate_header_key(password: &str) -> [u8; HEADER_KEY_SIZE] {
    let mut key = [0u8; HEADER_KEY_SIZE];
    let mut ks = Keystream::new();
    ks.fill(&mut key);
    for (slot, byte) in key.iter_mut().zip(password.bytes()) {
        *slot ^= byte;
    }
    key
}
