//! Adler-32 checksum (RFC 1950).
//!
//! Used twice per framed message: over the 128-byte header with its checksum
//! field zeroed, and over the body. The empty-input checksum is 1, which is
//! also the value a header carries when no body is attached.

/// Largest prime smaller than 2^16.
const MOD_ADLER: u32 = 65521;

/// Largest n such that `255 * n * (n + 1) / 2 + (n + 1) * (MOD_ADLER - 1)`
/// fits in a u32. Deferring the modulo to every NMAX bytes keeps the inner
/// loop divisions-free.
const NMAX: usize = 5552;

/// Streaming Adler-32 state.
///
/// `Adler32::default()` starts at the RFC initial value (a = 1, b = 0);
/// feed bytes with [`Adler32::update`] and read the digest with
/// [`Adler32::finalize`].
#[derive(Debug, Clone, Copy)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Default for Adler32 {
    fn default() -> Self {
        Self { a: 1, b: 0 }
    }
}

impl Adler32 {
    /// Create a fresh checksum state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb `data` into the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        for chunk in data.chunks(NMAX) {
            for &byte in chunk {
                self.a += u32::from(byte);
                self.b += self.a;
            }
            self.a %= MOD_ADLER;
            self.b %= MOD_ADLER;
        }
    }

    /// Current digest: `b * 65536 + a`.
    #[must_use]
    pub fn finalize(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

/// One-shot Adler-32 over `data`.
#[must_use]
pub fn adler32(data: &[u8]) -> u32 {
    let mut state = Adler32::new();
    state.update(data);
    state.finalize()
}
