//! Framed ACP message codec.
//!
//! Every exchange with a base station is a 128-byte big-endian header,
//! optionally followed by a body. The header carries two Adler-32 checksums:
//! one over itself (computed with its own checksum field zeroed) and one over
//! the body (1 when no body is attached). The 32-byte key field holds the
//! keystream-obfuscated admin password.
//!
//! `body_size == -1` marks a stream frame: the header announces an
//! open-ended sequence of follow-up data (property element streams), so no
//! body may be attached to the frame itself.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    adler::adler32,
    errors::{FramingError, Result},
    keystream::{HEADER_KEY_SIZE, generate_header_key},
};

/// Serialized header size.
pub const HEADER_SIZE: usize = 128;

/// Header magic: `"acpp"`.
pub const MAGIC: [u8; 4] = *b"acpp";

/// Version written on every outbound frame.
pub const SEND_VERSION: u32 = 0x0003_0001;

/// Versions tolerated on inbound frames. Old firmware still speaks
/// 0x00000001; everything we send is 0x00030001.
const READ_VERSIONS: [u32; 2] = [0x0000_0001, SEND_VERSION];

/// Marker value of `body_size` for stream frames.
pub const STREAM_BODY_SIZE: i32 = -1;

/// Operation selector carried in the header.
///
/// `Reserved` covers command codes the device accepts but this client never
/// originates; they survive parsing so monitor traffic can be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe; the reply echoes the request body
    Echo,
    /// Write the primary firmware image
    FlashPrimary,
    /// Write the secondary firmware image
    FlashSecondary,
    /// Write the bootloader
    FlashBootloader,
    /// Read properties
    GetProp,
    /// Write properties
    SetProp,
    /// Trigger a device action
    Perform,
    /// Subscribe to unsolicited monitor data
    Monitor,
    /// Structured RPC
    Rpc,
    /// SRP authentication handshake
    Auth,
    /// Enumerate device features
    Feat,
    /// Accepted-but-unused command code (0x04, 0x17)
    Reserved(u32),
}

impl Command {
    /// Wire code for this command.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Echo => 0x01,
            Self::FlashPrimary => 0x03,
            Self::FlashSecondary => 0x05,
            Self::FlashBootloader => 0x06,
            Self::GetProp => 0x14,
            Self::SetProp => 0x15,
            Self::Perform => 0x16,
            Self::Monitor => 0x18,
            Self::Rpc => 0x19,
            Self::Auth => 0x1a,
            Self::Feat => 0x1b,
            Self::Reserved(code) => code,
        }
    }

    /// Command for a wire code. `None` outside the accepted set.
    #[must_use]
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x01 => Some(Self::Echo),
            0x03 => Some(Self::FlashPrimary),
            0x05 => Some(Self::FlashSecondary),
            0x06 => Some(Self::FlashBootloader),
            0x14 => Some(Self::GetProp),
            0x15 => Some(Self::SetProp),
            0x16 => Some(Self::Perform),
            0x18 => Some(Self::Monitor),
            0x19 => Some(Self::Rpc),
            0x1a => Some(Self::Auth),
            0x1b => Some(Self::Feat),
            0x04 | 0x17 => Some(Self::Reserved(code)),
            _ => None,
        }
    }
}

/// Raw 128-byte header layout (big-endian network byte order).
///
/// Fields are byte arrays to keep the struct alignment-free; zerocopy
/// verifies at compile time that casting untrusted bytes is sound (every bit
/// pattern is a valid header — semantic validation happens separately).
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct RawHeader {
    magic: [u8; 4],
    version: [u8; 4],
    header_checksum: [u8; 4],
    body_checksum: [u8; 4],
    body_size: [u8; 4],
    flags: [u8; 4],
    unused: [u8; 4],
    command: [u8; 4],
    error_code: [u8; 4],
    pad1: [u8; 12],
    key: [u8; 32],
    pad2: [u8; 48],
}

/// One request or response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Protocol version (writer fixed at [`SEND_VERSION`])
    pub version: u32,
    /// Command-specific flags
    pub flags: u32,
    /// Reserved field, zero on everything observed
    pub unused: u32,
    /// Operation selector
    pub command: Command,
    /// Device status; non-zero is a protocol-level error
    pub error_code: i32,
    /// Obfuscated password (see [`generate_header_key`])
    pub key: [u8; HEADER_KEY_SIZE],
    /// Declared body length; [`STREAM_BODY_SIZE`] for stream frames
    pub body_size: i32,
    /// Adler-32 of the body; 1 when no body
    pub body_checksum: u32,
    /// Attached body, absent for header-only and stream frames
    pub body: Option<Vec<u8>>,
}

impl Message {
    /// Build a frame for `command` with an optional body.
    ///
    /// The body checksum and size fields are derived here, so a constructed
    /// message always satisfies the header invariants. An empty body is
    /// normalised to no body (the two are indistinguishable on the wire).
    #[must_use]
    pub fn new(command: Command, flags: u32, password: &str, body: Option<Vec<u8>>) -> Self {
        let body = body.filter(|b| !b.is_empty());
        let (body_size, body_checksum) = match &body {
            Some(bytes) => (bytes.len() as i32, adler32(bytes)),
            None => (0, 1),
        };
        Self {
            version: SEND_VERSION,
            flags,
            unused: 0,
            command,
            error_code: 0,
            key: generate_header_key(password),
            body_size,
            body_checksum,
            body,
        }
    }

    /// Build a stream frame: `body_size == -1`, no attached body.
    #[must_use]
    pub fn stream(command: Command, flags: u32, password: &str) -> Self {
        let mut msg = Self::new(command, flags, password, None);
        msg.body_size = STREAM_BODY_SIZE;
        msg
    }

    /// Liveness probe carrying an arbitrary body.
    #[must_use]
    pub fn echo(password: &str, body: Vec<u8>) -> Self {
        Self::new(Command::Echo, 0, password, Some(body))
    }

    /// Property read request. `flags` is 4 on every observed firmware.
    #[must_use]
    pub fn get_prop(password: &str, body: Vec<u8>) -> Self {
        Self::new(Command::GetProp, 4, password, Some(body))
    }

    /// Property write request.
    #[must_use]
    pub fn set_prop(password: &str, body: Vec<u8>) -> Self {
        Self::new(Command::SetProp, 0, password, Some(body))
    }

    /// Authentication stage message.
    #[must_use]
    pub fn auth(password: &str, body: Vec<u8>) -> Self {
        Self::new(Command::Auth, 0, password, Some(body))
    }

    /// Feature enumeration request. Always uses the empty-password key.
    #[must_use]
    pub fn feat() -> Self {
        Self::new(Command::Feat, 0, "", None)
    }

    /// Primary firmware write carrying the image as body.
    #[must_use]
    pub fn flash_primary(password: &str, image: Vec<u8>) -> Self {
        Self::new(Command::FlashPrimary, 0, password, Some(image))
    }

    /// Secondary firmware write.
    #[must_use]
    pub fn flash_secondary(password: &str, image: Vec<u8>) -> Self {
        Self::new(Command::FlashSecondary, 0, password, Some(image))
    }

    /// Bootloader write.
    #[must_use]
    pub fn flash_bootloader(password: &str, image: Vec<u8>) -> Self {
        Self::new(Command::FlashBootloader, 0, password, Some(image))
    }

    /// Action trigger request.
    #[must_use]
    pub fn perform(password: &str, body: Vec<u8>) -> Self {
        Self::new(Command::Perform, 0, password, Some(body))
    }

    /// Structured RPC request carrying a CFL-encoded body.
    #[must_use]
    pub fn rpc(password: &str, body: Vec<u8>) -> Self {
        Self::new(Command::Rpc, 0, password, Some(body))
    }

    /// Monitor subscription request.
    #[must_use]
    pub fn monitor(password: &str, body: Vec<u8>) -> Self {
        Self::new(Command::Monitor, 0, password, Some(body))
    }

    /// Serialize the 128-byte header.
    ///
    /// Packs with a zeroed checksum field, computes Adler-32 over the whole
    /// header, then writes the digest back at offset 8.
    #[must_use]
    pub fn pack_header(&self) -> [u8; HEADER_SIZE] {
        let mut raw = RawHeader {
            magic: MAGIC,
            version: self.version.to_be_bytes(),
            header_checksum: [0; 4],
            body_checksum: self.body_checksum.to_be_bytes(),
            body_size: self.body_size.to_be_bytes(),
            flags: self.flags.to_be_bytes(),
            unused: self.unused.to_be_bytes(),
            command: self.command.to_u32().to_be_bytes(),
            error_code: self.error_code.to_be_bytes(),
            pad1: [0; 12],
            key: self.key,
            pad2: [0; 48],
        };
        let checksum = adler32(raw.as_bytes());
        raw.header_checksum = checksum.to_be_bytes();

        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(raw.as_bytes());
        out
    }

    /// Serialize the full frame: header plus any attached body.
    #[must_use]
    pub fn compose(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_SIZE + self.body.as_ref().map_or(0, Vec::len),
        );
        out.extend_from_slice(&self.pack_header());
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }
        out
    }

    /// Parse the leading 128 bytes as a header; body fields are carried over
    /// verbatim and no body is attached.
    ///
    /// # Errors
    ///
    /// [`FramingError`] on short input, bad magic, unknown version, header
    /// checksum mismatch, or unknown command. Tampering with any header byte
    /// trips one of those checks.
    pub fn parse_header(data: &[u8]) -> Result<Self> {
        let Ok((raw, _)) = RawHeader::ref_from_prefix(data) else {
            return Err(FramingError::Truncated { expected: HEADER_SIZE, actual: data.len() });
        };

        if raw.magic != MAGIC {
            return Err(FramingError::BadMagic);
        }

        let version = u32::from_be_bytes(raw.version);
        if !READ_VERSIONS.contains(&version) {
            return Err(FramingError::UnknownVersion(version));
        }

        let stored = u32::from_be_bytes(raw.header_checksum);
        let mut zeroed = *raw;
        zeroed.header_checksum = [0; 4];
        let computed = adler32(zeroed.as_bytes());
        if computed != stored {
            return Err(FramingError::HeaderChecksum { computed, stored });
        }

        let command_code = u32::from_be_bytes(raw.command);
        let Some(command) = Command::from_u32(command_code) else {
            return Err(FramingError::UnknownCommand(command_code));
        };

        Ok(Self {
            version,
            flags: u32::from_be_bytes(raw.flags),
            unused: u32::from_be_bytes(raw.unused),
            command,
            error_code: i32::from_be_bytes(raw.error_code),
            key: raw.key,
            body_size: i32::from_be_bytes(raw.body_size),
            body_checksum: u32::from_be_bytes(raw.body_checksum),
            body: None,
        })
    }

    /// Attach and verify a body read separately from the header.
    ///
    /// # Errors
    ///
    /// - [`FramingError::StreamWithBody`] on a stream header
    /// - [`FramingError::BodySize`] if the length disagrees with the header
    /// - [`FramingError::BodyChecksum`] if the Adler-32 disagrees
    pub fn attach_body(&mut self, body: Vec<u8>) -> Result<()> {
        if self.body_size == STREAM_BODY_SIZE {
            return Err(FramingError::StreamWithBody);
        }
        if body.len() != self.body_size as usize {
            return Err(FramingError::BodySize { declared: self.body_size, actual: body.len() });
        }
        let computed = adler32(&body);
        if computed != self.body_checksum {
            return Err(FramingError::BodyChecksum { computed, stored: self.body_checksum });
        }
        if !body.is_empty() {
            self.body = Some(body);
        }
        Ok(())
    }

    /// Parse a complete frame; all bytes past the header must be the body.
    ///
    /// # Errors
    ///
    /// Header errors per [`Message::parse_header`], plus body size and
    /// checksum mismatches, and [`FramingError::StreamWithBody`] when a
    /// stream header arrives with trailing bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut msg = Self::parse_header(data)?;
        let rest = &data[HEADER_SIZE..];
        if msg.body_size == STREAM_BODY_SIZE {
            if !rest.is_empty() {
                return Err(FramingError::StreamWithBody);
            }
            return Ok(msg);
        }
        msg.attach_body(rest.to_vec())?;
        Ok(msg)
    }

    /// Parse one frame from the front of `data` and return the tail beyond
    /// `128 + body_size`. Stream headers consume only the header.
    ///
    /// # Errors
    ///
    /// Header errors per [`Message::parse_header`], truncation if the buffer
    /// holds less than the declared body, and body checksum mismatches.
    pub fn parse_with_remaining(data: &[u8]) -> Result<(Self, &[u8])> {
        let mut msg = Self::parse_header(data)?;
        if msg.body_size == STREAM_BODY_SIZE {
            return Ok((msg, &data[HEADER_SIZE..]));
        }
        let body_len = msg.body_size as usize;
        let total = HEADER_SIZE + body_len;
        if data.len() < total {
            return Err(FramingError::Truncated { expected: total, actual: data.len() });
        }
        msg.attach_body(data[HEADER_SIZE..total].to_vec())?;
        Ok((msg, &data[total..]))
    }
}
