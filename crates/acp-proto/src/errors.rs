//! Error types for the ACP wire codecs.
//!
//! Strongly-typed errors per codec layer: message framing, the CFL binary
//! property list, and catalogue-backed property validation. Codecs return
//! errors locally; the session layer decides what is fatal.

use thiserror::Error;

/// Result alias used throughout the codec modules.
pub type Result<T, E = FramingError> = std::result::Result<T, E>;

/// Errors raised while packing or parsing framed ACP messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Buffer shorter than the structure it should contain
    #[error("truncated frame: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Header does not start with the `"acpp"` magic
    #[error("bad header magic")]
    BadMagic,

    /// Protocol version outside the accepted set
    #[error("unknown protocol version {0:#010x}")]
    UnknownVersion(u32),

    /// Stored header checksum does not match the recomputed one
    #[error("header checksum mismatch: computed {computed:#010x}, stored {stored:#010x}")]
    HeaderChecksum {
        /// Adler-32 over the header with its checksum field zeroed
        computed: u32,
        /// Checksum carried in the header
        stored: u32,
    },

    /// Stored body checksum does not match the body bytes
    #[error("body checksum mismatch: computed {computed:#010x}, stored {stored:#010x}")]
    BodyChecksum {
        /// Adler-32 over the attached body
        computed: u32,
        /// Checksum carried in the header
        stored: u32,
    },

    /// Command code outside the accepted set
    #[error("unknown command {0:#04x}")]
    UnknownCommand(u32),

    /// Body length differs from the size declared in the header
    #[error("body size mismatch: header declares {declared}, got {actual} bytes")]
    BodySize {
        /// `body_size` field from the header
        declared: i32,
        /// Actual body length
        actual: usize,
    },

    /// A stream header (`body_size == -1`) arrived with body bytes attached
    #[error("stream header cannot carry a body")]
    StreamWithBody,

    /// Property list payload failed to parse
    #[error("property list: {0}")]
    Plist(#[from] CflError),
}

/// Errors raised by the CFL binary property list parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CflError {
    /// Input ended inside an object
    #[error("truncated plist: need {needed} more bytes")]
    Truncated {
        /// Additional bytes required to finish the current object
        needed: usize,
    },

    /// Object marker byte not in the supported dialect
    #[error("unknown object tag {0:#04x}")]
    UnknownTag(u8),

    /// Size-of-size prefix outside `0x10..=0x13`
    #[error("invalid size prefix {0:#04x}")]
    BadSizePrefix(u8),

    /// Declared size does not fit in memory-addressable range
    #[error("unreasonable declared size {0}")]
    BadSize(u64),

    /// Dictionary key was not a string object
    #[error("dictionary key is not a string")]
    NonStringKey,

    /// Collections nested past the parser's depth limit
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    /// ASCII string contained non-ASCII bytes
    #[error("invalid ascii string data")]
    InvalidAscii,

    /// UTF-16BE string contained unpaired surrogates
    #[error("invalid utf-16 string data")]
    InvalidUtf16,

    /// Bytes remained after the root object
    #[error("trailing bytes after root object: {remaining}")]
    TrailingData {
        /// Leftover byte count
        remaining: usize,
    },
}

/// Errors raised when constructing a [`crate::Property`] against the
/// catalogue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Tag absent from the property catalogue
    #[error("unknown property tag {0:?}")]
    UnknownTag(String),

    /// Tag not representable as four ASCII bytes
    #[error("property tag must be exactly four ascii bytes: {0:?}")]
    BadTag(String),

    /// Supplied value variant cannot encode this catalogue kind
    #[error("value for {tag} must be {expected}")]
    WrongKind {
        /// Property tag
        tag: String,
        /// Human description of the accepted variant(s)
        expected: &'static str,
    },

    /// Encoded value has the wrong length for the kind
    #[error("value for {tag} must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Property tag
        tag: String,
        /// Canonical length for the kind
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// Text form failed to parse for the kind (MAC, IP, UUID)
    #[error("cannot parse {text:?} as {kind} for {tag}")]
    BadText {
        /// Property tag
        tag: String,
        /// Kind name
        kind: &'static str,
        /// Offending text
        text: String,
    },

    /// Integer outside the range accepted by the kind or validator
    #[error("value {value} for {tag} outside accepted range [{lo}, {hi}]")]
    OutOfRange {
        /// Property tag
        tag: String,
        /// Offending value
        value: i64,
        /// Lower bound (inclusive)
        lo: i64,
        /// Upper bound (inclusive)
        hi: i64,
    },

    /// Integer not in the enumerated accepted set
    #[error("value {value} for {tag} not in the accepted set")]
    NotInSet {
        /// Property tag
        tag: String,
        /// Offending value
        value: i64,
    },

    /// Custom catalogue predicate rejected the encoded value
    #[error("value for {tag} rejected by validator")]
    Rejected {
        /// Property tag
        tag: String,
    },

    /// Property element shorter than its declared layout
    #[error("truncated property element: need {expected} bytes, have {actual}")]
    TruncatedElement {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },
}
