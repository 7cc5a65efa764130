//! CFL binary property list codec.
//!
//! A CoreFoundation-lite dialect of the binary plist format used for
//! structured ACP payloads: authentication stages, feature listings, `cfb`
//! property values, and monitor events. It differs from the stock bplist in
//! two ways that matter here:
//!
//! - Collections carry no offset table; arrays and dictionaries are streamed
//!   and terminated by a zero byte where an object tag would otherwise sit.
//! - The leading run of structural bytes (object tags, size prefixes, size
//!   bytes, terminators) is XOR-masked with the obfuscation keystream. The
//!   mask ends permanently at the first content byte (integer/real payloads,
//!   string/data bytes); blobs with no content bytes are masked end to end.
//!   Parser and serializer walk the grammar in lockstep, so both sides agree
//!   on where the mask stops.
//!
//! Round-trip law: `parse(compose(v)) == v` for every supported tree. The
//! serializer always picks the minimal integer width and emits reals as f64,
//! so compose-then-parse is a normal form, not a byte-level fixpoint.

use crate::{
    errors::CflError,
    keystream::Keystream,
};

/// Nesting limit for parsed trees. Deep enough for any device payload;
/// bounds stack use on hostile input.
const MAX_DEPTH: usize = 512;

/// Object tags (high/low nibble combined, per the wire dialect).
mod tag {
    pub const NULL: u8 = 0x00;
    pub const FALSE: u8 = 0x08;
    pub const TRUE: u8 = 0x09;
    pub const INT: u8 = 0x10; // low nibble: log2 of the byte width
    pub const REAL32: u8 = 0x22;
    pub const REAL64: u8 = 0x23;
    pub const DATE: u8 = 0x33;
    pub const DATA: u8 = 0x4f;
    pub const STRING_ASCII: u8 = 0x5f;
    pub const STRING_UTF16: u8 = 0x6f;
    pub const ARRAY: u8 = 0xaf;
    pub const DICT: u8 = 0xdf;
    pub const TERMINATOR: u8 = 0x00;
}

/// One node of a CFL property list tree.
///
/// Dates are kept as raw seconds since 2001-01-01 UTC (the CoreFoundation
/// epoch); integers are widened to `i64` regardless of wire width.
#[derive(Debug, Clone, PartialEq)]
pub enum CflValue {
    /// Explicit null object
    Null,
    /// Boolean
    Bool(bool),
    /// Integer; 1/2/4-byte wire forms are unsigned, 8-byte two's complement
    Integer(i64),
    /// Floating point (f32 on the wire widens to f64)
    Real(f64),
    /// Seconds since the CoreFoundation epoch (2001-01-01 UTC)
    Date(f64),
    /// Opaque bytes
    Data(Vec<u8>),
    /// Text; serialized as ASCII when possible, UTF-16BE otherwise
    String(String),
    /// Ordered sequence
    Array(Vec<CflValue>),
    /// Ordered key/value pairs with string keys
    Dict(Vec<(String, CflValue)>),
}

impl CflValue {
    /// String value.
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Data value.
    pub fn data(d: impl Into<Vec<u8>>) -> Self {
        Self::Data(d.into())
    }

    /// Dictionary from `(key, value)` pairs, preserving order.
    #[must_use]
    pub fn dict(pairs: Vec<(&str, CflValue)>) -> Self {
        Self::Dict(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    /// Integer payload, if this is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Byte payload, if this is a data object.
    #[must_use]
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(d) => Some(d),
            _ => None,
        }
    }

    /// Key/value pairs, if this is a dictionary.
    #[must_use]
    pub fn as_dict(&self) -> Option<&[(String, CflValue)]> {
        match self {
            Self::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// First value stored under `key`, if this is a dictionary.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CflValue> {
        self.as_dict()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl From<bool> for CflValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for CflValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for CflValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<&str> for CflValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for CflValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for CflValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Data(v)
    }
}

/// Minimal big-endian encoding of an integer: `(log2 width, bytes)`.
///
/// Non-negative values take the narrowest of 1/2/4 bytes; values past 32
/// bits and all negative values take the full 8-byte two's complement form
/// so the sign bit is never ambiguous at a narrower width.
fn integer_parts(v: i64) -> (u8, Vec<u8>) {
    if v < 0 {
        (3, v.to_be_bytes().to_vec())
    } else if v <= i64::from(u8::MAX) {
        (0, vec![v as u8])
    } else if v <= i64::from(u16::MAX) {
        (1, (v as u16).to_be_bytes().to_vec())
    } else if v <= i64::from(u32::MAX) {
        (2, (v as u32).to_be_bytes().to_vec())
    } else {
        (3, v.to_be_bytes().to_vec())
    }
}

/// Serializer state: output buffer plus the keystream mask cursor.
struct MaskedWriter {
    out: Vec<u8>,
    ks: Keystream,
    masking: bool,
}

impl MaskedWriter {
    fn new() -> Self {
        Self { out: Vec::new(), ks: Keystream::new(), masking: true }
    }

    /// Emit a structural byte (tag, size prefix, size byte, terminator).
    fn structural(&mut self, byte: u8) {
        if self.masking {
            self.out.push(byte ^ self.ks.next_byte());
        } else {
            self.out.push(byte);
        }
    }

    fn structural_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.structural(byte);
        }
    }

    /// Emit content bytes; the mask ends here for the rest of the blob.
    fn content(&mut self, bytes: &[u8]) {
        self.masking = false;
        self.out.extend_from_slice(bytes);
    }

    /// Emit a size-of-size prefix followed by the size itself.
    fn size(&mut self, n: usize) {
        let (k, bytes) = integer_parts(n as i64);
        self.structural(tag::INT | k);
        self.structural_slice(&bytes);
    }
}

/// Parser state: input cursor plus the keystream mask cursor, kept in
/// lockstep with the serializer's.
struct MaskedReader<'a> {
    data: &'a [u8],
    pos: usize,
    ks: Keystream,
    masking: bool,
}

impl<'a> MaskedReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, ks: Keystream::new(), masking: true }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn structural(&mut self) -> Result<u8, CflError> {
        let Some(&byte) = self.data.get(self.pos) else {
            return Err(CflError::Truncated { needed: 1 });
        };
        self.pos += 1;
        Ok(if self.masking { byte ^ self.ks.next_byte() } else { byte })
    }

    fn content(&mut self, n: usize) -> Result<&'a [u8], CflError> {
        self.masking = false;
        if self.remaining() < n {
            return Err(CflError::Truncated { needed: n - self.remaining() });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a size-of-size prefix and the size it declares.
    fn size(&mut self) -> Result<usize, CflError> {
        let prefix = self.structural()?;
        let k = prefix & 0x0F;
        if prefix & 0xF0 != tag::INT || k > 3 {
            return Err(CflError::BadSizePrefix(prefix));
        }
        let width = 1usize << k;
        let mut value: u64 = 0;
        for _ in 0..width {
            value = (value << 8) | u64::from(self.structural()?);
        }
        // A declared size can never exceed what the buffer could still hold.
        if value > self.remaining() as u64 {
            return Err(CflError::Truncated { needed: (value - self.remaining() as u64) as usize });
        }
        Ok(value as usize)
    }
}

/// Serialize `value` into a masked CFL binary plist blob.
#[must_use]
pub fn compose(value: &CflValue) -> Vec<u8> {
    let mut writer = MaskedWriter::new();
    compose_object(&mut writer, value);
    writer.out
}

fn compose_object(w: &mut MaskedWriter, value: &CflValue) {
    match value {
        CflValue::Null => w.structural(tag::NULL),
        CflValue::Bool(false) => w.structural(tag::FALSE),
        CflValue::Bool(true) => w.structural(tag::TRUE),
        CflValue::Integer(v) => {
            let (k, bytes) = integer_parts(*v);
            w.structural(tag::INT | k);
            w.content(&bytes);
        },
        CflValue::Real(v) => {
            w.structural(tag::REAL64);
            w.content(&v.to_be_bytes());
        },
        CflValue::Date(seconds) => {
            w.structural(tag::DATE);
            w.content(&seconds.to_be_bytes());
        },
        CflValue::Data(bytes) => {
            w.structural(tag::DATA);
            w.size(bytes.len());
            w.content(bytes);
        },
        CflValue::String(s) => compose_string(w, s),
        CflValue::Array(items) => {
            w.structural(tag::ARRAY);
            for item in items {
                compose_object(w, item);
            }
            w.structural(tag::TERMINATOR);
        },
        CflValue::Dict(pairs) => {
            w.structural(tag::DICT);
            for (key, val) in pairs {
                compose_string(w, key);
                compose_object(w, val);
            }
            w.structural(tag::TERMINATOR);
        },
    }
}

fn compose_string(w: &mut MaskedWriter, s: &str) {
    if s.is_ascii() {
        w.structural(tag::STRING_ASCII);
        w.size(s.len());
        w.content(s.as_bytes());
    } else {
        let units: Vec<u16> = s.encode_utf16().collect();
        let mut bytes = Vec::with_capacity(units.len() * 2);
        for unit in &units {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        w.structural(tag::STRING_UTF16);
        w.size(units.len());
        w.content(&bytes);
    }
}

/// Parse a masked CFL binary plist blob into a tree.
///
/// # Errors
///
/// [`CflError`] on truncated input, unknown tags, malformed strings,
/// non-string dictionary keys, or trailing bytes after the root object.
pub fn parse(data: &[u8]) -> Result<CflValue, CflError> {
    let mut reader = MaskedReader::new(data);
    let value = parse_object(&mut reader, 0)?;
    if reader.remaining() > 0 {
        return Err(CflError::TrailingData { remaining: reader.remaining() });
    }
    Ok(value)
}

fn parse_object(r: &mut MaskedReader<'_>, depth: usize) -> Result<CflValue, CflError> {
    let tag = r.structural()?;
    parse_tagged(r, tag, depth)
}

fn parse_tagged(r: &mut MaskedReader<'_>, tag_byte: u8, depth: usize) -> Result<CflValue, CflError> {
    if depth > MAX_DEPTH {
        return Err(CflError::TooDeep(MAX_DEPTH));
    }
    match tag_byte {
        tag::NULL => Ok(CflValue::Null),
        tag::FALSE => Ok(CflValue::Bool(false)),
        tag::TRUE => Ok(CflValue::Bool(true)),
        0x10..=0x13 => {
            let width = 1usize << (tag_byte & 0x0F);
            let bytes = r.content(width)?;
            Ok(CflValue::Integer(parse_integer(bytes)))
        },
        tag::REAL32 => {
            let bytes = r.content(4)?;
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            Ok(CflValue::Real(f64::from(f32::from_be_bytes(buf))))
        },
        tag::REAL64 => {
            let bytes = r.content(8)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            Ok(CflValue::Real(f64::from_be_bytes(buf)))
        },
        tag::DATE => {
            let bytes = r.content(8)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            Ok(CflValue::Date(f64::from_be_bytes(buf)))
        },
        tag::DATA => {
            let len = r.size()?;
            Ok(CflValue::Data(r.content(len)?.to_vec()))
        },
        tag::STRING_ASCII => {
            let len = r.size()?;
            let bytes = r.content(len)?;
            if !bytes.is_ascii() {
                return Err(CflError::InvalidAscii);
            }
            // ASCII is valid UTF-8 by construction.
            Ok(CflValue::String(String::from_utf8_lossy(bytes).into_owned()))
        },
        tag::STRING_UTF16 => {
            let units = r.size()?;
            let Some(byte_len) = units.checked_mul(2) else {
                return Err(CflError::BadSize(units as u64));
            };
            let bytes = r.content(byte_len)?;
            let code_units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&code_units)
                .map(CflValue::String)
                .map_err(|_| CflError::InvalidUtf16)
        },
        tag::ARRAY => {
            let mut items = Vec::new();
            loop {
                let next = r.structural()?;
                if next == tag::TERMINATOR {
                    return Ok(CflValue::Array(items));
                }
                items.push(parse_tagged(r, next, depth + 1)?);
            }
        },
        tag::DICT => {
            let mut pairs = Vec::new();
            loop {
                let next = r.structural()?;
                if next == tag::TERMINATOR {
                    return Ok(CflValue::Dict(pairs));
                }
                let key = match parse_tagged(r, next, depth + 1)? {
                    CflValue::String(s) => s,
                    _ => return Err(CflError::NonStringKey),
                };
                let value = parse_object(r, depth + 1)?;
                pairs.push((key, value));
            }
        },
        other => Err(CflError::UnknownTag(other)),
    }
}

/// Decode an integer body at its wire width.
///
/// 1/2/4-byte forms are unsigned and always fit an i64; the 8-byte form is
/// two's complement.
fn parse_integer(bytes: &[u8]) -> i64 {
    if bytes.len() == 8 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        i64::from_be_bytes(buf)
    } else {
        let mut value: i64 = 0;
        for &byte in bytes {
            value = (value << 8) | i64::from(byte);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystream::keystream;

    fn roundtrip(value: CflValue) {
        let bytes = compose(&value);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed, value, "round trip through {bytes:02x?}");
    }

    #[test]
    fn integer_widths_are_minimal() {
        // Unmasked forms: tag 0x10|k then 2^k big-endian bytes.
        assert_eq!(compose(&CflValue::Integer(1)), [0x73, 0x01]);
        assert_eq!(compose(&CflValue::Integer(256)), [0x72, 0x01, 0x00]);
        assert_eq!(compose(&CflValue::Integer(65537)), [0x71, 0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn negative_integers_take_eight_bytes() {
        assert_eq!(
            compose(&CflValue::Integer(-5)),
            [0x70, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfb]
        );
        roundtrip(CflValue::Integer(-5));
        roundtrip(CflValue::Integer(i64::MIN));
        roundtrip(CflValue::Integer(i64::MAX));
    }

    #[test]
    fn scalar_singletons() {
        assert_eq!(compose(&CflValue::Null), [0x63]);
        assert_eq!(compose(&CflValue::Bool(true)), [0x6a]);
        assert_eq!(compose(&CflValue::Bool(false)), [0x08 ^ keystream(1)[0]]);
        roundtrip(CflValue::Null);
        roundtrip(CflValue::Bool(false));
        roundtrip(CflValue::Bool(true));
    }

    #[test]
    fn masking_covers_leading_structural_run() {
        let bytes = compose(&CflValue::dict(vec![("state", 1.into())]));
        assert_eq!(bytes, [0xbc, 0x31, 0x14, 0xe8, b's', b't', b'a', b't', b'e', 0x10, 0x01, 0x00]);

        // Unmasking the head recovers the plain structural bytes; everything
        // after the first content byte is already in the clear.
        let ks = keystream(4);
        assert_eq!(bytes[0] ^ ks[0], 0xdf); // dict tag
        assert_eq!(bytes[1] ^ ks[1], 0x5f); // ascii string tag
        assert_eq!(bytes[2] ^ ks[2], 0x10); // size-of-size prefix
        assert_eq!(bytes[3] ^ ks[3], 0x05); // key length
        assert_eq!(&bytes[4..9], b"state");
        assert_eq!(&bytes[9..], [0x10, 0x01, 0x00]); // int tag, value, terminator
    }

    #[test]
    fn empty_dict_is_fully_masked() {
        let bytes = compose(&CflValue::Dict(Vec::new()));
        assert_eq!(bytes, [0xbc, 0x6e]);
        assert_eq!(parse(&bytes).unwrap(), CflValue::Dict(Vec::new()));
    }

    #[test]
    fn strings_and_data() {
        assert_eq!(compose(&CflValue::string("hi")), [0x3c, 0x7e, 0x06, b'h', b'i']);
        assert_eq!(compose(&CflValue::data(b"ab".to_vec())), [0x2c, 0x7e, 0x06, b'a', b'b']);
        roundtrip(CflValue::string(""));
        roundtrip(CflValue::string("ascii only"));
        roundtrip(CflValue::string("héllo wörld"));
        roundtrip(CflValue::string("surrogate pair: \u{1F600}"));
        roundtrip(CflValue::data(vec![0u8; 300]));
    }

    #[test]
    fn reals_and_dates() {
        assert_eq!(
            compose(&CflValue::Real(1.5)),
            [0x40, 0x3f, 0xf8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            compose(&CflValue::Date(0.0)),
            [0x50, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        roundtrip(CflValue::Real(-2.25e10));
        roundtrip(CflValue::Date(778_410_000.5));
    }

    #[test]
    fn f32_on_the_wire_widens() {
        // 0x22-tagged real: 1.5f32. Leading tag masked with the stream head.
        let raw = [0x22 ^ keystream(1)[0], 0x3f, 0xc0, 0x00, 0x00];
        assert_eq!(parse(&raw).unwrap(), CflValue::Real(1.5));
    }

    #[test]
    fn arrays_terminate_without_counts() {
        assert_eq!(
            compose(&CflValue::Array(vec![1.into(), "a".into()])),
            [0xcc, 0x7e, 0x01, 0x5f, 0x10, 0x01, b'a', 0x00]
        );
        roundtrip(CflValue::Array(Vec::new()));
        roundtrip(CflValue::Array(vec![false.into(), true.into(), 7.into()]));
    }

    #[test]
    fn null_array_elements_are_indistinguishable_from_the_terminator() {
        // The null tag shares its byte with the terminator, so a null in an
        // array ends the array early; the dialect cannot represent it.
        let bytes = compose(&CflValue::Array(vec![CflValue::Null]));
        assert!(parse(&bytes).is_err());

        // Dictionary values sit after a key, so null is fine there.
        roundtrip(CflValue::dict(vec![("gone", CflValue::Null)]));
    }

    #[test]
    fn nested_collections_roundtrip() {
        let tree = CflValue::dict(vec![
            ("name", "base station".into()),
            ("counts", CflValue::Array(vec![1.into(), 65536.into(), (-1).into()])),
            (
                "inner",
                CflValue::dict(vec![
                    ("blob", CflValue::data(vec![1, 2, 3])),
                    ("deep", CflValue::Array(vec![CflValue::dict(vec![("x", 0.into())])])),
                ]),
            ),
        ]);
        roundtrip(tree);
    }

    #[test]
    fn srp_stage_one_shape() {
        let stage = CflValue::dict(vec![("state", 1.into()), ("username", "admin".into())]);
        let bytes = compose(&stage);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.get("state").and_then(CflValue::as_i64), Some(1));
        assert_eq!(parsed.get("username").and_then(CflValue::as_str), Some("admin"));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = compose(&CflValue::Integer(1));
        bytes.push(0xAA);
        assert_eq!(parse(&bytes), Err(CflError::TrailingData { remaining: 1 }));
    }

    #[test]
    fn rejects_unknown_tag() {
        // Parser unmasks the first byte; pre-mask it so it sees 0x77.
        let raw = [0x77 ^ keystream(1)[0]];
        assert_eq!(parse(&raw), Err(CflError::UnknownTag(0x77)));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(parse(&[]), Err(CflError::Truncated { .. })));
        let mut bytes = compose(&CflValue::string("hello"));
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(parse(&bytes), Err(CflError::Truncated { .. })));
    }

    #[test]
    fn rejects_non_string_dict_key() {
        // dict tag, then an integer where a key belongs: df 10 ...
        let ks = keystream(2);
        let raw = [0xdf ^ ks[0], 0x10 ^ ks[1], 0x01, 0x00];
        assert_eq!(parse(&raw), Err(CflError::NonStringKey));
    }

    #[test]
    fn declared_size_beyond_input_is_truncation() {
        // data tag with a declared length far past the buffer end.
        let ks = keystream(3);
        let raw = [0x4f ^ ks[0], 0x10 ^ ks[1], 0xff ^ ks[2]];
        assert!(matches!(parse(&raw), Err(CflError::Truncated { .. })));
    }
}
