//! Typed device properties and their 12-byte TLV wire element.
//!
//! A property element is a 4-byte tag, a u32 flags word, a u32 size, and
//! `size` value bytes. Lists of elements end with the sentinel: the all-NUL
//! tag, written with a four-NUL value body (a tag-only sentinel is accepted
//! on read). When bit 0 of the flags is set the value is a 4-byte big-endian
//! error code for that tag.
//!
//! Construction is catalogue-checked: unknown tags are rejected up front to
//! catch typos, host values are coerced to the canonical big-endian layout
//! for the tag's kind, and the catalogue validator (when present) must
//! accept the result.

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

use crate::{
    catalogue::{self, PropInfo, Validator, ValueKind},
    errors::ValidationError,
};

/// Size of the element header on the wire.
pub const ELEMENT_HEADER_SIZE: usize = 12;

/// Flags bit marking an error element.
pub const FLAG_ERROR: u32 = 0x1;

/// Four-byte property tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropName(pub [u8; 4]);

impl PropName {
    /// End-of-list sentinel tag (four NUL bytes).
    pub const SENTINEL: Self = Self([0; 4]);

    /// Whether this is the sentinel tag.
    #[must_use]
    pub fn is_sentinel(self) -> bool {
        self == Self::SENTINEL
    }

    /// Tag as text. Catalogue tags are always ASCII.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl TryFrom<&str> for PropName {
    type Error = ValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !s.is_ascii() {
            return Err(ValidationError::BadTag(s.to_owned()));
        }
        let mut name = [0u8; 4];
        name.copy_from_slice(bytes);
        Ok(Self(name))
    }
}

impl fmt::Display for PropName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for PropName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropName({:?})", self.as_str())
    }
}

/// Host-side value accepted by the property initialiser.
///
/// The catalogue kind decides which variants are meaningful and how they
/// coerce to canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Integer, encoded big-endian at the kind's width
    Integer(i64),
    /// Text, encoded per kind (UTF-8, dotted quad, colon-separated MAC, ...)
    Text(String),
    /// Raw bytes, taken verbatim after a length check
    Bytes(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Parsed element header: tag, flags, declared value size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    /// Property tag
    pub name: PropName,
    /// Element flags; bit 0 marks an error element
    pub flags: u32,
    /// Declared value length in bytes
    pub size: u32,
}

impl ElementHeader {
    /// Decode the fixed 12-byte header.
    #[must_use]
    pub fn parse(bytes: [u8; ELEMENT_HEADER_SIZE]) -> Self {
        Self {
            name: PropName([bytes[0], bytes[1], bytes[2], bytes[3]]),
            flags: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            size: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }

    /// Whether this header starts the end-of-list sentinel.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.name.is_sentinel()
    }
}

/// One typed attribute of the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    name: PropName,
    flags: u32,
    value: Vec<u8>,
}

impl Property {
    /// Build a property for `tag` from a host value.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] for unknown tags, value variants the kind cannot
    /// encode, wrong lengths, unparsable text forms, and validator
    /// rejections.
    pub fn new(tag: &str, value: impl Into<Value>) -> Result<Self, ValidationError> {
        let name = PropName::try_from(tag)?;
        let Some(info) = catalogue::lookup(tag) else {
            return Err(ValidationError::UnknownTag(tag.to_owned()));
        };
        let canonical = canonicalize(tag, info, value.into())?;
        if let Some(validator) = &info.validator {
            check_validator(tag, validator, &canonical)?;
        }
        Ok(Self { name, flags: 0, value: canonical })
    }

    /// Empty-valued element used to request `tag` in a GetProp body.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] for tags absent from the catalogue.
    pub fn request(tag: &str) -> Result<Self, ValidationError> {
        let name = PropName::try_from(tag)?;
        if catalogue::lookup(tag).is_none() {
            return Err(ValidationError::UnknownTag(tag.to_owned()));
        }
        Ok(Self { name, flags: 0, value: Vec::new() })
    }

    /// Rebuild a property from wire pieces.
    ///
    /// The tag must be known to the catalogue; value bytes are taken as the
    /// device sent them (the device is authoritative for its own encoding).
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownTag`] for tags outside the catalogue.
    pub fn from_wire(header: ElementHeader, value: Vec<u8>) -> Result<Self, ValidationError> {
        if catalogue::lookup(header.name.as_str()).is_none() {
            return Err(ValidationError::UnknownTag(header.name.as_str().to_owned()));
        }
        Ok(Self { name: header.name, flags: header.flags, value })
    }

    /// Property tag.
    #[must_use]
    pub fn name(&self) -> PropName {
        self.name
    }

    /// Element flags.
    #[must_use]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Canonical value bytes.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Peer error code, when this is an error element (`flags & 1`).
    #[must_use]
    pub fn error_code(&self) -> Option<i32> {
        if self.flags & FLAG_ERROR != 0 && self.value.len() >= 4 {
            Some(i32::from_be_bytes([self.value[0], self.value[1], self.value[2], self.value[3]]))
        } else {
            None
        }
    }

    /// Catalogue row for this property's tag.
    #[must_use]
    pub fn info(&self) -> Option<&'static PropInfo> {
        catalogue::lookup(self.name.as_str())
    }

    /// Serialize the element: 12-byte header plus value bytes.
    #[must_use]
    pub fn compose(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ELEMENT_HEADER_SIZE + self.value.len());
        out.extend_from_slice(&self.name.0);
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&(self.value.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.value);
        out
    }

    /// Serialized end-of-list sentinel (four-NUL tag with a four-NUL value).
    #[must_use]
    pub fn sentinel_bytes() -> [u8; 16] {
        let mut out = [0u8; 16];
        out[11] = 4; // size field
        out
    }

    /// Parse one element from the front of `data`.
    ///
    /// Returns `None` for the sentinel (either the four-NUL-value form or the
    /// tag-only form).
    ///
    /// # Errors
    ///
    /// [`ValidationError`] on truncated input or unknown tags.
    pub fn parse(data: &[u8]) -> Result<Option<Self>, ValidationError> {
        if data.len() < ELEMENT_HEADER_SIZE {
            return Err(ValidationError::TruncatedElement {
                expected: ELEMENT_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let mut header_bytes = [0u8; ELEMENT_HEADER_SIZE];
        header_bytes.copy_from_slice(&data[..ELEMENT_HEADER_SIZE]);
        let header = ElementHeader::parse(header_bytes);

        let total = ELEMENT_HEADER_SIZE + header.size as usize;
        if data.len() < total {
            return Err(ValidationError::TruncatedElement { expected: total, actual: data.len() });
        }
        if header.is_sentinel() {
            return Ok(None);
        }
        let value = data[ELEMENT_HEADER_SIZE..total].to_vec();
        Self::from_wire(header, value).map(Some)
    }

    /// Render the canonical value for display, per the catalogue kind.
    #[must_use]
    pub fn format_value(&self) -> String {
        let Some(info) = self.info() else {
            return hex::encode(&self.value);
        };
        format_bytes(info.kind, &self.value)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.format_value())
    }
}

/// Big-endian integer from up to 8 canonical bytes.
fn decode_integer(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let mut value: i64 = 0;
    for &byte in bytes {
        value = (value << 8) | i64::from(byte);
    }
    Some(value)
}

/// Coerce a host value to the canonical wire bytes for `info.kind`.
fn canonicalize(tag: &str, info: &PropInfo, value: Value) -> Result<Vec<u8>, ValidationError> {
    let kind = info.kind;
    match value {
        Value::Integer(v) => {
            if !kind.is_integer() {
                return Err(ValidationError::WrongKind { tag: tag.to_owned(), expected: expected_for(kind) });
            }
            encode_integer(tag, kind, v)
        },
        Value::Text(text) => canonicalize_text(tag, kind, &text),
        Value::Bytes(bytes) => {
            if let Some(expected) = kind.fixed_len() {
                if bytes.len() != expected {
                    return Err(ValidationError::WrongLength {
                        tag: tag.to_owned(),
                        expected,
                        actual: bytes.len(),
                    });
                }
            }
            Ok(bytes)
        },
    }
}

/// Human description of the accepted input variants for a kind.
fn expected_for(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Str | ValueKind::Log => "text or raw bytes",
        ValueKind::Mac => "a MAC string or 6 raw bytes",
        ValueKind::Ip4 => "a dotted quad or 4 raw bytes",
        ValueKind::Ip6 => "an IPv6 address or 16 raw bytes",
        ValueKind::Uid => "a UUID string or 16 raw bytes",
        ValueKind::Cfb | ValueKind::Bin | ValueKind::Bpl => "raw bytes",
        _ => "an integer",
    }
}

fn encode_integer(tag: &str, kind: ValueKind, v: i64) -> Result<Vec<u8>, ValidationError> {
    let (lo, hi, width) = match kind {
        ValueKind::U8 => (0, i64::from(u8::MAX), 1),
        ValueKind::Boo => (0, 1, 1),
        ValueKind::U16 => (0, i64::from(u16::MAX), 2),
        ValueKind::Dec | ValueKind::Hex | ValueKind::U32 => (0, i64::from(u32::MAX), 4),
        ValueKind::Ui8 => (0, i64::MAX, 8),
        _ => return Err(ValidationError::WrongKind { tag: tag.to_owned(), expected: expected_for(kind) }),
    };
    if v < lo || v > hi {
        return Err(ValidationError::OutOfRange { tag: tag.to_owned(), value: v, lo, hi });
    }
    Ok(v.to_be_bytes()[8 - width..].to_vec())
}

fn canonicalize_text(tag: &str, kind: ValueKind, text: &str) -> Result<Vec<u8>, ValidationError> {
    let bad = |kind_name: &'static str| ValidationError::BadText {
        tag: tag.to_owned(),
        kind: kind_name,
        text: text.to_owned(),
    };
    match kind {
        ValueKind::Str | ValueKind::Log => Ok(text.as_bytes().to_vec()),
        ValueKind::Mac => parse_mac(text).ok_or_else(|| bad("mac")),
        ValueKind::Ip4 => text
            .parse::<Ipv4Addr>()
            .map(|ip| ip.octets().to_vec())
            .map_err(|_| bad("ip4")),
        ValueKind::Ip6 => text
            .parse::<Ipv6Addr>()
            .map(|ip| ip.octets().to_vec())
            .map_err(|_| bad("ip6")),
        ValueKind::Uid => parse_uuid(text).ok_or_else(|| bad("uuid")),
        _ => Err(ValidationError::WrongKind { tag: tag.to_owned(), expected: expected_for(kind) }),
    }
}

/// `"aa:bb:cc:dd:ee:ff"` to 6 raw bytes.
fn parse_mac(text: &str) -> Option<Vec<u8>> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 6 {
        return None;
    }
    parts
        .iter()
        .map(|part| {
            if part.len() == 2 { u8::from_str_radix(part, 16).ok() } else { None }
        })
        .collect()
}

/// Hyphenated or bare hex UUID text to 16 raw bytes.
fn parse_uuid(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| *c != '-').collect();
    if compact.len() != 32 {
        return None;
    }
    hex::decode(compact).ok().filter(|bytes| bytes.len() == 16)
}

fn check_validator(tag: &str, validator: &Validator, bytes: &[u8]) -> Result<(), ValidationError> {
    match validator {
        Validator::Range { lo, hi } => {
            let value = decode_integer(bytes)
                .ok_or_else(|| ValidationError::Rejected { tag: tag.to_owned() })?;
            if value < *lo || value > *hi {
                return Err(ValidationError::OutOfRange {
                    tag: tag.to_owned(),
                    value,
                    lo: *lo,
                    hi: *hi,
                });
            }
            Ok(())
        },
        Validator::OneOf(set) => {
            let value = decode_integer(bytes)
                .ok_or_else(|| ValidationError::Rejected { tag: tag.to_owned() })?;
            if !set.contains(&value) {
                return Err(ValidationError::NotInSet { tag: tag.to_owned(), value });
            }
            Ok(())
        },
        Validator::Custom(predicate) => {
            if predicate(bytes) {
                Ok(())
            } else {
                Err(ValidationError::Rejected { tag: tag.to_owned() })
            }
        },
    }
}

fn format_bytes(kind: ValueKind, bytes: &[u8]) -> String {
    match kind {
        ValueKind::Str | ValueKind::Log => String::from_utf8_lossy(bytes).into_owned(),
        ValueKind::Hex => match decode_integer(bytes) {
            Some(v) => format!("{v:#010x}"),
            None => hex::encode(bytes),
        },
        ValueKind::Dec | ValueKind::U8 | ValueKind::U16 | ValueKind::U32 | ValueKind::Ui8 => {
            match decode_integer(bytes) {
                Some(v) => v.to_string(),
                None => hex::encode(bytes),
            }
        },
        ValueKind::Boo => match bytes {
            [0] => "false".to_owned(),
            [_] => "true".to_owned(),
            _ => hex::encode(bytes),
        },
        ValueKind::Mac => {
            if bytes.len() == 6 {
                bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
            } else {
                hex::encode(bytes)
            }
        },
        ValueKind::Ip4 => match <[u8; 4]>::try_from(bytes) {
            Ok(octets) => Ipv4Addr::from(octets).to_string(),
            Err(_) => hex::encode(bytes),
        },
        ValueKind::Ip6 => match <[u8; 16]>::try_from(bytes) {
            Ok(octets) => Ipv6Addr::from(octets).to_string(),
            Err(_) => hex::encode(bytes),
        },
        ValueKind::Uid => {
            if bytes.len() == 16 {
                let h = hex::encode(bytes);
                format!("{}-{}-{}-{}-{}", &h[..8], &h[8..12], &h[12..16], &h[16..20], &h[20..])
            } else {
                hex::encode(bytes)
            }
        },
        ValueKind::Cfb | ValueKind::Bin | ValueKind::Bpl => hex::encode(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_element_is_twelve_zero_padded_bytes() {
        let wire = Property::request("syAP").unwrap().compose();
        assert_eq!(wire, b"syAP\x00\x00\x00\x00\x00\x00\x00\x00");
        assert_eq!(wire.len(), ELEMENT_HEADER_SIZE);
    }

    #[test]
    fn sentinel_has_four_nul_value_body() {
        let wire = Property::sentinel_bytes();
        assert_eq!(&wire[..4], &[0; 4]);
        assert_eq!(&wire[8..12], &4u32.to_be_bytes());
        assert_eq!(&wire[12..], &[0; 4]);
    }

    #[test]
    fn parse_accepts_both_sentinel_forms() {
        assert_eq!(Property::parse(&Property::sentinel_bytes()).unwrap(), None);
        assert_eq!(Property::parse(&[0u8; ELEMENT_HEADER_SIZE]).unwrap(), None);
    }

    #[test]
    fn unknown_tags_are_rejected_up_front() {
        assert!(matches!(
            Property::new("zzzz", 1),
            Err(ValidationError::UnknownTag(_))
        ));
        assert!(matches!(Property::new("toolong", 1), Err(ValidationError::BadTag(_))));
    }

    #[test]
    fn integer_coercion_is_big_endian_at_kind_width() {
        let prop = Property::new("syAP", 0x0107).unwrap();
        assert_eq!(prop.value(), [0x00, 0x00, 0x01, 0x07]);

        let prop = Property::new("6Lfx", 64).unwrap();
        assert_eq!(prop.value(), [64]);

        let prop = Property::new("iCld", 1).unwrap();
        assert_eq!(prop.value(), [1]);
    }

    #[test]
    fn boolean_range_is_enforced() {
        assert!(matches!(
            Property::new("iCld", 2),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn mac_accepts_text_and_raw_forms() {
        let from_text = Property::new("laMA", "00:11:22:33:44:55").unwrap();
        let from_bytes = Property::new("laMA", vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55]).unwrap();
        assert_eq!(from_text, from_bytes);
        assert_eq!(from_text.format_value(), "00:11:22:33:44:55");

        assert!(matches!(
            Property::new("laMA", "not a mac"),
            Err(ValidationError::BadText { .. })
        ));
        // Multicast bit trips the catalogue predicate.
        assert!(matches!(
            Property::new("laMA", "01:00:5e:00:00:01"),
            Err(ValidationError::Rejected { .. })
        ));
    }

    #[test]
    fn ip_addresses_coerce_from_text() {
        let prop = Property::new("laIP", "10.0.1.1").unwrap();
        assert_eq!(prop.value(), [10, 0, 1, 1]);
        assert_eq!(prop.format_value(), "10.0.1.1");

        let prop = Property::new("6Lad", "fe80::1").unwrap();
        assert_eq!(prop.value().len(), 16);
        assert_eq!(prop.format_value(), "fe80::1");
    }

    #[test]
    fn uuid_text_round_trips_through_display() {
        let text = "00112233-4455-6677-8899-aabbccddeeff";
        let prop = Property::new("uuid", text).unwrap();
        assert_eq!(prop.value().len(), 16);
        assert_eq!(prop.format_value(), text);
    }

    #[test]
    fn range_validator_is_applied_to_the_canonical_value() {
        assert!(Property::new("dhLe", 86_400).is_ok());
        assert!(matches!(
            Property::new("dhLe", 10),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            Property::new("LEDc", 9),
            Err(ValidationError::NotInSet { .. })
        ));
    }

    #[test]
    fn validated_entries_round_trip_through_the_wire() {
        // Representative in-range value per validator shape.
        let samples: &[(&str, Value)] = &[
            ("dhLe", Value::Integer(3600)),
            ("slvl", Value::Integer(5)),
            ("LEDc", Value::Integer(2)),
            ("leAc", Value::Integer(0)),
            ("SUFq", Value::Integer(86_400)),
            ("6Lfx", Value::Integer(64)),
            ("6aut", Value::Integer(1)),
            ("acRB", Value::Integer(0)),
            ("auRR", Value::Integer(3)),
            ("raMA", Value::Text("00:11:22:33:44:55".to_owned())),
        ];
        for (tag, value) in samples {
            let prop = Property::new(tag, value.clone()).unwrap();
            let parsed = Property::parse(&prop.compose()).unwrap().unwrap();
            assert_eq!(parsed, prop, "tag {tag}");
        }
    }

    #[test]
    fn error_elements_expose_the_peer_code() {
        let header = ElementHeader { name: PropName(*b"syNm"), flags: FLAG_ERROR, size: 4 };
        let prop = Property::from_wire(header, vec![0xFF, 0xFF, 0xFF, 0xFE]).unwrap();
        assert_eq!(prop.error_code(), Some(-2));
    }

    #[test]
    fn wrong_kind_and_length_are_rejected() {
        assert!(matches!(
            Property::new("syNm", 5),
            Err(ValidationError::WrongKind { .. })
        ));
        assert!(matches!(
            Property::new("laIP", vec![10, 0, 1]),
            Err(ValidationError::WrongLength { .. })
        ));
    }

    #[test]
    fn display_includes_tag_and_formatted_value() {
        let prop = Property::new("syNm", "Base Station").unwrap();
        assert_eq!(prop.to_string(), "syNm=Base Station");

        let prop = Property::new("naFl", 0x0102).unwrap();
        assert_eq!(prop.format_value(), "0x00000102");
    }

    #[test]
    fn truncated_elements_are_rejected() {
        let err = Property::parse(&[0u8; 5]);
        assert!(matches!(err, Err(ValidationError::TruncatedElement { .. })));

        let mut wire = Property::new("syAP", 1).unwrap().compose();
        wire.truncate(wire.len() - 1);
        assert!(matches!(
            Property::parse(&wire),
            Err(ValidationError::TruncatedElement { .. })
        ));
    }
}
