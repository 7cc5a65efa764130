//! Static property catalogue.
//!
//! Immutable mapping from 4-character property tags to their value kind,
//! display description, and optional validator. The catalogue is a leaf
//! module: the property codec depends on it, never the other way around.
//! Curation follows the vendor firmware; only the tags exercised by the
//! supported operations are guaranteed present.

/// Canonical representation of a property value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// UTF-8 text
    Str,
    /// u32, displayed decimal
    Dec,
    /// u32, displayed hexadecimal
    Hex,
    /// Device log text
    Log,
    /// 6-byte MAC address
    Mac,
    /// CFL binary property list blob
    Cfb,
    /// Opaque bytes
    Bin,
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    Ui8,
    /// IPv4 address (4 bytes)
    Ip4,
    /// IPv6 address (16 bytes)
    Ip6,
    /// 16-byte UUID
    Uid,
    /// Boolean (1 byte, 0 or 1)
    Boo,
    /// Stock Apple binary plist blob
    Bpl,
}

impl ValueKind {
    /// Fixed canonical byte length for the kind, if it has one.
    #[must_use]
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            Self::Dec | Self::Hex | Self::U32 | Self::Ip4 => Some(4),
            Self::U8 | Self::Boo => Some(1),
            Self::U16 => Some(2),
            Self::Ui8 => Some(8),
            Self::Mac => Some(6),
            Self::Ip6 | Self::Uid => Some(16),
            Self::Str | Self::Log | Self::Cfb | Self::Bin | Self::Bpl => None,
        }
    }

    /// Whether values of this kind are integers in canonical form.
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Dec | Self::Hex | Self::U8 | Self::U16 | Self::U32 | Self::Ui8 | Self::Boo)
    }
}

/// Pure predicate over a property's canonical encoding.
#[derive(Clone, Copy)]
pub enum Validator {
    /// Inclusive integer range
    Range {
        /// Lower bound
        lo: i64,
        /// Upper bound
        hi: i64,
    },
    /// Enumerated accepted integers
    OneOf(&'static [i64]),
    /// Arbitrary predicate over the encoded bytes
    Custom(fn(&[u8]) -> bool),
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Range { lo, hi } => write!(f, "Range {{ lo: {lo}, hi: {hi} }}"),
            Self::OneOf(set) => write!(f, "OneOf({set:?})"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One catalogue row.
#[derive(Debug, Clone, Copy)]
pub struct PropInfo {
    /// Canonical value kind
    pub kind: ValueKind,
    /// Human-readable description for display
    pub description: &'static str,
    /// Optional constraint on the canonical value
    pub validator: Option<Validator>,
}

/// MAC addresses configured on an interface must be unicast.
fn mac_is_unicast(bytes: &[u8]) -> bool {
    bytes.len() == 6 && bytes[0] & 0x01 == 0
}

use ValueKind as K;

/// The catalogue proper. Kept sorted roughly by functional group, matching
/// the firmware property listing.
static ENTRIES: &[(&str, PropInfo)] = &[
    // System
    ("syNm", PropInfo { kind: K::Str, description: "System name", validator: None }),
    ("syPW", PropInfo { kind: K::Str, description: "System password", validator: None }),
    ("syAP", PropInfo { kind: K::Dec, description: "Apple product ID", validator: None }),
    ("sySN", PropInfo { kind: K::Str, description: "System serial number", validator: None }),
    ("syUT", PropInfo { kind: K::U32, description: "System uptime", validator: None }),
    ("uuid", PropInfo { kind: K::Uid, description: "Device UUID", validator: None }),
    // Radio
    ("raMA", PropInfo {
        kind: K::Mac,
        description: "Radio MAC address",
        validator: Some(Validator::Custom(mac_is_unicast)),
    }),
    ("raPo", PropInfo { kind: K::Str, description: "Transmit power", validator: None }),
    // WAN
    ("waIP", PropInfo { kind: K::Ip4, description: "WAN IP address", validator: None }),
    ("waSM", PropInfo { kind: K::Ip4, description: "WAN subnet mask", validator: None }),
    ("waRA", PropInfo { kind: K::Ip4, description: "WAN router address", validator: None }),
    ("waMA", PropInfo {
        kind: K::Mac,
        description: "WAN MAC address",
        validator: Some(Validator::Custom(mac_is_unicast)),
    }),
    ("waDN", PropInfo { kind: K::Str, description: "WAN domain name", validator: None }),
    ("waDC", PropInfo { kind: K::Str, description: "WAN DHCP client ID", validator: None }),
    // LAN
    ("laIP", PropInfo { kind: K::Ip4, description: "LAN IP address", validator: None }),
    ("laSM", PropInfo { kind: K::Ip4, description: "LAN subnet mask", validator: None }),
    ("laMA", PropInfo {
        kind: K::Mac,
        description: "LAN MAC address",
        validator: Some(Validator::Custom(mac_is_unicast)),
    }),
    // DHCP server
    ("dhBg", PropInfo { kind: K::Ip4, description: "DHCP range begin", validator: None }),
    ("dhEn", PropInfo { kind: K::Ip4, description: "DHCP range end", validator: None }),
    ("dhSN", PropInfo { kind: K::Ip4, description: "DHCP subnet", validator: None }),
    ("dhLe", PropInfo {
        kind: K::Dec,
        description: "DHCP lease time",
        validator: Some(Validator::Range { lo: 60, hi: 2_592_000 }),
    }),
    ("dhSL", PropInfo { kind: K::Str, description: "DHCP shared lease domain", validator: None }),
    ("DRes", PropInfo { kind: K::Cfb, description: "DHCP reservations", validator: None }),
    // NAT
    ("naFl", PropInfo { kind: K::Hex, description: "NAT flags", validator: None }),
    ("nDMZ", PropInfo { kind: K::Ip4, description: "NAT default host", validator: None }),
    // Access control and services
    ("tACL", PropInfo { kind: K::Cfb, description: "Timed access control list", validator: None }),
    ("ntSV", PropInfo { kind: K::Str, description: "NTP server", validator: None }),
    ("slvl", PropInfo {
        kind: K::Dec,
        description: "Syslog level",
        validator: Some(Validator::Range { lo: 0, hi: 7 }),
    }),
    ("logm", PropInfo { kind: K::Log, description: "Log messages", validator: None }),
    ("usrd", PropInfo { kind: K::Cfb, description: "User accounts", validator: None }),
    ("feat", PropInfo { kind: K::Cfb, description: "Feature flags", validator: None }),
    ("prop", PropInfo { kind: K::Bin, description: "Supported properties", validator: None }),
    // Actions
    ("acRB", PropInfo {
        kind: K::Dec,
        description: "Reboot device",
        validator: Some(Validator::Range { lo: 0, hi: 1 }),
    }),
    ("acRN", PropInfo { kind: K::Dec, description: "Renew DHCP lease", validator: None }),
    ("acRF", PropInfo { kind: K::Dec, description: "Restore factory defaults", validator: None }),
    // Authentication
    ("auHK", PropInfo { kind: K::Bin, description: "Auth host key", validator: None }),
    ("auHE", PropInfo { kind: K::Boo, description: "Auth enabled", validator: None }),
    ("auNP", PropInfo { kind: K::Dec, description: "Auth PIN attempts", validator: None }),
    ("auRR", PropInfo {
        kind: K::U8,
        description: "Auth retry limit",
        validator: Some(Validator::Range { lo: 0, hi: 10 }),
    }),
    // IPv6
    ("6aut", PropInfo {
        kind: K::Dec,
        description: "IPv6 autoconfig mode",
        validator: Some(Validator::OneOf(&[0, 1, 2, 3])),
    }),
    ("6cfg", PropInfo { kind: K::Dec, description: "IPv6 config mode", validator: None }),
    ("6Wad", PropInfo { kind: K::Ip6, description: "IPv6 WAN address", validator: None }),
    ("6Wgw", PropInfo { kind: K::Ip6, description: "IPv6 WAN gateway", validator: None }),
    ("6Lad", PropInfo { kind: K::Ip6, description: "IPv6 LAN address", validator: None }),
    ("6Lfx", PropInfo {
        kind: K::U8,
        description: "IPv6 LAN prefix length",
        validator: Some(Validator::Range { lo: 0, hi: 128 }),
    }),
    ("6sfw", PropInfo { kind: K::Boo, description: "IPv6 simple firewall", validator: None }),
    ("6trd", PropInfo { kind: K::Cfb, description: "IPv6 tunnel data", validator: None }),
    ("6fwl", PropInfo { kind: K::Cfb, description: "IPv6 firewall rules", validator: None }),
    ("6NS1", PropInfo { kind: K::Ip6, description: "IPv6 name server 1", validator: None }),
    ("6NS2", PropInfo { kind: K::Ip6, description: "IPv6 name server 2", validator: None }),
    ("6NS3", PropInfo { kind: K::Ip6, description: "IPv6 name server 3", validator: None }),
    // Hardware
    ("APID", PropInfo { kind: K::Hex, description: "AirPort ID", validator: None }),
    ("LEDc", PropInfo {
        kind: K::Dec,
        description: "Status LED mode",
        validator: Some(Validator::OneOf(&[0, 1, 2, 3])),
    }),
    ("leAc", PropInfo {
        kind: K::Dec,
        description: "Status LED activity",
        validator: Some(Validator::OneOf(&[0, 1, 2])),
    }),
    ("isAC", PropInfo { kind: K::Boo, description: "Running on AC power", validator: None }),
    ("GPIs", PropInfo { kind: K::Hex, description: "GPIO states", validator: None }),
    // Software update
    ("SUEn", PropInfo { kind: K::Boo, description: "Software update enabled", validator: None }),
    ("SUFq", PropInfo {
        kind: K::U32,
        description: "Software update check interval",
        validator: Some(Validator::Range { lo: 3600, hi: 2_592_000 }),
    }),
    // Remote web access
    ("wbEn", PropInfo { kind: K::Boo, description: "Web access enabled", validator: None }),
    ("wbHN", PropInfo { kind: K::Str, description: "Web host name", validator: None }),
    ("wbHU", PropInfo { kind: K::Str, description: "Web host user", validator: None }),
    ("wbHP", PropInfo { kind: K::Str, description: "Web host password", validator: None }),
    ("wbAC", PropInfo { kind: K::Dec, description: "Web access control", validator: None }),
    // iCloud
    ("iCld", PropInfo { kind: K::Boo, description: "iCloud enabled", validator: None }),
    ("iCLH", PropInfo { kind: K::Str, description: "iCloud host", validator: None }),
];

/// Catalogue row for `tag`, if known.
#[must_use]
pub fn lookup(tag: &str) -> Option<&'static PropInfo> {
    ENTRIES.iter().find(|(name, _)| *name == tag).map(|(_, info)| info)
}

/// Iterate all catalogue rows as `(tag, info)` pairs.
pub fn entries() -> impl Iterator<Item = (&'static str, &'static PropInfo)> {
    ENTRIES.iter().map(|(name, info)| (*name, info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_four_ascii_bytes_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for (tag, _) in entries() {
            assert_eq!(tag.len(), 4, "tag {tag:?}");
            assert!(tag.is_ascii());
            assert!(seen.insert(tag), "duplicate tag {tag:?}");
        }
    }

    #[test]
    fn operation_tags_are_present() {
        for tag in ["syNm", "syAP", "acRB", "feat", "raPo", "6NS3", "iCLH", "dhLe"] {
            assert!(lookup(tag).is_some(), "missing {tag}");
        }
        assert!(lookup("zzzz").is_none());
    }

    #[test]
    fn transmit_power_is_pinned_to_text() {
        let info = lookup("raPo").unwrap();
        assert_eq!(info.kind, ValueKind::Str);
        assert_eq!(info.description, "Transmit power");
    }

    #[test]
    fn fixed_lengths_match_kinds() {
        assert_eq!(ValueKind::Mac.fixed_len(), Some(6));
        assert_eq!(ValueKind::Ip6.fixed_len(), Some(16));
        assert_eq!(ValueKind::Str.fixed_len(), None);
        assert!(ValueKind::Boo.is_integer());
        assert!(!ValueKind::Cfb.is_integer());
    }

    #[test]
    fn unicast_predicate() {
        assert!(mac_is_unicast(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert!(!mac_is_unicast(&[0x01, 0x00, 0x5E, 0x00, 0x00, 0x01]));
        assert!(!mac_is_unicast(&[0x00; 5]));
    }
}
