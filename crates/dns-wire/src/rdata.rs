//! The resource-record catalogue: typed rdata for every record type
//! the resolver understands, plus an opaque passthrough for the rest.

use bytes::Bytes;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::name::Name;

/// A resource record: one (name, class, type, ttl, rdata) tuple.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                                               |
///     /                      NAME                     /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TYPE                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     CLASS                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TTL                      |
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                   RDLENGTH                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
///     /                     RDATA                     /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// See section 4.1.3 of RFC 1035.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Record {
    pub name: Name,
    pub rdata: Rdata,
    pub rclass: RecordClass,
    /// TTL in seconds.  Decoding treats a value with the most
    /// significant bit set as 0 (RFC 2181 section 8).
    pub ttl: u32,
}

impl Record {
    pub fn rtype(&self) -> RecordType {
        self.rdata.rtype()
    }
}

/// A record type with its associated, decoded, data.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Rdata {
    /// A 32 bit Internet address.
    A { address: Ipv4Addr },

    /// A 128 bit Internet address.  See RFC 3596.
    Aaaa { address: Ipv6Addr },

    /// The canonical name for the owner, which is an alias.
    Cname { target: Name },

    /// A host which should be authoritative for the owner's zone.
    Ns { nsdname: Name },

    /// A name pointing to some other location in the name space, most
    /// commonly under `in-addr.arpa.` / `ip6.arpa.`.
    Ptr { target: Name },

    /// A mail exchange for the owner, lower preference values first.
    Mx { preference: u16, exchange: Name },

    /// One or more character strings.
    Txt { strings: Vec<Bytes> },

    /// Start of a zone of authority.  See section 3.3.13 of RFC 1035.
    Soa {
        mname: Name,
        rname: Name,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },

    /// The location of a service, RFC 2782.  Lower priority first;
    /// weight breaks ties within a priority.
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: Name,
    },

    /// Naming-authority pointer, RFC 3403.
    Naptr {
        order: u16,
        preference: u16,
        flags: Bytes,
        service: Bytes,
        regexp: Bytes,
        replacement: Name,
    },

    /// Certification-authority authorisation, RFC 8659.
    Caa { flags: u8, tag: Bytes, value: Bytes },

    /// TLSA certificate association, RFC 6698.  The certificate data
    /// passes through unverified.
    Tlsa {
        usage: u8,
        selector: u8,
        matching: u8,
        certificate: Bytes,
    },

    /// URI record, RFC 7553.  The target is not a domain name: it is
    /// the bare octets of a URI, with no length prefix.
    Uri {
        priority: u16,
        weight: u16,
        target: Bytes,
    },

    /// General-purpose service binding, RFC 9460.
    Svcb {
        priority: u16,
        target: Name,
        params: Vec<SvcParam>,
    },

    /// Service binding for HTTPS origins, RFC 9460.
    Https {
        priority: u16,
        target: Name,
        params: Vec<SvcParam>,
    },

    /// Any other record, with its RDATA preserved untouched.
    Unknown {
        tag: RecordTypeUnknown,
        octets: Bytes,
    },
}

impl Rdata {
    pub fn rtype(&self) -> RecordType {
        match self {
            Rdata::A { .. } => RecordType::A,
            Rdata::Aaaa { .. } => RecordType::AAAA,
            Rdata::Cname { .. } => RecordType::CNAME,
            Rdata::Ns { .. } => RecordType::NS,
            Rdata::Ptr { .. } => RecordType::PTR,
            Rdata::Mx { .. } => RecordType::MX,
            Rdata::Txt { .. } => RecordType::TXT,
            Rdata::Soa { .. } => RecordType::SOA,
            Rdata::Srv { .. } => RecordType::SRV,
            Rdata::Naptr { .. } => RecordType::NAPTR,
            Rdata::Caa { .. } => RecordType::CAA,
            Rdata::Tlsa { .. } => RecordType::TLSA,
            Rdata::Uri { .. } => RecordType::URI,
            Rdata::Svcb { .. } => RecordType::SVCB,
            Rdata::Https { .. } => RecordType::HTTPS,
            Rdata::Unknown { tag, .. } => RecordType::Unknown(*tag),
        }
    }
}

impl fmt::Display for Rdata {
    /// Master-file-ish presentation format, for diagnostic output.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rdata::A { address } => write!(f, "{address}"),
            Rdata::Aaaa { address } => write!(f, "{address}"),
            Rdata::Cname { target } => write!(f, "{target}"),
            Rdata::Ns { nsdname } => write!(f, "{nsdname}"),
            Rdata::Ptr { target } => write!(f, "{target}"),
            Rdata::Mx {
                preference,
                exchange,
            } => write!(f, "{preference} {exchange}"),
            Rdata::Txt { strings } => {
                let mut first = true;
                for s in strings {
                    if !first {
                        write!(f, " ")?;
                    }
                    first = false;
                    write_quoted(f, s)?;
                }
                Ok(())
            }
            Rdata::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}"
            ),
            Rdata::Srv {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{priority} {weight} {port} {target}"),
            Rdata::Naptr {
                order,
                preference,
                flags,
                service,
                regexp,
                replacement,
            } => {
                write!(f, "{order} {preference} ")?;
                write_quoted(f, flags)?;
                write!(f, " ")?;
                write_quoted(f, service)?;
                write!(f, " ")?;
                write_quoted(f, regexp)?;
                write!(f, " {replacement}")
            }
            Rdata::Caa { flags, tag, value } => {
                write!(f, "{flags} ")?;
                for octet in tag {
                    write!(f, "{}", *octet as char)?;
                }
                write!(f, " ")?;
                write_quoted(f, value)
            }
            Rdata::Tlsa {
                usage,
                selector,
                matching,
                certificate,
            } => {
                write!(f, "{usage} {selector} {matching} ")?;
                write_hex(f, certificate)
            }
            Rdata::Uri {
                priority,
                weight,
                target,
            } => {
                write!(f, "{priority} {weight} ")?;
                write_quoted(f, target)
            }
            Rdata::Svcb {
                priority,
                target,
                params,
            }
            | Rdata::Https {
                priority,
                target,
                params,
            } => {
                write!(f, "{priority} {target}")?;
                for param in params {
                    write!(f, " {param}")?;
                }
                Ok(())
            }
            Rdata::Unknown { octets, .. } => {
                // RFC 3597 generic encoding
                write!(f, "\\# {} ", octets.len())?;
                write_hex(f, octets)
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter, octets: &[u8]) -> fmt::Result {
    write!(f, "\"")?;
    for octet in octets {
        match octet {
            b'"' | b'\\' => write!(f, "\\{}", *octet as char)?,
            0x20..=0x7e => write!(f, "{}", *octet as char)?,
            _ => write!(f, "\\{octet:03}")?,
        }
    }
    write!(f, "\"")
}

fn write_hex(f: &mut fmt::Formatter, octets: &[u8]) -> fmt::Result {
    for octet in octets {
        write!(f, "{octet:02x}")?;
    }
    Ok(())
}

/// One key/value pair from an SVCB or HTTPS record.  Values are kept
/// as raw octets; only the key is interpreted.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SvcParam {
    pub key: SvcParamKey,
    pub value: Bytes,
}

impl fmt::Display for SvcParam {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}=", self.key)?;
            write_hex(f, &self.value)
        }
    }
}

/// SVCB/HTTPS parameter keys, RFC 9460 section 14.3.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SvcParamKey {
    Mandatory,
    Alpn,
    NoDefaultAlpn,
    Port,
    Ipv4Hint,
    Ech,
    Ipv6Hint,
    Unknown(u16),
}

impl From<u16> for SvcParamKey {
    fn from(value: u16) -> Self {
        match value {
            0 => SvcParamKey::Mandatory,
            1 => SvcParamKey::Alpn,
            2 => SvcParamKey::NoDefaultAlpn,
            3 => SvcParamKey::Port,
            4 => SvcParamKey::Ipv4Hint,
            5 => SvcParamKey::Ech,
            6 => SvcParamKey::Ipv6Hint,
            other => SvcParamKey::Unknown(other),
        }
    }
}

impl From<SvcParamKey> for u16 {
    fn from(value: SvcParamKey) -> Self {
        match value {
            SvcParamKey::Mandatory => 0,
            SvcParamKey::Alpn => 1,
            SvcParamKey::NoDefaultAlpn => 2,
            SvcParamKey::Port => 3,
            SvcParamKey::Ipv4Hint => 4,
            SvcParamKey::Ech => 5,
            SvcParamKey::Ipv6Hint => 6,
            SvcParamKey::Unknown(other) => other,
        }
    }
}

impl fmt::Display for SvcParamKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SvcParamKey::Mandatory => write!(f, "mandatory"),
            SvcParamKey::Alpn => write!(f, "alpn"),
            SvcParamKey::NoDefaultAlpn => write!(f, "no-default-alpn"),
            SvcParamKey::Port => write!(f, "port"),
            SvcParamKey::Ipv4Hint => write!(f, "ipv4hint"),
            SvcParamKey::Ech => write!(f, "ech"),
            SvcParamKey::Ipv6Hint => write!(f, "ipv6hint"),
            SvcParamKey::Unknown(n) => write!(f, "key{n}"),
        }
    }
}

/// Record types, used by resource records and by queries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    NAPTR,
    /// The EDNS(0) pseudo-record type.  It never appears in a
    /// [`Record`]: the message codec lifts it into `Message::edns`.
    OPT,
    TLSA,
    SVCB,
    HTTPS,
    URI,
    CAA,
    Unknown(RecordTypeUnknown),
}

/// A struct with a private constructor, to ensure a `RecordType` for a
/// known type number cannot hide in the `Unknown` variant.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordTypeUnknown(u16);

impl RecordType {
    pub fn is_unknown(&self) -> bool {
        matches!(self, RecordType::Unknown(_))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::SRV => write!(f, "SRV"),
            RecordType::NAPTR => write!(f, "NAPTR"),
            RecordType::OPT => write!(f, "OPT"),
            RecordType::TLSA => write!(f, "TLSA"),
            RecordType::SVCB => write!(f, "SVCB"),
            RecordType::HTTPS => write!(f, "HTTPS"),
            RecordType::URI => write!(f, "URI"),
            RecordType::CAA => write!(f, "CAA"),
            RecordType::Unknown(RecordTypeUnknown(n)) => write!(f, "TYPE{n}"),
        }
    }
}

impl FromStr for RecordType {
    type Err = RecordTypeFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(RecordType::A),
            "NS" => Ok(RecordType::NS),
            "CNAME" => Ok(RecordType::CNAME),
            "SOA" => Ok(RecordType::SOA),
            "PTR" => Ok(RecordType::PTR),
            "MX" => Ok(RecordType::MX),
            "TXT" => Ok(RecordType::TXT),
            "AAAA" => Ok(RecordType::AAAA),
            "SRV" => Ok(RecordType::SRV),
            "NAPTR" => Ok(RecordType::NAPTR),
            "OPT" => Ok(RecordType::OPT),
            "TLSA" => Ok(RecordType::TLSA),
            "SVCB" => Ok(RecordType::SVCB),
            "HTTPS" => Ok(RecordType::HTTPS),
            "URI" => Ok(RecordType::URI),
            "CAA" => Ok(RecordType::CAA),
            _ => {
                if let Some(type_str) = s.strip_prefix("TYPE") {
                    if let Ok(type_num) = u16::from_str(type_str) {
                        Ok(RecordType::from(type_num))
                    } else {
                        Err(RecordTypeFromStr::BadType)
                    }
                } else {
                    Err(RecordTypeFromStr::NoParse)
                }
            }
        }
    }
}

/// Errors that can arise when converting a `&str` into a `RecordType`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordTypeFromStr {
    BadType,
    NoParse,
}

impl fmt::Display for RecordTypeFromStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordTypeFromStr::BadType => write!(f, "TYPE<num> number must be a u16"),
            RecordTypeFromStr::NoParse => write!(f, "could not parse string to type"),
        }
    }
}

impl std::error::Error for RecordTypeFromStr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            35 => RecordType::NAPTR,
            41 => RecordType::OPT,
            52 => RecordType::TLSA,
            64 => RecordType::SVCB,
            65 => RecordType::HTTPS,
            256 => RecordType::URI,
            257 => RecordType::CAA,
            _ => RecordType::Unknown(RecordTypeUnknown(value)),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::NAPTR => 35,
            RecordType::OPT => 41,
            RecordType::TLSA => 52,
            RecordType::SVCB => 64,
            RecordType::HTTPS => 65,
            RecordType::URI => 256,
            RecordType::CAA => 257,
            RecordType::Unknown(RecordTypeUnknown(value)) => value,
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordType {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        // OPT cannot occur in a `Record`, so never generate it
        let mut value = u.arbitrary::<u16>()?;
        if value == 41 {
            value = 42;
        }
        Ok(Self::from(value))
    }
}

/// Record classes, used by resource records and by queries.  `IN` is
/// the overwhelmingly common one; `CH` and `HS` turn up in server
/// self-identification queries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordClass {
    IN,
    CH,
    HS,
    Unknown(RecordClassUnknown),
}

/// A struct with a private constructor, to ensure invalid
/// `RecordClass`es cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordClassUnknown(u16);

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::CH => write!(f, "CH"),
            RecordClass::HS => write!(f, "HS"),
            RecordClass::Unknown(RecordClassUnknown(n)) => write!(f, "CLASS{n}"),
        }
    }
}

impl FromStr for RecordClass {
    type Err = RecordClassFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(RecordClass::IN),
            "CH" => Ok(RecordClass::CH),
            "HS" => Ok(RecordClass::HS),
            _ => {
                if let Some(class_str) = s.strip_prefix("CLASS") {
                    if let Ok(class_num) = u16::from_str(class_str) {
                        Ok(RecordClass::from(class_num))
                    } else {
                        Err(RecordClassFromStr::BadClass)
                    }
                } else {
                    Err(RecordClassFromStr::NoParse)
                }
            }
        }
    }
}

/// Errors that can arise when converting a `&str` into a `RecordClass`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordClassFromStr {
    BadClass,
    NoParse,
}

impl fmt::Display for RecordClassFromStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClassFromStr::BadClass => write!(f, "CLASS<num> number must be a u16"),
            RecordClassFromStr::NoParse => write!(f, "could not parse string to class"),
        }
    }
}

impl std::error::Error for RecordClassFromStr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            3 => RecordClass::CH,
            4 => RecordClass::HS,
            _ => RecordClass::Unknown(RecordClassUnknown(value)),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::CH => 3,
            RecordClass::HS => 4,
            RecordClass::Unknown(RecordClassUnknown(value)) => value,
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordClass {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for SvcParam {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let key = SvcParamKey::from(u.arbitrary::<u16>()?);
        let len = u.int_in_range(0..=30)?;
        let value = Bytes::copy_from_slice(u.bytes(len)?);
        Ok(Self { key, value })
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Record {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self {
            name: u.arbitrary()?,
            rdata: u.arbitrary()?,
            rclass: u.arbitrary()?,
            // the decoder zeroes MSB-set TTLs, so don't generate them
            ttl: u.arbitrary::<u32>()? & 0x7fff_ffff,
        })
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Rdata {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let len = u.int_in_range(0..=64)?;
        let octets = Bytes::copy_from_slice(u.bytes(len)?);

        let rdata = match u.arbitrary::<RecordType>()? {
            RecordType::A => Rdata::A {
                address: u.arbitrary()?,
            },
            RecordType::AAAA => Rdata::Aaaa {
                address: u.arbitrary()?,
            },
            RecordType::CNAME => Rdata::Cname {
                target: u.arbitrary()?,
            },
            RecordType::NS => Rdata::Ns {
                nsdname: u.arbitrary()?,
            },
            RecordType::PTR => Rdata::Ptr {
                target: u.arbitrary()?,
            },
            RecordType::MX => Rdata::Mx {
                preference: u.arbitrary()?,
                exchange: u.arbitrary()?,
            },
            RecordType::TXT => {
                let count = u.int_in_range(1..=3)?;
                let mut strings = Vec::with_capacity(count);
                for _ in 0..count {
                    let len = u.int_in_range(0..=30)?;
                    strings.push(Bytes::copy_from_slice(u.bytes(len)?));
                }
                Rdata::Txt { strings }
            }
            RecordType::SOA => Rdata::Soa {
                mname: u.arbitrary()?,
                rname: u.arbitrary()?,
                serial: u.arbitrary()?,
                refresh: u.arbitrary()?,
                retry: u.arbitrary()?,
                expire: u.arbitrary()?,
                minimum: u.arbitrary()?,
            },
            RecordType::SRV => Rdata::Srv {
                priority: u.arbitrary()?,
                weight: u.arbitrary()?,
                port: u.arbitrary()?,
                target: u.arbitrary()?,
            },
            RecordType::NAPTR => Rdata::Naptr {
                order: u.arbitrary()?,
                preference: u.arbitrary()?,
                flags: arbitrary_string(u)?,
                service: arbitrary_string(u)?,
                regexp: arbitrary_string(u)?,
                replacement: u.arbitrary()?,
            },
            RecordType::CAA => {
                let tag_len = u.int_in_range(1..=10)?;
                Rdata::Caa {
                    flags: u.arbitrary()?,
                    tag: Bytes::copy_from_slice(u.bytes(tag_len)?),
                    value: octets,
                }
            }
            RecordType::TLSA => Rdata::Tlsa {
                usage: u.arbitrary()?,
                selector: u.arbitrary()?,
                matching: u.arbitrary()?,
                certificate: octets,
            },
            RecordType::URI => Rdata::Uri {
                priority: u.arbitrary()?,
                weight: u.arbitrary()?,
                target: octets,
            },
            RecordType::SVCB => Rdata::Svcb {
                priority: u.arbitrary()?,
                target: u.arbitrary()?,
                params: arbitrary_params(u)?,
            },
            RecordType::HTTPS => Rdata::Https {
                priority: u.arbitrary()?,
                target: u.arbitrary()?,
                params: arbitrary_params(u)?,
            },
            // never generated, see the RecordType impl
            RecordType::OPT => unreachable!(),
            RecordType::Unknown(tag) => Rdata::Unknown { tag, octets },
        };
        Ok(rdata)
    }
}

#[cfg(any(feature = "test-util", test))]
fn arbitrary_string(u: &mut arbitrary::Unstructured) -> arbitrary::Result<Bytes> {
    let len = u.int_in_range(0..=20)?;
    Ok(Bytes::copy_from_slice(u.bytes(len)?))
}

#[cfg(any(feature = "test-util", test))]
fn arbitrary_params(u: &mut arbitrary::Unstructured) -> arbitrary::Result<Vec<SvcParam>> {
    let count = u.int_in_range(0..=3)?;
    let mut params = Vec::with_capacity(count);
    for _ in 0..count {
        params.push(u.arbitrary()?);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_recordtype_roundtrip() {
        for i in 0..300 {
            assert_eq!(u16::from(RecordType::from(i)), i);
        }
    }

    #[test]
    fn u16_recordclass_roundtrip() {
        for i in 0..100 {
            assert_eq!(u16::from(RecordClass::from(i)), i);
        }
    }

    #[test]
    fn u16_svcparamkey_roundtrip() {
        for i in 0..100 {
            assert_eq!(u16::from(SvcParamKey::from(i)), i);
        }
    }

    #[test]
    fn recordtype_from_str() {
        assert_eq!(Ok(RecordType::HTTPS), RecordType::from_str("HTTPS"));
        assert_eq!(Ok(RecordType::from(999)), RecordType::from_str("TYPE999"));
        assert_eq!(
            Err(RecordTypeFromStr::NoParse),
            RecordType::from_str("nonsense")
        );
    }

    #[test]
    fn unknown_rdata_displays_rfc3597() {
        let rdata = match RecordType::from(999) {
            RecordType::Unknown(tag) => Rdata::Unknown {
                tag,
                octets: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
            },
            _ => unreachable!(),
        };
        assert_eq!("\\# 4 deadbeef", rdata.to_string());
    }
}
