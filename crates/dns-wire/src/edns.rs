//! EDNS(0), RFC 6891.
//!
//! The OPT pseudo-record repurposes the CLASS field as the sender's
//! maximum UDP payload size and the TTL field as a bundle of extended
//! rcode bits, a version number, and flags:
//!
//! ```text
//!                 +0 (MSB)                            +1 (LSB)
//!      +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//!   0: |         EXTENDED-RCODE        |            VERSION            |
//!      +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//!   2: | DO|                           Z                               |
//!      +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! ```
//!
//! RDATA is a sequence of (option-code, option-length, value) triples.

use bytes::Bytes;
use std::fmt;

/// The UDP payload size advertised when the caller does not pick one.
/// 1232 avoids IPv6 fragmentation on almost every path (the DNS flag
/// day 2020 value).
pub const DEFAULT_UDP_PAYLOAD_SIZE: u16 = 1232;

/// The EDNS(0) information carried by one OPT record.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Edns {
    /// Maximum UDP payload size the sender can reassemble, from the
    /// OPT record's CLASS field.
    pub udp_payload_size: u16,

    /// The upper 8 bits of the 12-bit extended rcode.  Combined with
    /// the header's 4-bit rcode by `Message::extended_rcode`.
    pub extended_rcode: u8,

    /// EDNS version.  Only version 0 is specified.
    pub version: u8,

    /// The DO bit: the sender can handle DNSSEC records.
    pub dnssec_ok: bool,

    /// The remaining 15 flag bits, all currently must-be-zero but
    /// preserved as received.
    pub flags: u16,

    /// Options in wire order.
    pub options: Vec<EdnsOption>,
}

impl Edns {
    pub fn new(udp_payload_size: u16) -> Self {
        Self {
            udp_payload_size,
            extended_rcode: 0,
            version: 0,
            dnssec_ok: false,
            flags: 0,
            options: Vec::new(),
        }
    }

    /// The packed value of the OPT record's TTL field.
    pub fn ttl_field(&self) -> u32 {
        (u32::from(self.extended_rcode) << 24)
            | (u32::from(self.version) << 16)
            | (u32::from(self.dnssec_ok) << 15)
            | u32::from(self.flags & 0x7fff)
    }

    /// The inverse of [`Edns::ttl_field`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_ttl_field(udp_payload_size: u16, ttl: u32) -> Self {
        Self {
            udp_payload_size,
            extended_rcode: (ttl >> 24) as u8,
            version: (ttl >> 16) as u8,
            dnssec_ok: ttl & 0x8000 != 0,
            flags: (ttl & 0x7fff) as u16,
            options: Vec::new(),
        }
    }

    pub fn option(&self, code: OptionCode) -> Option<&EdnsOption> {
        self.options.iter().find(|o| o.code == code)
    }
}

impl Default for Edns {
    fn default() -> Self {
        Self::new(DEFAULT_UDP_PAYLOAD_SIZE)
    }
}

/// A single EDNS option: a code and its raw value.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EdnsOption {
    pub code: OptionCode,
    pub data: Bytes,
}

/// EDNS option codes.  Unknown codes pass through preserved.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum OptionCode {
    /// Name-server identifier, RFC 5001.
    Nsid,
    /// Client subnet, RFC 7871.
    ClientSubnet,
    /// DNS cookies, RFC 7873.
    Cookie,
    /// Padding, RFC 7830.
    Padding,
    Unknown(u16),
}

impl From<u16> for OptionCode {
    fn from(value: u16) -> Self {
        match value {
            3 => OptionCode::Nsid,
            8 => OptionCode::ClientSubnet,
            10 => OptionCode::Cookie,
            12 => OptionCode::Padding,
            other => OptionCode::Unknown(other),
        }
    }
}

impl From<OptionCode> for u16 {
    fn from(value: OptionCode) -> Self {
        match value {
            OptionCode::Nsid => 3,
            OptionCode::ClientSubnet => 8,
            OptionCode::Cookie => 10,
            OptionCode::Padding => 12,
            OptionCode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for OptionCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OptionCode::Nsid => write!(f, "NSID"),
            OptionCode::ClientSubnet => write!(f, "CLIENT-SUBNET"),
            OptionCode::Cookie => write!(f, "COOKIE"),
            OptionCode::Padding => write!(f, "PADDING"),
            OptionCode::Unknown(n) => write!(f, "OPT{n}"),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Edns {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut options = Vec::new();
        for _ in 0..u.int_in_range(0..=2)? {
            let code = OptionCode::from(u.arbitrary::<u16>()?);
            let len = u.int_in_range(0..=20)?;
            options.push(EdnsOption {
                code,
                data: Bytes::copy_from_slice(u.bytes(len)?),
            });
        }
        Ok(Self {
            udp_payload_size: u.arbitrary()?,
            extended_rcode: u.arbitrary()?,
            version: u.arbitrary()?,
            dnssec_ok: u.arbitrary()?,
            flags: u.arbitrary::<u16>()? & 0x7fff,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_field_roundtrip() {
        let mut edns = Edns::new(4096);
        edns.extended_rcode = 0xab;
        edns.version = 1;
        edns.dnssec_ok = true;
        edns.flags = 0x1234;

        let ttl = edns.ttl_field();
        assert_eq!(0xab01_9234, ttl);
        assert_eq!(edns, Edns::from_ttl_field(4096, ttl));
    }

    #[test]
    fn u16_optioncode_roundtrip() {
        for i in 0..30 {
            assert_eq!(u16::from(OptionCode::from(i)), i);
        }
    }

    #[test]
    fn option_lookup_by_code() {
        let mut edns = Edns::default();
        edns.options.push(EdnsOption {
            code: OptionCode::Nsid,
            data: Bytes::from_static(b"ns1"),
        });
        assert!(edns.option(OptionCode::Nsid).is_some());
        assert!(edns.option(OptionCode::Cookie).is_none());
    }
}
