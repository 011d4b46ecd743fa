//! Deserialisation of DNS messages from the network.  See the other
//! modules for details of the format.
//!
//! The parser never panics on hostile input: every structural rule is
//! an `Error` variant, and a failed parse leaves nothing half-built.

use bytes::{Buf, Bytes};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::edns::{Edns, EdnsOption, OptionCode};
use crate::message::*;
use crate::name::{Label, Name, NAME_MAX_ENCODED_LEN};
use crate::rdata::{Rdata, Record, RecordClass, RecordType, SvcParam, SvcParamKey};

impl Message {
    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        if octets.len() < 12 {
            return Err(Error::MessageTooShort);
        }

        let mut reader = WireReader::new(Bytes::copy_from_slice(octets));
        let message = Self::deserialise(&mut reader)?;

        // a message must account for every octet: trailing garbage is
        // as suspect as a short read
        if reader.remaining() != 0 {
            return Err(Error::TrailingOctets);
        }

        Ok(message)
    }

    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn deserialise(reader: &mut WireReader) -> Result<Self, Error> {
        let wire_header = WireHeader::deserialise(reader)?;
        let mut questions = Vec::with_capacity(wire_header.qdcount.into());
        let mut answers = Vec::with_capacity(wire_header.ancount.into());
        let mut authority = Vec::with_capacity(wire_header.nscount.into());
        let mut additional = Vec::new();
        let mut edns = None;

        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(reader)?);
        }
        for _ in 0..wire_header.ancount {
            match SectionEntry::deserialise(reader)? {
                SectionEntry::Record(rr) => answers.push(rr),
                SectionEntry::Opt(_) => return Err(Error::MisplacedOpt),
            }
        }
        for _ in 0..wire_header.nscount {
            match SectionEntry::deserialise(reader)? {
                SectionEntry::Record(rr) => authority.push(rr),
                SectionEntry::Opt(_) => return Err(Error::MisplacedOpt),
            }
        }
        for _ in 0..wire_header.arcount {
            match SectionEntry::deserialise(reader)? {
                SectionEntry::Record(rr) => additional.push(rr),
                SectionEntry::Opt(parsed) => {
                    if edns.is_some() {
                        return Err(Error::RepeatedOpt);
                    }
                    edns = Some(parsed);
                }
            }
        }

        Ok(Self {
            header: wire_header.header,
            questions,
            answers,
            authority,
            additional,
            edns,
        })
    }
}

/// The header together with the section counts, which exist only on
/// the wire.
pub struct WireHeader {
    pub header: Header,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl WireHeader {
    /// # Errors
    ///
    /// If the header is too short.
    pub fn deserialise(reader: &mut WireReader) -> Result<Self, Error> {
        let id = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;
        let flags1 = reader.next_u8().ok_or(Error::UnexpectedEndOfInput)?;
        let flags2 = reader.next_u8().ok_or(Error::UnexpectedEndOfInput)?;
        let qdcount = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;
        let ancount = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;
        let nscount = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;
        let arcount = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;

        Ok(Self {
            header: Header {
                id,
                is_response: flags1 & HEADER_MASK_QR != 0,
                opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
                is_authoritative: flags1 & HEADER_MASK_AA != 0,
                is_truncated: flags1 & HEADER_MASK_TC != 0,
                recursion_desired: flags1 & HEADER_MASK_RD != 0,
                recursion_available: flags2 & HEADER_MASK_RA != 0,
                authentic_data: flags2 & HEADER_MASK_AD != 0,
                checking_disabled: flags2 & HEADER_MASK_CD != 0,
                rcode: Rcode::from(flags2 & HEADER_MASK_RCODE),
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    /// # Errors
    ///
    /// If the question cannot be parsed.
    pub fn deserialise(reader: &mut WireReader) -> Result<Self, Error> {
        let name = Name::deserialise(reader)?;
        let qtype = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;
        let qclass = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;

        Ok(Self {
            name,
            qtype: QueryType::from(qtype),
            qclass: QueryClass::from(qclass),
        })
    }
}

/// One parsed entry of an answer, authority, or additional section:
/// either a real record, or the OPT pseudo-record.
enum SectionEntry {
    Record(Record),
    Opt(Edns),
}

impl SectionEntry {
    fn deserialise(reader: &mut WireReader) -> Result<Self, Error> {
        let name = Name::deserialise(reader)?;
        let rtype = RecordType::from(reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?);
        let class = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;
        let ttl = reader.next_u32().ok_or(Error::UnexpectedEndOfInput)?;
        let rdlength = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;

        if rtype == RecordType::OPT {
            if !name.is_root() {
                return Err(Error::MisplacedOpt);
            }
            // CLASS carries the payload size and TTL the extended
            // rcode/version/flags; neither is a class or a ttl here
            let mut edns = Edns::from_ttl_field(class, ttl);
            edns.options = deserialise_options(reader, rdlength)?;
            return Ok(SectionEntry::Opt(edns));
        }

        let rdata = Rdata::deserialise(reader, rtype, rdlength)?;

        Ok(SectionEntry::Record(Record {
            name,
            rdata,
            rclass: RecordClass::from(class),
            ttl: clamp_ttl(ttl),
        }))
    }
}

/// RFC 2181 section 8: a TTL with the most significant bit set is
/// treated as if the entire value were zero.
fn clamp_ttl(ttl: u32) -> u32 {
    if ttl & 0x8000_0000 == 0 {
        ttl
    } else {
        0
    }
}

fn deserialise_options(reader: &mut WireReader, rdlength: u16) -> Result<Vec<EdnsOption>, Error> {
    let rdata_end = reader.position() + usize::from(rdlength);
    let mut options = Vec::new();

    while reader.position() < rdata_end {
        let code = reader.next_u16().ok_or(Error::OptionLength)?;
        let len = reader.next_u16().ok_or(Error::OptionLength)?;
        let data = reader
            .take(usize::from(len))
            .ok_or(Error::OptionLength)?;
        options.push(EdnsOption {
            code: OptionCode::from(code),
            data,
        });
    }

    if reader.position() == rdata_end {
        Ok(options)
    } else {
        Err(Error::OptionLength)
    }
}

impl Rdata {
    /// Decode the RDATA of a record of the given type.  Consumes
    /// exactly `rdlength` octets or fails.
    ///
    /// # Errors
    ///
    /// If the record cannot be parsed.
    #[allow(clippy::missing_panics_doc)]
    pub fn deserialise(
        reader: &mut WireReader,
        rtype: RecordType,
        rdlength: u16,
    ) -> Result<Self, Error> {
        let rdata_start = reader.position();
        let rdata_end = rdata_start + usize::from(rdlength);

        let rest = |reader: &mut WireReader| -> Result<Bytes, Error> {
            let remaining = rdata_end
                .checked_sub(reader.position())
                .ok_or(Error::RecordLength)?;
            reader.take(remaining).ok_or(Error::UnexpectedEndOfInput)
        };

        let rdata = match rtype {
            RecordType::A => Rdata::A {
                address: Ipv4Addr::from(
                    reader.next_u32().ok_or(Error::UnexpectedEndOfInput)?,
                ),
            },
            RecordType::AAAA => {
                let octets = reader.take(16).ok_or(Error::UnexpectedEndOfInput)?;
                // safe: take(16) returned exactly 16 octets
                let array: [u8; 16] = octets.as_ref().try_into().unwrap();
                Rdata::Aaaa {
                    address: Ipv6Addr::from(array),
                }
            }
            RecordType::CNAME => Rdata::Cname {
                target: Name::deserialise(reader)?,
            },
            RecordType::NS => Rdata::Ns {
                nsdname: Name::deserialise(reader)?,
            },
            RecordType::PTR => Rdata::Ptr {
                target: Name::deserialise(reader)?,
            },
            RecordType::MX => Rdata::Mx {
                preference: reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?,
                exchange: Name::deserialise(reader)?,
            },
            RecordType::TXT => {
                // one or more character strings filling exactly RDLEN
                if rdlength == 0 {
                    return Err(Error::RecordInvalid);
                }
                let mut strings = Vec::new();
                while reader.position() < rdata_end {
                    strings.push(read_character_string(reader)?);
                }
                Rdata::Txt { strings }
            }
            RecordType::SOA => Rdata::Soa {
                mname: Name::deserialise(reader)?,
                rname: Name::deserialise(reader)?,
                serial: reader.next_u32().ok_or(Error::UnexpectedEndOfInput)?,
                refresh: reader.next_u32().ok_or(Error::UnexpectedEndOfInput)?,
                retry: reader.next_u32().ok_or(Error::UnexpectedEndOfInput)?,
                expire: reader.next_u32().ok_or(Error::UnexpectedEndOfInput)?,
                minimum: reader.next_u32().ok_or(Error::UnexpectedEndOfInput)?,
            },
            RecordType::SRV => Rdata::Srv {
                priority: reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?,
                weight: reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?,
                port: reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?,
                target: Name::deserialise(reader)?,
            },
            RecordType::NAPTR => Rdata::Naptr {
                order: reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?,
                preference: reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?,
                flags: read_character_string(reader)?,
                service: read_character_string(reader)?,
                regexp: read_character_string(reader)?,
                replacement: Name::deserialise(reader)?,
            },
            RecordType::CAA => {
                let flags = reader.next_u8().ok_or(Error::UnexpectedEndOfInput)?;
                let tag = read_character_string(reader)?;
                if tag.is_empty() {
                    return Err(Error::RecordInvalid);
                }
                Rdata::Caa {
                    flags,
                    tag,
                    value: rest(reader)?,
                }
            }
            RecordType::TLSA => Rdata::Tlsa {
                usage: reader.next_u8().ok_or(Error::UnexpectedEndOfInput)?,
                selector: reader.next_u8().ok_or(Error::UnexpectedEndOfInput)?,
                matching: reader.next_u8().ok_or(Error::UnexpectedEndOfInput)?,
                certificate: rest(reader)?,
            },
            RecordType::URI => Rdata::Uri {
                priority: reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?,
                weight: reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?,
                target: rest(reader)?,
            },
            RecordType::SVCB => {
                let (priority, target, params) = deserialise_svcb(reader, rdata_end)?;
                Rdata::Svcb {
                    priority,
                    target,
                    params,
                }
            }
            RecordType::HTTPS => {
                let (priority, target, params) = deserialise_svcb(reader, rdata_end)?;
                Rdata::Https {
                    priority,
                    target,
                    params,
                }
            }
            // handled at the section level before rdata decoding
            RecordType::OPT => return Err(Error::MisplacedOpt),
            RecordType::Unknown(tag) => Rdata::Unknown {
                tag,
                octets: rest(reader)?,
            },
        };

        if reader.position() == rdata_end {
            Ok(rdata)
        } else {
            Err(Error::RecordLength)
        }
    }
}

fn deserialise_svcb(
    reader: &mut WireReader,
    rdata_end: usize,
) -> Result<(u16, Name, Vec<SvcParam>), Error> {
    let priority = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;
    let target = Name::deserialise(reader)?;

    let mut params = Vec::new();
    while reader.position() < rdata_end {
        let key = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;
        let len = reader.next_u16().ok_or(Error::UnexpectedEndOfInput)?;
        let value = reader
            .take(usize::from(len))
            .ok_or(Error::UnexpectedEndOfInput)?;
        params.push(SvcParam {
            key: SvcParamKey::from(key),
            value,
        });
    }

    Ok((priority, target, params))
}

fn read_character_string(reader: &mut WireReader) -> Result<Bytes, Error> {
    let len = reader.next_u8().ok_or(Error::UnexpectedEndOfInput)?;
    reader
        .take(usize::from(len))
        .ok_or(Error::UnexpectedEndOfInput)
}

impl Name {
    /// Decode a name, following compression pointers.
    ///
    /// Pointers may only point strictly backwards, and each pointer in
    /// a chain must point strictly before the previous one, so
    /// decoding always terminates without cycle detection.  The
    /// reader's position advances only over the octets at the original
    /// site: a pointer consumes two.
    ///
    /// # Errors
    ///
    /// If the name cannot be parsed.
    #[allow(clippy::missing_panics_doc)]
    pub fn deserialise(reader: &mut WireReader) -> Result<Self, Error> {
        let mut labels = Vec::new();
        let mut encoded_len = 1usize;
        // every pointer target must be strictly below this
        let mut limit = reader.position();
        // once the first pointer is followed, reading continues in a
        // detached cursor so the caller's position is untouched
        let mut cursor: Option<WireReader> = None;

        loop {
            let r = match cursor.as_mut() {
                Some(c) => c,
                None => &mut *reader,
            };

            let size = r.next_u8().ok_or(Error::UnexpectedEndOfInput)?;
            match size {
                0 => break,
                1..=63 => {
                    encoded_len += 1 + usize::from(size);
                    if encoded_len > NAME_MAX_ENCODED_LEN {
                        return Err(Error::NameTooLong);
                    }
                    let octets = r.take(usize::from(size)).ok_or(Error::UnexpectedEndOfInput)?;
                    // safe: 1 <= size <= 63
                    labels.push(Label::try_from(octets.as_ref()).unwrap());
                }
                0b1100_0000..=0xff => {
                    let lo = r.next_u8().ok_or(Error::UnexpectedEndOfInput)?;
                    let target = usize::from(u16::from_be_bytes([size & 0b0011_1111, lo]));
                    if target >= limit {
                        return Err(Error::PointerNotBackwards);
                    }
                    limit = target;
                    cursor = Some(reader.at_offset(target));
                }
                // the 0b10 and 0b01 prefixes are reserved
                _ => return Err(Error::LabelReserved),
            }
        }

        // the per-label additions above keep encoded_len <= 255
        Ok(Name::from_labels(labels).unwrap())
    }
}

/// Errors encountered when parsing a message.  A resolver surfaces
/// any of these to its caller as a single "bad response" failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// Shorter than the 12-octet header.
    MessageTooShort,

    /// The declared sections need more octets than the message has.
    UnexpectedEndOfInput,

    /// The message is longer than its declared sections.
    TrailingOctets,

    /// A label length has one of the reserved prefixes `10` or `01`.
    LabelReserved,

    /// A compression pointer does not point strictly backwards.
    PointerNotBackwards,

    /// A name decompressed to more than 255 octets.
    NameTooLong,

    /// An rdata decoder did not consume exactly RDLENGTH octets.
    RecordLength,

    /// A structural rule inside some rdata was violated.
    RecordInvalid,

    /// More than one OPT record.
    RepeatedOpt,

    /// An OPT record outside the additional section, or with a
    /// non-root owner name.
    MisplacedOpt,

    /// An EDNS option's length does not match the OPT RDATA.
    OptionLength,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MessageTooShort => write!(f, "message shorter than the header"),
            Error::UnexpectedEndOfInput => write!(f, "message ends mid-field"),
            Error::TrailingOctets => write!(f, "message has octets after the last section"),
            Error::LabelReserved => write!(f, "label length has a reserved prefix"),
            Error::PointerNotBackwards => write!(f, "compression pointer not strictly backwards"),
            Error::NameTooLong => write!(f, "name decompresses to over 255 octets"),
            Error::RecordLength => write!(f, "rdata does not fill its declared length"),
            Error::RecordInvalid => write!(f, "rdata violates its record type's structure"),
            Error::RepeatedOpt => write!(f, "more than one OPT record"),
            Error::MisplacedOpt => write!(f, "OPT record in the wrong place"),
            Error::OptionLength => write!(f, "EDNS option length mismatch"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A reading cursor over a message, the counterpart of the writer's
/// `BytesMut`: the unread tail is a `Bytes` view that the `Buf` reads
/// consume, and taken rdata is a slice of the same shared buffer, not
/// a copy.  Compression-pointer jumps get a cheap sub-reader over the
/// whole message.
pub struct WireReader {
    message: Bytes,
    cursor: Bytes,
}

impl WireReader {
    pub fn new(octets: Bytes) -> Self {
        Self {
            cursor: octets.clone(),
            message: octets,
        }
    }

    /// Offset from the start of the message.
    pub fn position(&self) -> usize {
        self.message.len() - self.cursor.len()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.len()
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        (!self.cursor.is_empty()).then(|| self.cursor.get_u8())
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        (self.cursor.len() >= 2).then(|| self.cursor.get_u16())
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        (self.cursor.len() >= 4).then(|| self.cursor.get_u32())
    }

    pub fn take(&mut self, size: usize) -> Option<Bytes> {
        (self.cursor.len() >= size).then(|| self.cursor.copy_to_bytes(size))
    }

    /// A fresh reader over the same message, positioned at `position`.
    pub fn at_offset(&self, position: usize) -> WireReader {
        Self {
            message: self.message.clone(),
            cursor: self.message.slice(position.min(self.message.len())..),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::test_util::*;

    fn reply_header(id: u16, ancount: u16) -> Vec<u8> {
        let [id_hi, id_lo] = id.to_be_bytes();
        let [an_hi, an_lo] = ancount.to_be_bytes();
        vec![
            id_hi, id_lo, 0b1000_0000, 0, 0, 1, an_hi, an_lo, 0, 0, 0, 0,
        ]
    }

    #[test]
    fn too_short_for_header() {
        assert_eq!(Err(Error::MessageTooShort), Message::from_octets(&[0; 11]));
    }

    #[test]
    #[rustfmt::skip]
    fn parses_compressed_reply() {
        let mut octets = reply_header(0x1234, 1);
        octets.extend_from_slice(&[
            // QNAME www.example.com
            3, b'w', b'w', b'w',
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            3, b'c', b'o', b'm', 0,
            0, 1, // QTYPE A
            0, 1, // QCLASS IN
            // answer: pointer to QNAME
            0b1100_0000, 12,
            0, 1, // TYPE A
            0, 1, // CLASS IN
            0, 0, 1, 0, // TTL 256
            0, 4, // RDLENGTH
            1, 2, 3, 4,
        ]);

        let message = Message::from_octets(&octets).unwrap();
        assert_eq!(0x1234, message.header.id);
        assert!(message.header.is_response);
        assert_eq!(vec![question("www.example.com", RecordType::A)], message.questions);
        assert_eq!(
            vec![Record {
                name: domain("www.example.com"),
                rdata: Rdata::A { address: "1.2.3.4".parse().unwrap() },
                rclass: RecordClass::IN,
                ttl: 256,
            }],
            message.answers
        );
    }

    #[test]
    #[rustfmt::skip]
    fn parses_mx_reply_in_order() {
        let mut octets = reply_header(7, 2);
        octets.extend_from_slice(&[
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0,
            0, 15, 0, 1,
            // 100 mx1.example.com
            0b1100_0000, 12,
            0, 15, 0, 1, 0, 0, 1, 44, 0, 8,
            0, 100, 3, b'm', b'x', b'1', 0b1100_0000, 12,
            // 200 mx2.example.com
            0b1100_0000, 12,
            0, 15, 0, 1, 0, 0, 1, 44, 0, 8,
            0, 200, 3, b'm', b'x', b'2', 0b1100_0000, 12,
        ]);

        let message = Message::from_octets(&octets).unwrap();
        assert_eq!(
            vec![
                mx_record("example.com", 100, "mx1.example.com"),
                mx_record("example.com", 200, "mx2.example.com"),
            ],
            message.answers
        );
    }

    #[test]
    fn rejects_forward_pointer() {
        let mut octets = reply_header(1, 0);
        // pointer to itself: target == current offset
        octets.extend_from_slice(&[0b1100_0000, 12, 0, 1, 0, 1]);
        assert_eq!(
            Err(Error::PointerNotBackwards),
            Message::from_octets(&octets)
        );
    }

    #[test]
    fn rejects_pointer_loop_between_names() {
        let mut octets = reply_header(1, 0);
        // "a" then a pointer back to offset 12, which would re-read
        // the same label and pointer forever without the
        // monotonically-decreasing rule
        octets.extend_from_slice(&[1, b'a', 0b1100_0000, 12, 0, 1, 0, 1]);
        assert_eq!(
            Err(Error::PointerNotBackwards),
            Message::from_octets(&octets)
        );
    }

    #[test]
    fn rejects_reserved_label_prefixes() {
        for prefix in [0b0100_0000u8, 0b1000_0000] {
            let mut octets = reply_header(1, 0);
            octets.extend_from_slice(&[prefix | 1, b'a', 0, 0, 1, 0, 1]);
            assert_eq!(Err(Error::LabelReserved), Message::from_octets(&octets));
        }
    }

    #[test]
    fn rejects_truncated_record() {
        let mut octets = reply_header(1, 1);
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        // the answer section is missing entirely
        assert_eq!(
            Err(Error::UnexpectedEndOfInput),
            Message::from_octets(&octets)
        );
    }

    #[test]
    fn rejects_rdlength_overrunning_buffer() {
        let mut octets = reply_header(1, 1);
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        // TYPE 999 (unknown), CLASS IN, TTL 0, RDLENGTH 50, no rdata
        octets.extend_from_slice(&[1, b'a', 0, 3, 231, 0, 1, 0, 0, 0, 0, 0, 50]);
        assert_eq!(
            Err(Error::UnexpectedEndOfInput),
            Message::from_octets(&octets)
        );
    }

    #[test]
    fn rejects_rdlength_mismatch() {
        let mut octets = reply_header(1, 1);
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        // an A record whose RDLENGTH says 5
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 5, 1, 2, 3, 4, 9]);
        assert_eq!(Err(Error::RecordLength), Message::from_octets(&octets));
    }

    #[test]
    fn rejects_trailing_octets() {
        let mut octets = reply_header(1, 0);
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        octets.push(0);
        assert_eq!(Err(Error::TrailingOctets), Message::from_octets(&octets));
    }

    #[test]
    fn clamps_msb_set_ttls() {
        let mut octets = reply_header(1, 1);
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        octets.extend_from_slice(&[
            1, b'a', 0, 0, 1, 0, 1, 0x80, 0, 0, 1, 0, 4, 1, 2, 3, 4,
        ]);
        let message = Message::from_octets(&octets).unwrap();
        assert_eq!(0, message.answers[0].ttl);
    }

    #[test]
    fn rejects_empty_txt() {
        let mut octets = reply_header(1, 1);
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        octets.extend_from_slice(&[1, b'a', 0, 0, 16, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Err(Error::RecordInvalid), Message::from_octets(&octets));
    }

    #[test]
    fn txt_strings_fill_rdlength_exactly() {
        let mut octets = reply_header(1, 1);
        octets.extend_from_slice(&[1, b'a', 0, 0, 16, 0, 1]);
        octets.extend_from_slice(&[
            1, b'a', 0, 0, 16, 0, 1, 0, 0, 0, 0, 0, 6, 2, b'h', b'i', 3, b'y', b'o', b'u',
        ]);
        // the second string runs one octet past the declared RDLENGTH
        assert_eq!(Err(Error::RecordLength), Message::from_octets(&octets));
    }

    #[test]
    fn preserves_unknown_rdata() {
        let mut octets = reply_header(1, 1);
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        octets.extend_from_slice(&[1, b'a', 0, 3, 231, 0, 1, 0, 0, 0, 0, 0, 2, 0xbe, 0xef]);
        let message = Message::from_octets(&octets).unwrap();
        assert_eq!(RecordType::from(999), message.answers[0].rtype());
        match &message.answers[0].rdata {
            Rdata::Unknown { octets, .. } => assert_eq!(&[0xbe, 0xef][..], &octets[..]),
            other => panic!("expected unknown rdata, got {other:?}"),
        }
    }

    #[test]
    fn lifts_opt_out_of_additional() {
        let mut octets = reply_header(1, 0);
        octets[11] = 1; // arcount
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        octets.extend_from_slice(&[
            0, 0, 41, 0x10, 0x00, 0, 0, 0, 0, 0, 8, 0, 3, 0, 4, b'n', b's', b'1', b'!',
        ]);
        let message = Message::from_octets(&octets).unwrap();
        assert!(message.additional.is_empty());
        let edns = message.edns.unwrap();
        assert_eq!(4096, edns.udp_payload_size);
        assert_eq!(
            &[b'n', b's', b'1', b'!'][..],
            &edns.option(OptionCode::Nsid).unwrap().data[..]
        );
    }

    #[test]
    fn rejects_second_opt() {
        let mut octets = reply_header(1, 0);
        octets[11] = 2; // arcount
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        octets.extend_from_slice(&[0, 0, 41, 0x10, 0x00, 0, 0, 0, 0, 0, 0]);
        octets.extend_from_slice(&[0, 0, 41, 0x10, 0x00, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Err(Error::RepeatedOpt), Message::from_octets(&octets));
    }

    #[test]
    fn rejects_opt_in_answer_section() {
        let mut octets = reply_header(1, 1);
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        octets.extend_from_slice(&[0, 0, 41, 0x10, 0x00, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Err(Error::MisplacedOpt), Message::from_octets(&octets));
    }

    #[test]
    fn rejects_opt_with_nonroot_owner() {
        let mut octets = reply_header(1, 0);
        octets[11] = 1; // arcount
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        octets.extend_from_slice(&[1, b'a', 0, 0, 41, 0x10, 0x00, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Err(Error::MisplacedOpt), Message::from_octets(&octets));
    }

    #[test]
    fn rejects_option_length_mismatch() {
        let mut octets = reply_header(1, 0);
        octets[11] = 1; // arcount
        octets.extend_from_slice(&[1, b'a', 0, 0, 1, 0, 1]);
        // an option claiming 6 octets in 4 octets of rdata
        octets.extend_from_slice(&[0, 0, 41, 0x10, 0x00, 0, 0, 0, 0, 0, 4, 0, 10, 0, 6]);
        assert_eq!(Err(Error::OptionLength), Message::from_octets(&octets));
    }

    #[test]
    fn question_name_case_is_preserved() {
        let mut octets = reply_header(1, 0);
        octets.extend_from_slice(&[4, b'w', b'W', b'w', b'W', 0, 0, 1, 0, 1]);
        let message = Message::from_octets(&octets).unwrap();
        assert_eq!("wWwW", message.questions[0].name.to_string());
    }

    #[test]
    fn name_over_255_octets_via_pointers() {
        // five 62-octet labels chained with pointers: 63 * 5 + 1 > 255
        let mut octets = reply_header(1, 0);
        let mut chain_offsets = Vec::new();
        for i in 0..5 {
            chain_offsets.push(octets.len());
            octets.push(62);
            octets.extend_from_slice(&[b'a' + i; 62]);
            if i == 0 {
                octets.push(0);
            } else {
                let target = u16::try_from(chain_offsets[usize::from(i) - 1]).unwrap();
                let [hi, lo] = target.to_be_bytes();
                octets.push(hi | 0b1100_0000);
                octets.push(lo);
            }
        }
        // make the last chain the question name
        let target = u16::try_from(*chain_offsets.last().unwrap()).unwrap();
        let [hi, lo] = target.to_be_bytes();
        octets.extend_from_slice(&[hi | 0b1100_0000, lo, 0, 1, 0, 1]);

        assert_eq!(Err(Error::NameTooLong), Message::from_octets(&octets));
    }
}
