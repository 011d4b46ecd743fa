//! Serialisation of DNS messages to the wire format.  See the other
//! modules for details of the format.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use crate::edns::Edns;
use crate::message::*;
use crate::name::Name;
use crate::rdata::{Rdata, Record, RecordType};

impl Message {
    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn to_octets(&self) -> Result<BytesMut, Error> {
        let mut writer = WireWriter::default();
        self.serialise(&mut writer)?;
        Ok(writer.octets)
    }

    /// Like `to_octets`, but with name compression disabled.  Both
    /// forms decode to the same message.
    ///
    /// # Errors
    ///
    /// If the message is invalid.
    pub fn to_uncompressed_octets(&self) -> Result<BytesMut, Error> {
        let mut writer = WireWriter::without_compression();
        self.serialise(&mut writer)?;
        Ok(writer.octets)
    }

    /// # Errors
    ///
    /// If the message is invalid.
    pub fn serialise(&self, writer: &mut WireWriter) -> Result<(), Error> {
        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount = usize_to_u16(self.additional.len() + usize::from(self.edns.is_some()))?;

        self.header.serialise(writer);
        writer.write_u16(qdcount);
        writer.write_u16(ancount);
        writer.write_u16(nscount);
        writer.write_u16(arcount);

        for question in &self.questions {
            question.serialise(writer);
        }
        for rr in &self.answers {
            rr.serialise(writer)?;
        }
        for rr in &self.authority {
            rr.serialise(writer)?;
        }
        for rr in &self.additional {
            rr.serialise(writer)?;
        }
        if let Some(edns) = &self.edns {
            edns.serialise(writer)?;
        }

        Ok(())
    }
}

impl Header {
    pub fn serialise(&self, writer: &mut WireWriter) {
        // octet 1
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        // octet 2
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let flag_ad = if self.authentic_data {
            HEADER_MASK_AD
        } else {
            0
        };
        let flag_cd = if self.checking_disabled {
            HEADER_MASK_CD
        } else {
            0
        };
        let field_rcode = HEADER_MASK_RCODE & u8::from(self.rcode);

        writer.write_u16(self.id);
        writer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        writer.write_u8(flag_ra | flag_ad | flag_cd | field_rcode);
    }
}

impl Question {
    pub fn serialise(&self, writer: &mut WireWriter) {
        self.name.serialise(writer, true);
        writer.write_u16(self.qtype.into());
        writer.write_u16(self.qclass.into());
    }
}

impl Record {
    /// # Errors
    ///
    /// If the RDATA is too long.
    pub fn serialise(&self, writer: &mut WireWriter) -> Result<(), Error> {
        self.name.serialise(writer, true);
        writer.write_u16(self.rtype().into());
        writer.write_u16(self.rclass.into());
        writer.write_u32(self.ttl);

        let rdlength_site = writer.begin_rdata();

        // domain names inside RDATA are written without compression:
        // receivers are only required to decompress the RFC 1035 types,
        // and RFC 3597 forbids compression in the newer ones.
        match &self.rdata {
            Rdata::A { address } => writer.write_octets(&address.octets()),
            Rdata::Aaaa { address } => writer.write_octets(&address.octets()),
            Rdata::Cname { target } => target.serialise(writer, false),
            Rdata::Ns { nsdname } => nsdname.serialise(writer, false),
            Rdata::Ptr { target } => target.serialise(writer, false),
            Rdata::Mx {
                preference,
                exchange,
            } => {
                writer.write_u16(*preference);
                exchange.serialise(writer, false);
            }
            Rdata::Txt { strings } => {
                for s in strings {
                    writer.write_character_string(s)?;
                }
            }
            Rdata::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(writer, false);
                rname.serialise(writer, false);
                writer.write_u32(*serial);
                writer.write_u32(*refresh);
                writer.write_u32(*retry);
                writer.write_u32(*expire);
                writer.write_u32(*minimum);
            }
            Rdata::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                writer.write_u16(*priority);
                writer.write_u16(*weight);
                writer.write_u16(*port);
                target.serialise(writer, false);
            }
            Rdata::Naptr {
                order,
                preference,
                flags,
                service,
                regexp,
                replacement,
            } => {
                writer.write_u16(*order);
                writer.write_u16(*preference);
                writer.write_character_string(flags)?;
                writer.write_character_string(service)?;
                writer.write_character_string(regexp)?;
                replacement.serialise(writer, false);
            }
            Rdata::Caa { flags, tag, value } => {
                writer.write_u8(*flags);
                writer.write_character_string(tag)?;
                writer.write_octets(value);
            }
            Rdata::Tlsa {
                usage,
                selector,
                matching,
                certificate,
            } => {
                writer.write_u8(*usage);
                writer.write_u8(*selector);
                writer.write_u8(*matching);
                writer.write_octets(certificate);
            }
            Rdata::Uri {
                priority,
                weight,
                target,
            } => {
                writer.write_u16(*priority);
                writer.write_u16(*weight);
                writer.write_octets(target);
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
                writer.write_u16(*priority);
                target.serialise(writer, false);
                for param in params {
                    writer.write_u16(param.key.into());
                    writer.write_u16(usize_to_u16(param.value.len())?);
                    writer.write_octets(&param.value);
                }
            }
            Rdata::Unknown { octets, .. } => writer.write_octets(octets),
        }

        writer.end_rdata(rdlength_site)
    }
}

impl Edns {
    /// Serialise as an OPT pseudo-record: root owner, the payload size
    /// in the CLASS field, the packed TTL field, options as RDATA.
    ///
    /// # Errors
    ///
    /// If an option value is too long.
    pub fn serialise(&self, writer: &mut WireWriter) -> Result<(), Error> {
        Name::root().serialise(writer, false);
        writer.write_u16(RecordType::OPT.into());
        writer.write_u16(self.udp_payload_size);
        writer.write_u32(self.ttl_field());

        let rdlength_site = writer.begin_rdata();
        for option in &self.options {
            writer.write_u16(option.code.into());
            writer.write_u16(usize_to_u16(option.data.len())?);
            writer.write_octets(&option.data);
        }
        writer.end_rdata(rdlength_site)
    }
}

impl Name {
    pub fn serialise(&self, writer: &mut WireWriter, compress: bool) {
        if compress {
            if let Some(ptr) = writer.name_pointer(self) {
                writer.write_u16(ptr);
                return;
            }
        }

        writer.memoise_name(self);
        for label in self.labels() {
            writer.write_u8(label.len());
            writer.write_octets(label.octets());
        }
        writer.write_u8(0);
    }
}

/// Errors encountered when serialising a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A counter or length does not fit in the desired width.
    CounterTooLarge { counter: usize, bits: u32 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CounterTooLarge { counter, bits } => {
                write!(f, "'{counter}' cannot be converted to a u{bits}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which can be written to, for serialisation purposes.
/// Remembers the position of every name it has written so later
/// occurrences can be replaced by compression pointers.
pub struct WireWriter {
    pub octets: BytesMut,
    name_pointers: Option<HashMap<Name, u16>>,
}

impl Default for WireWriter {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
            name_pointers: Some(HashMap::new()),
        }
    }
}

impl WireWriter {
    /// A writer which never emits compression pointers.
    pub fn without_compression() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
            name_pointers: None,
        }
    }

    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn memoise_name(&mut self, name: &Name) {
        let index = self.index();
        if let Some(pointers) = &mut self.name_pointers {
            if !name.is_root() && !pointers.contains_key(name) {
                // a compression pointer only has 14 bits of offset
                if let Ok(index) = u16::try_from(index) {
                    if index <= 0b0011_1111_1111_1111 {
                        let [hi, lo] = index.to_be_bytes();
                        pointers.insert(name.clone(), u16::from_be_bytes([hi | 0b1100_0000, lo]));
                    }
                }
            }
        }
    }

    pub fn name_pointer(&self, name: &Name) -> Option<u16> {
        self.name_pointers.as_ref()?.get(name).copied()
    }

    /// Reserve the RDLENGTH slot, returning its position for
    /// [`WireWriter::end_rdata`] to fill in.
    pub fn begin_rdata(&mut self) -> usize {
        let site = self.index();
        self.write_u16(0);
        site
    }

    /// Backpatch the RDLENGTH written at `site` with the number of
    /// octets written since.
    ///
    /// # Errors
    ///
    /// If the RDATA is longer than a u16 can describe.
    pub fn end_rdata(&mut self, site: usize) -> Result<(), Error> {
        // -2 so we don't also include the 2 octets for the rdlength
        let rdlength = usize_to_u16(self.index() - site - 2)?;
        let [hi, lo] = rdlength.to_be_bytes();
        self.octets[site] = hi;
        self.octets[site + 1] = lo;
        Ok(())
    }

    /// Write a length-prefixed character string.
    ///
    /// # Errors
    ///
    /// If the string is longer than 255 octets.
    pub fn write_character_string(&mut self, octets: &[u8]) -> Result<(), Error> {
        let len = if let Ok(len) = u8::try_from(octets.len()) {
            len
        } else {
            return Err(Error::CounterTooLarge {
                counter: octets.len(),
                bits: u8::BITS,
            });
        };
        self.write_u8(len);
        self.write_octets(octets);
        Ok(())
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.put_u8(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_octets(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_octets(&value.to_be_bytes());
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.put_slice(octets);
    }
}

/// Helper function to convert a `usize` into a `u16` (or return an error).
///
/// # Errors
///
/// If the value cannot be converted.
fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    if let Ok(t) = u16::try_from(counter) {
        Ok(t)
    } else {
        Err(Error::CounterTooLarge {
            counter,
            bits: u16::BITS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::test_util::*;
    use crate::rdata::Rdata;

    #[test]
    #[rustfmt::skip]
    fn name_compression_opt_in() {
        let mut writer = WireWriter::default();
        writer.write_u8(1);
        writer.write_u8(2);
        writer.write_u8(3);
        writer.write_u8(4);
        domain("www.example.com").serialise(&mut writer, true);
        domain("www.example.com").serialise(&mut writer, true);

        assert_eq!(
            vec![
                1, 2, 3, 4,
                // name 1
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // name 2
                0b1100_0000, 0b0000_0100 // pointer
            ],
            writer.octets,
        );
    }

    #[test]
    #[rustfmt::skip]
    fn name_compression_opt_out() {
        let mut writer = WireWriter::without_compression();
        domain("www.example.com").serialise(&mut writer, true);
        domain("www.example.com").serialise(&mut writer, true);

        assert_eq!(
            vec![
                3, 119, 119, 119,
                7, 101, 120, 97, 109, 112, 108, 101,
                3, 99, 111, 109, 0,
                3, 119, 119, 119,
                7, 101, 120, 97, 109, 112, 108, 101,
                3, 99, 111, 109, 0,
            ],
            writer.octets,
        );
    }

    #[test]
    fn compression_is_case_sensitive() {
        // a memoised name must not stand in for a differently-cased
        // one, or 0x20 echoes would be corrupted
        let mut writer = WireWriter::default();
        domain("www.example.com").serialise(&mut writer, true);
        let before = writer.index();
        domain("WWW.example.com").serialise(&mut writer, true);
        // full labels, not a 2-octet pointer
        assert_eq!(writer.index() - before, 17);
    }

    #[test]
    #[rustfmt::skip]
    fn record_sets_rdlength() {
        let mut writer = WireWriter::default();
        let rr = mx_record("www.example.com", 32, "mx.example.com");
        rr.serialise(&mut writer).unwrap();

        assert_eq!(
            vec![
                // NAME
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // TYPE
                0b0000_0000, 0b0000_1111, // MX
                // CLASS
                0b0000_0000, 0b0000_0001, // IN
                // TTL
                0b0000_0000, 0b0000_0000, 0b0000_0001, 0b0010_1100, // 300
                // RDLENGTH
                0b0000_0000, 0b0001_0010, // 18 octets
                // RDATA
                0, 32, // preference
                2, 109, 120, // "mx"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
            ],
            writer.octets,
        );
    }

    #[test]
    #[rustfmt::skip]
    fn edns_serialises_as_trailing_opt() {
        let mut message = Message::new_query(0x0102, question("x", crate::rdata::RecordType::A));
        message = message.with_edns(crate::edns::Edns::new(1232));
        let octets = message.to_octets().unwrap();

        assert_eq!(
            vec![
                1, 2, // id
                0b0000_0001, 0, // flags: RD
                0, 1, 0, 0, 0, 0, 0, 1, // counts: 1 question, 1 additional
                1, 120, 0, // "x"
                0, 1, // QTYPE A
                0, 1, // QCLASS IN
                // the OPT record
                0, // root owner
                0, 41, // TYPE
                0b0000_0100, 0b1101_0000, // CLASS = 1232
                0, 0, 0, 0, // TTL
                0, 0, // RDLENGTH
            ],
            octets,
        );
    }

    #[test]
    fn character_string_too_long() {
        let mut writer = WireWriter::default();
        let long = vec![0u8; 256];
        assert!(writer.write_character_string(&long).is_err());

        let rr = crate::rdata::Record {
            name: domain("x"),
            rdata: Rdata::Txt {
                strings: vec![bytes::Bytes::from(vec![0u8; 300])],
            },
            rclass: crate::rdata::RecordClass::IN,
            ttl: 0,
        };
        let mut writer = WireWriter::default();
        assert!(rr.serialise(&mut writer).is_err());
    }
}
