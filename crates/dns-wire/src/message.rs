//! Basic DNS message format, used for both queries and responses.
//!
//! ```text
//!     +---------------------+
//!     |        Header       |
//!     +---------------------+
//!     |       Question      | the question for the name server
//!     +---------------------+
//!     |        Answer       | RRs answering the question
//!     +---------------------+
//!     |      Authority      | RRs pointing toward an authority
//!     +---------------------+
//!     |      Additional     | RRs holding additional information
//!     +---------------------+
//! ```
//!
//! See section 4.1 of RFC 1035.

use std::fmt;
use std::str::FromStr;

use crate::edns::Edns;
use crate::name::Name;
use crate::rdata::{Record, RecordClass, RecordType};

/// Octet mask for the QR flag being set (response).
pub const HEADER_MASK_QR: u8 = 0b1000_0000;

/// Octet mask for the opcode field.
pub const HEADER_MASK_OPCODE: u8 = 0b0111_1000;

/// Offset for the opcode field.
pub const HEADER_OFFSET_OPCODE: usize = 3;

/// Octet mask for the AA flag being set (authoritative).
pub const HEADER_MASK_AA: u8 = 0b0000_0100;

/// Octet mask for the TC flag being set (truncated).
pub const HEADER_MASK_TC: u8 = 0b0000_0010;

/// Octet mask for the RD flag being set (recursion desired).
pub const HEADER_MASK_RD: u8 = 0b0000_0001;

/// Octet mask for the RA flag being set (recursion available).
pub const HEADER_MASK_RA: u8 = 0b1000_0000;

/// Octet mask for the AD flag being set (authentic data, RFC 4035).
pub const HEADER_MASK_AD: u8 = 0b0010_0000;

/// Octet mask for the CD flag being set (checking disabled, RFC 4035).
pub const HEADER_MASK_CD: u8 = 0b0001_0000;

/// Octet mask for the rcode field.
pub const HEADER_MASK_RCODE: u8 = 0b0000_1111;

/// A whole message.  The section counts of the wire header are not
/// stored: they are implied by the section vectors.  An EDNS(0) OPT
/// pseudo-record, if present, is lifted out of the additional section
/// into [`Message::edns`] by the codec.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
    pub edns: Option<Edns>,
}

impl Message {
    /// A minimal query: one question, standard opcode, recursion
    /// desired.
    pub fn new_query(id: u16, question: Question) -> Self {
        Self {
            header: Header {
                id,
                is_response: false,
                opcode: Opcode::Query,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: true,
                recursion_available: false,
                authentic_data: false,
                checking_disabled: false,
                rcode: Rcode::NoError,
            },
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
        }
    }

    /// The skeleton of a reply to this message: same id and question,
    /// QR set, everything else cleared.  Used when synthesising
    /// responses locally (and by mock servers in tests).
    pub fn make_response(&self) -> Self {
        Self {
            header: Header {
                id: self.header.id,
                is_response: true,
                opcode: self.header.opcode,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: self.header.recursion_desired,
                recursion_available: true,
                authentic_data: false,
                checking_disabled: false,
                rcode: Rcode::NoError,
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
        }
    }

    pub fn with_edns(mut self, edns: Edns) -> Self {
        self.edns = Some(edns);
        self
    }

    /// The response code including EDNS(0) extended-rcode bits.
    pub fn extended_rcode(&self) -> u16 {
        let base = u16::from(u8::from(self.header.rcode));
        match &self.edns {
            Some(edns) => (u16::from(edns.extended_rcode) << 4) | base,
            None => base,
        }
    }
}

/// Common header type for all messages.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      ID                       |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |QR|   Opcode  |AA|TC|RD|RA| Z|AD|CD|   RCODE   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    QDCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ANCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    NSCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ARCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// See section 4.1.1 of RFC 1035, with the AD and CD bits of RFC 4035
/// carved out of the original Z field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that generates any
    /// kind of query.  This identifier is copied into the
    /// corresponding reply and is how the requester matches up replies
    /// to outstanding queries.
    pub id: u16,

    /// Whether this message is a query (false) or a response (true).
    pub is_response: bool,

    /// The kind of query.  Copied into the response.
    pub opcode: Opcode,

    /// Whether the responding name server is an authority for the
    /// domain name in the question section.
    pub is_authoritative: bool,

    /// Whether this message was truncated to fit the transmission
    /// channel.  A truncated UDP reply prompts a retry over TCP.
    pub is_truncated: bool,

    /// Set in a query to direct the server to pursue it recursively;
    /// copied into the response.
    pub recursion_desired: bool,

    /// Set in a response to indicate recursive query support.
    pub recursion_available: bool,

    /// Set in a response when the data has been validated by the
    /// server (DNSSEC).  Surfaced, never verified here.
    pub authentic_data: bool,

    /// Set in a query to disable server-side DNSSEC validation.
    pub checking_disabled: bool,

    /// Response code.
    pub rcode: Rcode,
}

/// What sort of query this is.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Opcode {
    Query,
    InverseQuery,
    Status,
    Reserved(OpcodeReserved),
}

/// A struct with a private constructor, to ensure invalid `Opcode`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OpcodeReserved(u8);

impl From<u8> for Opcode {
    fn from(octet: u8) -> Self {
        match octet & 0b0000_1111 {
            0 => Opcode::Query,
            1 => Opcode::InverseQuery,
            2 => Opcode::Status,
            other => Opcode::Reserved(OpcodeReserved(other)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Query => 0,
            Opcode::InverseQuery => 1,
            Opcode::Status => 2,
            Opcode::Reserved(OpcodeReserved(octet)) => octet,
        }
    }
}

/// What sort of response this is.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    /// NXDOMAIN: the queried name does not exist.
    NameError,
    NotImplemented,
    Refused,
    Reserved(RcodeReserved),
}

/// A struct with a private constructor, to ensure invalid `Rcode`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RcodeReserved(u8);

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rcode::NoError => write!(f, "NOERROR"),
            Rcode::FormatError => write!(f, "FORMERR"),
            Rcode::ServerFailure => write!(f, "SERVFAIL"),
            Rcode::NameError => write!(f, "NXDOMAIN"),
            Rcode::NotImplemented => write!(f, "NOTIMP"),
            Rcode::Refused => write!(f, "REFUSED"),
            Rcode::Reserved(RcodeReserved(n)) => write!(f, "RCODE{n}"),
        }
    }
}

impl From<u8> for Rcode {
    fn from(octet: u8) -> Self {
        match octet & 0b0000_1111 {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            other => Rcode::Reserved(RcodeReserved(other)),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Reserved(RcodeReserved(octet)) => octet,
        }
    }
}

/// A single entry in the question section.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                                               |
///     /                     QNAME                     /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     QTYPE                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     QCLASS                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// See section 4.1.2 of RFC 1035.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Question {
    pub name: Name,
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

impl Question {
    /// Whether a record could answer this question: type and class
    /// match (wildcards match anything), and the owner equals the
    /// given name.  Name comparison here is always case-insensitive;
    /// 0x20 enforcement happens on the question echo, not on answers.
    pub fn matched_by(&self, owner: &Name, record: &Record) -> bool {
        self.qtype.matches(record.rtype())
            && self.qclass.matches(record.rclass)
            && record.name.eq_ignore_ascii_case(owner)
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.qclass, self.qtype)
    }
}

/// Query types are a superset of record types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum QueryType {
    Record(RecordType),
    Any,
}

impl QueryType {
    pub fn matches(self, rtype: RecordType) -> bool {
        match self {
            QueryType::Any => true,
            QueryType::Record(want) => want == rtype,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryType::Record(rtype) => rtype.fmt(f),
            QueryType::Any => write!(f, "ANY"),
        }
    }
}

impl FromStr for QueryType {
    type Err = crate::rdata::RecordTypeFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ANY" => Ok(QueryType::Any),
            _ => RecordType::from_str(s).map(QueryType::Record),
        }
    }
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryType::Any,
            _ => QueryType::Record(RecordType::from(value)),
        }
    }
}

impl From<QueryType> for u16 {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::Any => 255,
            QueryType::Record(rtype) => rtype.into(),
        }
    }
}

/// Query classes are a superset of record classes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum QueryClass {
    Record(RecordClass),
    Any,
}

impl QueryClass {
    pub fn matches(self, rclass: RecordClass) -> bool {
        match self {
            QueryClass::Any => true,
            QueryClass::Record(want) => want == rclass,
        }
    }
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryClass::Record(rclass) => rclass.fmt(f),
            QueryClass::Any => write!(f, "ANY"),
        }
    }
}

impl FromStr for QueryClass {
    type Err = crate::rdata::RecordClassFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ANY" => Ok(QueryClass::Any),
            _ => RecordClass::from_str(s).map(QueryClass::Record),
        }
    }
}

impl From<u16> for QueryClass {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryClass::Any,
            _ => QueryClass::Record(RecordClass::from(value)),
        }
    }
}

impl From<QueryClass> for u16 {
    fn from(value: QueryClass) -> Self {
        match value {
            QueryClass::Any => 255,
            QueryClass::Record(rclass) => rclass.into(),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Opcode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u8>()?))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Rcode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u8>()?))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for QueryType {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for QueryClass {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Header {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self {
            id: u.arbitrary()?,
            is_response: u.arbitrary()?,
            opcode: u.arbitrary()?,
            is_authoritative: u.arbitrary()?,
            is_truncated: u.arbitrary()?,
            recursion_desired: u.arbitrary()?,
            recursion_available: u.arbitrary()?,
            authentic_data: u.arbitrary()?,
            checking_disabled: u.arbitrary()?,
            rcode: u.arbitrary()?,
        })
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Question {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self {
            name: u.arbitrary()?,
            qtype: u.arbitrary()?,
            qclass: u.arbitrary()?,
        })
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Message {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut questions = Vec::new();
        for _ in 0..u.int_in_range(0..=2)? {
            questions.push(u.arbitrary()?);
        }
        let mut answers = Vec::new();
        for _ in 0..u.int_in_range(0..=3)? {
            answers.push(u.arbitrary()?);
        }
        let mut authority = Vec::new();
        for _ in 0..u.int_in_range(0..=2)? {
            authority.push(u.arbitrary()?);
        }
        let mut additional = Vec::new();
        for _ in 0..u.int_in_range(0..=2)? {
            additional.push(u.arbitrary()?);
        }
        Ok(Self {
            header: u.arbitrary()?,
            questions,
            answers,
            authority,
            additional,
            edns: u.arbitrary()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_opcode_roundtrip() {
        for i in 0..15 {
            assert_eq!(u8::from(Opcode::from(i)), i);
        }
    }

    #[test]
    fn u8_rcode_roundtrip() {
        for i in 0..15 {
            assert_eq!(u8::from(Rcode::from(i)), i);
        }
    }

    #[test]
    fn u16_querytype_roundtrip() {
        for i in 0..300 {
            assert_eq!(u16::from(QueryType::from(i)), i);
        }
    }

    #[test]
    fn u16_queryclass_roundtrip() {
        for i in 0..300 {
            assert_eq!(u16::from(QueryClass::from(i)), i);
        }
    }

    #[test]
    fn extended_rcode_combines_opt_bits() {
        use super::test_util::*;
        use crate::edns::Edns;

        let mut message = Message::new_query(1, question("example.com", RecordType::A));
        assert_eq!(0, message.extended_rcode());

        message.header.rcode = Rcode::from(5);
        let mut edns = Edns::new(1232);
        edns.extended_rcode = 1;
        message = message.with_edns(edns);
        // BADVERS = 16 + 5... extended rcode 0x15
        assert_eq!(0x15, message.extended_rcode());
    }

    #[test]
    fn matched_by_honours_wildcards() {
        use super::test_util::*;

        let q = Question {
            name: domain("example.com"),
            qtype: QueryType::Any,
            qclass: QueryClass::Any,
        };
        let rr = a_record("EXAMPLE.com", "1.2.3.4".parse().unwrap());
        assert!(q.matched_by(&domain("Example.COM"), &rr));
    }
}

#[cfg(any(feature = "test-util", test))]
#[allow(clippy::missing_panics_doc)]
pub mod test_util {
    use super::*;
    use crate::rdata::Rdata;

    use arbitrary::{Arbitrary, Unstructured};
    use rand::Rng;
    use std::net::{Ipv4Addr, Ipv6Addr};

    pub fn arbitrary_message() -> Message {
        let mut rng = rand::thread_rng();
        for size in [512, 1024, 2048, 4096, 8192] {
            let mut buf = vec![0u8; size];
            rng.fill(&mut buf[..]);

            if let Ok(message) = Message::arbitrary(&mut Unstructured::new(&buf)) {
                return message;
            }
        }

        panic!("could not generate arbitrary value!");
    }

    pub fn domain(name: &str) -> Name {
        Name::parse(name).unwrap()
    }

    pub fn question(name: &str, rtype: RecordType) -> Question {
        Question {
            name: domain(name),
            qtype: QueryType::Record(rtype),
            qclass: QueryClass::Record(RecordClass::IN),
        }
    }

    pub fn a_record(name: &str, address: Ipv4Addr) -> Record {
        Record {
            name: domain(name),
            rdata: Rdata::A { address },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn aaaa_record(name: &str, address: Ipv6Addr) -> Record {
        Record {
            name: domain(name),
            rdata: Rdata::Aaaa { address },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn cname_record(name: &str, target_name: &str) -> Record {
        Record {
            name: domain(name),
            rdata: Rdata::Cname {
                target: domain(target_name),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn mx_record(name: &str, preference: u16, exchange: &str) -> Record {
        Record {
            name: domain(name),
            rdata: Rdata::Mx {
                preference,
                exchange: domain(exchange),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn ptr_record(name: &str, target: &str) -> Record {
        Record {
            name: domain(name),
            rdata: Rdata::Ptr {
                target: domain(target),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }
}
