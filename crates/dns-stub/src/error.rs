//! The failure taxonomy surfaced to callers.  Every query completes
//! with exactly one of these or an answer; nothing else escapes the
//! library boundary.

use std::fmt;

/// Why a lookup failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The caller-supplied name violates the length or label rules.
    BadName,

    /// The server's reply was malformed.
    BadResponse,

    /// Every try on every server elapsed without a matching reply.
    Timeout,

    /// NXDOMAIN, after the search list was exhausted.
    NotFound,

    /// A valid reply, but no records of the asked type.
    NoData,

    /// SERVFAIL from every server tried.
    ServerFailure,

    /// REFUSED from every server tried.
    Refused,

    /// NOTIMP from every server tried.
    NotImplemented,

    /// FORMERR from every server tried.
    FormatError,

    /// No server was reachable at the socket layer.
    ConnectionRefused,

    /// The caller cancelled the query.
    Cancelled,

    /// The channel was torn down with the query still in flight.
    Destroyed,

    /// A hosts or aliases file could not be read when consulted.
    FileError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadName => write!(f, "misformatted domain name"),
            Error::BadResponse => write!(f, "misformatted DNS reply"),
            Error::Timeout => write!(f, "timeout while contacting DNS servers"),
            Error::NotFound => write!(f, "domain name not found"),
            Error::NoData => write!(f, "no data of the requested type"),
            Error::ServerFailure => write!(f, "DNS server returned general failure"),
            Error::Refused => write!(f, "DNS server refused query"),
            Error::NotImplemented => write!(f, "DNS server does not implement requested operation"),
            Error::FormatError => write!(f, "DNS server claims query was misformatted"),
            Error::ConnectionRefused => write!(f, "could not contact any DNS servers"),
            Error::Cancelled => write!(f, "DNS query cancelled"),
            Error::Destroyed => write!(f, "channel destroyed with query in flight"),
            Error::FileError => write!(f, "error reading hosts or aliases file"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
