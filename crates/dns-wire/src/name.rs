//! Domain names: sequences of case-preserving labels, with the textual
//! escape syntax of RFC 1035 section 5.1 (`\.`, `\\`, `\DDD`).
//!
//! Labels keep the exact octets they were built from.  DNS comparisons
//! are ASCII-case-insensitive, but the 0x20 spoofing defence needs the
//! original casing back byte-for-byte, so nothing in this module ever
//! normalises case behind the caller's back.

use bytes::Bytes;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Maximum length of the wire encoding of a name: every length octet
/// plus every label octet plus the root terminator.
pub const NAME_MAX_ENCODED_LEN: usize = 255;

/// Maximum length of a single label.
pub const LABEL_MAX_LEN: usize = 63;

/// A single label: 1 to 63 octets, case preserved.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Label {
    /// Private so an empty or over-long `Label` cannot be constructed.
    octets: Bytes,
}

impl Label {
    /// Between 1 and 63: empty labels cannot be constructed.
    #[allow(clippy::missing_panics_doc, clippy::len_without_is_empty)]
    pub fn len(&self) -> u8 {
        // safe as the `TryFrom` ensures a label is <= 63 octets
        self.octets.len().try_into().unwrap()
    }

    pub fn octets(&self) -> &Bytes {
        &self.octets
    }

    pub fn eq_ignore_ascii_case(&self, other: &Label) -> bool {
        self.octets.eq_ignore_ascii_case(&other.octets)
    }

    pub fn to_ascii_lowercase(&self) -> Label {
        Label {
            octets: Bytes::copy_from_slice(&self.octets.to_ascii_lowercase()),
        }
    }
}

impl TryFrom<&[u8]> for Label {
    type Error = NameError;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        if octets.is_empty() {
            return Err(NameError::EmptyLabel);
        }
        if octets.len() > LABEL_MAX_LEN {
            return Err(NameError::LabelTooLong);
        }

        Ok(Self {
            octets: Bytes::copy_from_slice(octets),
        })
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Label {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Label> {
        let label_len = u.int_in_range::<u8>(1..=20)?;
        let bs = u.bytes(label_len.into())?;
        Ok(Self {
            octets: Bytes::copy_from_slice(bs),
        })
    }
}

/// A domain name: an ordered sequence of labels.  The root name is the
/// empty sequence; the implicit empty root label is not stored.
///
/// Equality and hashing are byte-exact.  Use [`Name::eq_ignore_ascii_case`]
/// for the usual DNS comparison.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Name {
    labels: Vec<Label>,
}

impl Name {
    pub fn root() -> Self {
        Name { labels: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Length of the wire encoding, including length octets and the
    /// root terminator.
    pub fn encoded_len(&self) -> usize {
        1 + self
            .labels
            .iter()
            .map(|l| 1 + usize::from(l.len()))
            .sum::<usize>()
    }

    /// The number of interior label separators, i.e. how many dots the
    /// unescaped textual form has.  This is what an `ndots` threshold
    /// is compared against.
    pub fn dots(&self) -> usize {
        self.labels.len().saturating_sub(1)
    }

    /// # Errors
    ///
    /// If the assembled name would exceed the wire-format bound.
    pub fn from_labels(labels: Vec<Label>) -> Result<Self, NameError> {
        let name = Name { labels };
        if name.encoded_len() > NAME_MAX_ENCODED_LEN {
            return Err(NameError::NameTooLong);
        }
        Ok(name)
    }

    /// Append `suffix` to this name, as search-list expansion does.
    ///
    /// # Errors
    ///
    /// If the combined name would exceed the wire-format bound.
    pub fn join(&self, suffix: &Name) -> Result<Self, NameError> {
        let mut labels = self.labels.clone();
        labels.extend(suffix.labels.iter().cloned());
        Self::from_labels(labels)
    }

    /// Parse a textual name.  A trailing dot is accepted and has no
    /// effect on the parsed value; `""` and `"."` both give the root.
    ///
    /// Escapes: `\DDD` is the octet with that three-digit decimal
    /// value, and `\c` for any other character is a literal `c`.
    ///
    /// # Errors
    ///
    /// If a label is empty or over-long, an escape is malformed, or the
    /// whole name is over-long.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        if s.is_empty() || s == "." {
            return Ok(Self::root());
        }

        let mut labels = Vec::new();
        let mut current = Vec::new();
        let mut chars = s.bytes();

        while let Some(b) = chars.next() {
            match b {
                b'.' => {
                    labels.push(Label::try_from(&current[..])?);
                    current.clear();
                }
                b'\\' => match chars.next() {
                    None => return Err(NameError::BadEscape),
                    Some(d @ b'0'..=b'9') => {
                        let d2 = chars.next().ok_or(NameError::BadEscape)?;
                        let d3 = chars.next().ok_or(NameError::BadEscape)?;
                        if !d2.is_ascii_digit() || !d3.is_ascii_digit() {
                            return Err(NameError::BadEscape);
                        }
                        let value = u32::from(d - b'0') * 100
                            + u32::from(d2 - b'0') * 10
                            + u32::from(d3 - b'0');
                        match u8::try_from(value) {
                            Ok(octet) => current.push(octet),
                            Err(_) => return Err(NameError::BadEscape),
                        }
                    }
                    Some(other) => current.push(other),
                },
                other => current.push(other),
            }
        }

        // a trailing dot leaves `current` empty, which is fine; an
        // interior empty label has already errored above.
        if !current.is_empty() {
            labels.push(Label::try_from(&current[..])?);
        }

        Self::from_labels(labels)
    }

    pub fn eq_ignore_ascii_case(&self, other: &Name) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(&other.labels)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    pub fn to_ascii_lowercase(&self) -> Name {
        Name {
            labels: self.labels.iter().map(Label::to_ascii_lowercase).collect(),
        }
    }

    /// Flip the case of each ASCII letter according to `coin`, one
    /// throw per letter.  This is the DNS 0x20 defence: the reply must
    /// echo the randomised casing exactly.
    pub fn randomise_case(&self, mut coin: impl FnMut() -> bool) -> Name {
        let labels = self
            .labels
            .iter()
            .map(|label| {
                let octets = label
                    .octets
                    .iter()
                    .map(|o| {
                        if o.is_ascii_alphabetic() && coin() {
                            o ^ 0x20
                        } else {
                            *o
                        }
                    })
                    .collect::<Vec<u8>>();
                Label {
                    octets: Bytes::from(octets),
                }
            })
            .collect();
        Name { labels }
    }

    /// The reverse-lookup name for an address: dotted-quad under
    /// `in-addr.arpa.` for IPv4, reversed nibbles under `ip6.arpa.`
    /// for IPv6.
    #[allow(clippy::missing_panics_doc)]
    pub fn reverse_address(address: IpAddr) -> Name {
        let text = match address {
            IpAddr::V4(v4) => {
                let [a, b, c, d] = v4.octets();
                format!("{d}.{c}.{b}.{a}.in-addr.arpa")
            }
            IpAddr::V6(v6) => {
                let mut out = String::with_capacity(72);
                for octet in v6.octets().iter().rev() {
                    out.push(char::from_digit(u32::from(octet & 0x0f), 16).unwrap());
                    out.push('.');
                    out.push(char::from_digit(u32::from(octet >> 4), 16).unwrap());
                    out.push('.');
                }
                out.push_str("ip6.arpa");
                out
            }
        };
        // built from fixed-size address octets, always within bounds
        Name::parse(&text).unwrap()
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Name")
            .field("text", &self.to_string())
            .finish()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return write!(f, ".");
        }

        let mut first = true;
        for label in &self.labels {
            if first {
                first = false;
            } else {
                write!(f, ".")?;
            }
            for octet in label.octets() {
                match octet {
                    b'.' | b'\\' => write!(f, "\\{}", *octet as char)?,
                    0x21..=0x7e => write!(f, "{}", *octet as char)?,
                    _ => write!(f, "\\{octet:03}")?,
                }
            }
        }

        Ok(())
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Name {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let num_labels = u.int_in_range::<usize>(0..=6)?;
        let mut labels = Vec::with_capacity(num_labels);
        for _ in 0..num_labels {
            labels.push(u.arbitrary()?);
        }
        Ok(Name::from_labels(labels).unwrap())
    }
}

/// Errors that can arise when building a `Name`.  These all correspond
/// to the resolver-level "bad name" failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NameError {
    EmptyLabel,
    LabelTooLong,
    NameTooLong,
    BadEscape,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NameError::EmptyLabel => write!(f, "name has an empty label"),
            NameError::LabelTooLong => write!(f, "label is longer than {LABEL_MAX_LEN} octets"),
            NameError::NameTooLong => {
                write!(f, "name encoding is longer than {NAME_MAX_ENCODED_LEN} octets")
            }
            NameError::BadEscape => write!(f, "malformed backslash escape"),
        }
    }
}

impl std::error::Error for NameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
