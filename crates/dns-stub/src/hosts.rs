//! The hosts map (`/etc/hosts` format) and the host-aliases map.
//!
//! Discovery of where these files live is the host application's
//! problem; this module only parses their formats and answers lookups.
//! Names are stored lowercased, as both maps are case-insensitive.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;

use dns_wire::message::QueryType;
use dns_wire::name::Name;
use dns_wire::rdata::{Rdata, Record, RecordClass, RecordType};

/// A collection of address records keyed by name.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Hosts {
    v4: HashMap<Name, Vec<Ipv4Addr>>,
    v6: HashMap<Name, Vec<Ipv6Addr>>,
}

impl Hosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    pub fn insert(&mut self, name: &Name, address: IpAddr) {
        let key = name.to_ascii_lowercase();
        match address {
            IpAddr::V4(ip) => {
                let addresses = self.v4.entry(key).or_default();
                if !addresses.contains(&ip) {
                    addresses.push(ip);
                }
            }
            IpAddr::V6(ip) => {
                let addresses = self.v6.entry(key).or_default();
                if !addresses.contains(&ip) {
                    addresses.push(ip);
                }
            }
        }
    }

    pub fn ipv4(&self, name: &Name) -> Option<&[Ipv4Addr]> {
        self.v4.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    pub fn ipv6(&self, name: &Name) -> Option<&[Ipv6Addr]> {
        self.v6.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// Merge another hosts map into this one.  Addresses for names in
    /// both maps are appended.
    pub fn merge(&mut self, other: Hosts) {
        for (name, addresses) in other.v4 {
            for address in addresses {
                self.insert(&name, IpAddr::V4(address));
            }
        }
        for (name, addresses) in other.v6 {
            for address in addresses {
                self.insert(&name, IpAddr::V6(address));
            }
        }
    }

    /// Records answering an address question from this map, or `None`
    /// if the map has nothing for the name.  TTL 0: a hosts answer is
    /// for the current transaction only.
    pub(crate) fn answer(&self, name: &Name, qtype: QueryType) -> Option<Vec<Record>> {
        let mut records = Vec::new();

        if qtype.matches(RecordType::A) {
            if let Some(addresses) = self.ipv4(name) {
                records.extend(addresses.iter().map(|&address| Record {
                    name: name.clone(),
                    rdata: Rdata::A { address },
                    rclass: RecordClass::IN,
                    ttl: 0,
                }));
            }
        }
        if qtype.matches(RecordType::AAAA) {
            if let Some(addresses) = self.ipv6(name) {
                records.extend(addresses.iter().map(|&address| Record {
                    name: name.clone(),
                    rdata: Rdata::Aaaa { address },
                    rclass: RecordClass::IN,
                    ttl: 0,
                }));
            }
        }

        if records.is_empty() {
            None
        } else {
            Some(records)
        }
    }

    /// Parse a string of hosts data.
    ///
    /// # Errors
    ///
    /// If the string cannot be parsed.
    pub fn deserialise(data: &str) -> Result<Self, Error> {
        let mut hosts = Self::new();

        for line in data.lines() {
            // everything after '#' is a comment
            let line = line.split('#').next().unwrap_or("");
            let mut fields = line.split_whitespace();

            let Some(address_field) = fields.next() else {
                continue;
            };
            // strip a scoped-address zone id, "fe80::1%eth0"
            let address_field = address_field.split('%').next().unwrap_or("");
            let address = IpAddr::from_str(address_field).map_err(|_| Error::BadAddress {
                address: address_field.into(),
            })?;

            for name_field in fields {
                let name = Name::parse(name_field).map_err(|_| Error::BadHostname {
                    name: name_field.into(),
                })?;
                hosts.insert(&name, address);
            }
        }

        Ok(hosts)
    }

    /// Read and parse a hosts file.
    ///
    /// # Errors
    ///
    /// `FileError` if the file cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, crate::error::Error> {
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| crate::error::Error::FileError)?;
        Self::deserialise(&data).map_err(|_| crate::error::Error::FileError)
    }
}

/// The host-aliases map: single-label names rewritten before lookup,
/// HOSTALIASES style.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Aliases {
    map: HashMap<Name, Name>,
}

impl Aliases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn insert(&mut self, alias: &Name, canonical: Name) {
        self.map.insert(alias.to_ascii_lowercase(), canonical);
    }

    pub fn lookup(&self, name: &Name) -> Option<&Name> {
        self.map.get(&name.to_ascii_lowercase())
    }

    /// Parse a string of aliases data: one `alias canonical` pair per
    /// line, `#` comments.
    ///
    /// # Errors
    ///
    /// If the string cannot be parsed.
    pub fn deserialise(data: &str) -> Result<Self, Error> {
        let mut aliases = Self::new();

        for line in data.lines() {
            let line = line.split('#').next().unwrap_or("");
            let mut fields = line.split_whitespace();

            let (Some(alias_field), Some(canonical_field)) = (fields.next(), fields.next()) else {
                continue;
            };
            let alias = Name::parse(alias_field).map_err(|_| Error::BadHostname {
                name: alias_field.into(),
            })?;
            let canonical = Name::parse(canonical_field).map_err(|_| Error::BadHostname {
                name: canonical_field.into(),
            })?;
            aliases.insert(&alias, canonical);
        }

        Ok(aliases)
    }

    /// Read and parse an aliases file.
    ///
    /// # Errors
    ///
    /// `FileError` if the file cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, crate::error::Error> {
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| crate::error::Error::FileError)?;
        Self::deserialise(&data).map_err(|_| crate::error::Error::FileError)
    }
}

/// Errors that can arise when parsing hosts or aliases data.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    BadAddress { address: String },
    BadHostname { name: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadAddress { address } => write!(f, "could not parse address '{address}'"),
            Error::BadHostname { name } => write!(f, "could not parse hostname '{name}'"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
