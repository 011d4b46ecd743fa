//! Host-oriented lookups layered over the channel: the getaddrinfo
//! equivalent (parallel A + AAAA with merged results) and reverse
//! address lookups.

use std::net::IpAddr;

use dns_wire::message::{QueryClass, QueryType};
use dns_wire::name::Name;
use dns_wire::rdata::{Rdata, RecordClass, RecordType};

use crate::channel::{Answer, Channel};
use crate::error::Error;
use crate::query::MAX_CNAME_CHAIN;
use crate::sortlist;

/// Which address families a host lookup wants.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
    /// Both: A and AAAA queries run as independent parallel lookups
    /// and the results are merged.
    Unspec,
}

/// The merged outcome of a host lookup.
#[derive(Debug, Clone)]
pub struct HostAddresses {
    /// The name that was looked up.
    pub name: Name,

    /// All addresses found, v4 before v6, reordered by the channel's
    /// sortlist if one is configured.
    pub addresses: Vec<IpAddr>,

    /// Timeouts observed across both family lookups.
    pub timeouts: u32,
}

/// The outcome of a reverse lookup.
#[derive(Debug, Clone)]
pub struct HostInfo {
    /// The address that was looked up.
    pub address: IpAddr,

    /// The primary name: the first PTR target found.
    pub hostname: Name,

    /// Every PTR target found.
    pub aliases: Vec<Name>,
}

impl Channel {
    /// Resolve a host name to addresses.  Under
    /// [`AddressFamily::Unspec`] the A and AAAA queries are fired in
    /// parallel as independent lookups; a family that fails is
    /// ignored as long as the other returns data.
    ///
    /// # Errors
    ///
    /// See [`Error`].  When both families fail, the IPv4 failure is
    /// reported.
    pub async fn resolve_host(
        &self,
        name: &str,
        family: AddressFamily,
    ) -> Result<HostAddresses, Error> {
        let parsed = Name::parse(name).map_err(|_| Error::BadName)?;
        let qclass = QueryClass::Record(RecordClass::IN);
        let a = QueryType::Record(RecordType::A);
        let aaaa = QueryType::Record(RecordType::AAAA);

        let (v4, v6) = match family {
            AddressFamily::V4 => (Some(self.query(name, qclass, a).await), None),
            AddressFamily::V6 => (None, Some(self.query(name, qclass, aaaa).await)),
            AddressFamily::Unspec => {
                let (v4, v6) =
                    tokio::join!(self.query(name, qclass, a), self.query(name, qclass, aaaa));
                (Some(v4), Some(v6))
            }
        };

        let mut addresses = Vec::new();
        let mut timeouts = 0;
        let mut failures = Vec::new();
        for result in [v4, v6].into_iter().flatten() {
            match result {
                Ok(answer) => {
                    timeouts += answer.timeouts;
                    addresses.extend(answer.addresses());
                }
                Err(err) => failures.push(err),
            }
        }

        if addresses.is_empty() {
            return Err(failures.into_iter().next().unwrap_or(Error::NoData));
        }

        sortlist::sort_addresses(self.sortlist(), &mut addresses);

        Ok(HostAddresses {
            name: parsed,
            addresses,
            timeouts,
        })
    }

    /// Callback form of [`Channel::resolve_host`].
    pub fn get_host_addresses<F>(&self, name: &str, family: AddressFamily, handler: F)
    where
        F: FnOnce(Result<HostAddresses, Error>) + Send + 'static,
    {
        let channel = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            handler(channel.resolve_host(&name, family).await);
        });
    }

    /// Resolve an address back to its host names via PTR.  CNAME
    /// chains under `in-addr.arpa` / `ip6.arpa` are followed, whether
    /// they resolve within one reply or need further queries.
    ///
    /// # Errors
    ///
    /// See [`Error`].
    pub async fn resolve_address(&self, address: IpAddr) -> Result<HostInfo, Error> {
        let reverse = Name::reverse_address(address);
        // the trailing dot keeps the search list away from arpa names
        let answer = self
            .query(
                &format!("{reverse}."),
                QueryClass::Record(RecordClass::IN),
                QueryType::Record(RecordType::PTR),
            )
            .await?;
        ptr_host_info(address, &answer).ok_or(Error::NoData)
    }

    /// Callback form of [`Channel::resolve_address`].
    pub fn get_host_info<F>(&self, address: IpAddr, handler: F)
    where
        F: FnOnce(Result<HostInfo, Error>) + Send + 'static,
    {
        let channel = self.clone();
        tokio::spawn(async move {
            handler(channel.resolve_address(address).await);
        });
    }
}

/// Interpret a PTR answer: walk the CNAME chain from the reverse name
/// and collect the PTR targets where it ends.
pub(crate) fn ptr_host_info(address: IpAddr, answer: &Answer) -> Option<HostInfo> {
    let mut owner = Name::reverse_address(address);
    let mut hostname = None;
    let mut aliases = Vec::new();

    for _ in 0..=MAX_CNAME_CHAIN {
        let mut next = None;
        for rr in &answer.message.answers {
            if !rr.name.eq_ignore_ascii_case(&owner) {
                continue;
            }
            match &rr.rdata {
                Rdata::Ptr { target } => {
                    if hostname.is_none() {
                        hostname = Some(target.clone());
                    }
                    if !aliases.contains(target) {
                        aliases.push(target.clone());
                    }
                }
                Rdata::Cname { target } => next = Some(target.clone()),
                _ => (),
            }
        }

        if hostname.is_some() {
            break;
        }
        owner = next?;
    }

    hostname.map(|hostname| HostInfo {
        address,
        hostname,
        aliases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_wire::message::test_util::*;
    use dns_wire::message::Message;

    fn ptr_answer(answers: Vec<dns_wire::rdata::Record>) -> Answer {
        let mut message =
            Message::new_query(7, question("64.48.32.16.in-addr.arpa", RecordType::PTR))
                .make_response();
        message.answers = answers;
        Answer {
            message,
            timeouts: 0,
        }
    }

    #[test]
    fn direct_ptr_reply() {
        let answer = ptr_answer(vec![ptr_record("64.48.32.16.in-addr.arpa", "other.com")]);
        let info = ptr_host_info("16.32.48.64".parse().unwrap(), &answer).unwrap();

        assert_eq!("other.com", info.hostname.to_string());
        assert_eq!(vec![domain("other.com")], info.aliases);
        assert_eq!("16.32.48.64".parse::<IpAddr>().unwrap(), info.address);
    }

    #[test]
    fn ptr_reply_with_cname_chain() {
        // 64.48.32.16.in-addr.arpa -> 64.48.32.8.in-addr.arpa -> other.com
        let answer = ptr_answer(vec![
            cname_record("64.48.32.16.in-addr.arpa", "64.48.32.8.in-addr.arpa"),
            ptr_record("64.48.32.8.in-addr.arpa", "other.com"),
        ]);
        let info = ptr_host_info("16.32.48.64".parse().unwrap(), &answer).unwrap();

        assert_eq!("other.com", info.hostname.to_string());
        assert_eq!(vec![domain("other.com")], info.aliases);
    }

    #[test]
    fn ptr_reply_with_multiple_targets() {
        let answer = ptr_answer(vec![
            ptr_record("64.48.32.16.in-addr.arpa", "first.example.com"),
            ptr_record("64.48.32.16.in-addr.arpa", "second.example.com"),
        ]);
        let info = ptr_host_info("16.32.48.64".parse().unwrap(), &answer).unwrap();

        assert_eq!("first.example.com", info.hostname.to_string());
        assert_eq!(
            vec![domain("first.example.com"), domain("second.example.com")],
            info.aliases
        );
    }

    #[test]
    fn ptr_reply_without_ptr_records() {
        let answer = ptr_answer(vec![]);
        assert!(ptr_host_info("16.32.48.64".parse().unwrap(), &answer).is_none());
    }
}
