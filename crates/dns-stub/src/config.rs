//! Channel configuration.  The host application discovers its own
//! resolver settings (resolv.conf, registry, whatever) and hands the
//! results in through an [`Options`] value; this library never reads
//! system configuration itself.

use ipnet::IpNet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dns_wire::name::Name;

use crate::hosts::{Aliases, Hosts};

/// Which protocol a socket speaks.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Tcp => write!(f, "tcp"),
        }
    }
}

/// One upstream recursive server.  Ports default to the channel-wide
/// `udp_port` / `tcp_port` options when unset.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ServerSpec {
    pub address: IpAddr,
    pub udp_port: Option<u16>,
    pub tcp_port: Option<u16>,
}

impl From<IpAddr> for ServerSpec {
    fn from(address: IpAddr) -> Self {
        Self {
            address,
            udp_port: None,
            tcp_port: None,
        }
    }
}

impl From<SocketAddr> for ServerSpec {
    fn from(address: SocketAddr) -> Self {
        Self {
            address: address.ip(),
            udp_port: Some(address.port()),
            tcp_port: Some(address.port()),
        }
    }
}

impl FromStr for ServerSpec {
    type Err = ServerSpecFromStr;

    /// Accepts `1.2.3.4`, `1.2.3.4:53`, `::1`, or `[::1]:53`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(address) = IpAddr::from_str(s) {
            return Ok(address.into());
        }
        if let Ok(address) = SocketAddr::from_str(s) {
            return Ok(address.into());
        }
        Err(ServerSpecFromStr::NoParse)
    }
}

/// Errors that can arise when converting a `&str` into a `ServerSpec`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ServerSpecFromStr {
    NoParse,
}

impl fmt::Display for ServerSpecFromStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "could not parse string to server address")
    }
}

impl std::error::Error for ServerSpecFromStr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// One source consulted when resolving a host name, in order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Lookup {
    /// The DNS itself ("b", for bind, in resolv.conf tradition).
    Dns,
    /// The hosts file ("f").
    HostsFile,
}

/// Behaviour toggles, off by default.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Flags {
    /// Always query over TCP.
    pub use_tcp: bool,

    /// Always use the first server instead of rotating on failure.
    pub primary: bool,

    /// Accept truncated UDP replies instead of retrying over TCP.
    pub ignore_truncation: bool,

    /// Clear the RD bit: ask servers not to recurse.
    pub no_recursion: bool,

    /// Keep idle sockets open between queries.
    pub stay_open: bool,

    /// Skip the host-aliases map.
    pub no_aliases: bool,

    /// Attach an EDNS(0) OPT record advertising `udp_payload_size`.
    pub edns: bool,

    /// Randomise the case of query names and require the reply to
    /// echo it exactly (DNS 0x20 spoofing defence).
    pub dns0x20: bool,
}

/// A socket-state transition, reported through the channel's
/// socket-state callback: opened (armed for reading and, for TCP,
/// writing) or closed (neither flag set).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SocketEvent {
    /// The server the socket talks to.
    pub server: SocketAddr,
    pub transport: Transport,
    pub readable: bool,
    pub writable: bool,
}

/// Callback invoked on every socket-state transition.
pub type SocketStateCallback = Arc<dyn Fn(SocketEvent) + Send + Sync>;

/// Everything configurable about a channel.  Build one with the
/// `set_*` methods, which chain:
///
/// ```
/// use dns_stub::config::Options;
/// use std::time::Duration;
///
/// let mut options = Options::new();
/// options.set_timeout(Duration::from_millis(500)).set_tries(2);
/// ```
pub struct Options {
    pub(crate) servers: Vec<ServerSpec>,
    pub(crate) timeout: Duration,
    pub(crate) tries: u32,
    pub(crate) ndots: usize,
    pub(crate) search: Vec<Name>,
    pub(crate) lookups: Vec<Lookup>,
    pub(crate) flags: Flags,
    pub(crate) udp_port: u16,
    pub(crate) tcp_port: u16,
    pub(crate) sortlist: Vec<IpNet>,
    pub(crate) rotate: bool,
    pub(crate) udp_payload_size: u16,
    pub(crate) send_buffer_size: Option<usize>,
    pub(crate) recv_buffer_size: Option<usize>,
    pub(crate) socket_state_callback: Option<SocketStateCallback>,
    pub(crate) hosts: Hosts,
    pub(crate) aliases: Aliases,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            servers: vec![IpAddr::V4(Ipv4Addr::LOCALHOST).into()],
            timeout: Duration::from_secs(2),
            tries: 3,
            ndots: 1,
            search: Vec::new(),
            lookups: vec![Lookup::HostsFile, Lookup::Dns],
            flags: Flags::default(),
            udp_port: 53,
            tcp_port: 53,
            sortlist: Vec::new(),
            rotate: false,
            udp_payload_size: dns_wire::edns::DEFAULT_UDP_PAYLOAD_SIZE,
            send_buffer_size: None,
            recv_buffer_size: None,
            socket_state_callback: None,
            hosts: Hosts::new(),
            aliases: Aliases::new(),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ordered upstream server list.
    pub fn set_servers(&mut self, servers: Vec<ServerSpec>) -> &mut Self {
        self.servers = servers;
        self
    }

    /// Time allowed for each try, before retransmitting or failing
    /// over.  UDP tries after the first get proportionally longer.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Attempts per server before a query fails.
    pub fn set_tries(&mut self, tries: u32) -> &mut Self {
        self.tries = tries.max(1);
        self
    }

    /// Minimum number of dots for a name to be tried as-is before the
    /// search list is applied.
    pub fn set_ndots(&mut self, ndots: usize) -> &mut Self {
        self.ndots = ndots;
        self
    }

    /// Search suffixes for unqualified names.
    pub fn set_domains(&mut self, search: Vec<Name>) -> &mut Self {
        self.search = search;
        self
    }

    /// Lookup order as a string over `b` (DNS) and `f` (hosts file),
    /// resolv.conf style.  Unknown characters are ignored.
    pub fn set_lookups(&mut self, lookups: &str) -> &mut Self {
        self.lookups = lookups
            .chars()
            .filter_map(|c| match c {
                'b' => Some(Lookup::Dns),
                'f' => Some(Lookup::HostsFile),
                _ => None,
            })
            .collect();
        self
    }

    pub fn set_flags(&mut self, flags: Flags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Port used for UDP queries, for servers without an explicit one.
    pub fn set_udp_port(&mut self, udp_port: u16) -> &mut Self {
        self.udp_port = udp_port;
        self
    }

    /// Port used for TCP queries, for servers without an explicit one.
    pub fn set_tcp_port(&mut self, tcp_port: u16) -> &mut Self {
        self.tcp_port = tcp_port;
        self
    }

    /// CIDR preference list: returned addresses inside an earlier
    /// entry sort before addresses inside a later (or no) entry.
    pub fn set_sortlist(&mut self, sortlist: Vec<IpNet>) -> &mut Self {
        self.sortlist = sortlist;
        self
    }

    /// Round-robin across servers instead of always starting with the
    /// first.
    pub fn set_rotate(&mut self, rotate: bool) -> &mut Self {
        self.rotate = rotate;
        self
    }

    /// The UDP payload size advertised when the EDNS flag is set.
    pub fn set_udp_payload_size(&mut self, size: u16) -> &mut Self {
        self.udp_payload_size = size;
        self
    }

    /// `SO_SNDBUF` hint for the sockets the channel opens.
    pub fn set_send_buffer_size(&mut self, size: usize) -> &mut Self {
        self.send_buffer_size = Some(size);
        self
    }

    /// `SO_RCVBUF` hint for the sockets the channel opens.
    pub fn set_recv_buffer_size(&mut self, size: usize) -> &mut Self {
        self.recv_buffer_size = Some(size);
        self
    }

    /// Callback invoked whenever the channel opens or closes a socket.
    pub fn set_socket_state_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(SocketEvent) + Send + Sync + 'static,
    {
        self.socket_state_callback = Some(Arc::new(callback));
        self
    }

    /// The hosts map consulted for address lookups, per the lookup
    /// order.
    pub fn set_hosts(&mut self, hosts: Hosts) -> &mut Self {
        self.hosts = hosts;
        self
    }

    /// The host-aliases map, applied to dot-free names.
    pub fn set_aliases(&mut self, aliases: Aliases) -> &mut Self {
        self.aliases = aliases;
        self
    }
}
