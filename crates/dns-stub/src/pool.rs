//! The server pool: per-endpoint socket state, health accounting, and
//! selection.
//!
//! Sockets are created lazily, on the first send that needs them.  The
//! UDP socket is connected so the kernel rejects datagrams from
//! anywhere but the server it was opened for.  TCP connections are
//! driven by a task per connection: a writer draining an outbound
//! queue of length-prefixed messages, and a reader slicing complete
//! messages out of the stream and forwarding them to the channel's
//! event queue.  Several queries can be in flight on one TCP
//! connection at a time; the channel matches replies by wire id.

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpSocket, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{Options, SocketEvent, SocketStateCallback, Transport};

/// Largest datagram the channel will accept.  EDNS can advertise
/// anything up to this.
const UDP_RECV_BUFFER_LEN: usize = 65535;

/// Something that happened on a socket, forwarded into the channel's
/// event loop.  Socket tasks never touch resolver state themselves.
#[derive(Debug)]
pub(crate) enum Event {
    /// A datagram arrived on a server's UDP socket.
    Udp { server: usize, octets: Bytes },

    /// A server's UDP socket failed; it has to be reopened before the
    /// next send.
    UdpClosed { server: usize, kind: io::ErrorKind },

    /// A complete framed message arrived on a server's TCP connection.
    Tcp { server: usize, octets: Bytes },

    /// A server's TCP connection failed or was closed by the peer.
    /// `kind` is `None` for a clean EOF.
    TcpClosed {
        server: usize,
        kind: Option<io::ErrorKind>,
    },
}

pub(crate) struct UdpConn {
    pub(crate) socket: Arc<UdpSocket>,
    reader: JoinHandle<()>,
}

pub(crate) struct TcpConn {
    pub(crate) tx: mpsc::UnboundedSender<Bytes>,
    task: JoinHandle<()>,
}

pub(crate) struct Endpoint {
    pub(crate) udp_addr: SocketAddr,
    pub(crate) tcp_addr: SocketAddr,
    pub(crate) udp: Option<UdpConn>,
    pub(crate) tcp: Option<TcpConn>,
    /// Consecutive failures; reset by any successful reply.
    pub(crate) failures: u32,
}

pub(crate) struct ServerPool {
    endpoints: Vec<Endpoint>,
    cursor: usize,
    /// An endpoint with this many consecutive failures is skipped.
    max_failures: u32,
    primary: bool,
    rotate: bool,
    send_buffer_size: Option<usize>,
    recv_buffer_size: Option<usize>,
    callback: Option<SocketStateCallback>,
}

impl ServerPool {
    pub(crate) fn new(options: &Options) -> Self {
        let endpoints = options
            .servers
            .iter()
            .map(|spec| Endpoint {
                udp_addr: SocketAddr::new(spec.address, spec.udp_port.unwrap_or(options.udp_port)),
                tcp_addr: SocketAddr::new(spec.address, spec.tcp_port.unwrap_or(options.tcp_port)),
                udp: None,
                tcp: None,
                failures: 0,
            })
            .collect();

        Self {
            endpoints,
            cursor: 0,
            max_failures: options.tries,
            primary: options.flags.primary,
            rotate: options.rotate,
            send_buffer_size: options.send_buffer_size,
            recv_buffer_size: options.recv_buffer_size,
            callback: options.socket_state_callback.clone(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub(crate) fn endpoint(&self, server: usize) -> &Endpoint {
        &self.endpoints[server]
    }

    /// Pick the endpoint for a fresh transmission, skipping endpoints
    /// whose failure count has hit the limit.  If everything is in
    /// skip state the counters are cleared and selection starts over.
    pub(crate) fn choose(&mut self) -> usize {
        let len = self.endpoints.len();
        let start = if self.rotate && !self.primary {
            self.cursor
        } else {
            0
        };

        for i in 0..len {
            let candidate = (start + i) % len;
            if self.endpoints[candidate].failures < self.max_failures {
                if self.rotate {
                    self.cursor = (candidate + 1) % len;
                }
                return candidate;
            }
        }

        // all skipped: clear and reset the cursor
        for endpoint in &mut self.endpoints {
            endpoint.failures = 0;
        }
        self.cursor = if self.rotate { (start + 1) % len } else { 0 };
        start % len
    }

    /// The endpoint to fail over to after `server` let a query down.
    pub(crate) fn next_after(&mut self, server: usize) -> usize {
        let len = self.endpoints.len();
        for i in 1..=len {
            let candidate = (server + i) % len;
            if self.endpoints[candidate].failures < self.max_failures {
                return candidate;
            }
        }

        for endpoint in &mut self.endpoints {
            endpoint.failures = 0;
        }
        (server + 1) % len
    }

    pub(crate) fn note_failure(&mut self, server: usize) {
        self.endpoints[server].failures += 1;
    }

    pub(crate) fn note_success(&mut self, server: usize) {
        self.endpoints[server].failures = 0;
    }

    /// The connected UDP socket for an endpoint, opening it if needed.
    pub(crate) async fn ensure_udp(
        &mut self,
        server: usize,
        event_tx: &mpsc::UnboundedSender<Event>,
    ) -> io::Result<Arc<UdpSocket>> {
        if let Some(conn) = &self.endpoints[server].udp {
            return Ok(conn.socket.clone());
        }

        let addr = self.endpoints[server].udp_addr;
        let socket = self.open_udp_socket(addr).await?;
        let socket = Arc::new(socket);

        let reader = {
            let socket = socket.clone();
            let event_tx = event_tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; UDP_RECV_BUFFER_LEN];
                loop {
                    match socket.recv(&mut buf).await {
                        Ok(received) => {
                            let octets = Bytes::copy_from_slice(&buf[..received]);
                            if event_tx.send(Event::Udp { server, octets }).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            let _ = event_tx.send(Event::UdpClosed {
                                server,
                                kind: err.kind(),
                            });
                            break;
                        }
                    }
                }
            })
        };

        self.endpoints[server].udp = Some(UdpConn {
            socket: socket.clone(),
            reader,
        });
        self.notify(addr, Transport::Udp, true, false);

        Ok(socket)
    }

    async fn open_udp_socket(&self, addr: SocketAddr) -> io::Result<UdpSocket> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        socket.set_nonblocking(true)?;

        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        socket.bind(&local.into())?;

        let socket = UdpSocket::from_std(std::net::UdpSocket::from(socket))?;
        socket.connect(addr).await?;
        Ok(socket)
    }

    /// The outbound queue of an endpoint's TCP connection, opening it
    /// if needed.  Connecting happens inside the connection task, so
    /// the caller never blocks on it; a failed connect surfaces as a
    /// `TcpClosed` event.
    pub(crate) fn ensure_tcp(
        &mut self,
        server: usize,
        event_tx: &mpsc::UnboundedSender<Event>,
    ) -> mpsc::UnboundedSender<Bytes> {
        if let Some(conn) = &self.endpoints[server].tcp {
            return conn.tx.clone();
        }

        let addr = self.endpoints[server].tcp_addr;
        let (tx, rx) = mpsc::unbounded_channel();
        let send_buffer_size = self.send_buffer_size;
        let recv_buffer_size = self.recv_buffer_size;
        let event_tx = event_tx.clone();
        let task = tokio::spawn(run_tcp_connection(
            server,
            addr,
            send_buffer_size,
            recv_buffer_size,
            rx,
            event_tx,
        ));

        self.endpoints[server].tcp = Some(TcpConn {
            tx: tx.clone(),
            task,
        });
        self.notify(addr, Transport::Tcp, true, true);

        tx
    }

    pub(crate) fn close_udp(&mut self, server: usize) {
        if let Some(conn) = self.endpoints[server].udp.take() {
            conn.reader.abort();
            let addr = self.endpoints[server].udp_addr;
            self.notify(addr, Transport::Udp, false, false);
        }
    }

    pub(crate) fn close_tcp(&mut self, server: usize) {
        if let Some(conn) = self.endpoints[server].tcp.take() {
            conn.task.abort();
            let addr = self.endpoints[server].tcp_addr;
            self.notify(addr, Transport::Tcp, false, false);
        }
    }

    /// Close every socket not in `in_use`.
    pub(crate) fn close_unused(&mut self, in_use: &std::collections::HashSet<(usize, Transport)>) {
        for server in 0..self.endpoints.len() {
            if self.endpoints[server].udp.is_some() && !in_use.contains(&(server, Transport::Udp)) {
                self.close_udp(server);
            }
            if self.endpoints[server].tcp.is_some() && !in_use.contains(&(server, Transport::Tcp)) {
                self.close_tcp(server);
            }
        }
    }

    pub(crate) fn close_all(&mut self) {
        for server in 0..self.endpoints.len() {
            self.close_udp(server);
            self.close_tcp(server);
        }
    }

    fn notify(&self, server: SocketAddr, transport: Transport, readable: bool, writable: bool) {
        if let Some(callback) = &self.callback {
            callback(SocketEvent {
                server,
                transport,
                readable,
                writable,
            });
        }
    }
}

async fn run_tcp_connection(
    server: usize,
    addr: SocketAddr,
    send_buffer_size: Option<usize>,
    recv_buffer_size: Option<usize>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    event_tx: mpsc::UnboundedSender<Event>,
) {
    let stream = match connect_tcp(addr, send_buffer_size, recv_buffer_size).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::debug!(%addr, error = %err, "TCP connect failed");
            let _ = event_tx.send(Event::TcpClosed {
                server,
                kind: Some(err.kind()),
            });
            return;
        }
    };

    let (mut read_half, mut write_half) = stream.into_split();

    let writer = tokio::spawn(async move {
        while let Some(octets) = outbound.recv().await {
            let Ok(length) = u16::try_from(octets.len()) else {
                tracing::debug!(length = octets.len(), "dropping oversized TCP message");
                continue;
            };
            if write_half.write_all(&length.to_be_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(&octets).await.is_err() {
                break;
            }
        }
    });

    loop {
        match read_tcp_message(&mut read_half).await {
            Ok(octets) => {
                if event_tx.send(Event::Tcp { server, octets }).is_err() {
                    break;
                }
            }
            Err(kind) => {
                let _ = event_tx.send(Event::TcpClosed { server, kind });
                break;
            }
        }
    }

    writer.abort();
}

async fn connect_tcp(
    addr: SocketAddr,
    send_buffer_size: Option<usize>,
    recv_buffer_size: Option<usize>,
) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Some(size) = send_buffer_size {
        socket.set_send_buffer_size(u32::try_from(size).unwrap_or(u32::MAX))?;
    }
    if let Some(size) = recv_buffer_size {
        socket.set_recv_buffer_size(u32::try_from(size).unwrap_or(u32::MAX))?;
    }
    socket.connect(addr).await
}

/// Read one DNS message from a TCP stream.
///
/// A DNS TCP message has a big-endian u16 prefix giving the total
/// length of the message.  This is redundant (the header says how many
/// fields there are, and the fields contain length information), but
/// it means the entire message can be read before parsing begins.
///
/// `Err(None)` is a clean EOF at a message boundary.
async fn read_tcp_message(stream: &mut OwnedReadHalf) -> Result<Bytes, Option<io::ErrorKind>> {
    let length = match stream.read_u16().await {
        Ok(length) => usize::from(length),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Err(None),
        Err(err) => return Err(Some(err.kind())),
    };

    let mut octets = vec![0u8; length];
    match stream.read_exact(&mut octets).await {
        Ok(_) => Ok(Bytes::from(octets)),
        Err(err) => Err(Some(err.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(servers: usize, tries: u32, rotate: bool, primary: bool) -> ServerPool {
        let mut options = Options::new();
        options
            .set_servers(
                (0..servers)
                    .map(|i| {
                        std::net::IpAddr::V4(Ipv4Addr::new(192, 0, 2, u8::try_from(i).unwrap()))
                            .into()
                    })
                    .collect(),
            )
            .set_tries(tries)
            .set_rotate(rotate);
        options.flags.primary = primary;
        ServerPool::new(&options)
    }

    #[test]
    fn choose_without_rotate_prefers_first() {
        let mut pool = pool(3, 2, false, false);
        assert_eq!(0, pool.choose());
        assert_eq!(0, pool.choose());
    }

    #[test]
    fn choose_with_rotate_round_robins() {
        let mut pool = pool(3, 2, true, false);
        assert_eq!(0, pool.choose());
        assert_eq!(1, pool.choose());
        assert_eq!(2, pool.choose());
        assert_eq!(0, pool.choose());
    }

    #[test]
    fn primary_overrides_rotation() {
        let mut pool = pool(3, 2, true, true);
        assert_eq!(0, pool.choose());
        assert_eq!(0, pool.choose());
    }

    #[test]
    fn failed_endpoints_are_skipped() {
        let mut pool = pool(3, 2, false, false);
        pool.note_failure(0);
        pool.note_failure(0);
        assert_eq!(1, pool.choose());
        assert_eq!(2, pool.next_after(1));
    }

    #[test]
    fn success_clears_the_skip() {
        let mut pool = pool(2, 1, false, false);
        pool.note_failure(0);
        assert_eq!(1, pool.choose());
        pool.note_success(0);
        assert_eq!(0, pool.choose());
    }

    #[test]
    fn all_skipped_resets_counters() {
        let mut pool = pool(2, 1, false, false);
        pool.note_failure(0);
        pool.note_failure(1);
        assert_eq!(0, pool.choose());
        // counters were cleared, both endpoints usable again
        assert_eq!(1, pool.next_after(0));
    }

    #[test]
    fn endpoint_addresses_use_default_ports() {
        let mut options = Options::new();
        options
            .set_servers(vec!["192.0.2.1".parse().unwrap()])
            .set_udp_port(5300)
            .set_tcp_port(5301);
        let pool = ServerPool::new(&options);
        assert_eq!("192.0.2.1:5300".parse::<SocketAddr>().unwrap(), pool.endpoint(0).udp_addr);
        assert_eq!("192.0.2.1:5301".parse::<SocketAddr>().unwrap(), pool.endpoint(0).tcp_addr);
    }
}
