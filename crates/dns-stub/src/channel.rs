//! The channel: one resolver instance, with its own server pool,
//! options, pending queries, timers, and RNG.
//!
//! All of that state lives inside a single event-loop task, which is
//! the only code that ever touches it: sockets and callers communicate
//! with it exclusively through queues.  One `select!` pass over
//! commands, socket events, and the timer heap is one tick of the
//! loop; the loop itself never blocks and never spawns threads.

use bytes::Bytes;
use priority_queue::PriorityQueue;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use dns_wire::edns::Edns;
use dns_wire::message::{Message, QueryClass, QueryType, Question, Rcode};
use dns_wire::name::Name;
use dns_wire::rdata::{Rdata, RecordType};

use crate::config::{Lookup, Options, Transport};
use crate::error::Error;
use crate::pool::{Event, ServerPool};
use crate::query::{
    chase_cnames, rcode_failure, reply_matches, search_candidates, udp_try_timeout, Chase,
    PendingQuery,
};
use crate::sortlist;

/// Payload limit for queries sent without EDNS.
const CLASSIC_UDP_PAYLOAD: usize = 512;

/// A completed lookup.
#[derive(Debug, Clone)]
pub struct Answer {
    /// The reply, parsed.  For hosts-map hits this is synthesised
    /// locally and no query ever hits the wire.
    pub message: Message,

    /// Timeouts observed while producing this answer.
    pub timeouts: u32,
}

impl Answer {
    /// Every address in the answer section, in answer order.
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.message
            .answers
            .iter()
            .filter_map(|rr| match &rr.rdata {
                Rdata::A { address } => Some(IpAddr::V4(*address)),
                Rdata::Aaaa { address } => Some(IpAddr::V6(*address)),
                _ => None,
            })
            .collect()
    }
}

/// The completion callback of one submission.  Fired exactly once,
/// with the outcome and the number of timeouts observed.
pub(crate) type Handler = Box<dyn FnOnce(Result<Answer, Error>, u32) + Send + 'static>;

enum Command {
    Submit {
        name: String,
        qclass: QueryClass,
        qtype: QueryType,
        handler: Handler,
        epoch: u64,
    },
    SubmitRaw {
        octets: Bytes,
        handler: Handler,
        epoch: u64,
    },
    Cancel {
        done: oneshot::Sender<()>,
    },
    Destroy {
        done: oneshot::Sender<()>,
    },
}

/// A handle to one resolver instance.  Handles are cheap to clone and
/// share one event loop; when the last handle is dropped the loop
/// tears down, failing any in-flight queries with `Destroyed`.
#[derive(Clone)]
pub struct Channel {
    cmd_tx: mpsc::UnboundedSender<Command>,
    cancel_epoch: Arc<AtomicU64>,
    sortlist: Arc<Vec<ipnet::IpNet>>,
}

impl Channel {
    /// Create a channel and spawn its event loop.  Must be called
    /// from within a tokio runtime.  No sockets are opened until the
    /// first query needs one.
    pub fn new(options: Options) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel_epoch = Arc::new(AtomicU64::new(0));
        let sortlist = Arc::new(options.sortlist.clone());

        let driver = Driver {
            pool: ServerPool::new(&options),
            options,
            pending: BTreeMap::new(),
            timers: PriorityQueue::new(),
            cmd_rx,
            event_rx,
            event_tx,
            rng: StdRng::from_entropy(),
            cancel_epoch: cancel_epoch.clone(),
        };
        tokio::spawn(driver.run());

        Self {
            cmd_tx,
            cancel_epoch,
            sortlist,
        }
    }

    /// Submit a query.  The handler fires exactly once, from the
    /// channel's event loop, with the outcome and the number of
    /// timeouts observed.
    pub fn submit<F>(&self, name: &str, qclass: QueryClass, qtype: QueryType, handler: F)
    where
        F: FnOnce(Result<Answer, Error>, u32) + Send + 'static,
    {
        let command = Command::Submit {
            name: name.to_string(),
            qclass,
            qtype,
            handler: Box::new(handler),
            epoch: self.cancel_epoch.load(Ordering::SeqCst),
        };
        if let Err(mpsc::error::SendError(command)) = self.cmd_tx.send(command) {
            if let Command::Submit { handler, .. } = command {
                handler(Err(Error::Destroyed), 0);
            }
        }
    }

    /// Submit a caller-built query message.  The wire id is replaced
    /// with a channel-allocated one; nothing else is touched: no
    /// search expansion, no hosts map, no 0x20.  The reply is
    /// delivered as parsed, without CNAME chasing.
    ///
    /// The message must carry exactly one question: a reply to a
    /// zero- or multi-question query could never be matched back to
    /// it, so such messages fail immediately with `BadName`.
    pub fn submit_raw<F>(&self, octets: Bytes, handler: F)
    where
        F: FnOnce(Result<Answer, Error>, u32) + Send + 'static,
    {
        let command = Command::SubmitRaw {
            octets,
            handler: Box::new(handler),
            epoch: self.cancel_epoch.load(Ordering::SeqCst),
        };
        if let Err(mpsc::error::SendError(command)) = self.cmd_tx.send(command) {
            if let Command::SubmitRaw { handler, .. } = command {
                handler(Err(Error::Destroyed), 0);
            }
        }
    }

    /// `submit`, as a future.
    ///
    /// # Errors
    ///
    /// See [`Error`].
    pub async fn query(
        &self,
        name: &str,
        qclass: QueryClass,
        qtype: QueryType,
    ) -> Result<Answer, Error> {
        let (tx, rx) = oneshot::channel();
        self.submit(name, qclass, qtype, move |result, _timeouts| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(Error::Destroyed))
    }

    /// `submit_raw`, as a future.
    ///
    /// # Errors
    ///
    /// See [`Error`].
    pub async fn query_raw(&self, octets: Bytes) -> Result<Answer, Error> {
        let (tx, rx) = oneshot::channel();
        self.submit_raw(octets, move |result, _timeouts| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(Error::Destroyed))
    }

    /// Cancel every in-flight query.  When this returns, every
    /// pending callback has fired with `Cancelled`.  This covers
    /// submissions enqueued before the cancel that the event loop had
    /// not picked up yet: those are cancelled before any bytes reach
    /// the wire.
    pub async fn cancel(&self) {
        self.cancel_epoch.fetch_add(1, Ordering::SeqCst);
        let (done, ack) = oneshot::channel();
        if self.cmd_tx.send(Command::Cancel { done }).is_ok() {
            let _ = ack.await;
        }
    }

    /// Tear the channel down.  When this returns, every pending
    /// callback has fired with `Destroyed` and every socket is
    /// closed.  Other clones of this handle get `Destroyed` for any
    /// later use.
    pub async fn destroy(self) {
        self.cancel_epoch.fetch_add(1, Ordering::SeqCst);
        let (done, ack) = oneshot::channel();
        if self.cmd_tx.send(Command::Destroy { done }).is_ok() {
            let _ = ack.await;
        }
    }

    pub(crate) fn sortlist(&self) -> &[ipnet::IpNet] {
        &self.sortlist
    }
}

/// The event loop and every piece of channel state.  Nothing outside
/// [`Driver::run`] ever sees this struct.
struct Driver {
    options: Options,
    pool: ServerPool,
    pending: BTreeMap<u16, PendingQuery>,
    timers: PriorityQueue<u16, Reverse<Instant>>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_rx: mpsc::UnboundedReceiver<Event>,
    event_tx: mpsc::UnboundedSender<Event>,
    rng: StdRng,
    cancel_epoch: Arc<AtomicU64>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let deadline = self.timers.peek().map(|(_, Reverse(at))| *at);

            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await {
                            break;
                        }
                    }
                    // the last Channel handle is gone
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                event = self.event_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    }
                }
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.expire_timers().await;
                }
            }
        }
    }

    /// Returns true when the loop should exit.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Submit {
                name,
                qclass,
                qtype,
                handler,
                epoch,
            } => {
                if epoch < self.cancel_epoch.load(Ordering::SeqCst) {
                    handler(Err(Error::Cancelled), 0);
                } else {
                    self.submit(&name, qclass, qtype, handler).await;
                }
                false
            }
            Command::SubmitRaw {
                octets,
                handler,
                epoch,
            } => {
                if epoch < self.cancel_epoch.load(Ordering::SeqCst) {
                    handler(Err(Error::Cancelled), 0);
                } else {
                    self.submit_raw(&octets, handler).await;
                }
                false
            }
            Command::Cancel { done } => {
                self.cancel_all(Error::Cancelled);
                let _ = done.send(());
                false
            }
            Command::Destroy { done } => {
                self.shutdown();
                let _ = done.send(());
                true
            }
        }
    }

    async fn submit(&mut self, name: &str, qclass: QueryClass, qtype: QueryType, handler: Handler) {
        // a PTR query for a bare address literal asks for the
        // matching reverse name; the trailing dot keeps it absolute
        let mut lookup_name = name.to_string();
        let mut aliased = false;
        if qtype == QueryType::Record(RecordType::PTR) {
            if let Ok(address) = name.parse::<IpAddr>() {
                lookup_name = format!("{}.", Name::reverse_address(address));
                aliased = true;
            }
        }

        // host aliases rewrite dot-free names, and suppress the
        // search list when they hit
        if !aliased && !self.options.flags.no_aliases && !name.contains('.') {
            if let Ok(parsed) = Name::parse(name) {
                if let Some(canonical) = self.options.aliases.lookup(&parsed) {
                    tracing::debug!(%name, %canonical, "rewrote via host alias");
                    lookup_name = canonical.to_string();
                    aliased = true;
                }
            }
        }

        let search: &[Name] = if aliased { &[] } else { &self.options.search };
        let mut candidates = match search_candidates(&lookup_name, search, self.options.ndots) {
            Ok(candidates) => candidates,
            Err(err) => {
                handler(Err(err), 0);
                return;
            }
        };
        // candidates is never empty: the bare name is always in it
        let Some(first) = candidates.pop_front() else {
            handler(Err(Error::BadName), 0);
            return;
        };
        let Ok(original_name) = Name::parse(&lookup_name) else {
            handler(Err(Error::BadName), 0);
            return;
        };

        // the hosts map answers address lookups, per the lookup order
        let mut hosts_fallback = false;
        if matches!(qtype, QueryType::Record(RecordType::A | RecordType::AAAA)) {
            for (i, lookup) in self.options.lookups.iter().enumerate() {
                match lookup {
                    Lookup::HostsFile => {
                        if let Some(answers) = self.options.hosts.answer(&original_name, qtype) {
                            let question = Question {
                                name: original_name.clone(),
                                qtype,
                                qclass,
                            };
                            let mut message = Message::new_query(0, question).make_response();
                            message.answers = answers;
                            handler(Ok(Answer { message, timeouts: 0 }), 0);
                            return;
                        }
                    }
                    Lookup::Dns => {
                        hosts_fallback =
                            self.options.lookups[i + 1..].contains(&Lookup::HostsFile);
                        break;
                    }
                }
            }
            if !self.options.lookups.contains(&Lookup::Dns) {
                handler(Err(Error::NotFound), 0);
                return;
            }
        }

        let mut pq = PendingQuery {
            handler: Some(handler),
            question: Question {
                name: Name::root(),
                qtype,
                qclass,
            },
            original_name,
            candidates,
            server: self.pool.choose(),
            transport: Transport::Udp,
            attempt: 0,
            tries_left: self.tries_budget(),
            timeouts: 0,
            cname_depth: 0,
            last_failure: None,
            use_tcp: self.options.flags.use_tcp,
            exact_case: self.options.flags.dns0x20,
            hosts_fallback,
            raw: false,
            wire: Bytes::new(),
        };

        let qid = self.allocate_id();
        if let Err(err) = self.compose(&mut pq, qid, first, true) {
            if let Some(handler) = pq.handler.take() {
                handler(Err(err), 0);
            }
            return;
        }
        self.pending.insert(qid, pq);
        self.transmit(qid).await;
    }

    async fn submit_raw(&mut self, octets: &[u8], handler: Handler) {
        let mut message = match Message::from_octets(octets) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!(%error, "rejecting malformed raw query");
                handler(Err(Error::BadName), 0);
                return;
            }
        };
        // reply matching insists on a single echoed question, so a
        // raw query with any other shape could only ever time out;
        // reject it up front instead
        let [question] = &message.questions[..] else {
            handler(Err(Error::BadName), 0);
            return;
        };
        let question = question.clone();

        let qid = self.allocate_id();
        message.header.id = qid;
        let Ok(wire) = message.to_octets() else {
            handler(Err(Error::BadName), 0);
            return;
        };
        let wire = wire.freeze();

        let mut pq = PendingQuery {
            handler: Some(handler),
            original_name: question.name.clone(),
            question,
            candidates: VecDeque::new(),
            server: self.pool.choose(),
            transport: Transport::Udp,
            attempt: 0,
            tries_left: self.tries_budget(),
            timeouts: 0,
            cname_depth: 0,
            last_failure: None,
            use_tcp: self.options.flags.use_tcp,
            exact_case: false,
            hosts_fallback: false,
            raw: true,
            wire,
        };
        if pq.wire.len() > self.max_udp_payload() {
            pq.use_tcp = true;
        }

        self.pending.insert(qid, pq);
        self.transmit(qid).await;
    }

    /// Compose the wire form of a query for `wire_name`, applying
    /// 0x20 casing (unless the name is being reissued verbatim) and
    /// EDNS, and store it in the pending query.
    fn compose(
        &mut self,
        pq: &mut PendingQuery,
        qid: u16,
        wire_name: Name,
        randomise: bool,
    ) -> Result<(), Error> {
        let wire_name = if randomise && self.options.flags.dns0x20 {
            let rng = &mut self.rng;
            wire_name.randomise_case(|| rng.gen())
        } else {
            wire_name
        };

        pq.question = Question {
            name: wire_name,
            qtype: pq.question.qtype,
            qclass: pq.question.qclass,
        };

        let mut message = Message::new_query(qid, pq.question.clone());
        message.header.recursion_desired = !self.options.flags.no_recursion;
        if self.options.flags.edns {
            message = message.with_edns(Edns::new(self.options.udp_payload_size));
        }

        pq.wire = message.to_octets().map_err(|_| Error::BadName)?.freeze();
        if pq.wire.len() > self.max_udp_payload() {
            pq.use_tcp = true;
        }
        Ok(())
    }

    /// Send (or resend) a pending query, trying further endpoints on
    /// socket-level failure.  Arms the retry timer on success.
    async fn transmit(&mut self, qid: u16) {
        let servers = self.pool.len();

        for _ in 0..servers {
            let Some(pq) = self.pending.get_mut(&qid) else {
                return;
            };
            let transport = if pq.use_tcp {
                Transport::Tcp
            } else {
                Transport::Udp
            };
            pq.transport = transport;
            let server = pq.server;
            let attempt = pq.attempt;
            let wire = pq.wire.clone();

            let sent = match transport {
                Transport::Udp => match self.pool.ensure_udp(server, &self.event_tx).await {
                    Ok(socket) => match socket.send(&wire).await {
                        Ok(_) => true,
                        Err(err) => {
                            tracing::debug!(server, error = %err, "UDP send failed");
                            false
                        }
                    },
                    Err(err) => {
                        tracing::debug!(server, error = %err, "UDP socket open failed");
                        false
                    }
                },
                Transport::Tcp => self
                    .pool
                    .ensure_tcp(server, &self.event_tx)
                    .send(wire)
                    .is_ok(),
            };

            if sent {
                let timeout = match transport {
                    Transport::Udp => udp_try_timeout(self.options.timeout, attempt, servers),
                    Transport::Tcp => self.options.timeout,
                };
                self.timers.push(qid, Reverse(Instant::now() + timeout));
                return;
            }

            self.pool.note_failure(server);
            let next = self.pool.next_after(server);
            let Some(pq) = self.pending.get_mut(&qid) else {
                return;
            };
            pq.last_failure.get_or_insert(Error::ConnectionRefused);
            pq.server = next;
        }

        self.finish(qid, Err(Error::ConnectionRefused));
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Udp { server, octets } => {
                self.handle_reply(server, Transport::Udp, &octets).await;
            }
            Event::Tcp { server, octets } => {
                self.handle_reply(server, Transport::Tcp, &octets).await;
            }
            Event::UdpClosed { server, kind } => {
                tracing::debug!(server, ?kind, "UDP socket failed");
                self.pool.close_udp(server);
                self.transport_failed(server, Transport::Udp).await;
            }
            Event::TcpClosed { server, kind } => {
                tracing::debug!(server, ?kind, "TCP connection closed");
                self.pool.close_tcp(server);
                self.transport_failed(server, Transport::Tcp).await;
            }
        }
    }

    /// A socket died: every query in flight on it fails over to the
    /// next endpoint, or finishes with `ConnectionRefused` when out of
    /// tries.
    async fn transport_failed(&mut self, server: usize, transport: Transport) {
        let affected: Vec<u16> = self
            .pending
            .iter()
            .filter(|(_, pq)| pq.server == server && pq.transport == transport)
            .map(|(qid, _)| *qid)
            .collect();

        for qid in affected {
            self.pool.note_failure(server);
            let next = self.pool.next_after(server);
            let Some(pq) = self.pending.get_mut(&qid) else {
                continue;
            };
            pq.last_failure = Some(Error::ConnectionRefused);
            if pq.tries_left <= 1 {
                self.finish(qid, Err(Error::ConnectionRefused));
                continue;
            }
            pq.tries_left -= 1;
            pq.attempt += 1;
            pq.server = next;
            self.timers.remove(&qid);
            self.transmit(qid).await;
        }
    }

    async fn handle_reply(&mut self, server: usize, transport: Transport, octets: &[u8]) {
        let message = match Message::from_octets(octets) {
            Ok(message) => message,
            Err(error) => {
                // an individual malformed packet is dropped, not an
                // error: the timer will retransmit if nothing valid
                // arrives
                tracing::debug!(%error, %transport, "dropping malformed reply");
                return;
            }
        };

        let qid = message.header.id;
        let matched = match self.pending.get(&qid) {
            Some(pq) => {
                // a reply must arrive on the socket the query went out
                // on: a late UDP reply after TCP fallback is dropped
                pq.server == server
                    && pq.transport == transport
                    && reply_matches(&pq.question, &message, pq.exact_case)
            }
            None => false,
        };
        if !matched {
            tracing::debug!(%qid, server, %transport, "dropping unmatched reply");
            return;
        }

        self.pool.note_success(server);

        if transport == Transport::Udp
            && message.header.is_truncated
            && !self.options.flags.ignore_truncation
        {
            self.fallback_to_tcp(qid).await;
            return;
        }

        match message.header.rcode {
            Rcode::NoError => self.process_answer(qid, message).await,
            Rcode::NameError => self.advance_search(qid).await,
            rcode => match rcode_failure(rcode) {
                Some(failure) => self.server_failed(qid, failure).await,
                None => {
                    tracing::debug!(%rcode, "reserved rcode in reply");
                    self.finish(qid, Err(Error::BadResponse));
                }
            },
        }
    }

    async fn process_answer(&mut self, qid: u16, mut message: Message) {
        let chase = {
            let Some(pq) = self.pending.get(&qid) else {
                return;
            };
            if pq.raw {
                None
            } else {
                Some(chase_cnames(&message, &pq.question, pq.cname_depth))
            }
        };
        let Some(chase) = chase else {
            self.finish(qid, Ok(message));
            return;
        };

        match chase {
            Chase::Answered => {
                sortlist::sort_answers(&self.options.sortlist, &mut message.answers);
                self.finish(qid, Ok(message));
            }
            Chase::NoData => self.finish(qid, Err(Error::NoData)),
            Chase::TooDeep => self.finish(qid, Err(Error::BadResponse)),
            Chase::Follow { target, depth } => {
                tracing::debug!(%target, depth, "following CNAME with a fresh query");
                if let Some(pq) = self.pending.get_mut(&qid) {
                    // the search is over once a server answered
                    pq.candidates.clear();
                }
                self.requeue(qid, target, depth).await;
            }
        }
    }

    /// NXDOMAIN: move on to the next search candidate, or fail.
    async fn advance_search(&mut self, qid: u16) {
        let next_name = match self.pending.get_mut(&qid) {
            Some(pq) => pq.candidates.pop_front(),
            None => return,
        };
        match next_name {
            Some(name) => self.requeue(qid, name, 0).await,
            None => self.finish(qid, Err(Error::NotFound)),
        }
    }

    /// Re-enter the SEND state with a new wire name: the next search
    /// candidate, or a CNAME target.  Fresh id, fresh casing, fresh
    /// tries budget; accumulated timeouts are kept.
    async fn requeue(&mut self, qid: u16, wire_name: Name, cname_depth: u32) {
        let Some(mut pq) = self.pending.remove(&qid) else {
            return;
        };
        self.timers.remove(&qid);

        pq.cname_depth = cname_depth;
        pq.attempt = 0;
        pq.tries_left = self.tries_budget();
        pq.last_failure = None;
        pq.use_tcp = self.options.flags.use_tcp;
        pq.server = self.pool.choose();

        let new_qid = self.allocate_id();
        if let Err(err) = self.compose(&mut pq, new_qid, wire_name, true) {
            if let Some(handler) = pq.handler.take() {
                handler(Err(err), pq.timeouts);
            }
            return;
        }
        self.pending.insert(new_qid, pq);
        self.transmit(new_qid).await;
    }

    /// A truncated UDP reply: reissue the same question over TCP on
    /// the same endpoint, under a new id.
    async fn fallback_to_tcp(&mut self, qid: u16) {
        let Some(mut pq) = self.pending.remove(&qid) else {
            return;
        };
        self.timers.remove(&qid);

        tracing::debug!(server = pq.server, "truncated reply, falling back to TCP");
        pq.use_tcp = true;

        let new_qid = self.allocate_id();
        let wire_name = pq.question.name.clone();
        // reissued verbatim: the 0x20 casing must not change
        if let Err(err) = self.compose(&mut pq, new_qid, wire_name, false) {
            if let Some(handler) = pq.handler.take() {
                handler(Err(err), pq.timeouts);
            }
            return;
        }
        self.pending.insert(new_qid, pq);
        self.transmit(new_qid).await;
    }

    /// A server-fail rcode: count the endpoint failure and re-send to
    /// the next endpoint, or fail with the last rcode seen.
    async fn server_failed(&mut self, qid: u16, failure: Error) {
        let server = match self.pending.get(&qid) {
            Some(pq) => pq.server,
            None => return,
        };
        self.pool.note_failure(server);
        let next = self.pool.next_after(server);

        let Some(pq) = self.pending.get_mut(&qid) else {
            return;
        };
        pq.last_failure = Some(failure);
        if pq.tries_left <= 1 {
            self.finish(qid, Err(failure));
            return;
        }
        pq.tries_left -= 1;
        pq.attempt += 1;
        pq.server = next;
        self.timers.remove(&qid);
        self.transmit(qid).await;
    }

    async fn expire_timers(&mut self) {
        let now = Instant::now();
        loop {
            let due = match self.timers.peek() {
                Some((&qid, &Reverse(at))) if at <= now => Some(qid),
                _ => None,
            };
            let Some(qid) = due else {
                break;
            };
            self.timers.remove(&qid);
            self.handle_timeout(qid).await;
        }
    }

    async fn handle_timeout(&mut self, qid: u16) {
        let server = match self.pending.get(&qid) {
            Some(pq) => pq.server,
            None => return,
        };
        self.pool.note_failure(server);
        let next = self.pool.next_after(server);

        let Some(pq) = self.pending.get_mut(&qid) else {
            return;
        };
        pq.timeouts += 1;
        if pq.tries_left <= 1 {
            self.finish(qid, Err(Error::Timeout));
            return;
        }
        pq.tries_left -= 1;
        pq.attempt += 1;
        pq.server = next;
        tracing::debug!(%qid, server = pq.server, attempt = pq.attempt, "timed out, retrying");
        self.transmit(qid).await;
    }

    /// The terminal transition: remove the query, run its callback,
    /// release idle sockets.
    fn finish(&mut self, qid: u16, result: Result<Message, Error>) {
        let Some(mut pq) = self.pending.remove(&qid) else {
            return;
        };
        self.timers.remove(&qid);

        let mut result = result;
        // the hosts map as a later lookup source
        let hosts_eligible = pq.hosts_fallback
            && result.is_err()
            && !matches!(result, Err(Error::Cancelled | Error::Destroyed));
        if hosts_eligible {
            if let Some(answers) = self
                .options
                .hosts
                .answer(&pq.original_name, pq.question.qtype)
            {
                let question = Question {
                    name: pq.original_name.clone(),
                    qtype: pq.question.qtype,
                    qclass: pq.question.qclass,
                };
                let mut message = Message::new_query(0, question).make_response();
                message.answers = answers;
                result = Ok(message);
            }
        }

        let timeouts = pq.timeouts;
        if let Some(handler) = pq.handler.take() {
            handler(result.map(|message| Answer { message, timeouts }), timeouts);
        }

        if !self.options.flags.stay_open {
            self.close_idle_sockets();
        }
    }

    fn cancel_all(&mut self, error: Error) {
        // map order, so callbacks fire in a stable order
        let qids: Vec<u16> = self.pending.keys().copied().collect();
        for qid in qids {
            self.finish(qid, Err(error));
        }
    }

    fn shutdown(&mut self) {
        self.cancel_all(Error::Destroyed);
        self.pool.close_all();
    }

    fn close_idle_sockets(&mut self) {
        let in_use: HashSet<(usize, Transport)> = self
            .pending
            .values()
            .map(|pq| (pq.server, pq.transport))
            .collect();
        self.pool.close_unused(&in_use);
    }

    fn allocate_id(&mut self) -> u16 {
        loop {
            let qid = self.rng.gen();
            if !self.pending.contains_key(&qid) {
                return qid;
            }
        }
    }

    fn tries_budget(&self) -> u32 {
        self.options.tries * u32::try_from(self.pool.len().max(1)).unwrap_or(1)
    }

    fn max_udp_payload(&self) -> usize {
        if self.options.flags.edns {
            usize::from(self.options.udp_payload_size)
        } else {
            CLASSIC_UDP_PAYLOAD
        }
    }
}
