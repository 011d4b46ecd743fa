//! The per-request state carried by the channel, and the pure pieces
//! of the query lifecycle: search-list expansion, retry timing, reply
//! matching, and CNAME chasing.  Everything here is synchronous and
//! side-effect free; the channel's event loop drives the transitions.

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;

use dns_wire::message::{Message, Question, Rcode};
use dns_wire::name::Name;
use dns_wire::rdata::Rdata;

use crate::channel::Handler;
use crate::config::Transport;
use crate::error::Error;

/// Maximum number of CNAMEs followed for one lookup, whether inside a
/// single reply or across requeued queries.  A longer chain is treated
/// as a malformed response.
pub(crate) const MAX_CNAME_CHAIN: u32 = 8;

/// One in-flight lookup.  Owned by the channel, keyed by wire id, and
/// destroyed immediately after its terminal callback runs.
pub(crate) struct PendingQuery {
    /// Taken exactly once, at the terminal transition.
    pub(crate) handler: Option<Handler>,

    /// The question as sent on the wire, 0x20 casing included.
    pub(crate) question: Question,

    /// The name as the caller supplied it (after alias rewriting),
    /// used for the hosts-map fallback.
    pub(crate) original_name: Name,

    /// Search candidates not yet tried.
    pub(crate) candidates: VecDeque<Name>,

    /// Index of the endpoint the query was last sent to.
    pub(crate) server: usize,

    pub(crate) transport: Transport,

    /// Transmissions so far for the current wire name.
    pub(crate) attempt: u32,

    /// Transmissions left before the query fails.
    pub(crate) tries_left: u32,

    /// Timeouts observed over the whole lookup, reported to the
    /// caller.
    pub(crate) timeouts: u32,

    /// CNAMEs followed so far over the whole lookup.
    pub(crate) cname_depth: u32,

    /// The last rcode-derived failure, reported if every server is
    /// exhausted.
    pub(crate) last_failure: Option<Error>,

    /// Forced TCP: the usevc flag, an oversized query, or a truncated
    /// UDP reply.
    pub(crate) use_tcp: bool,

    /// Whether reply questions must match byte-for-byte (0x20 on).
    pub(crate) exact_case: bool,

    /// Whether the hosts map is consulted if DNS fails (lookup order
    /// put `f` after `b`).
    pub(crate) hosts_fallback: bool,

    /// A caller-built message: no search expansion, no CNAME chasing,
    /// the reply is handed over as-is.
    pub(crate) raw: bool,

    /// The serialised query, kept for retransmission.
    pub(crate) wire: Bytes,
}

/// The ordered wire names to try for a user-supplied name.
///
/// A name with a trailing dot is absolute: tried as-is, never
/// expanded.  A name with at least `ndots` dots is tried as-is first
/// and then with each search suffix; anything else tries the suffixes
/// first and the bare name last.
///
/// # Errors
///
/// `BadName` if the name does not parse.
pub(crate) fn search_candidates(
    name: &str,
    search: &[Name],
    ndots: usize,
) -> Result<VecDeque<Name>, Error> {
    let parsed = Name::parse(name).map_err(|_| Error::BadName)?;
    let mut candidates = VecDeque::with_capacity(search.len() + 1);

    if name.ends_with('.') && !name.ends_with("\\.") {
        candidates.push_back(parsed);
        return Ok(candidates);
    }

    let qualified = parsed.dots() >= ndots;
    if qualified {
        candidates.push_back(parsed.clone());
    }
    for suffix in search {
        // a join that would be over-long just isn't a candidate
        if let Ok(joined) = parsed.join(suffix) {
            candidates.push_back(joined);
        }
    }
    if !qualified {
        candidates.push_back(parsed);
    }

    Ok(candidates)
}

/// How long to wait for this UDP attempt.  Later attempts get
/// proportionally longer: `timeout * (1 + attempt / servers)`.
pub(crate) fn udp_try_timeout(base: Duration, attempt: u32, servers: usize) -> Duration {
    let servers = u32::try_from(servers.max(1)).unwrap_or(u32::MAX);
    base * (1 + attempt / servers)
}

/// Whether a decoded reply answers the given pending question.  The
/// channel has already checked the wire id and arrival socket; this
/// checks the QR bit and the echoed question.  With 0x20 on, the
/// echoed name must match the randomised casing byte-for-byte;
/// anything else is treated as spoofed and dropped.
pub(crate) fn reply_matches(question: &Question, reply: &Message, exact_case: bool) -> bool {
    if !reply.header.is_response {
        return false;
    }
    let [echoed] = &reply.questions[..] else {
        return false;
    };
    if echoed.qtype != question.qtype || echoed.qclass != question.qclass {
        return false;
    }
    if exact_case {
        echoed.name == question.name
    } else {
        echoed.name.eq_ignore_ascii_case(&question.name)
    }
}

/// The failure a server-fail rcode maps to, or `None` for rcodes that
/// are not endpoint failures.
pub(crate) fn rcode_failure(rcode: Rcode) -> Option<Error> {
    match rcode {
        Rcode::ServerFailure => Some(Error::ServerFailure),
        Rcode::Refused => Some(Error::Refused),
        Rcode::NotImplemented => Some(Error::NotImplemented),
        Rcode::FormatError => Some(Error::FormatError),
        _ => None,
    }
}

/// Where CNAME chasing through a single reply ends up.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Chase {
    /// The reply holds at least one record of the asked type, at the
    /// question name or at the end of an in-reply CNAME chain.
    Answered,

    /// No records of the asked type and no chain to follow.
    NoData,

    /// The chain leaves the reply: a fresh query for `target` is
    /// needed, with the chain depth so far.
    Follow { target: Name, depth: u32 },

    /// The chain exceeds [`MAX_CNAME_CHAIN`].
    TooDeep,
}

/// Follow the CNAME chain for `question` within one reply, starting
/// `base_depth` links into the overall lookup.
pub(crate) fn chase_cnames(message: &Message, question: &Question, base_depth: u32) -> Chase {
    let mut owner: &Name = &question.name;
    let mut depth = base_depth;

    loop {
        let mut cname = None;
        for rr in &message.answers {
            if !rr.name.eq_ignore_ascii_case(owner) {
                continue;
            }
            if question.qtype.matches(rr.rtype()) && question.qclass.matches(rr.rclass) {
                return Chase::Answered;
            }
            if let Rdata::Cname { target } = &rr.rdata {
                cname = Some(target);
            }
        }

        match cname {
            Some(target) => {
                depth += 1;
                if depth > MAX_CNAME_CHAIN {
                    return Chase::TooDeep;
                }
                owner = target;
            }
            None => {
                return if depth == base_depth {
                    Chase::NoData
                } else {
                    Chase::Follow {
                        target: owner.clone(),
                        depth,
                    }
                };
            }
        }
    }
}
