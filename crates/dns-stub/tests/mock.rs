//! End-to-end tests against in-process mock servers.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

use bytes::Bytes;
use dns_stub::hosts::Hosts;
use dns_stub::{Channel, Error, Flags, Options, ServerSpec};
use dns_wire::message::test_util::*;
use dns_wire::message::{Message, QueryClass, QueryType, Rcode};
use dns_wire::rdata::{Rdata, Record, RecordClass, RecordType};

struct MockUdpServer {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
}

/// A UDP nameserver driven by a closure from (query index, query) to
/// an optional reply.  Returning `None` drops the datagram.
async fn mock_udp_server<F>(respond: F) -> MockUdpServer
where
    F: Fn(usize, &Message) -> Option<Message> + Send + Sync + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let queries = Arc::new(AtomicUsize::new(0));

    let counter = queries.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        loop {
            let Ok((received, src)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let Ok(query) = Message::from_octets(&buf[..received]) else {
                continue;
            };
            if let Some(reply) = respond(index, &query) {
                let octets = reply.to_octets().unwrap();
                let _ = socket.send_to(&octets, src).await;
            }
        }
    });

    MockUdpServer { addr, queries }
}

/// A TCP nameserver answering every framed query on every connection
/// with the given closure.
async fn mock_tcp_server<F>(respond: F) -> SocketAddr
where
    F: Fn(&Message) -> Message + Send + Sync + Clone + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let respond = respond.clone();
            tokio::spawn(async move {
                loop {
                    let Ok(length) = stream.read_u16().await else {
                        break;
                    };
                    let mut buf = vec![0u8; usize::from(length)];
                    if stream.read_exact(&mut buf).await.is_err() {
                        break;
                    }
                    let Ok(query) = Message::from_octets(&buf) else {
                        break;
                    };
                    let octets = respond(&query).to_octets().unwrap();
                    let length = u16::try_from(octets.len()).unwrap();
                    if stream.write_all(&length.to_be_bytes()).await.is_err() {
                        break;
                    }
                    if stream.write_all(&octets).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

fn options_for(addr: SocketAddr) -> Options {
    let mut options = Options::new();
    options
        .set_servers(vec![addr.into()])
        .set_timeout(Duration::from_millis(250))
        .set_tries(2)
        .set_lookups("b");
    options
}

fn qtype_a() -> QueryType {
    QueryType::Record(RecordType::A)
}

fn qclass_in() -> QueryClass {
    QueryClass::Record(RecordClass::IN)
}

fn answer_with(query: &Message, address: Ipv4Addr) -> Message {
    let mut reply = query.make_response();
    reply.answers = vec![a_record(
        &query.questions[0].name.to_string(),
        address,
    )];
    reply
}

#[tokio::test]
async fn basic_a_lookup() {
    let server = mock_udp_server(|_, query| {
        let mut reply = answer_with(query, Ipv4Addr::new(1, 2, 3, 4));
        reply.answers[0].ttl = 256;
        Some(reply)
    })
    .await;

    let channel = Channel::new(options_for(server.addr));
    let answer = channel
        .query("www.google.com.", qclass_in(), qtype_a())
        .await
        .unwrap();

    assert_eq!(
        vec!["1.2.3.4".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );
    assert_eq!(0, answer.timeouts);
    assert_eq!(256, answer.message.answers[0].ttl);
}

#[tokio::test]
async fn search_list_walks_suffixes() {
    let server = mock_udp_server(|_, query| {
        let mut reply = query.make_response();
        let qname = query.questions[0].name.to_ascii_lowercase().to_string();
        if qname == "www.third.gov" {
            reply = answer_with(query, Ipv4Addr::new(2, 3, 4, 5));
        } else {
            reply.header.rcode = Rcode::NameError;
        }
        Some(reply)
    })
    .await;

    let mut options = options_for(server.addr);
    options.set_domains(vec![
        domain("first.com"),
        domain("second.org"),
        domain("third.gov"),
    ]);
    let channel = Channel::new(options);

    let answer = channel.query("www", qclass_in(), qtype_a()).await.unwrap();
    assert_eq!(
        vec!["2.3.4.5".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );
    // three queries hit the wire: two NXDOMAINs, one answer
    assert_eq!(3, server.queries.load(Ordering::SeqCst));
}

#[tokio::test]
async fn udp_retries_after_drops() {
    let server = mock_udp_server(|index, query| {
        if index < 2 {
            return None;
        }
        Some(answer_with(query, Ipv4Addr::new(3, 4, 5, 6)))
    })
    .await;

    let mut options = options_for(server.addr);
    options
        .set_timeout(Duration::from_millis(100))
        .set_tries(3);
    let channel = Channel::new(options);

    let answer = channel
        .query("www.example.com.", qclass_in(), qtype_a())
        .await
        .unwrap();

    assert_eq!(
        vec!["3.4.5.6".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );
    assert_eq!(2, answer.timeouts);
}

#[tokio::test]
async fn truncation_falls_back_to_tcp() {
    let udp = mock_udp_server(|_, query| {
        let mut reply = query.make_response();
        reply.header.is_truncated = true;
        Some(reply)
    })
    .await;
    let tcp_addr = mock_tcp_server(|query| answer_with(query, Ipv4Addr::new(5, 6, 7, 8))).await;

    let mut options = Options::new();
    options
        .set_servers(vec![ServerSpec {
            address: udp.addr.ip(),
            udp_port: Some(udp.addr.port()),
            tcp_port: Some(tcp_addr.port()),
        }])
        .set_timeout(Duration::from_millis(500))
        .set_tries(2)
        .set_lookups("b");
    let channel = Channel::new(options);

    let answer = channel
        .query("www.example.com.", qclass_in(), qtype_a())
        .await
        .unwrap();

    assert_eq!(
        vec!["5.6.7.8".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );
    assert_eq!(0, answer.timeouts);
}

#[tokio::test]
async fn always_tcp_when_asked() {
    let tcp_addr = mock_tcp_server(|query| answer_with(query, Ipv4Addr::new(7, 7, 0, 1))).await;
    let udp = mock_udp_server(|_, _| None).await;

    let mut options = Options::new();
    options
        .set_servers(vec![ServerSpec {
            address: udp.addr.ip(),
            udp_port: Some(udp.addr.port()),
            tcp_port: Some(tcp_addr.port()),
        }])
        .set_timeout(Duration::from_millis(500))
        .set_lookups("b")
        .set_flags(Flags {
            use_tcp: true,
            ..Flags::default()
        });
    let channel = Channel::new(options);

    let answer = channel
        .query("www.example.com.", qclass_in(), qtype_a())
        .await
        .unwrap();

    assert_eq!(
        vec!["7.7.0.1".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );
    // the UDP mock saw nothing
    assert_eq!(0, udp.queries.load(Ordering::SeqCst));
}

#[tokio::test]
async fn server_failure_fails_over() {
    let bad = mock_udp_server(|_, query| {
        let mut reply = query.make_response();
        reply.header.rcode = Rcode::ServerFailure;
        Some(reply)
    })
    .await;
    let good = mock_udp_server(|_, query| Some(answer_with(query, Ipv4Addr::new(9, 9, 9, 9)))).await;

    let mut options = Options::new();
    options
        .set_servers(vec![bad.addr.into(), good.addr.into()])
        .set_timeout(Duration::from_millis(500))
        .set_tries(2)
        .set_lookups("b");
    let channel = Channel::new(options);

    let answer = channel
        .query("www.example.com.", qclass_in(), qtype_a())
        .await
        .unwrap();

    assert_eq!(
        vec!["9.9.9.9".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );
    assert_eq!(1, bad.queries.load(Ordering::SeqCst));
}

#[tokio::test]
async fn servfail_everywhere_reports_server_failure() {
    let server = mock_udp_server(|_, query| {
        let mut reply = query.make_response();
        reply.header.rcode = Rcode::ServerFailure;
        Some(reply)
    })
    .await;

    let channel = Channel::new(options_for(server.addr));
    let result = channel
        .query("www.example.com.", qclass_in(), qtype_a())
        .await;

    assert!(matches!(result, Err(Error::ServerFailure)));
}

#[tokio::test]
async fn empty_answer_is_nodata() {
    let server = mock_udp_server(|_, query| Some(query.make_response())).await;

    let channel = Channel::new(options_for(server.addr));
    let result = channel
        .query("www.example.com.", qclass_in(), qtype_a())
        .await;

    assert!(matches!(result, Err(Error::NoData)));
}

#[tokio::test]
async fn cname_target_is_fetched_with_a_fresh_query() {
    let server = mock_udp_server(|_, query| {
        let mut reply = query.make_response();
        let qname = query.questions[0].name.to_ascii_lowercase().to_string();
        if qname == "alias.example.com" {
            reply.answers = vec![cname_record(
                &query.questions[0].name.to_string(),
                "real.example.com",
            )];
        } else if qname == "real.example.com" {
            reply = answer_with(query, Ipv4Addr::new(7, 8, 9, 10));
        } else {
            reply.header.rcode = Rcode::NameError;
        }
        Some(reply)
    })
    .await;

    let channel = Channel::new(options_for(server.addr));
    let answer = channel
        .query("alias.example.com.", qclass_in(), qtype_a())
        .await
        .unwrap();

    assert_eq!(
        vec!["7.8.9.10".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );
    assert_eq!(2, server.queries.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancel_fires_callback_without_traffic() {
    let server = mock_udp_server(|_, query| Some(answer_with(query, Ipv4Addr::new(1, 1, 1, 1)))).await;

    let channel = Channel::new(options_for(server.addr));
    let (tx, rx) = tokio::sync::oneshot::channel();
    channel.submit(
        "www.example.com.",
        qclass_in(),
        qtype_a(),
        move |result, _timeouts| {
            let _ = tx.send(result);
        },
    );
    channel.cancel().await;

    let result = rx.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));

    // give any stray datagram time to show up
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(0, server.queries.load(Ordering::SeqCst));
}

#[tokio::test]
async fn destroy_fails_pending_queries() {
    let server = mock_udp_server(|_, _| None).await;

    let mut options = options_for(server.addr);
    options.set_timeout(Duration::from_secs(30));
    let channel = Channel::new(options);

    let (tx, rx) = tokio::sync::oneshot::channel();
    channel.submit(
        "www.example.com.",
        qclass_in(),
        qtype_a(),
        move |result, _timeouts| {
            let _ = tx.send(result);
        },
    );
    // let the query reach the wire first
    tokio::time::sleep(Duration::from_millis(100)).await;
    channel.destroy().await;

    let result = rx.await.unwrap();
    assert!(matches!(result, Err(Error::Destroyed)));
    assert_eq!(1, server.queries.load(Ordering::SeqCst));
}

#[tokio::test]
async fn mismatched_0x20_case_is_ignored() {
    let server = mock_udp_server(|_, query| {
        let mut reply = answer_with(query, Ipv4Addr::new(6, 6, 6, 6));
        // echo the question the way a spoofer who never saw the
        // randomised casing would
        reply.questions[0].name = reply.questions[0].name.to_ascii_lowercase();
        reply.answers[0].name = reply.answers[0].name.to_ascii_lowercase();
        Some(reply)
    })
    .await;

    let mut options = options_for(server.addr);
    options
        .set_timeout(Duration::from_millis(100))
        .set_flags(Flags {
            dns0x20: true,
            ..Flags::default()
        });
    let channel = Channel::new(options);

    // plenty of letters, so an accidentally all-lowercase
    // randomisation is astronomically unlikely
    let result = channel
        .query(
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa.example.com.",
            qclass_in(),
            qtype_a(),
        )
        .await;

    assert!(matches!(result, Err(Error::Timeout)));
}

#[tokio::test]
async fn hosts_map_answers_without_network() {
    let server = mock_udp_server(|_, query| Some(answer_with(query, Ipv4Addr::new(1, 1, 1, 1)))).await;

    let mut options = options_for(server.addr);
    options
        .set_lookups("fb")
        .set_hosts(Hosts::deserialise("10.0.0.1 myhost\n").unwrap());
    let channel = Channel::new(options);

    let answer = channel.query("myhost", qclass_in(), qtype_a()).await.unwrap();
    assert_eq!(
        vec!["10.0.0.1".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(0, server.queries.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unspec_lookup_merges_families() {
    let server = mock_udp_server(|_, query| {
        let mut reply = query.make_response();
        let name = query.questions[0].name.to_string();
        match query.questions[0].qtype {
            QueryType::Record(RecordType::A) => {
                reply.answers = vec![a_record(&name, Ipv4Addr::new(1, 2, 3, 4))];
            }
            QueryType::Record(RecordType::AAAA) => {
                reply.answers = vec![aaaa_record(&name, "2001:db8::1".parse().unwrap())];
            }
            _ => reply.header.rcode = Rcode::NameError,
        }
        Some(reply)
    })
    .await;

    let channel = Channel::new(options_for(server.addr));
    let found = channel
        .resolve_host("dual.example.com.", dns_stub::AddressFamily::Unspec)
        .await
        .unwrap();

    assert_eq!(
        vec![
            "1.2.3.4".parse::<IpAddr>().unwrap(),
            "2001:db8::1".parse::<IpAddr>().unwrap(),
        ],
        found.addresses
    );
}

#[tokio::test]
async fn unspec_lookup_tolerates_one_failing_family() {
    let server = mock_udp_server(|_, query| {
        let mut reply = query.make_response();
        match query.questions[0].qtype {
            QueryType::Record(RecordType::A) => {
                reply.answers = vec![a_record(
                    &query.questions[0].name.to_string(),
                    Ipv4Addr::new(4, 4, 4, 4),
                )];
            }
            _ => reply.header.rcode = Rcode::ServerFailure,
        }
        Some(reply)
    })
    .await;

    let channel = Channel::new(options_for(server.addr));
    let found = channel
        .resolve_host("v4only.example.com.", dns_stub::AddressFamily::Unspec)
        .await
        .unwrap();

    assert_eq!(
        vec!["4.4.4.4".parse::<IpAddr>().unwrap()],
        found.addresses
    );
}

#[tokio::test]
async fn raw_query_is_reissued_under_a_channel_id() {
    let server = mock_udp_server(|_, query| Some(answer_with(query, Ipv4Addr::new(8, 8, 4, 4)))).await;

    let channel = Channel::new(options_for(server.addr));
    let raw = Message::new_query(0x4242, question("raw.example.com", RecordType::A));
    let answer = channel
        .query_raw(raw.to_octets().unwrap().freeze())
        .await
        .unwrap();

    assert_eq!(
        vec!["8.8.4.4".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );
    // the caller's id was replaced by a channel-allocated one, which
    // the mock echoed back
    assert_ne!(0x4242, answer.message.header.id);
    assert_eq!(
        vec![question("raw.example.com", RecordType::A)],
        answer.message.questions
    );
}

#[tokio::test]
async fn oversized_raw_query_goes_straight_to_tcp() {
    let udp = mock_udp_server(|_, _| None).await;
    let tcp_addr = mock_tcp_server(|query| answer_with(query, Ipv4Addr::new(3, 3, 3, 3))).await;

    let mut options = Options::new();
    options
        .set_servers(vec![ServerSpec {
            address: udp.addr.ip(),
            udp_port: Some(udp.addr.port()),
            tcp_port: Some(tcp_addr.port()),
        }])
        .set_timeout(Duration::from_millis(500))
        .set_tries(2)
        .set_lookups("b");
    let channel = Channel::new(options);

    // pad the query past the 512-octet UDP limit
    let mut raw = Message::new_query(9, question("big.example.com", RecordType::A));
    raw.additional = vec![Record {
        name: domain("big.example.com"),
        rdata: Rdata::Txt {
            strings: vec![Bytes::from(vec![b'x'; 200]); 3],
        },
        rclass: RecordClass::IN,
        ttl: 0,
    }];

    let answer = channel
        .query_raw(raw.to_octets().unwrap().freeze())
        .await
        .unwrap();

    assert_eq!(
        vec!["3.3.3.3".parse::<IpAddr>().unwrap()],
        answer.addresses()
    );
    assert_eq!(0, udp.queries.load(Ordering::SeqCst));
}

#[tokio::test]
async fn raw_query_must_carry_exactly_one_question() {
    let server = mock_udp_server(|_, _| None).await;
    let channel = Channel::new(options_for(server.addr));

    let mut raw = Message::new_query(7, question("a.example.com", RecordType::A));
    raw.questions.push(question("b.example.com", RecordType::A));
    let result = channel.query_raw(raw.to_octets().unwrap().freeze()).await;
    assert!(matches!(result, Err(Error::BadName)));

    raw.questions.clear();
    let result = channel.query_raw(raw.to_octets().unwrap().freeze()).await;
    assert!(matches!(result, Err(Error::BadName)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(0, server.queries.load(Ordering::SeqCst));
}

#[tokio::test]
async fn ptr_query_for_address_literal_is_rewritten() {
    let server = mock_udp_server(|_, query| {
        let mut reply = query.make_response();
        reply.answers = vec![ptr_record(
            &query.questions[0].name.to_string(),
            "host.example.com",
        )];
        Some(reply)
    })
    .await;

    let channel = Channel::new(options_for(server.addr));
    let answer = channel
        .query(
            "16.32.48.64",
            qclass_in(),
            QueryType::Record(RecordType::PTR),
        )
        .await
        .unwrap();

    assert_eq!(
        "64.48.32.16.in-addr.arpa",
        answer.message.questions[0].name.to_string()
    );
}

#[tokio::test]
async fn reverse_lookup_follows_the_reply_chain() {
    let server = mock_udp_server(|_, query| {
        let mut reply = query.make_response();
        reply.answers = vec![
            cname_record("64.48.32.16.in-addr.arpa", "64.48.32.8.in-addr.arpa"),
            ptr_record("64.48.32.8.in-addr.arpa", "other.com"),
        ];
        Some(reply)
    })
    .await;

    let channel = Channel::new(options_for(server.addr));
    let info = channel
        .resolve_address("16.32.48.64".parse().unwrap())
        .await
        .unwrap();

    assert_eq!("other.com", info.hostname.to_string());
    assert_eq!(vec![domain("other.com")], info.aliases);
    assert_eq!("16.32.48.64".parse::<IpAddr>().unwrap(), info.address);
}
