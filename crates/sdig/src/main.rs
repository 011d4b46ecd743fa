use clap::Parser;
use ipnet::IpNet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use dns_stub::hosts::Hosts;
use dns_stub::{Channel, Flags, Options, ServerSpec};
use dns_wire::message::{QueryClass, QueryType};
use dns_wire::name::Name;
use dns_wire::rdata::{Record, RecordClass, RecordType};

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// DNS stub-resolver lookup utility
///
/// Sends queries to recursive servers and prints the replies.  This
/// is a debugging front-end for the dns-stub crate; it reads no
/// system resolver configuration, so name servers and search domains
/// must be given on the command line.
struct Args {
    /// Name to look up (or an address, with -x)
    #[clap(value_parser)]
    name: String,

    /// Query type
    #[clap(default_value_t = QueryType::Record(RecordType::A), value_parser)]
    qtype: QueryType,

    /// Query class
    #[clap(default_value_t = QueryClass::Record(RecordClass::IN), value_parser)]
    qclass: QueryClass,

    /// Reverse lookup: treat the name as an IPv4/IPv6 address and
    /// query the matching PTR name
    #[clap(short = 'x', long, action(clap::ArgAction::SetTrue))]
    reverse: bool,

    /// Name server to query, as ip or ip:port; can be given more than
    /// once for a fallback list
    #[clap(short, long = "server", value_parser)]
    servers: Vec<ServerSpec>,

    /// Search suffix for unqualified names; can be given more than once
    #[clap(long = "search", value_parser)]
    search: Vec<Name>,

    /// Minimum dots for a name to be tried as-is first
    #[clap(long, default_value_t = 1, value_parser)]
    ndots: usize,

    /// Per-try timeout in milliseconds
    #[clap(short, long, default_value_t = 2000, value_parser)]
    timeout: u64,

    /// Attempts per server
    #[clap(long, default_value_t = 3, value_parser)]
    tries: u32,

    /// Query over TCP from the start
    #[clap(long, action(clap::ArgAction::SetTrue))]
    tcp: bool,

    /// Accept truncated replies instead of retrying over TCP
    #[clap(long, action(clap::ArgAction::SetTrue))]
    ignore_tc: bool,

    /// Clear the recursion-desired bit
    #[clap(long, action(clap::ArgAction::SetTrue))]
    no_recurse: bool,

    /// Attach an EDNS(0) OPT record
    #[clap(long, action(clap::ArgAction::SetTrue))]
    edns: bool,

    /// UDP payload size to advertise with --edns
    #[clap(long, default_value_t = dns_wire::edns::DEFAULT_UDP_PAYLOAD_SIZE, value_parser)]
    ednspsz: u16,

    /// Randomise query-name casing and require an exact echo (0x20)
    #[clap(long, action(clap::ArgAction::SetTrue))]
    dns0x20: bool,

    /// Rotate through servers instead of always trying the first
    #[clap(long, action(clap::ArgAction::SetTrue))]
    rotate: bool,

    /// CIDR sortlist entry for A/AAAA answer ordering; can be given
    /// more than once
    #[clap(long = "sortlist", value_parser)]
    sortlist: Vec<IpNet>,

    /// Path to a hosts file consulted before the DNS
    #[clap(long, value_parser)]
    hosts_file: Option<PathBuf>,
}

fn print_section(heading: &str, rrs: &[Record]) {
    if rrs.is_empty() {
        return;
    }

    println!("\n;; {heading}");
    for rr in rrs {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            rr.name,
            rr.ttl,
            rr.rclass,
            rr.rtype(),
            rr.rdata
        );
    }
}

async fn build_options(args: &Args) -> Options {
    let mut options = Options::new();
    if !args.servers.is_empty() {
        options.set_servers(args.servers.clone());
    }
    options
        .set_timeout(Duration::from_millis(args.timeout))
        .set_tries(args.tries)
        .set_ndots(args.ndots)
        .set_domains(args.search.clone())
        .set_rotate(args.rotate)
        .set_sortlist(args.sortlist.clone())
        .set_udp_payload_size(args.ednspsz)
        .set_flags(Flags {
            use_tcp: args.tcp,
            ignore_truncation: args.ignore_tc,
            no_recursion: args.no_recurse,
            edns: args.edns,
            dns0x20: args.dns0x20,
            ..Flags::default()
        });

    if let Some(path) = &args.hosts_file {
        match Hosts::load(path).await {
            Ok(hosts) => {
                options.set_hosts(hosts).set_lookups("fb");
            }
            Err(error) => {
                eprintln!("could not load {}: {error}", path.display());
                process::exit(1);
            }
        }
    } else {
        options.set_lookups("b");
    }

    options
}

async fn reverse_lookup(channel: &Channel, name: &str) {
    let address: IpAddr = match name.parse() {
        Ok(address) => address,
        Err(_) => {
            eprintln!("'{name}' is not an IP address");
            process::exit(1);
        }
    };

    match channel.resolve_address(address).await {
        Ok(info) => {
            println!("{address} is {}", info.hostname);
            for alias in &info.aliases {
                println!("\talias {alias}");
            }
        }
        Err(error) => {
            println!("; {error}");
            process::exit(1);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let options = build_options(&args).await;
    let channel = Channel::new(options);

    if args.reverse {
        reverse_lookup(&channel, &args.name).await;
        return;
    }

    println!(";; QUESTION");
    println!("{}\t{}\t{}", args.name, args.qclass, args.qtype);

    match channel.query(&args.name, args.qclass, args.qtype).await {
        Ok(answer) => {
            let message = &answer.message;
            println!(
                ";; status: {}, id: {}, timeouts: {}",
                message.header.rcode, message.header.id, answer.timeouts
            );
            if let Some(edns) = &message.edns {
                println!(
                    ";; EDNS: version {}, udp payload {}",
                    edns.version, edns.udp_payload_size
                );
            }
            print_section("ANSWER", &message.answers);
            print_section("AUTHORITY", &message.authority);
            print_section("ADDITIONAL", &message.additional);
        }
        Err(error) => {
            println!("\n;; ANSWER");
            println!("; {error}");
            process::exit(1);
        }
    }
}
