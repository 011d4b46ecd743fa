//! An asynchronous stub DNS resolver.
//!
//! A [`Channel`] is one resolver instance: it owns a pool of upstream
//! recursive servers, expands names through a search list, races
//! queries over UDP with TCP fallback, and delivers answers through
//! callbacks or futures without ever blocking the caller.  Embed it in
//! any tokio program:
//!
//! ```no_run
//! use dns_stub::{AddressFamily, Channel, Options};
//!
//! # async fn example() -> Result<(), dns_stub::Error> {
//! let channel = Channel::new(Options::new());
//! let found = channel.resolve_host("example.com", AddressFamily::Unspec).await?;
//! println!("{:?}", found.addresses);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
// Sometimes a redundant else is clearer
#![allow(clippy::redundant_else)]
// Don't care enough to fix
#![allow(clippy::match_same_arms)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::similar_names)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::wildcard_imports)]

pub mod addrinfo;
pub mod channel;
pub mod config;
pub mod error;
pub mod hosts;
mod pool;
mod query;
pub mod sortlist;

pub use addrinfo::{AddressFamily, HostAddresses, HostInfo};
pub use channel::{Answer, Channel};
pub use config::{Flags, Lookup, Options, ServerSpec, SocketEvent, Transport};
pub use error::Error;
