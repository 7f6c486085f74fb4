//! A lightweight, serious IRC client library.
//!
//! `sirc` speaks RFC 1459/2812 plus 005 ISUPPORT and a useful subset of
//! IRCv3 (CAP negotiation, SASL, STARTTLS, message tags). It opens the
//! transport — optionally through an HTTP CONNECT, SOCKS4 or SOCKS5
//! proxy, optionally under TLS from the start or upgraded mid-stream —
//! runs the logon conversation until the server acknowledges the
//! session, and then serves as a framed, tokenised message channel with
//! per-command handler dispatch and optional channel/user tracking.
//!
//! The protocol layer (framing, tokenising, casemapping, ISUPPORT) lives
//! in the companion [`sirc-proto`](sirc_proto) crate, re-exported here
//! as [`proto`].
//!
//! ```no_run
//! use sirc::client::prelude::*;
//!
//! # async fn run() -> Result<(), Error> {
//! let mut irc = Irc::new();
//! irc.set_server("irc.libera.chat", 0);
//! irc.set_nick("rustle");
//! irc.set_track(true);
//! irc.connect().await?;
//! irc.write("JOIN #rust").await?;
//! loop {
//!     match irc.read(0).await? {
//!         Some(msg) => println!("<- {}", msg),
//!         None => continue,
//!     }
//! }
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod util;

pub use sirc_proto as proto;

pub use crate::client::Irc;
pub use crate::error::{Error, Result};
